use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use gitstore_core::traits::{effective_hash, require_concrete};
use gitstore_core::{
    BatchedIter, HashIter, KeyType, Namespace, ObjectIter, ObjectStorer, StorageError,
    StorageResult,
};
use gitstore_types::{EncodedObject, ObjectHash, ObjectType};

use crate::backend::{unavailable, RedisBackend, ScanSource};

/// Objects as `<ns>:object:<type>:<hash>` string keys holding the raw payload.
#[derive(Clone, Debug)]
pub struct RedisObjectStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisObjectStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    fn probe_keys(&self, hash: &ObjectHash) -> Vec<String> {
        ObjectType::PROBE_ORDER
            .iter()
            .map(|kind| self.namespace.object_key(*kind, hash))
            .collect()
    }

    /// `(exists, length)` for every concrete type, in probe order, from one
    /// pipelined round-trip. `STRLEN` alone cannot tell an empty payload
    /// from a missing key.
    async fn probe_lengths(&self, hash: &ObjectHash) -> StorageResult<Option<u64>> {
        let mut pipe = redis::pipe();
        for key in self.probe_keys(hash) {
            pipe.exists(&key).strlen(&key);
        }
        let mut conn = self.backend.connection();
        let replies: Vec<u64> = pipe.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(replies
            .chunks_exact(2)
            .find(|pair| pair[0] > 0)
            .map(|pair| pair[1]))
    }
}

fn malformed_key(key: &str) -> StorageError {
    warn!(key, "unparseable object key");
    StorageError::corruption(key, "malformed object key")
}

#[async_trait]
impl ObjectStorer for RedisObjectStore {
    async fn set_encoded_object(&self, object: &EncodedObject) -> StorageResult<ObjectHash> {
        require_concrete(object.kind, "set_encoded_object")?;
        let hash = effective_hash(object);
        // One type per hash: a rewrite under another type replaces the old key.
        let stale: Vec<String> = ObjectType::PROBE_ORDER
            .into_iter()
            .filter(|kind| *kind != object.kind)
            .map(|kind| self.namespace.object_key(kind, &hash))
            .collect();
        let mut conn = self.backend.connection();
        let _: () = redis::pipe()
            .atomic()
            .del(stale)
            .ignore()
            .set(self.namespace.object_key(object.kind, &hash), object.data.as_slice())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        debug!(tenant = %self.namespace, %hash, kind = %object.kind, size = object.data.len(), "stored object");
        Ok(hash)
    }

    async fn encoded_object(
        &self,
        kind: ObjectType,
        hash: &ObjectHash,
    ) -> StorageResult<EncodedObject> {
        let mut conn = self.backend.connection();
        if kind != ObjectType::Any {
            let data: Option<Vec<u8>> = conn
                .get(self.namespace.object_key(kind, hash))
                .await
                .map_err(unavailable)?;
            return data
                .map(|data| EncodedObject::with_hash(*hash, kind, data))
                .ok_or(StorageError::ObjectNotFound(*hash));
        }

        let mut pipe = redis::pipe();
        for key in self.probe_keys(hash) {
            pipe.get(key);
        }
        let payloads: Vec<Option<Vec<u8>>> =
            pipe.query_async(&mut conn).await.map_err(unavailable)?;
        ObjectType::PROBE_ORDER
            .into_iter()
            .zip(payloads)
            .find_map(|(kind, data)| data.map(|data| EncodedObject::with_hash(*hash, kind, data)))
            .ok_or(StorageError::ObjectNotFound(*hash))
    }

    async fn has_encoded_object(&self, hash: &ObjectHash) -> StorageResult<bool> {
        let mut conn = self.backend.connection();
        let found: usize = conn
            .exists(self.probe_keys(hash))
            .await
            .map_err(unavailable)?;
        Ok(found > 0)
    }

    async fn encoded_object_size(&self, hash: &ObjectHash) -> StorageResult<u64> {
        self.probe_lengths(hash)
            .await?
            .ok_or(StorageError::ObjectNotFound(*hash))
    }

    async fn iter_encoded_objects(&self, kind: ObjectType) -> StorageResult<ObjectIter> {
        require_concrete(kind, "iter_encoded_objects")?;
        let sub_prefix = format!("{kind}:");
        let literal = format!("{}{sub_prefix}", self.namespace.key_prefix(KeyType::Object));
        let pattern = self.namespace.pattern(KeyType::Object, &sub_prefix);
        Ok(BatchedIter::new(ScanSource::entries(
            &self.backend,
            pattern,
            move |key, data| {
                let hash = key
                    .strip_prefix(literal.as_str())
                    .and_then(|hex| hex.parse::<ObjectHash>().ok())
                    .ok_or_else(|| malformed_key(key))?;
                Ok(EncodedObject::with_hash(hash, kind, data))
            },
        )))
    }

    async fn iter_object_hashes(&self) -> StorageResult<HashIter> {
        let namespace = self.namespace.clone();
        Ok(BatchedIter::new(ScanSource::keys(
            &self.backend,
            self.namespace.pattern(KeyType::Object, ""),
            move |key| {
                namespace
                    .parse_object_key(key)
                    .map(|(_, hash)| hash)
                    .ok_or_else(|| malformed_key(key))
            },
        )))
    }

    /// One `MGET` for a concrete type; the wildcard falls back to probing
    /// each hash.
    async fn encoded_objects(
        &self,
        kind: ObjectType,
        hashes: &[ObjectHash],
    ) -> StorageResult<Vec<Option<EncodedObject>>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        if kind == ObjectType::Any {
            let mut out = Vec::with_capacity(hashes.len());
            for hash in hashes {
                match self.encoded_object(kind, hash).await {
                    Ok(object) => out.push(Some(object)),
                    Err(StorageError::ObjectNotFound(_)) => out.push(None),
                    Err(e) => return Err(e),
                }
            }
            return Ok(out);
        }
        let keys: Vec<String> = hashes
            .iter()
            .map(|hash| self.namespace.object_key(kind, hash))
            .collect();
        let mut conn = self.backend.connection();
        let payloads: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(hashes
            .iter()
            .zip(payloads)
            .map(|(hash, data)| data.map(|data| EncodedObject::with_hash(*hash, kind, data)))
            .collect())
    }
}
