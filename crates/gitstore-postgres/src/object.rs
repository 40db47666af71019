use async_trait::async_trait;
use tracing::{debug, warn};

use gitstore_core::traits::{effective_hash, require_concrete};
use gitstore_core::{
    BatchSource, BatchedIter, HashIter, KeyType, Namespace, ObjectIter, ObjectStorer,
    StorageError, StorageResult,
};
use gitstore_types::{EncodedObject, ObjectHash, ObjectType};

use crate::backend::{unavailable, Page, PostgresBackend};

/// Rows of the `objects` table, keyed by `(url, hash)`.
#[derive(Clone, Debug)]
pub struct PostgresObjectStore {
    backend: PostgresBackend,
    namespace: Namespace,
}

impl PostgresObjectStore {
    pub fn new(backend: PostgresBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    fn url(&self) -> &str {
        self.namespace.tenant_id()
    }
}

fn parse_hash(namespace: &Namespace, kind: ObjectType, raw: &str) -> StorageResult<ObjectHash> {
    raw.parse().map_err(|e| {
        let key = namespace.key(KeyType::Object, Some(&format!("{kind}:{raw}")));
        warn!(%key, "unparseable object hash");
        StorageError::corruption(key, e)
    })
}

fn probe_order() -> Vec<String> {
    ObjectType::PROBE_ORDER.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl ObjectStorer for PostgresObjectStore {
    async fn set_encoded_object(&self, object: &EncodedObject) -> StorageResult<ObjectHash> {
        require_concrete(object.kind, "set_encoded_object")?;
        let hash = effective_hash(object);
        sqlx::query(
            "INSERT INTO objects (url, hash, type, blob, size) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (url, hash) DO UPDATE
             SET type = EXCLUDED.type, blob = EXCLUDED.blob, size = EXCLUDED.size",
        )
        .bind(self.url())
        .bind(hash.to_hex())
        .bind(object.kind.as_str())
        .bind(object.data.as_slice())
        .bind(object.data.len() as i64)
        .execute(self.backend.pool())
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
        let row: Option<(String, Vec<u8>)> = if kind == ObjectType::Any {
            sqlx::query_as::<_, (String, Vec<u8>)>(
                "SELECT type, blob FROM objects WHERE url = $1 AND hash = $2
                 ORDER BY array_position($3::text[], type) LIMIT 1",
            )
            .bind(self.url())
            .bind(hash.to_hex())
            .bind(probe_order())
            .fetch_optional(self.backend.pool())
            .await
        } else {
            sqlx::query_as::<_, (String, Vec<u8>)>(
                "SELECT type, blob FROM objects WHERE url = $1 AND hash = $2 AND type = $3",
            )
            .bind(self.url())
            .bind(hash.to_hex())
            .bind(kind.as_str())
            .fetch_optional(self.backend.pool())
            .await
        }
        .map_err(unavailable)?;

        let (stored_kind, data) = row.ok_or(StorageError::ObjectNotFound(*hash))?;
        let stored_kind: ObjectType = stored_kind.parse().map_err(|e| {
            StorageError::corruption(self.namespace.object_key(kind, hash), e)
        })?;
        Ok(EncodedObject::with_hash(*hash, stored_kind, data))
    }

    async fn has_encoded_object(&self, hash: &ObjectHash) -> StorageResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM objects WHERE url = $1 AND hash = $2)")
                .bind(self.url())
                .bind(hash.to_hex())
                .fetch_one(self.backend.pool())
                .await
                .map_err(unavailable)?;
        Ok(exists)
    }

    async fn encoded_object_size(&self, hash: &ObjectHash) -> StorageResult<u64> {
        let size: Option<(i64,)> =
            sqlx::query_as("SELECT size FROM objects WHERE url = $1 AND hash = $2")
                .bind(self.url())
                .bind(hash.to_hex())
                .fetch_optional(self.backend.pool())
                .await
                .map_err(unavailable)?;
        size.map(|(size,)| size.max(0) as u64)
            .ok_or(StorageError::ObjectNotFound(*hash))
    }

    async fn iter_encoded_objects(&self, kind: ObjectType) -> StorageResult<ObjectIter> {
        require_concrete(kind, "iter_encoded_objects")?;
        Ok(BatchedIter::new(ObjectPages {
            backend: self.backend.clone(),
            namespace: self.namespace.clone(),
            kind,
            page: Page::new(self.backend.batch_size()),
        }))
    }

    async fn iter_object_hashes(&self) -> StorageResult<HashIter> {
        Ok(BatchedIter::new(HashPages {
            backend: self.backend.clone(),
            namespace: self.namespace.clone(),
            page: Page::new(self.backend.batch_size()),
        }))
    }

    /// One `= ANY($n)` query for a concrete type.
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
        let wanted: Vec<String> = hashes.iter().map(ObjectHash::to_hex).collect();
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT hash, blob FROM objects WHERE url = $1 AND type = $2 AND hash = ANY($3)",
        )
        .bind(self.url())
        .bind(kind.as_str())
        .bind(&wanted)
        .fetch_all(self.backend.pool())
        .await
        .map_err(unavailable)?;

        let mut found = std::collections::HashMap::with_capacity(rows.len());
        for (hash, data) in rows {
            found.insert(parse_hash(&self.namespace, kind, &hash)?, data);
        }
        Ok(hashes
            .iter()
            .map(|hash| {
                found
                    .remove(hash)
                    .map(|data| EncodedObject::with_hash(*hash, kind, data))
            })
            .collect())
    }
}

struct ObjectPages {
    backend: PostgresBackend,
    namespace: Namespace,
    kind: ObjectType,
    page: Page,
}

#[async_trait]
impl BatchSource<EncodedObject> for ObjectPages {
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<EncodedObject>>> {
        if self.page.done {
            return Ok(None);
        }
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT hash, blob FROM objects WHERE url = $1 AND type = $2
             ORDER BY hash LIMIT $3 OFFSET $4",
        )
        .bind(self.namespace.tenant_id())
        .bind(self.kind.as_str())
        .bind(self.page.limit)
        .bind(self.page.offset)
        .fetch_all(self.backend.pool())
        .await
        .map_err(unavailable)?;
        self.page.advance(rows.len());

        rows.into_iter()
            .map(|(hash, data)| {
                let hash = parse_hash(&self.namespace, self.kind, &hash)?;
                Ok(EncodedObject::with_hash(hash, self.kind, data))
            })
            .collect::<StorageResult<Vec<_>>>()
            .map(Some)
    }
}

struct HashPages {
    backend: PostgresBackend,
    namespace: Namespace,
    page: Page,
}

#[async_trait]
impl BatchSource<ObjectHash> for HashPages {
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<ObjectHash>>> {
        if self.page.done {
            return Ok(None);
        }
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT hash, type FROM objects WHERE url = $1 ORDER BY hash LIMIT $2 OFFSET $3",
        )
        .bind(self.namespace.tenant_id())
        .bind(self.page.limit)
        .bind(self.page.offset)
        .fetch_all(self.backend.pool())
        .await
        .map_err(unavailable)?;
        self.page.advance(rows.len());

        rows.into_iter()
            .map(|(hash, kind)| {
                let kind = kind.parse().unwrap_or(ObjectType::Any);
                parse_hash(&self.namespace, kind, &hash)
            })
            .collect::<StorageResult<Vec<_>>>()
            .map(Some)
    }
}
