use async_trait::async_trait;
use tracing::{debug, warn};

use gitstore_types::{EncodedObject, ObjectHash, ObjectType};

use super::{KeyScan, MemoryBackend};
use crate::error::{StorageError, StorageResult};
use crate::iter::{BatchedIter, HashIter, ObjectIter};
use crate::namespace::{KeyType, Namespace};
use crate::traits::{effective_hash, require_concrete, ObjectStorer};

/// Objects stored as `<ns>:object:<type>:<hash>` string keys.
#[derive(Clone, Debug)]
pub struct MemoryObjectStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryObjectStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    /// First concrete type (in probe order, or just `kind`) holding `hash`,
    /// with its payload.
    fn lookup(&self, kind: ObjectType, hash: &ObjectHash) -> StorageResult<Option<(ObjectType, Vec<u8>)>> {
        let state = self.backend.read()?;
        let candidates: &[ObjectType] = if kind == ObjectType::Any {
            &ObjectType::PROBE_ORDER
        } else {
            std::slice::from_ref(&kind)
        };
        Ok(candidates.iter().find_map(|candidate| {
            state
                .strings
                .get(&self.namespace.object_key(*candidate, hash))
                .map(|data| (*candidate, data.clone()))
        }))
    }

    fn stored_len(&self, hash: &ObjectHash) -> StorageResult<Option<u64>> {
        let state = self.backend.read()?;
        Ok(ObjectType::PROBE_ORDER.iter().find_map(|kind| {
            state
                .strings
                .get(&self.namespace.object_key(*kind, hash))
                .map(|data| data.len() as u64)
        }))
    }
}

#[async_trait]
impl ObjectStorer for MemoryObjectStore {
    async fn set_encoded_object(&self, object: &EncodedObject) -> StorageResult<ObjectHash> {
        require_concrete(object.kind, "set_encoded_object")?;
        let hash = effective_hash(object);
        let mut state = self.backend.write()?;
        // One type per hash: a rewrite under another type replaces the old entry.
        for kind in ObjectType::PROBE_ORDER {
            if kind != object.kind {
                state.strings.remove(&self.namespace.object_key(kind, &hash));
            }
        }
        state
            .strings
            .insert(self.namespace.object_key(object.kind, &hash), object.data.clone());
        drop(state);
        debug!(tenant = %self.namespace, %hash, kind = %object.kind, size = object.data.len(), "stored object");
        Ok(hash)
    }

    async fn encoded_object(
        &self,
        kind: ObjectType,
        hash: &ObjectHash,
    ) -> StorageResult<EncodedObject> {
        match self.lookup(kind, hash)? {
            Some((found, data)) => Ok(EncodedObject::with_hash(*hash, found, data)),
            None => Err(StorageError::ObjectNotFound(*hash)),
        }
    }

    async fn has_encoded_object(&self, hash: &ObjectHash) -> StorageResult<bool> {
        Ok(self.stored_len(hash)?.is_some())
    }

    async fn encoded_object_size(&self, hash: &ObjectHash) -> StorageResult<u64> {
        self.stored_len(hash)?
            .ok_or(StorageError::ObjectNotFound(*hash))
    }

    async fn iter_encoded_objects(&self, kind: ObjectType) -> StorageResult<ObjectIter> {
        require_concrete(kind, "iter_encoded_objects")?;
        let prefix = format!("{}{kind}:", self.namespace.key_prefix(KeyType::Object));
        let strip = prefix.clone();
        Ok(BatchedIter::new(KeyScan::new(
            self.backend.clone(),
            prefix,
            move |key, data| {
                let hash = key
                    .strip_prefix(strip.as_str())
                    .and_then(|hex| hex.parse::<ObjectHash>().ok())
                    .ok_or_else(|| {
                        warn!(key, "unparseable object key");
                        StorageError::corruption(key, "malformed object key")
                    })?;
                Ok(EncodedObject::with_hash(hash, kind, data))
            },
        )))
    }

    async fn iter_object_hashes(&self) -> StorageResult<HashIter> {
        let namespace = self.namespace.clone();
        Ok(BatchedIter::new(KeyScan::new(
            self.backend.clone(),
            self.namespace.key_prefix(KeyType::Object),
            move |key, _| {
                namespace
                    .parse_object_key(key)
                    .map(|(_, hash)| hash)
                    .ok_or_else(|| {
                        warn!(key, "unparseable object key");
                        StorageError::corruption(key, "malformed object key")
                    })
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tenant: &str) -> MemoryObjectStore {
        MemoryObjectStore::new(MemoryBackend::with_batch_size(4), Namespace::new(tenant))
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = store("repo-a");
        let blob = EncodedObject::new(ObjectType::Blob, b"hello".to_vec());
        let hash = store.set_encoded_object(&blob).await.unwrap();
        assert_eq!(hash, blob.hash);

        let read = store.encoded_object(ObjectType::Blob, &hash).await.unwrap();
        assert_eq!(read.data, b"hello");
        assert_eq!(read.size, 5);
        assert_eq!(store.encoded_object_size(&hash).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn zero_hash_is_computed() {
        let store = store("t");
        let object = EncodedObject::with_hash(ObjectHash::ZERO, ObjectType::Blob, b"hello".to_vec());
        let hash = store.set_encoded_object(&object).await.unwrap();
        assert_eq!(hash.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
    }

    #[tokio::test]
    async fn wrong_type_is_not_found() {
        let store = store("t");
        let blob = EncodedObject::new(ObjectType::Blob, b"x".to_vec());
        store.set_encoded_object(&blob).await.unwrap();
        let err = store
            .encoded_object(ObjectType::Commit, &blob.hash)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound(h) if h == blob.hash));
        assert!(store.has_encoded_object(&blob.hash).await.unwrap());
    }

    #[tokio::test]
    async fn rewrite_under_new_type_replaces_old_entry() {
        let backend = MemoryBackend::new();
        let store = MemoryObjectStore::new(backend.clone(), Namespace::new("t"));
        let hash = ObjectHash::from_raw([9; 20]);
        store
            .set_encoded_object(&EncodedObject::with_hash(hash, ObjectType::Tree, b"old-tree".to_vec()))
            .await
            .unwrap();
        store
            .set_encoded_object(&EncodedObject::with_hash(hash, ObjectType::Blob, b"fixed".to_vec()))
            .await
            .unwrap();

        let any = store.encoded_object(ObjectType::Any, &hash).await.unwrap();
        assert_eq!(any.kind, ObjectType::Blob);
        assert_eq!(any.data, b"fixed");
        assert_eq!(store.encoded_object_size(&hash).await.unwrap(), 5);
        assert_eq!(backend.key_count().unwrap(), 1);
        let hashes = store.iter_object_hashes().await.unwrap().try_collect().await.unwrap();
        assert_eq!(hashes, vec![hash]);
    }

    #[tokio::test]
    async fn any_type_is_rejected_for_writes_and_iteration() {
        let store = store("t");
        let object = EncodedObject::with_hash(ObjectHash::from_raw([1; 20]), ObjectType::Any, vec![]);
        assert!(matches!(
            store.set_encoded_object(&object).await,
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.iter_encoded_objects(ObjectType::Any).await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn hashes_span_every_type() {
        let store = store("t");
        let blob = EncodedObject::new(ObjectType::Blob, b"b".to_vec());
        let tree = EncodedObject::new(ObjectType::Tree, b"t".to_vec());
        let delta = EncodedObject::new(ObjectType::RefDelta, b"d".to_vec());
        for object in [&blob, &tree, &delta] {
            store.set_encoded_object(object).await.unwrap();
        }
        let mut hashes = store.iter_object_hashes().await.unwrap().try_collect().await.unwrap();
        hashes.sort();
        let mut expected = vec![blob.hash, tree.hash, delta.hash];
        expected.sort();
        assert_eq!(hashes, expected);
    }

    #[tokio::test]
    async fn batch_read_marks_missing() {
        let store = store("t");
        let blob = EncodedObject::new(ObjectType::Blob, b"present".to_vec());
        store.set_encoded_object(&blob).await.unwrap();
        let missing = ObjectHash::from_raw([7; 20]);
        let got = store
            .encoded_objects(ObjectType::Blob, &[blob.hash, missing])
            .await
            .unwrap();
        assert_eq!(got[0].as_ref().map(|o| o.data.clone()), Some(b"present".to_vec()));
        assert!(got[1].is_none());
    }

    #[tokio::test]
    async fn pack_markers() {
        let store = store("t");
        assert!(store.object_packs().await.unwrap().is_empty());
        assert!(matches!(
            store.loose_object_time(&ObjectHash::ZERO).await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            store.delete_loose_object(&ObjectHash::ZERO).await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            store
                .delete_old_object_pack_and_index(&ObjectHash::ZERO, std::time::SystemTime::now())
                .await,
            Err(StorageError::Unsupported(_))
        ));
    }
}
