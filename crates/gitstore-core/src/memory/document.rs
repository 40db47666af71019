//! Per-tenant singletons: shallow set, index and config.

use async_trait::async_trait;

use gitstore_types::{Index, ObjectHash, RepoConfig};

use super::MemoryBackend;
use crate::codec::{decode_document, encode_document};
use crate::error::{StorageError, StorageResult};
use crate::namespace::{KeyType, Namespace};
use crate::traits::{ConfigStorer, IndexStorer, ShallowStorer};

/// Shallow commits as a string set under `<ns>:shallow`.
#[derive(Clone, Debug)]
pub struct MemoryShallowStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryShallowStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ShallowStorer for MemoryShallowStore {
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let key = self.namespace.key(KeyType::Shallow, None);
        let mut state = self.backend.write()?;
        state
            .sets
            .entry(key)
            .or_default()
            .extend(commits.iter().map(ObjectHash::to_hex));
        Ok(())
    }

    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>> {
        let key = self.namespace.key(KeyType::Shallow, None);
        let state = self.backend.read()?;
        let Some(members) = state.sets.get(&key) else {
            return Ok(Vec::new());
        };
        members
            .iter()
            .map(|hex| {
                ObjectHash::from_hex(hex).map_err(|e| StorageError::corruption(key.as_str(), e))
            })
            .collect()
    }
}

/// Serialized index under `<ns>:index`.
#[derive(Clone, Debug)]
pub struct MemoryIndexStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryIndexStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl IndexStorer for MemoryIndexStore {
    async fn set_index(&self, index: &Index) -> StorageResult<()> {
        let data = encode_document(index)?;
        let key = self.namespace.key(KeyType::Index, None);
        self.backend.write()?.strings.insert(key, data);
        Ok(())
    }

    async fn index(&self) -> StorageResult<Index> {
        let key = self.namespace.key(KeyType::Index, None);
        let raw = self.backend.read()?.strings.get(&key).cloned();
        match raw {
            Some(raw) => decode_document(&key, &raw),
            None => Ok(Index::default()),
        }
    }
}

/// Serialized repository config under `<ns>:config`.
#[derive(Clone, Debug)]
pub struct MemoryConfigStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryConfigStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ConfigStorer for MemoryConfigStore {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()> {
        let data = encode_document(config)?;
        let key = self.namespace.key(KeyType::Config, None);
        self.backend.write()?.strings.insert(key, data);
        Ok(())
    }

    async fn config(&self) -> StorageResult<RepoConfig> {
        let key = self.namespace.key(KeyType::Config, None);
        let raw = self.backend.read()?.strings.get(&key).cloned();
        match raw {
            Some(raw) => decode_document(&key, &raw),
            None => Ok(RepoConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitstore_types::{FileMode, IndexEntry, RemoteConfig};

    #[tokio::test]
    async fn shallow_union_is_idempotent() {
        let store = MemoryShallowStore::new(MemoryBackend::new(), Namespace::new("t"));
        let a = ObjectHash::from_raw([1; 20]);
        let b = ObjectHash::from_raw([2; 20]);
        store.set_shallow(&[a]).await.unwrap();
        store.set_shallow(&[a, b]).await.unwrap();
        store.set_shallow(&[]).await.unwrap();
        assert_eq!(store.shallow().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn index_roundtrip() {
        let store = MemoryIndexStore::new(MemoryBackend::new(), Namespace::new("t"));
        let mut index = Index::default();
        index.upsert(IndexEntry::new("src/lib.rs", ObjectHash::from_raw([3; 20]), FileMode::Regular, 42));
        store.set_index(&index).await.unwrap();
        assert_eq!(store.index().await.unwrap(), index);
    }

    #[tokio::test]
    async fn config_roundtrip_and_corruption() {
        let backend = MemoryBackend::new();
        let ns = Namespace::new("t");
        let store = MemoryConfigStore::new(backend.clone(), ns.clone());
        let mut config = RepoConfig::default();
        config.add_remote(RemoteConfig::new("origin", "https://example.com/r.git"));
        store.set_config(&config).await.unwrap();
        assert_eq!(store.config().await.unwrap(), config);

        backend
            .write()
            .unwrap()
            .strings
            .insert(ns.key(KeyType::Config, None), b"{not json".to_vec());
        assert!(matches!(
            store.config().await,
            Err(StorageError::Corruption { .. })
        ));
    }
}
