//! Per-tenant singletons: shallow set, index and config.

use async_trait::async_trait;
use redis::AsyncCommands;

use gitstore_core::codec::{decode_document, encode_document};
use gitstore_core::{
    ConfigStorer, IndexStorer, KeyType, Namespace, ShallowStorer, StorageError, StorageResult,
};
use gitstore_types::{Index, ObjectHash, RepoConfig};

use crate::backend::{unavailable, RedisBackend};

/// Shallow commits as a Redis set under `<ns>:shallow`.
#[derive(Clone, Debug)]
pub struct RedisShallowStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisShallowStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ShallowStorer for RedisShallowStore {
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let members: Vec<String> = commits.iter().map(ObjectHash::to_hex).collect();
        let mut conn = self.backend.connection();
        let _: () = conn
            .sadd(self.namespace.key(KeyType::Shallow, None), members)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>> {
        let key = self.namespace.key(KeyType::Shallow, None);
        let mut conn = self.backend.connection();
        let members: Vec<String> = conn.smembers(&key).await.map_err(unavailable)?;
        let mut hashes = members
            .iter()
            .map(|hex| ObjectHash::from_hex(hex).map_err(|e| StorageError::corruption(key.as_str(), e)))
            .collect::<StorageResult<Vec<_>>>()?;
        hashes.sort();
        Ok(hashes)
    }
}

/// Serialized index under `<ns>:index`.
#[derive(Clone, Debug)]
pub struct RedisIndexStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisIndexStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl IndexStorer for RedisIndexStore {
    async fn set_index(&self, index: &Index) -> StorageResult<()> {
        let data = encode_document(index)?;
        let mut conn = self.backend.connection();
        let _: () = conn
            .set(self.namespace.key(KeyType::Index, None), data)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn index(&self) -> StorageResult<Index> {
        let key = self.namespace.key(KeyType::Index, None);
        let mut conn = self.backend.connection();
        let raw: Option<Vec<u8>> = conn.get(&key).await.map_err(unavailable)?;
        match raw {
            Some(raw) => decode_document(&key, &raw),
            None => Ok(Index::default()),
        }
    }
}

/// Serialized repository config under `<ns>:config`.
#[derive(Clone, Debug)]
pub struct RedisConfigStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisConfigStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ConfigStorer for RedisConfigStore {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()> {
        let data = encode_document(config)?;
        let mut conn = self.backend.connection();
        let _: () = conn
            .set(self.namespace.key(KeyType::Config, None), data)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn config(&self) -> StorageResult<RepoConfig> {
        let key = self.namespace.key(KeyType::Config, None);
        let mut conn = self.backend.connection();
        let raw: Option<Vec<u8>> = conn.get(&key).await.map_err(unavailable)?;
        match raw {
            Some(raw) => decode_document(&key, &raw),
            None => Ok(RepoConfig::default()),
        }
    }
}
