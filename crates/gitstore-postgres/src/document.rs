//! Per-tenant singletons: shallow set, index and config.

use std::collections::BTreeSet;

use async_trait::async_trait;

use gitstore_core::codec::{decode_document, encode_document};
use gitstore_core::{
    ConfigStorer, IndexStorer, KeyType, Namespace, ShallowStorer, StorageError, StorageResult,
};
use gitstore_types::{Index, ObjectHash, RepoConfig};

use crate::backend::{unavailable, PostgresBackend};

/// One `TEXT[]` row in `shallows`. Writes merge into the stored set.
#[derive(Clone, Debug)]
pub struct PostgresShallowStore {
    backend: PostgresBackend,
    namespace: Namespace,
}

impl PostgresShallowStore {
    pub fn new(backend: PostgresBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ShallowStorer for PostgresShallowStore {
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let hashes: Vec<String> = commits
            .iter()
            .map(ObjectHash::to_hex)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sqlx::query(
            "INSERT INTO shallows (url, hashes) VALUES ($1, $2)
             ON CONFLICT (url) DO UPDATE
             SET hashes = ARRAY(
                 SELECT DISTINCT h FROM unnest(shallows.hashes || EXCLUDED.hashes) AS t(h)
                 ORDER BY h
             )",
        )
        .bind(self.namespace.tenant_id())
        .bind(&hashes)
        .execute(self.backend.pool())
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>> {
        let row: Option<(Vec<String>,)> =
            sqlx::query_as("SELECT hashes FROM shallows WHERE url = $1")
                .bind(self.namespace.tenant_id())
                .fetch_optional(self.backend.pool())
                .await
                .map_err(unavailable)?;
        let Some((hashes,)) = row else {
            return Ok(Vec::new());
        };
        let key = self.namespace.key(KeyType::Shallow, None);
        let mut hashes = hashes
            .iter()
            .map(|hex| ObjectHash::from_hex(hex).map_err(|e| StorageError::corruption(key.as_str(), e)))
            .collect::<StorageResult<Vec<_>>>()?;
        hashes.sort();
        hashes.dedup();
        Ok(hashes)
    }
}

/// Upsert a serialized document into a `(url, blob)` table.
async fn put_blob(
    backend: &PostgresBackend,
    table: &'static str,
    url: &str,
    data: Vec<u8>,
) -> StorageResult<()> {
    let statement = format!(
        "INSERT INTO {table} (url, blob) VALUES ($1, $2)
         ON CONFLICT (url) DO UPDATE SET blob = EXCLUDED.blob"
    );
    sqlx::query(&statement)
        .bind(url)
        .bind(data)
        .execute(backend.pool())
        .await
        .map_err(unavailable)?;
    Ok(())
}

async fn get_blob(
    backend: &PostgresBackend,
    table: &'static str,
    url: &str,
) -> StorageResult<Option<Vec<u8>>> {
    let statement = format!("SELECT blob FROM {table} WHERE url = $1");
    let row: Option<(Vec<u8>,)> = sqlx::query_as(&statement)
        .bind(url)
        .fetch_optional(backend.pool())
        .await
        .map_err(unavailable)?;
    Ok(row.map(|(blob,)| blob))
}

/// Serialized index in `indexes`.
#[derive(Clone, Debug)]
pub struct PostgresIndexStore {
    backend: PostgresBackend,
    namespace: Namespace,
}

impl PostgresIndexStore {
    pub fn new(backend: PostgresBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl IndexStorer for PostgresIndexStore {
    async fn set_index(&self, index: &Index) -> StorageResult<()> {
        let data = encode_document(index)?;
        put_blob(&self.backend, "indexes", self.namespace.tenant_id(), data).await
    }

    async fn index(&self) -> StorageResult<Index> {
        match get_blob(&self.backend, "indexes", self.namespace.tenant_id()).await? {
            Some(raw) => decode_document(&self.namespace.key(KeyType::Index, None), &raw),
            None => Ok(Index::default()),
        }
    }
}

/// Serialized repository config in `configs`.
#[derive(Clone, Debug)]
pub struct PostgresConfigStore {
    backend: PostgresBackend,
    namespace: Namespace,
}

impl PostgresConfigStore {
    pub fn new(backend: PostgresBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ConfigStorer for PostgresConfigStore {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()> {
        let data = encode_document(config)?;
        put_blob(&self.backend, "configs", self.namespace.tenant_id(), data).await
    }

    async fn config(&self) -> StorageResult<RepoConfig> {
        match get_blob(&self.backend, "configs", self.namespace.tenant_id()).await? {
            Some(raw) => decode_document(&self.namespace.key(KeyType::Config, None), &raw),
            None => Ok(RepoConfig::default()),
        }
    }
}
