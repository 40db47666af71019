use std::str::FromStr;
use std::sync::Arc;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use gitstore_core::{Namespace, StorageError, StorageResult};

use crate::config::PostgresConfig;
use crate::schema;
use crate::storage::PostgresStorage;

pub(crate) const BACKEND: &str = "postgres";

pub(crate) fn unavailable(err: sqlx::Error) -> StorageError {
    StorageError::unavailable(BACKEND, err)
}

/// SQLSTATE `40001` (serialization_failure) or `40P01` (deadlock_detected).
pub(crate) fn is_serialization_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    }
}

/// Shared connection pool for every tenant derived from it.
///
/// Cloning is cheap. Create one per process, hand out
/// [`PostgresBackend::storage`] facades and [`PostgresBackend::close`] the
/// pool at shutdown.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresBackend {
    /// Build the pool from `config` and bring the schema up to date.
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        Self::connect_with(config.connect_options()?, config).await
    }

    /// Like [`PostgresBackend::connect`], with connection parameters taken
    /// from a `postgres://` URL. Pool settings still come from `config`.
    pub async fn connect_url(url: &str, config: &PostgresConfig) -> StorageResult<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| StorageError::InvalidArgument(format!("postgres url: {e}")))?;
        Self::connect_with(options, config).await
    }

    async fn connect_with(options: PgConnectOptions, config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(unavailable)?;
        schema::migrate(&pool).await?;

        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            max_connections = config.max_connections,
            "postgres backend connected"
        );

        Ok(Self {
            pool,
            config: Arc::new(config.clone()),
        })
    }

    /// Wrap an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: PgPool, config: PostgresConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// Storage facade for `tenant`.
    pub fn storage(&self, tenant: &str) -> PostgresStorage {
        PostgresStorage::new(self.clone(), Namespace::new(tenant))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn batch_size(&self) -> i64 {
        self.config.batch_size.max(1) as i64
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

/// Offset/limit pagination state.
///
/// Rows are ordered by their key, but nothing pins the result set between
/// pages: rows inserted or deleted before the current offset shift later
/// pages, so a concurrent writer can cause a row to be skipped or repeated.
#[derive(Debug)]
pub(crate) struct Page {
    pub(crate) offset: i64,
    pub(crate) limit: i64,
    pub(crate) done: bool,
}

impl Page {
    pub(crate) fn new(limit: i64) -> Self {
        Self {
            offset: 0,
            limit,
            done: false,
        }
    }

    /// Record that `fetched` rows came back from the current page.
    pub(crate) fn advance(&mut self, fetched: usize) {
        self.offset += fetched as i64;
        if (fetched as i64) < self.limit {
            self.done = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_stops_on_short_read() {
        let mut page = Page::new(100);
        page.advance(100);
        assert_eq!(page.offset, 100);
        assert!(!page.done);
        page.advance(37);
        assert_eq!(page.offset, 137);
        assert!(page.done);
    }

    #[test]
    fn pool_errors_are_unavailable() {
        let err = unavailable(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(!is_serialization_failure(&sqlx::Error::PoolTimedOut));
    }

    #[tokio::test]
    async fn bad_url_is_invalid_argument() {
        let err = PostgresBackend::connect_url("not a url", &PostgresConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }
}
