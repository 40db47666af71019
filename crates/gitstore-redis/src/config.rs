use std::time::Duration;

use gitstore_core::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};

/// Connection settings for [`crate::RedisBackend`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `redis://[user:password@]host[:port][/db]`
    pub url: String,
    /// `SCAN ... COUNT` hint and page size for iterators.
    pub batch_size: usize,
    /// Upper bound on establishing a connection, and on waiting for a
    /// free watch connection.
    pub connection_timeout: Duration,
    /// Connections kept for reference compare-and-swap; also the limit on
    /// concurrent compare-and-swap calls per backend.
    pub watch_connections: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            connection_timeout: Duration::from_secs(5),
            watch_connections: 8,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
