//! Reusable connections for `WATCH` transactions.
//!
//! `WATCH` state belongs to a connection, so compare-and-swap cannot run on
//! the shared multiplexed connection. Each transaction borrows a connection
//! of its own from here. At most `size` are checked out at once; clean ones
//! go back to the idle list for the next caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use gitstore_core::{StorageError, StorageResult};

use crate::backend::{unavailable, BACKEND};

pub(crate) struct WatchPool {
    client: Client,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<MultiplexedConnection>>,
    timeout: Duration,
}

impl WatchPool {
    pub(crate) fn new(client: Client, size: usize, timeout: Duration) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Wait for a free slot, then reuse an idle connection or open one.
    pub(crate) async fn acquire(self: &Arc<Self>) -> StorageResult<WatchConnection> {
        let permit = tokio::time::timeout(self.timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| StorageError::unavailable(BACKEND, "timed out waiting for a watch connection"))?
            .map_err(|e| StorageError::unavailable(BACKEND, e))?;

        let reused = self.idle_list()?.pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("opening watch connection");
                tokio::time::timeout(self.timeout, self.client.get_multiplexed_async_connection())
                    .await
                    .map_err(|_| StorageError::unavailable(BACKEND, "connection timed out"))?
                    .map_err(unavailable)?
            }
        };
        Ok(WatchConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            clean: false,
            _permit: permit,
        })
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle_list().map(|idle| idle.len()).unwrap_or_default()
    }

    fn idle_list(&self) -> StorageResult<std::sync::MutexGuard<'_, Vec<MultiplexedConnection>>> {
        self.idle
            .lock()
            .map_err(|e| StorageError::unavailable(BACKEND, format!("lock poisoned: {e}")))
    }
}

/// A connection checked out of the [`WatchPool`].
///
/// Dropped connections return to the pool only after [`mark_clean`]; any
/// other exit (transport error, cancelled future) closes them, taking
/// their `WATCH` state along.
///
/// [`mark_clean`]: WatchConnection::mark_clean
pub(crate) struct WatchConnection {
    conn: Option<MultiplexedConnection>,
    pool: Arc<WatchPool>,
    clean: bool,
    _permit: OwnedSemaphorePermit,
}

impl WatchConnection {
    pub(crate) fn conn(&mut self) -> StorageResult<&mut MultiplexedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| StorageError::unavailable(BACKEND, "watch connection already released"))
    }

    /// No `WATCH` is pending; the connection may serve the next transaction.
    pub(crate) fn mark_clean(&mut self) {
        self.clean = true;
    }
}

impl Drop for WatchConnection {
    fn drop(&mut self) {
        if !self.clean {
            return;
        }
        if let (Some(conn), Ok(mut idle)) = (self.conn.take(), self.pool.idle.lock()) {
            idle.push(conn);
        }
    }
}
