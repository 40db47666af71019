//! In-memory key-value backend.
//!
//! [`MemoryBackend`] emulates the key-value layout of the Redis backend:
//! string keys holding byte payloads plus string sets, all rendered through
//! [`Namespace`]. One handle is shared by every tenant and module derived
//! from it. Data is lost when the last handle is dropped.
//!
//! Suitable for tests and embedding.

mod document;
mod object;
mod reference;
mod storage;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::iter::{BatchSource, DEFAULT_BATCH_SIZE};
use crate::namespace::Namespace;

pub use document::{MemoryConfigStore, MemoryIndexStore, MemoryShallowStore};
pub use object::MemoryObjectStore;
pub use reference::MemoryReferenceStore;
pub use storage::{MemoryModuleStore, MemoryStorage};

pub(crate) const BACKEND: &str = "memory";

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub(crate) strings: BTreeMap<String, Vec<u8>>,
    pub(crate) sets: BTreeMap<String, BTreeSet<String>>,
}

/// Shared handle to one in-memory keyspace.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    batch_size: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    /// A backend whose iterators fetch `batch_size` entries per step.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            batch_size: batch_size.max(1),
        }
    }

    /// Storage facade for `tenant`.
    pub fn storage(&self, tenant: &str) -> MemoryStorage {
        MemoryStorage::new(self.clone(), Namespace::new(tenant))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of keys across all tenants (strings and sets).
    pub fn key_count(&self) -> StorageResult<usize> {
        let state = self.read()?;
        Ok(state.strings.len() + state.sets.len())
    }

    pub(crate) fn read(&self) -> StorageResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| StorageError::unavailable(BACKEND, format!("lock poisoned: {e}")))
    }

    pub(crate) fn write(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| StorageError::unavailable(BACKEND, format!("lock poisoned: {e}")))
    }

    /// Up to `limit` string entries whose key starts with `prefix`, in key
    /// order, strictly after `after` when given.
    pub(crate) fn scan(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let state = self.read()?;
        let lower = match after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix),
        };
        Ok(state
            .strings
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    pub(crate) fn count_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let state = self.read()?;
        Ok(state
            .strings
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .count())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

type Decode<T> = Box<dyn Fn(&str, Vec<u8>) -> StorageResult<T> + Send + Sync>;

/// Key-ordered batch source over every string key under one prefix.
///
/// Resumes strictly after the last key it returned, so keys inserted or
/// removed between batches are seen or missed without disturbing the rest.
pub(crate) struct KeyScan<T> {
    backend: MemoryBackend,
    prefix: String,
    after: Option<String>,
    done: bool,
    decode: Decode<T>,
}

impl<T> KeyScan<T> {
    pub(crate) fn new(
        backend: MemoryBackend,
        prefix: String,
        decode: impl Fn(&str, Vec<u8>) -> StorageResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            prefix,
            after: None,
            done: false,
            decode: Box::new(decode),
        }
    }
}

#[async_trait]
impl<T: Send> BatchSource<T> for KeyScan<T> {
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }
        let limit = self.backend.batch_size;
        let entries = self
            .backend
            .scan(&self.prefix, self.after.as_deref(), limit)?;
        if entries.len() < limit {
            self.done = true;
        }
        if let Some((last, _)) = entries.last() {
            self.after = Some(last.clone());
        }
        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            batch.push((self.decode)(&key, value)?);
        }
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_respects_prefix_and_cursor() {
        let backend = MemoryBackend::new();
        {
            let mut state = backend.write().unwrap();
            for key in ["a:1", "a:2", "a:3", "ab:1", "b:1"] {
                state.strings.insert(key.to_string(), key.as_bytes().to_vec());
            }
        }
        let first = backend.scan("a:", None, 2).unwrap();
        let keys: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a:1", "a:2"]);

        let rest = backend.scan("a:", Some("a:2"), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].0, "a:3");
        assert_eq!(backend.count_prefix("a:").unwrap(), 3);
    }

    #[tokio::test]
    async fn key_scan_pages_through_everything() {
        let backend = MemoryBackend::with_batch_size(3);
        {
            let mut state = backend.write().unwrap();
            for i in 0..10 {
                state.strings.insert(format!("p:{i:02}"), vec![i]);
            }
        }
        let iter = crate::iter::BatchedIter::new(KeyScan::new(
            backend,
            "p:".to_string(),
            |_, value| Ok(value[0]),
        ));
        assert_eq!(iter.try_collect().await.unwrap(), (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(MemoryBackend::with_batch_size(0).batch_size(), 1);
    }
}
