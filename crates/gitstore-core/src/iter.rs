//! Bounded-memory, batched iteration.
//!
//! Every backend exposes large result sets (objects of one type, all
//! references) through a [`BatchedIter`], which holds at most one batch in
//! memory and asks its [`BatchSource`] for the next one when it runs dry.
//!
//! Consistency: iteration is weakly consistent. No lock or snapshot is held
//! across batches, so entries written or removed concurrently may or may not
//! be observed. Without concurrent writers every entry is yielded exactly
//! once.
//!
//! Cancellation: the iterator is forward-only and not restartable. Dropping
//! it, or dropping the future currently awaiting [`BatchedIter::next`],
//! abandons the in-flight backend call; no explicit close is needed.

use std::collections::VecDeque;
use std::ops::ControlFlow;

use async_trait::async_trait;
use gitstore_types::{EncodedObject, ObjectHash, Reference};

use crate::error::StorageResult;

/// Default number of entries fetched per backend round-trip.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A producer of successive batches.
#[async_trait]
pub trait BatchSource<T: Send>: Send {
    /// Fetch the next batch.
    ///
    /// `Ok(None)` signals exhaustion. An empty batch is allowed while more
    /// data remains (cursor scans may return empty pages).
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<T>>>;
}

/// Lazy sequence backed by a [`BatchSource`].
pub struct BatchedIter<T: Send> {
    source: Box<dyn BatchSource<T>>,
    buffer: VecDeque<T>,
    exhausted: bool,
}

/// Iterator over encoded objects.
pub type ObjectIter = BatchedIter<EncodedObject>;
/// Iterator over object hashes.
pub type HashIter = BatchedIter<ObjectHash>;
/// Iterator over references.
pub type ReferenceIter = BatchedIter<Reference>;

impl<T: Send + 'static> BatchedIter<T> {
    pub fn new(source: impl BatchSource<T> + 'static) -> Self {
        Self {
            source: Box::new(source),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// An iterator over items that are already in memory.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::new(Preloaded(Some(items)))
    }

    /// Yield the next item, fetching a new batch if the buffer is empty.
    ///
    /// Returns `Ok(None)` once the source is exhausted. After an error the
    /// iterator is exhausted.
    pub async fn next(&mut self) -> StorageResult<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.source.next_batch().await {
                Ok(Some(batch)) => self.buffer.extend(batch),
                Ok(None) => self.exhausted = true,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }
    }

    /// Apply `f` to every item until it returns `ControlFlow::Break` or the
    /// sequence ends. Breaking early is not an error.
    pub async fn for_each<F>(mut self, mut f: F) -> StorageResult<()>
    where
        F: FnMut(T) -> StorageResult<ControlFlow<()>> + Send,
    {
        while let Some(item) = self.next().await? {
            if f(item)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Drain the whole sequence into a `Vec`.
    pub async fn try_collect(mut self) -> StorageResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }
}

impl<T: Send> std::fmt::Debug for BatchedIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedIter")
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

struct Preloaded<T>(Option<Vec<T>>);

#[async_trait]
impl<T: Send> BatchSource<T> for Preloaded<T> {
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<T>>> {
        Ok(self.0.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    /// Yields `0..total` in pages of `page`, counting fetches.
    struct Counting {
        next: u32,
        total: u32,
        page: u32,
        fetches: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl BatchSource<u32> for Counting {
        async fn next_batch(&mut self) -> StorageResult<Option<Vec<u32>>> {
            self.fetches += 1;
            if Some(self.fetches) == self.fail_at {
                return Err(StorageError::unavailable("test", "boom"));
            }
            if self.next >= self.total {
                return Ok(None);
            }
            let end = (self.next + self.page).min(self.total);
            let batch = (self.next..end).collect();
            self.next = end;
            Ok(Some(batch))
        }
    }

    fn counting(total: u32, page: u32) -> Counting {
        Counting {
            next: 0,
            total,
            page,
            fetches: 0,
            fail_at: None,
        }
    }

    #[tokio::test]
    async fn yields_everything_across_batches() {
        let items = BatchedIter::new(counting(250, 100)).try_collect().await.unwrap();
        assert_eq!(items, (0..250).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_pages_are_skipped() {
        struct Sparse(u8);
        #[async_trait]
        impl BatchSource<u8> for Sparse {
            async fn next_batch(&mut self) -> StorageResult<Option<Vec<u8>>> {
                self.0 += 1;
                match self.0 {
                    1 | 2 => Ok(Some(vec![])),
                    3 => Ok(Some(vec![42])),
                    _ => Ok(None),
                }
            }
        }
        let items = BatchedIter::new(Sparse(0)).try_collect().await.unwrap();
        assert_eq!(items, vec![42]);
    }

    #[tokio::test]
    async fn for_each_stops_on_break() {
        let mut seen = Vec::new();
        BatchedIter::new(counting(1000, 10))
            .for_each(|n| {
                seen.push(n);
                Ok(if n == 14 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .await
            .unwrap();
        assert_eq!(seen.len(), 15);
    }

    #[tokio::test]
    async fn error_exhausts_iterator() {
        let mut source = counting(500, 100);
        source.fail_at = Some(2);
        let mut iter = BatchedIter::new(source);
        for _ in 0..100 {
            assert!(iter.next().await.unwrap().is_some());
        }
        assert!(iter.next().await.is_err());
        assert!(iter.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn preloaded_items() {
        let iter = BatchedIter::from_vec(vec!["a", "b"]);
        assert_eq!(iter.try_collect().await.unwrap(), vec!["a", "b"]);
    }
}
