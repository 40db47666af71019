use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use gitstore_core::codec::{decode_reference, encode_reference};
use gitstore_core::traits::check_expected;
use gitstore_core::{
    BatchedIter, KeyType, Namespace, ReferenceIter, ReferenceStorer, StorageError, StorageResult,
};
use gitstore_types::{Reference, ReferenceName};

use crate::backend::{unavailable, RedisBackend, ScanSource};
use crate::pool::WatchConnection;

/// References as JSON records under `<ns>:ref:<name>`.
#[derive(Clone, Debug)]
pub struct RedisReferenceStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisReferenceStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    /// `WATCH` the reference key and check it still holds `old`. On a
    /// mismatch the watch is dropped and the connection left reusable.
    async fn watch_expected(
        &self,
        conn: &mut WatchConnection,
        new: &Reference,
        old: &Reference,
    ) -> StorageResult<()> {
        let key = self.namespace.ref_key(new.name());
        let _: () = redis::cmd("WATCH")
            .arg(&key)
            .query_async(conn.conn()?)
            .await
            .map_err(unavailable)?;
        let raw: Option<Vec<u8>> = conn.conn()?.get(&key).await.map_err(unavailable)?;
        let checked = raw
            .map(|raw| decode_reference(&key, &raw))
            .transpose()
            .and_then(|current| check_expected(new, current.as_ref(), old));
        if let Err(e) = checked {
            debug!(tenant = %self.namespace, reference = %new.name(), error = %e, "reference update rejected");
            let _: () = redis::cmd("UNWATCH")
                .query_async(conn.conn()?)
                .await
                .map_err(unavailable)?;
            conn.mark_clean();
            return Err(e);
        }
        Ok(())
    }

    /// Write `new` in `MULTI`/`EXEC`. A nil reply means a watched key
    /// changed after [`Self::watch_expected`].
    async fn exec_set(&self, conn: &mut WatchConnection, new: &Reference) -> StorageResult<()> {
        let key = self.namespace.ref_key(new.name());
        let data = encode_reference(new)?;
        let committed: Option<()> = redis::pipe()
            .atomic()
            .set(&key, data)
            .ignore()
            .query_async(conn.conn()?)
            .await
            .map_err(unavailable)?;
        // EXEC clears the watch whether or not it applied.
        conn.mark_clean();
        match committed {
            Some(()) => Ok(()),
            None => {
                debug!(tenant = %self.namespace, reference = %new.name(), "reference changed during transaction");
                Err(StorageError::ReferenceHasChanged(new.name().to_string()))
            }
        }
    }
}

#[async_trait]
impl ReferenceStorer for RedisReferenceStore {
    async fn set_reference(&self, reference: &Reference) -> StorageResult<()> {
        let key = self.namespace.ref_key(reference.name());
        let data = encode_reference(reference)?;
        let mut conn = self.backend.connection();
        let _: () = conn.set(&key, data).await.map_err(unavailable)?;
        Ok(())
    }

    /// `WATCH` the key, verify, then write inside `MULTI`/`EXEC`. An `EXEC`
    /// aborted by a concurrent write to the key is a lost race.
    async fn check_and_set_reference(
        &self,
        new: &Reference,
        old: Option<&Reference>,
    ) -> StorageResult<()> {
        let Some(old) = old else {
            return self.set_reference(new).await;
        };
        let mut conn = self.backend.watch_connection().await?;
        self.watch_expected(&mut conn, new, old).await?;
        self.exec_set(&mut conn, new).await
    }

    async fn reference(&self, name: &ReferenceName) -> StorageResult<Reference> {
        let key = self.namespace.ref_key(name);
        let mut conn = self.backend.connection();
        let raw: Option<Vec<u8>> = conn.get(&key).await.map_err(unavailable)?;
        match raw {
            Some(raw) => decode_reference(&key, &raw),
            None => Err(StorageError::ReferenceNotFound(name.to_string())),
        }
    }

    async fn iter_references(&self) -> StorageResult<ReferenceIter> {
        Ok(BatchedIter::new(ScanSource::entries(
            &self.backend,
            self.namespace.pattern(KeyType::Ref, ""),
            |key, data| decode_reference(key, &data),
        )))
    }

    /// Counts matching keys with a full `SCAN` of the tenant's references.
    async fn count_loose_refs(&self) -> StorageResult<usize> {
        let mut iter = BatchedIter::new(ScanSource::keys(
            &self.backend,
            self.namespace.pattern(KeyType::Ref, ""),
            |_| Ok(()),
        ));
        let mut count = 0;
        while iter.next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::live_backend;
    use gitstore_types::ObjectHash;

    fn unique_tenant(label: &str) -> Namespace {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Namespace::new(format!("gitstore-unit-{label}-{}-{nanos}", std::process::id()))
    }

    fn at(byte: u8) -> Reference {
        Reference::hash(ReferenceName::branch("main").unwrap(), ObjectHash::from_raw([byte; 20]))
    }

    #[tokio::test]
    async fn write_between_watch_and_exec_aborts() {
        let Some(backend) = live_backend(2).await else { return };
        let store = RedisReferenceStore::new(backend.clone(), unique_tenant("exec-abort"));
        let (base, ours, theirs) = (at(1), at(2), at(3));
        store.set_reference(&base).await.unwrap();

        let mut conn = backend.watch_connection().await.unwrap();
        store.watch_expected(&mut conn, &ours, &base).await.unwrap();
        // Lands on the shared connection, outside the watching one.
        store.set_reference(&theirs).await.unwrap();
        let err = store.exec_set(&mut conn, &ours).await.unwrap_err();

        assert!(matches!(err, StorageError::ReferenceHasChanged(_)));
        assert_eq!(store.reference(ours.name()).await.unwrap(), theirs);
        drop(conn);
        assert_eq!(backend.idle_watch_connections(), 1);
    }

    #[tokio::test]
    async fn repeated_updates_reuse_one_connection() {
        let Some(backend) = live_backend(2).await else { return };
        let store = RedisReferenceStore::new(backend.clone(), unique_tenant("reuse"));
        store.set_reference(&at(1)).await.unwrap();
        for byte in 1..10u8 {
            store
                .check_and_set_reference(&at(byte + 1), Some(&at(byte)))
                .await
                .unwrap();
        }
        // A rejected update also hands its connection back.
        assert!(store.check_and_set_reference(&at(1), Some(&at(1))).await.is_err());
        assert_eq!(backend.idle_watch_connections(), 1);
        assert_eq!(store.reference(at(1).name()).await.unwrap(), at(10));
    }
}
