use async_trait::async_trait;
use tracing::debug;

use gitstore_types::{Reference, ReferenceName};

use super::{KeyScan, MemoryBackend};
use crate::codec::{decode_reference, encode_reference};
use crate::error::{StorageError, StorageResult};
use crate::iter::{BatchedIter, ReferenceIter};
use crate::namespace::{KeyType, Namespace};
use crate::traits::{check_expected, ReferenceStorer};

/// References stored as JSON records under `<ns>:ref:<name>`.
#[derive(Clone, Debug)]
pub struct MemoryReferenceStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryReferenceStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }
}

#[async_trait]
impl ReferenceStorer for MemoryReferenceStore {
    async fn set_reference(&self, reference: &Reference) -> StorageResult<()> {
        let key = self.namespace.ref_key(reference.name());
        let data = encode_reference(reference)?;
        self.backend.write()?.strings.insert(key, data);
        Ok(())
    }

    async fn check_and_set_reference(
        &self,
        new: &Reference,
        old: Option<&Reference>,
    ) -> StorageResult<()> {
        let key = self.namespace.ref_key(new.name());
        let data = encode_reference(new)?;
        let mut state = self.backend.write()?;
        if let Some(old) = old {
            let current = state
                .strings
                .get(&key)
                .map(|raw| decode_reference(&key, raw))
                .transpose()?;
            if let Err(e) = check_expected(new, current.as_ref(), old) {
                debug!(tenant = %self.namespace, reference = %new.name(), error = %e, "reference update rejected");
                return Err(e);
            }
        }
        state.strings.insert(key, data);
        Ok(())
    }

    async fn reference(&self, name: &ReferenceName) -> StorageResult<Reference> {
        let key = self.namespace.ref_key(name);
        let raw = self.backend.read()?.strings.get(&key).cloned();
        match raw {
            Some(raw) => decode_reference(&key, &raw),
            None => Err(StorageError::ReferenceNotFound(name.to_string())),
        }
    }

    async fn iter_references(&self) -> StorageResult<ReferenceIter> {
        Ok(BatchedIter::new(KeyScan::new(
            self.backend.clone(),
            self.namespace.key_prefix(KeyType::Ref),
            |key, data| decode_reference(key, &data),
        )))
    }

    async fn count_loose_refs(&self) -> StorageResult<usize> {
        self.backend
            .count_prefix(&self.namespace.key_prefix(KeyType::Ref))
    }
}
