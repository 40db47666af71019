use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

use gitstore_types::{
    EncodedObject, Index, ObjectHash, ObjectType, Reference, ReferenceName, RepoConfig,
};

use super::{
    MemoryBackend, MemoryConfigStore, MemoryIndexStore, MemoryObjectStore, MemoryReferenceStore,
    MemoryShallowStore,
};
use crate::error::StorageResult;
use crate::iter::{HashIter, ObjectIter, ReferenceIter};
use crate::namespace::{KeyType, Namespace};
use crate::traits::{
    ConfigStorer, IndexStorer, ModuleStorer, ObjectStorer, ReferenceStorer, ShallowStorer, Storer,
};

/// Registers submodules in the `<ns>:module` set.
#[derive(Clone, Debug)]
pub struct MemoryModuleStore {
    backend: MemoryBackend,
    namespace: Namespace,
}

impl MemoryModuleStore {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    /// Names registered through [`ModuleStorer::module`], sorted.
    pub fn module_names(&self) -> StorageResult<Vec<String>> {
        let key = self.namespace.key(KeyType::Module, None);
        let state = self.backend.read()?;
        Ok(state
            .sets
            .get(&key)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModuleStorer for MemoryModuleStore {
    async fn module(&self, name: &str) -> StorageResult<Box<dyn Storer>> {
        let key = self.namespace.key(KeyType::Module, None);
        self.backend
            .write()?
            .sets
            .entry(key)
            .or_default()
            .insert(name.to_string());
        let child = self.namespace.module(name);
        debug!(tenant = %self.namespace, module = name, child = %child, "opened module storage");
        Ok(Box::new(MemoryStorage::new(self.backend.clone(), child)))
    }
}

/// One tenant's view of a [`MemoryBackend`].
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    namespace: Namespace,
    objects: MemoryObjectStore,
    references: MemoryReferenceStore,
    shallow: MemoryShallowStore,
    index: MemoryIndexStore,
    config: MemoryConfigStore,
    modules: MemoryModuleStore,
}

impl MemoryStorage {
    pub fn new(backend: MemoryBackend, namespace: Namespace) -> Self {
        Self {
            objects: MemoryObjectStore::new(backend.clone(), namespace.clone()),
            references: MemoryReferenceStore::new(backend.clone(), namespace.clone()),
            shallow: MemoryShallowStore::new(backend.clone(), namespace.clone()),
            index: MemoryIndexStore::new(backend.clone(), namespace.clone()),
            config: MemoryConfigStore::new(backend.clone(), namespace.clone()),
            modules: MemoryModuleStore::new(backend, namespace.clone()),
            namespace,
        }
    }

    pub fn modules(&self) -> &MemoryModuleStore {
        &self.modules
    }
}

#[async_trait]
impl ObjectStorer for MemoryStorage {
    fn new_encoded_object(&self) -> EncodedObject {
        self.objects.new_encoded_object()
    }

    async fn set_encoded_object(&self, object: &EncodedObject) -> StorageResult<ObjectHash> {
        self.objects.set_encoded_object(object).await
    }

    async fn encoded_object(
        &self,
        kind: ObjectType,
        hash: &ObjectHash,
    ) -> StorageResult<EncodedObject> {
        self.objects.encoded_object(kind, hash).await
    }

    async fn has_encoded_object(&self, hash: &ObjectHash) -> StorageResult<bool> {
        self.objects.has_encoded_object(hash).await
    }

    async fn encoded_object_size(&self, hash: &ObjectHash) -> StorageResult<u64> {
        self.objects.encoded_object_size(hash).await
    }

    async fn iter_encoded_objects(&self, kind: ObjectType) -> StorageResult<ObjectIter> {
        self.objects.iter_encoded_objects(kind).await
    }

    async fn iter_object_hashes(&self) -> StorageResult<HashIter> {
        self.objects.iter_object_hashes().await
    }

    async fn encoded_objects(
        &self,
        kind: ObjectType,
        hashes: &[ObjectHash],
    ) -> StorageResult<Vec<Option<EncodedObject>>> {
        self.objects.encoded_objects(kind, hashes).await
    }

    async fn object_packs(&self) -> StorageResult<Vec<ObjectHash>> {
        self.objects.object_packs().await
    }

    async fn delete_old_object_pack_and_index(
        &self,
        pack: &ObjectHash,
        older_than: SystemTime,
    ) -> StorageResult<()> {
        self.objects
            .delete_old_object_pack_and_index(pack, older_than)
            .await
    }

    async fn loose_object_time(&self, hash: &ObjectHash) -> StorageResult<SystemTime> {
        self.objects.loose_object_time(hash).await
    }

    async fn delete_loose_object(&self, hash: &ObjectHash) -> StorageResult<()> {
        self.objects.delete_loose_object(hash).await
    }
}

#[async_trait]
impl ReferenceStorer for MemoryStorage {
    async fn set_reference(&self, reference: &Reference) -> StorageResult<()> {
        self.references.set_reference(reference).await
    }

    async fn check_and_set_reference(
        &self,
        new: &Reference,
        old: Option<&Reference>,
    ) -> StorageResult<()> {
        self.references.check_and_set_reference(new, old).await
    }

    async fn reference(&self, name: &ReferenceName) -> StorageResult<Reference> {
        self.references.reference(name).await
    }

    async fn iter_references(&self) -> StorageResult<ReferenceIter> {
        self.references.iter_references().await
    }

    async fn count_loose_refs(&self) -> StorageResult<usize> {
        self.references.count_loose_refs().await
    }

    async fn pack_refs(&self) -> StorageResult<()> {
        self.references.pack_refs().await
    }

    async fn remove_reference(&self, name: &ReferenceName) -> StorageResult<()> {
        self.references.remove_reference(name).await
    }
}

#[async_trait]
impl ShallowStorer for MemoryStorage {
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()> {
        self.shallow.set_shallow(commits).await
    }

    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>> {
        self.shallow.shallow().await
    }
}

#[async_trait]
impl IndexStorer for MemoryStorage {
    async fn set_index(&self, index: &Index) -> StorageResult<()> {
        self.index.set_index(index).await
    }

    async fn index(&self) -> StorageResult<Index> {
        self.index.index().await
    }
}

#[async_trait]
impl ConfigStorer for MemoryStorage {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()> {
        self.config.set_config(config).await
    }

    async fn config(&self) -> StorageResult<RepoConfig> {
        self.config.config().await
    }
}

#[async_trait]
impl ModuleStorer for MemoryStorage {
    async fn module(&self, name: &str) -> StorageResult<Box<dyn Storer>> {
        self.modules.module(name).await
    }
}

#[async_trait]
impl Storer for MemoryStorage {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::error::StorageError;

    fn factory(backend: MemoryBackend) -> impl Fn(&str) -> Box<dyn Storer> {
        move |tenant: &str| -> Box<dyn Storer> { Box::new(backend.storage(tenant)) }
    }

    #[tokio::test]
    async fn conformance_default_batch() {
        conformance::run_all(factory(MemoryBackend::new())).await;
    }

    #[tokio::test]
    async fn conformance_small_batches() {
        conformance::run_all(factory(MemoryBackend::with_batch_size(7))).await;
    }

    #[tokio::test]
    async fn module_isolation() {
        conformance::module_isolation(factory(MemoryBackend::new())).await;
    }

    #[tokio::test]
    async fn modules_are_registered() {
        let backend = MemoryBackend::new();
        let storage = backend.storage("repo");
        storage.module("vendor/lib").await.unwrap();
        storage.module("docs").await.unwrap();
        storage.module("docs").await.unwrap();
        assert_eq!(
            storage.modules().module_names().unwrap(),
            vec!["docs".to_string(), "vendor/lib".to_string()]
        );
    }

    #[tokio::test]
    async fn nested_module_namespace() {
        let storage = MemoryBackend::new().storage("repo");
        let child = storage.module("a").await.unwrap();
        let grandchild = child.module("b").await.unwrap();
        assert_eq!(grandchild.namespace().tenant_id(), "repo:module:a:module:b");
    }

    #[tokio::test]
    async fn alternates_are_unsupported() {
        let storage = MemoryBackend::new().storage("repo");
        assert!(matches!(
            storage.add_alternate("https://example.com/other.git").await,
            Err(StorageError::Unsupported("add_alternate"))
        ));
    }
}
