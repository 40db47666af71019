use std::time::SystemTime;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use gitstore_core::{
    ConfigStorer, HashIter, IndexStorer, KeyType, ModuleStorer, Namespace, ObjectIter,
    ObjectStorer, ReferenceIter, ReferenceStorer, ShallowStorer, StorageResult, Storer,
};
use gitstore_types::{
    EncodedObject, Index, ObjectHash, ObjectType, Reference, ReferenceName, RepoConfig,
};

use crate::backend::{unavailable, RedisBackend};
use crate::document::{RedisConfigStore, RedisIndexStore, RedisShallowStore};
use crate::object::RedisObjectStore;
use crate::reference::RedisReferenceStore;

/// Registers submodules in the `<ns>:module` set.
#[derive(Clone, Debug)]
pub struct RedisModuleStore {
    backend: RedisBackend,
    namespace: Namespace,
}

impl RedisModuleStore {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    /// Names registered through [`ModuleStorer::module`], sorted.
    pub async fn module_names(&self) -> StorageResult<Vec<String>> {
        let mut conn = self.backend.connection();
        let mut names: Vec<String> = conn
            .smembers(self.namespace.key(KeyType::Module, None))
            .await
            .map_err(unavailable)?;
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl ModuleStorer for RedisModuleStore {
    async fn module(&self, name: &str) -> StorageResult<Box<dyn Storer>> {
        let mut conn = self.backend.connection();
        let _: () = conn
            .sadd(self.namespace.key(KeyType::Module, None), name)
            .await
            .map_err(unavailable)?;
        let child = self.namespace.module(name);
        debug!(tenant = %self.namespace, module = name, child = %child, "opened module storage");
        Ok(Box::new(RedisStorage::new(self.backend.clone(), child)))
    }
}

/// One tenant's view of a [`RedisBackend`].
#[derive(Clone, Debug)]
pub struct RedisStorage {
    namespace: Namespace,
    objects: RedisObjectStore,
    references: RedisReferenceStore,
    shallow: RedisShallowStore,
    index: RedisIndexStore,
    config: RedisConfigStore,
    modules: RedisModuleStore,
}

impl RedisStorage {
    pub fn new(backend: RedisBackend, namespace: Namespace) -> Self {
        Self {
            objects: RedisObjectStore::new(backend.clone(), namespace.clone()),
            references: RedisReferenceStore::new(backend.clone(), namespace.clone()),
            shallow: RedisShallowStore::new(backend.clone(), namespace.clone()),
            index: RedisIndexStore::new(backend.clone(), namespace.clone()),
            config: RedisConfigStore::new(backend.clone(), namespace.clone()),
            modules: RedisModuleStore::new(backend, namespace.clone()),
            namespace,
        }
    }

    pub fn modules(&self) -> &RedisModuleStore {
        &self.modules
    }
}

#[async_trait]
impl ObjectStorer for RedisStorage {
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
impl ReferenceStorer for RedisStorage {
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
impl ShallowStorer for RedisStorage {
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()> {
        self.shallow.set_shallow(commits).await
    }

    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>> {
        self.shallow.shallow().await
    }
}

#[async_trait]
impl IndexStorer for RedisStorage {
    async fn set_index(&self, index: &Index) -> StorageResult<()> {
        self.index.set_index(index).await
    }

    async fn index(&self) -> StorageResult<Index> {
        self.index.index().await
    }
}

#[async_trait]
impl ConfigStorer for RedisStorage {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()> {
        self.config.set_config(config).await
    }

    async fn config(&self) -> StorageResult<RepoConfig> {
        self.config.config().await
    }
}

#[async_trait]
impl ModuleStorer for RedisStorage {
    async fn module(&self, name: &str) -> StorageResult<Box<dyn Storer>> {
        self.modules.module(name).await
    }
}

#[async_trait]
impl Storer for RedisStorage {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}
