use std::time::SystemTime;

use async_trait::async_trait;
use gitstore_types::{
    EncodedObject, Index, ObjectHash, ObjectType, Reference, ReferenceName, RepoConfig,
};

use crate::error::{StorageError, StorageResult};
use crate::iter::{HashIter, ObjectIter, ReferenceIter};
use crate::namespace::Namespace;

/// Reject the `Any` wildcard where a concrete object type is required.
pub fn require_concrete(kind: ObjectType, operation: &str) -> StorageResult<()> {
    if kind.is_concrete() {
        Ok(())
    } else {
        Err(StorageError::InvalidArgument(format!(
            "{operation} needs a concrete object type, got {kind}"
        )))
    }
}

/// The hash an object will be stored under: the one it carries, or the
/// canonical digest of its content when it carries none.
pub fn effective_hash(object: &EncodedObject) -> ObjectHash {
    if object.hash.is_zero() {
        ObjectHash::compute(object.kind, &object.data)
    } else {
        object.hash
    }
}

/// Verification step of a compare-and-swap, given the reference currently
/// stored under `new.name()`.
pub fn check_expected(
    new: &Reference,
    current: Option<&Reference>,
    old: &Reference,
) -> StorageResult<()> {
    match current {
        None => Err(StorageError::ReferenceNotFound(new.name().to_string())),
        Some(current) if current.target_hash() != old.target_hash() => {
            Err(StorageError::ReferenceHasChanged(new.name().to_string()))
        }
        Some(_) => Ok(()),
    }
}

/// Typed, content-addressed object storage for one tenant.
///
/// Invariants every backend keeps:
/// - `(tenant, hash, type)` addresses at most one payload.
/// - Writes are upserts. Rewriting a hash replaces payload and size.
/// - A missing object is [`StorageError::ObjectNotFound`], never a transport error.
#[async_trait]
pub trait ObjectStorer: Send + Sync {
    /// A fresh, empty object for the caller to fill in.
    fn new_encoded_object(&self) -> EncodedObject {
        EncodedObject::empty()
    }

    /// Persist `object` and return the hash it is stored under.
    ///
    /// A zero hash on `object` is replaced by the computed content digest.
    async fn set_encoded_object(&self, object: &EncodedObject) -> StorageResult<ObjectHash>;

    /// Read an object by type and hash.
    ///
    /// With [`ObjectType::Any`] the concrete types are tried in
    /// [`ObjectType::PROBE_ORDER`] and the first hit is returned.
    async fn encoded_object(&self, kind: ObjectType, hash: &ObjectHash)
        -> StorageResult<EncodedObject>;

    /// Whether an object with `hash` exists under any type. Never fetches
    /// the payload.
    async fn has_encoded_object(&self, hash: &ObjectHash) -> StorageResult<bool>;

    /// Payload length of `hash`, without fetching the payload.
    async fn encoded_object_size(&self, hash: &ObjectHash) -> StorageResult<u64>;

    /// All objects of one concrete type, fetched in bounded batches.
    async fn iter_encoded_objects(&self, kind: ObjectType) -> StorageResult<ObjectIter>;

    /// Hashes of every stored object regardless of type.
    async fn iter_object_hashes(&self) -> StorageResult<HashIter>;

    /// Read several objects of one type. Missing hashes yield `None`.
    ///
    /// Default implementation calls [`ObjectStorer::encoded_object`] per hash.
    async fn encoded_objects(
        &self,
        kind: ObjectType,
        hashes: &[ObjectHash],
    ) -> StorageResult<Vec<Option<EncodedObject>>> {
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.encoded_object(kind, hash).await {
                Ok(object) => out.push(Some(object)),
                Err(StorageError::ObjectNotFound(_)) => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Pack files held by the store. This engine never writes packs.
    async fn object_packs(&self) -> StorageResult<Vec<ObjectHash>> {
        Ok(Vec::new())
    }

    async fn delete_old_object_pack_and_index(
        &self,
        _pack: &ObjectHash,
        _older_than: SystemTime,
    ) -> StorageResult<()> {
        Err(StorageError::Unsupported("delete_old_object_pack_and_index"))
    }

    async fn loose_object_time(&self, _hash: &ObjectHash) -> StorageResult<SystemTime> {
        Err(StorageError::Unsupported("loose_object_time"))
    }

    async fn delete_loose_object(&self, _hash: &ObjectHash) -> StorageResult<()> {
        Err(StorageError::Unsupported("delete_loose_object"))
    }
}

/// Named, mutable references for one tenant.
#[async_trait]
pub trait ReferenceStorer: Send + Sync {
    /// Unconditional upsert by name.
    async fn set_reference(&self, reference: &Reference) -> StorageResult<()>;

    /// Compare-and-swap.
    ///
    /// - `old == None`: write `new` unconditionally.
    /// - otherwise the reference stored under `new.name()` must exist
    ///   ([`StorageError::ReferenceNotFound`]) and resolve to
    ///   `old.target_hash()` ([`StorageError::ReferenceHasChanged`]).
    ///
    /// Verification and write are atomic against other CAS calls on the
    /// same name. The engine never retries a lost race.
    async fn check_and_set_reference(
        &self,
        new: &Reference,
        old: Option<&Reference>,
    ) -> StorageResult<()>;

    /// Read a reference by name.
    async fn reference(&self, name: &ReferenceName) -> StorageResult<Reference>;

    /// All references, fetched in bounded batches.
    async fn iter_references(&self) -> StorageResult<ReferenceIter>;

    /// Number of references stored for the tenant.
    async fn count_loose_refs(&self) -> StorageResult<usize>;

    /// Packing references is a no-op: nothing here is ever packed.
    async fn pack_refs(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn remove_reference(&self, _name: &ReferenceName) -> StorageResult<()> {
        Err(StorageError::Unsupported("remove_reference"))
    }
}

/// Shallow-clone boundary commits.
#[async_trait]
pub trait ShallowStorer: Send + Sync {
    /// Add `commits` to the stored set. Adding a present hash is a no-op.
    async fn set_shallow(&self, commits: &[ObjectHash]) -> StorageResult<()>;

    /// The full set; empty when nothing was ever stored.
    async fn shallow(&self) -> StorageResult<Vec<ObjectHash>>;
}

#[async_trait]
pub trait IndexStorer: Send + Sync {
    async fn set_index(&self, index: &Index) -> StorageResult<()>;

    /// The stored index, or [`Index::default`] when none was stored.
    async fn index(&self) -> StorageResult<Index>;
}

#[async_trait]
pub trait ConfigStorer: Send + Sync {
    async fn set_config(&self, config: &RepoConfig) -> StorageResult<()>;

    /// The stored config, or [`RepoConfig::default`] when none was stored.
    async fn config(&self) -> StorageResult<RepoConfig>;
}

/// Nested storage scopes for submodules.
#[async_trait]
pub trait ModuleStorer: Send + Sync {
    /// Register `name` for this tenant and return a storer scoped to
    /// `<tenant>:module:<name>` on the same backend.
    async fn module(&self, name: &str) -> StorageResult<Box<dyn Storer>>;
}

/// Everything a VCS client needs from one tenant's storage.
#[async_trait]
pub trait Storer:
    ObjectStorer + ReferenceStorer + ShallowStorer + IndexStorer + ConfigStorer + ModuleStorer
{
    /// The tenant scope this storer reads and writes.
    fn namespace(&self) -> &Namespace;

    /// Alternate object directories are not supported.
    async fn add_alternate(&self, _remote: &str) -> StorageResult<()> {
        Err(StorageError::Unsupported("add_alternate"))
    }
}
