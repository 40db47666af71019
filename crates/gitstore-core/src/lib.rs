//! Storage contract for gitstore.
//!
//! This crate defines what a storage backend must do and ships the
//! pieces every backend shares. The Redis and Postgres backends live in
//! their own crates and implement the same traits.
//!
//! # Stores
//!
//! One tenant's storage is a [`Storer`], composed of six stores:
//!
//! - [`ObjectStorer`]: typed, content-addressed objects
//! - [`ReferenceStorer`]: named pointers with compare-and-swap
//! - [`ShallowStorer`]: shallow-clone boundary commits
//! - [`IndexStorer`] / [`ConfigStorer`]: per-tenant singleton documents
//! - [`ModuleStorer`]: nested scopes for submodules
//!
//! # Shared machinery
//!
//! - [`Namespace`]: collision-free tenant partitioning of one backend
//! - [`BatchedIter`]: bounded-memory, batched iteration
//! - [`codec`]: persisted reference and document encodings
//! - [`MemoryBackend`]: in-memory key-value backend for tests and embedding
//!
//! # Design Rules
//!
//! 1. No internal retries. Every failure surfaces as a typed [`StorageError`].
//! 2. Not-found is never conflated with an unreachable backend.
//! 3. Reference updates that must not lose races go through
//!    [`ReferenceStorer::check_and_set_reference`].
//! 4. Iteration is weakly consistent and never loads a full result set.

pub mod codec;
pub mod error;
pub mod iter;
pub mod memory;
pub mod namespace;
pub mod traits;

#[cfg(any(test, feature = "conformance"))]
pub mod conformance;

pub use error::{BoxError, StorageError, StorageResult};
pub use iter::{BatchSource, BatchedIter, HashIter, ObjectIter, ReferenceIter, DEFAULT_BATCH_SIZE};
pub use memory::{MemoryBackend, MemoryStorage};
pub use namespace::{KeyType, Namespace};
pub use traits::{
    ConfigStorer, IndexStorer, ModuleStorer, ObjectStorer, ReferenceStorer, ShallowStorer, Storer,
};
