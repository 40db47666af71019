//! Object model types for gitstore.
//!
//! This crate holds the plain data that flows through every storage backend.
//! It has no I/O and no async code; the backends in `gitstore-core`,
//! `gitstore-redis` and `gitstore-postgres` both speak in these types.
//!
//! # Key Types
//!
//! - [`ObjectHash`]: 20-byte SHA-1 content digest
//! - [`ObjectType`]: closed set of object kinds plus the `Any` wildcard
//! - [`EncodedObject`]: typed payload keyed by its hash
//! - [`Reference`]: hash or symbolic named pointer
//! - [`Index`]: staging index document (opaque to the storage engine)
//! - [`RepoConfig`]: repository configuration document

pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod object;
pub mod reference;

pub use config::{BranchConfig, CoreConfig, RemoteConfig, RepoConfig, SubmoduleConfig};
pub use error::TypeError;
pub use hash::ObjectHash;
pub use index::{FileMode, Index, IndexEntry};
pub use object::{EncodedObject, ObjectType};
pub use reference::{Reference, ReferenceKind, ReferenceName};
