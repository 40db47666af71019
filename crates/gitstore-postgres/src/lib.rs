//! Postgres backend for gitstore.
//!
//! All tenants share one table per record kind. The rendered tenant
//! ([`gitstore_core::Namespace::tenant_id`]) is stored in the `url` column
//! and leads every primary key:
//!
//! | Table          | Key           | Holds                               |
//! |----------------|---------------|-------------------------------------|
//! | `objects`      | `(url, hash)` | type tag, payload, payload size     |
//! | `"references"` | `(url, name)` | type tag, symbolic target, hash     |
//! | `shallows`     | `url`         | `TEXT[]` of hex commit hashes       |
//! | `indexes`      | `url`         | JSON index document                 |
//! | `configs`      | `url`         | JSON config document                |
//!
//! [`PostgresBackend::connect`] creates missing tables. Reference
//! compare-and-swap runs in a `SERIALIZABLE` transaction. Iterators page
//! with `LIMIT`/`OFFSET` and may skip or repeat rows under concurrent
//! writes. Submodule storage is not supported.

mod backend;
pub mod config;
mod document;
mod object;
mod reference;
pub mod schema;
mod storage;

pub use backend::PostgresBackend;
pub use config::PostgresConfig;
pub use document::{PostgresConfigStore, PostgresIndexStore, PostgresShallowStore};
pub use object::PostgresObjectStore;
pub use reference::PostgresReferenceStore;
pub use storage::PostgresStorage;
