//! Redis backend for gitstore.
//!
//! Every tenant shares one [`RedisBackend`] connection. Keys follow the
//! [`gitstore_core::Namespace`] layout:
//!
//! | Key                                 | Type   | Holds                    |
//! |-------------------------------------|--------|--------------------------|
//! | `<ns>:object:<type>:<hash>`         | string | raw object payload       |
//! | `<ns>:ref:<name>`                   | string | JSON reference record    |
//! | `<ns>:shallow`                      | set    | hex commit hashes        |
//! | `<ns>:index`                        | string | JSON index document      |
//! | `<ns>:config`                       | string | JSON config document     |
//! | `<ns>:module`                       | set    | registered module names  |
//!
//! Reference compare-and-swap uses `WATCH`/`MULTI`/`EXEC` on a connection
//! borrowed from a small bounded pool. Iteration uses `SCAN MATCH COUNT`.

mod backend;
pub mod config;
mod document;
mod object;
mod pool;
mod reference;
mod storage;

pub use backend::RedisBackend;
pub use config::RedisConfig;
pub use document::{RedisConfigStore, RedisIndexStore, RedisShallowStore};
pub use object::RedisObjectStore;
pub use reference::RedisReferenceStore;
pub use storage::{RedisModuleStore, RedisStorage};
