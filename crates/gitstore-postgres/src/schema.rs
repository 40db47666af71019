//! Table layout and migration.
//!
//! Every table carries the rendered tenant in its `url` column as part of
//! the primary key. `references` is a reserved word and is always quoted.

use sqlx::PgPool;
use tracing::debug;

use gitstore_core::StorageResult;

use crate::backend::unavailable;

/// Serializes concurrent migrations from several processes.
const MIGRATION_LOCK: i64 = 0x6769_7473_746f_7265;

pub(crate) const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS objects (
        url  TEXT   NOT NULL,
        hash TEXT   NOT NULL,
        type TEXT   NOT NULL,
        blob BYTEA  NOT NULL,
        size BIGINT NOT NULL,
        PRIMARY KEY (url, hash)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS objects_url_type_hash ON objects (url, type, hash)"#,
    r#"CREATE TABLE IF NOT EXISTS "references" (
        url    TEXT NOT NULL,
        name   TEXT NOT NULL,
        type   TEXT NOT NULL,
        target TEXT NOT NULL DEFAULT '',
        hash   TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (url, name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS configs (
        url  TEXT  PRIMARY KEY,
        blob BYTEA NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS shallows (
        url    TEXT   PRIMARY KEY,
        hashes TEXT[] NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS indexes (
        url  TEXT  PRIMARY KEY,
        blob BYTEA NOT NULL
    )"#,
];

/// Create any missing tables. Safe to run on every start.
pub async fn migrate(pool: &PgPool) -> StorageResult<()> {
    let mut tx = pool.begin().await.map_err(unavailable)?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
    }
    tx.commit().await.map_err(unavailable)?;
    debug!(statements = STATEMENTS.len(), "schema up to date");
    Ok(())
}
