use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::debug;

use gitstore_core::codec::{reference_from_parts, StoredReference};
use gitstore_core::traits::check_expected;
use gitstore_core::{
    BatchSource, BatchedIter, KeyType, Namespace, ReferenceIter, ReferenceStorer, StorageError,
    StorageResult,
};
use gitstore_types::{Reference, ReferenceName};

use crate::backend::{is_serialization_failure, unavailable, Page, PostgresBackend};

const UPSERT: &str = r#"INSERT INTO "references" (url, name, type, target, hash)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (url, name) DO UPDATE
    SET type = EXCLUDED.type, target = EXCLUDED.target, hash = EXCLUDED.hash"#;

#[derive(sqlx::FromRow)]
struct ReferenceRow {
    name: String,
    #[sqlx(rename = "type")]
    kind: String,
    target: String,
    hash: String,
}

impl ReferenceRow {
    fn decode(&self, namespace: &Namespace) -> StorageResult<Reference> {
        let key = namespace.key(KeyType::Ref, Some(&self.name));
        reference_from_parts(&key, &self.name, &self.kind, &self.target, Some(&self.hash))
    }
}

/// Rows of the `"references"` table, keyed by `(url, name)`.
#[derive(Clone, Debug)]
pub struct PostgresReferenceStore {
    backend: PostgresBackend,
    namespace: Namespace,
}

impl PostgresReferenceStore {
    pub fn new(backend: PostgresBackend, namespace: Namespace) -> Self {
        Self { backend, namespace }
    }

    async fn upsert(&self, conn: &mut PgConnection, reference: &Reference) -> sqlx::Result<()> {
        let stored = StoredReference::from(reference);
        sqlx::query(UPSERT)
            .bind(self.namespace.tenant_id())
            .bind(&stored.name)
            .bind(&stored.kind)
            .bind(&stored.target)
            .bind(stored.hash.as_deref().unwrap_or_default())
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn locked_current(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        name: &ReferenceName,
    ) -> sqlx::Result<Option<ReferenceRow>> {
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut **tx)
            .await?;
        sqlx::query_as(
            r#"SELECT name, type, target, hash FROM "references"
               WHERE url = $1 AND name = $2 FOR UPDATE"#,
        )
        .bind(self.namespace.tenant_id())
        .bind(name.as_str())
        .fetch_optional(&mut **tx)
        .await
    }
}

#[async_trait]
impl ReferenceStorer for PostgresReferenceStore {
    async fn set_reference(&self, reference: &Reference) -> StorageResult<()> {
        let mut conn = self.backend.pool().acquire().await.map_err(unavailable)?;
        self.upsert(&mut conn, reference).await.map_err(unavailable)
    }

    /// Read-check-write inside one `SERIALIZABLE` transaction with the row
    /// locked. A serialization failure means another writer got there first.
    async fn check_and_set_reference(
        &self,
        new: &Reference,
        old: Option<&Reference>,
    ) -> StorageResult<()> {
        let Some(old) = old else {
            return self.set_reference(new).await;
        };
        let lost = |err: sqlx::Error| {
            if is_serialization_failure(&err) {
                debug!(tenant = %self.namespace, reference = %new.name(), "reference changed during transaction");
                StorageError::ReferenceHasChanged(new.name().to_string())
            } else {
                unavailable(err)
            }
        };

        let mut tx = self.backend.pool().begin().await.map_err(unavailable)?;
        let current = self
            .locked_current(&mut tx, new.name())
            .await
            .map_err(lost)?
            .map(|row| row.decode(&self.namespace))
            .transpose()?;
        if let Err(e) = check_expected(new, current.as_ref(), old) {
            debug!(tenant = %self.namespace, reference = %new.name(), error = %e, "reference update rejected");
            return Err(e);
        }
        self.upsert(&mut tx, new).await.map_err(lost)?;
        tx.commit().await.map_err(lost)
    }

    async fn reference(&self, name: &ReferenceName) -> StorageResult<Reference> {
        let row: Option<ReferenceRow> = sqlx::query_as(
            r#"SELECT name, type, target, hash FROM "references" WHERE url = $1 AND name = $2"#,
        )
        .bind(self.namespace.tenant_id())
        .bind(name.as_str())
        .fetch_optional(self.backend.pool())
        .await
        .map_err(unavailable)?;
        match row {
            Some(row) => row.decode(&self.namespace),
            None => Err(StorageError::ReferenceNotFound(name.to_string())),
        }
    }

    async fn iter_references(&self) -> StorageResult<ReferenceIter> {
        Ok(BatchedIter::new(ReferencePages {
            backend: self.backend.clone(),
            namespace: self.namespace.clone(),
            page: Page::new(self.backend.batch_size()),
        }))
    }

    async fn count_loose_refs(&self) -> StorageResult<usize> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM "references" WHERE url = $1"#)
                .bind(self.namespace.tenant_id())
                .fetch_one(self.backend.pool())
                .await
                .map_err(unavailable)?;
        Ok(count.max(0) as usize)
    }
}

struct ReferencePages {
    backend: PostgresBackend,
    namespace: Namespace,
    page: Page,
}

#[async_trait]
impl BatchSource<Reference> for ReferencePages {
    async fn next_batch(&mut self) -> StorageResult<Option<Vec<Reference>>> {
        if self.page.done {
            return Ok(None);
        }
        let rows: Vec<ReferenceRow> = sqlx::query_as(
            r#"SELECT name, type, target, hash FROM "references" WHERE url = $1
               ORDER BY name LIMIT $2 OFFSET $3"#,
        )
        .bind(self.namespace.tenant_id())
        .bind(self.page.limit)
        .bind(self.page.offset)
        .fetch_all(self.backend.pool())
        .await
        .map_err(unavailable)?;
        self.page.advance(rows.len());

        rows.iter()
            .map(|row| row.decode(&self.namespace))
            .collect::<StorageResult<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitstore_types::{EncodedObject, ObjectType};

    fn row(name: &str, kind: &str, target: &str, hash: &str) -> ReferenceRow {
        ReferenceRow {
            name: name.into(),
            kind: kind.into(),
            target: target.into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn hash_row_decodes() {
        let hash = EncodedObject::new(ObjectType::Commit, b"c".to_vec()).hash;
        let decoded = row("refs/heads/main", "hash-reference", "", &hash.to_hex())
            .decode(&Namespace::new("t"))
            .unwrap();
        assert_eq!(decoded.target_hash(), hash);
    }

    #[test]
    fn symbolic_row_decodes() {
        let decoded = row("HEAD", "symbolic-reference", "refs/heads/main", "")
            .decode(&Namespace::new("t"))
            .unwrap();
        assert_eq!(decoded.target().map(ReferenceName::as_str), Some("refs/heads/main"));
    }

    #[test]
    fn broken_row_is_corruption() {
        let err = row("refs/heads/main", "hash-reference", "", "zz")
            .decode(&Namespace::new("t"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Corruption { .. }));
    }
}
