//! Repository for ledger records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{RecordRow, ScanRecord, ScanStatus};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// What an [`upsert`](Ledger::upsert) did to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// First sighting of this (bucket, key); a record with an unset status
    /// was created.
    Inserted,
    /// A live record with the same identity and scan time already exists.
    Unchanged,
    /// Identity or scan time changed (or a soft-deleted record was revived).
    Updated,
}

/// Repository mapping (bucket, key) to the last-scanned content identity.
///
/// There is exactly one row per (bucket, key), enforced by a unique index.
/// Rows are never hard-deleted.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}
impl From<&Database> for Ledger {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch the live record for an object, if the ledger has one.
    ///
    /// Soft-deleted records are treated as absent.
    pub async fn lookup(&self, bucket: &str, key: &str) -> Result<Option<ScanRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/lookup.sql"))
            .bind(bucket)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ScanRecord::try_from).transpose()
    }

    /// Record that an object with the given identity was scanned at
    /// `scanned_at`.
    ///
    /// - No record: insert one with an unset status.
    /// - Identical identity and scan time: no-op.
    /// - Otherwise: update identity and scan time in place, leaving the
    ///   status untouched and clearing any soft delete.
    ///
    /// Both steps are conflict-safe statements inside one transaction, so
    /// two workers racing on the same key never produce a second row.
    pub async fn upsert(&self, bucket: &str, key: &str, etag: &str, scanned_at: UtcDateTime) -> Result<Upsert> {
        let scanned_at = scanned_at.unix_timestamp();
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let inserted = sqlx::query(include_str!("../queries/insert_object.sql"))
            .bind(bucket)
            .bind(key)
            .bind(etag)
            .bind(scanned_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        let outcome = if inserted > 0 {
            Upsert::Inserted
        } else {
            let updated = sqlx::query(include_str!("../queries/update_object.sql"))
                .bind(bucket)
                .bind(key)
                .bind(etag)
                .bind(scanned_at)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?
                .rows_affected();
            match updated {
                0 => Upsert::Unchanged,
                _ => Upsert::Updated,
            }
        };
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::trace!(bucket, key, ?outcome, "Ledger upsert");
        Ok(outcome)
    }

    /// Mark a record as deleted without removing it. Returns `false` if
    /// there was no live record to delete.
    pub async fn soft_delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let affected = sqlx::query(include_str!("../queries/soft_delete.sql"))
            .bind(bucket)
            .bind(key)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Set the out-of-band status of a live record. Returns `false` if there
    /// was no live record to update.
    pub async fn set_status(&self, bucket: &str, key: &str, status: ScanStatus) -> Result<bool> {
        let affected = sqlx::query(include_str!("../queries/set_status.sql"))
            .bind(bucket)
            .bind(key)
            .bind(status.to_string())
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Live records whose status is unset or pending, least recently updated
    /// first.
    pub async fn list_pending(&self, limit: u32) -> Result<Vec<ScanRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/list_pending.sql"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ScanRecord::try_from).collect()
    }

    /// Number of live records.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("record count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger() -> Ledger {
        let db = Database::connect_in_memory().await.unwrap();
        Ledger::from(&db)
    }

    fn at(seconds: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(seconds).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let ledger = ledger().await;
        assert!(ledger.lookup("uploads", "nope.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let ledger = ledger().await;
        let outcome = ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        assert_eq!(outcome, Upsert::Inserted);
        let record = ledger.lookup("uploads", "a.bin").await.unwrap().unwrap();
        assert_eq!(record.etag, "\"e1\"");
        assert_eq!(record.status, ScanStatus::Unset);
        assert_eq!(record.scanned_at, at(100));
        // Keys are scoped per bucket.
        assert!(ledger.lookup("other", "a.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = ledger().await;
        ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        let first = ledger.lookup("uploads", "a.bin").await.unwrap().unwrap();
        for _ in 0..3 {
            let outcome = ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
            assert_eq!(outcome, Upsert::Unchanged);
        }
        assert_eq!(ledger.lookup("uploads", "a.bin").await.unwrap().unwrap(), first);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_status() {
        let ledger = ledger().await;
        ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        assert!(ledger.set_status("uploads", "a.bin", ScanStatus::Scanned).await.unwrap());
        let outcome = ledger.upsert("uploads", "a.bin", "\"e2\"", at(200)).await.unwrap();
        assert_eq!(outcome, Upsert::Updated);
        let record = ledger.lookup("uploads", "a.bin").await.unwrap().unwrap();
        assert_eq!(record.etag, "\"e2\"");
        assert_eq!(record.scanned_at, at(200));
        assert_eq!(record.status, ScanStatus::Scanned);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_scan_time_alone_updates() {
        let ledger = ledger().await;
        ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        let outcome = ledger.upsert("uploads", "a.bin", "\"e1\"", at(150)).await.unwrap();
        assert_eq!(outcome, Upsert::Updated);
    }

    #[tokio::test]
    async fn test_soft_delete_and_revive() {
        let ledger = ledger().await;
        ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        assert!(ledger.soft_delete("uploads", "a.bin").await.unwrap());
        assert!(!ledger.soft_delete("uploads", "a.bin").await.unwrap());
        assert!(ledger.lookup("uploads", "a.bin").await.unwrap().is_none());
        assert_eq!(ledger.count().await.unwrap(), 0);

        let outcome = ledger.upsert("uploads", "a.bin", "\"e1\"", at(100)).await.unwrap();
        assert_eq!(outcome, Upsert::Updated);
        let record = ledger.lookup("uploads", "a.bin").await.unwrap().unwrap();
        assert!(record.deleted_at.is_none());
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_pending() {
        let ledger = ledger().await;
        for key in ["a.bin", "b.bin", "c.bin", "d.bin"] {
            ledger.upsert("uploads", key, "\"e\"", at(100)).await.unwrap();
        }
        ledger.set_status("uploads", "b.bin", ScanStatus::Pending).await.unwrap();
        ledger.set_status("uploads", "c.bin", ScanStatus::Scanned).await.unwrap();
        ledger.soft_delete("uploads", "d.bin").await.unwrap();

        let mut keys: Vec<_> = ledger.list_pending(10).await.unwrap().into_iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, ["a.bin", "b.bin"]);
        assert_eq!(ledger.list_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status_missing_record() {
        let ledger = ledger().await;
        assert!(!ledger.set_status("uploads", "gone.bin", ScanStatus::Failed).await.unwrap());
    }
}
