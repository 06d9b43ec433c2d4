//! libSQL backend: local file or in-memory `RecordStore`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::{AnnotationRecord, RecordStore};

const RECORD_COLUMNS: &str = "timestamp, sender, subject, summary, category, priority";

/// libSQL record store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn opt_priority(priority: Option<u8>) -> libsql::Value {
    match priority {
        Some(p) => libsql::Value::Integer(i64::from(p)),
        None => libsql::Value::Null,
    }
}

/// Map a row (column order = `RECORD_COLUMNS`) to a record.
fn row_to_record(row: &libsql::Row) -> Result<AnnotationRecord, libsql::Error> {
    Ok(AnnotationRecord {
        timestamp: row.get(0)?,
        sender: row.get(1)?,
        subject: row.get(2)?,
        summary: row.get(3)?,
        category: row.get(4)?,
        priority: row
            .get::<i64>(5)
            .ok()
            .and_then(|p| u8::try_from(p).ok()),
    })
}

#[async_trait]
impl RecordStore for LibSqlStore {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn append(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!("INSERT INTO annotations ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    record.timestamp.as_str(),
                    record.sender.as_str(),
                    record.subject.as_str(),
                    record.summary.as_str(),
                    record.category.as_str(),
                    opt_priority(record.priority),
                ],
            )
            .await
            .map_err(|e| StoreError::Append(format!("insert annotation: {e}")))?;

        debug!(category = %record.category, "Annotation row inserted");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<AnnotationRecord>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM annotations ORDER BY id"),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("read_all: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("read_all row: {e}")))?
        {
            records.push(row_to_record(&row).map_err(|e| StoreError::Query(e.to_string()))?);
        }
        Ok(records)
    }

    async fn set_priority(&self, row: usize, priority: u8) -> Result<(), StoreError> {
        let offset = i64::try_from(row).map_err(|_| StoreError::RowNotFound { row })?;
        let affected = self
            .conn()
            .execute(
                "UPDATE annotations SET priority = ?1
                 WHERE id = (SELECT id FROM annotations ORDER BY id LIMIT 1 OFFSET ?2)",
                params![i64::from(priority), offset],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_priority: {e}")))?;

        if affected == 0 {
            return Err(StoreError::RowNotFound { row });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str, category: &str) -> AnnotationRecord {
        AnnotationRecord {
            timestamp: "2025-01-02 03:04:05".into(),
            sender: "Alice <alice@example.com>".into(),
            subject: subject.into(),
            summary: format!("About {subject}"),
            category: category.into(),
            priority: None,
        }
    }

    #[tokio::test]
    async fn append_and_read_preserves_order() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.append(&record("first", "Job")).await.unwrap();
        store.append(&record("second", "Finance")).await.unwrap();
        store.append(&record("third", "Other")).await.unwrap();

        let all = store.read_all().await.unwrap();
        let subjects: Vec<_> = all.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, ["first", "second", "third"]);
        assert_eq!(all[1], record("second", "Finance"));
    }

    #[tokio::test]
    async fn empty_store_reads_nothing() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_rows_are_allowed() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let r = record("same", "Job");
        store.append(&r).await.unwrap();
        store.append(&r).await.unwrap();
        assert_eq!(store.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn set_priority_targets_row_by_position() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.append(&record("a", "Job")).await.unwrap();
        store.append(&record("b", "Job")).await.unwrap();

        store.set_priority(1, 5).await.unwrap();

        let all = store.read_all().await.unwrap();
        assert_eq!(all[0].priority, None);
        assert_eq!(all[1].priority, Some(5));
    }

    #[tokio::test]
    async fn set_priority_out_of_range_fails() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.append(&record("a", "Job")).await.unwrap();
        assert!(matches!(
            store.set_priority(3, 2).await,
            Err(StoreError::RowNotFound { row: 3 })
        ));
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("records.db");
        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.append(&record("persisted", "Event")).await.unwrap();
        }
        let store = LibSqlStore::new_local(&path).await.unwrap();
        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category, "Event");
    }
}
