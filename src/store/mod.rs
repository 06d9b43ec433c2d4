//! Record persistence: one append-only row per processed message.
//!
//! Backends:
//! - **SheetsStore**: Google Sheets spreadsheet (first sheet)
//! - **LibSqlStore**: local libSQL file with versioned migrations

pub mod libsql_backend;
pub mod migrations;
pub mod sheets;

pub use libsql_backend::LibSqlStore;
pub use sheets::SheetsStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::auth::CredentialProvider;
use crate::config::StoreKind;
use crate::error::StoreError;

/// Canonical timestamp format for the Timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column headers, in order.
pub const COLUMNS: [&str; 6] = ["Timestamp", "Sender", "Subject", "Summary", "Category", "Priority"];

/// One persisted annotation.
///
/// Carries a denormalized copy of sender/subject so it stays meaningful
/// after the source message is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Record creation time (not message time), `TIMESTAMP_FORMAT`.
    pub timestamp: String,
    pub sender: String,
    pub subject: String,
    pub summary: String,
    pub category: String,
    /// 1–5, filled lazily by the dashboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl AnnotationRecord {
    pub fn new<Tz: TimeZone>(
        created_at: DateTime<Tz>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            timestamp: created_at.format(TIMESTAMP_FORMAT).to_string(),
            sender: sender.into(),
            subject: subject.into(),
            summary: summary.into(),
            category: category.into(),
            priority: None,
        }
    }

    /// Record stamped with the current local wall-clock time.
    pub fn now(
        sender: impl Into<String>,
        subject: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self::new(Local::now(), sender, subject, summary, category)
    }

    /// Parse the Timestamp column; `None` if it is not in a known format.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let raw = self.timestamp.trim();
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

/// Append-only tabular store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Append one row. At-least-once: a retry after an ambiguous failure may
    /// duplicate the row.
    async fn append(&self, record: &AnnotationRecord) -> Result<(), StoreError>;

    /// All rows in insertion order.
    async fn read_all(&self) -> Result<Vec<AnnotationRecord>, StoreError>;

    /// Cache a priority score on the row at `row` (0-based, `read_all` order).
    async fn set_priority(&self, row: usize, priority: u8) -> Result<(), StoreError>;
}

/// Open the configured store. Failure here is startup-fatal.
pub async fn open_store(
    kind: &StoreKind,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<Arc<dyn RecordStore>, StoreError> {
    match kind {
        StoreKind::Sheets { sheet_id } => {
            let store = SheetsStore::open(sheet_id, credentials).await?;
            Ok(Arc::new(store))
        }
        StoreKind::Local { path } => {
            let store = LibSqlStore::new_local(path).await?;
            Ok(Arc::new(store))
        }
    }
}
