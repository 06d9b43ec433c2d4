//! Google Sheets backend.
//!
//! Rows go to the first sheet of the spreadsheet. Row 1 holds the column
//! headers; it is written on open when the sheet is empty.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::error::StoreError;
use crate::store::{AnnotationRecord, COLUMNS, RecordStore};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    timestamp: Option<usize>,
    sender: Option<usize>,
    subject: Option<usize>,
    summary: Option<usize>,
    category: Option<usize>,
    priority: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[Value]) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|cell| cell_text(cell).trim().eq_ignore_ascii_case(name))
        };
        Self {
            timestamp: find("Timestamp"),
            sender: find("Sender"),
            subject: find("Subject"),
            summary: find("Summary"),
            category: find("Category"),
            priority: find("Priority"),
        }
    }

    fn standard() -> Self {
        Self::from_header(&COLUMNS.map(|c| Value::String(c.to_string())))
    }
}

/// A record and the 1-based sheet row it was read from.
#[derive(Debug, Clone, PartialEq)]
struct SheetRow {
    number: usize,
    record: AnnotationRecord,
}

/// Spreadsheet-backed record store.
///
/// `read_all` skips blank rows, so positions in its result are not sheet
/// rows. The sheet row of each returned record is remembered for
/// `set_priority`.
pub struct SheetsStore {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    sheet_id: String,
    sheet_title: String,
    priority_column: usize,
    row_numbers: Mutex<Vec<usize>>,
}

impl SheetsStore {
    /// Resolve the first sheet and make sure the header row exists.
    pub async fn open(
        sheet_id: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::new();
        let token = credentials.access_token().await?;

        let url = spreadsheet_url(sheet_id, &[])?;
        let response = http
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "cannot open spreadsheet {sheet_id}: {status}: {body}"
            )));
        }
        let meta: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("invalid spreadsheet metadata: {e}")))?;
        let sheet_title = meta
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| StoreError::Unavailable(format!("spreadsheet {sheet_id} has no sheets")))?;

        let mut store = Self {
            http,
            credentials,
            sheet_id: sheet_id.to_string(),
            sheet_title,
            priority_column: COLUMNS.len() - 1,
            row_numbers: Mutex::new(Vec::new()),
        };
        store.ensure_header().await?;
        info!(sheet = %store.sheet_title, "Spreadsheet store opened");
        Ok(store)
    }

    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.sheet_title.replace('\'', "''"), cells)
    }

    async fn get_values(&self, range: &str) -> Result<ValueRange, StoreError> {
        let token = self.credentials.access_token().await?;
        let url = spreadsheet_url(&self.sheet_id, &["values", range])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("{status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Query(format!("invalid values response: {e}")))
    }

    async fn put_values(&self, range: &str, values: Vec<Vec<Value>>) -> Result<(), StoreError> {
        let token = self.credentials.access_token().await?;
        let url = spreadsheet_url(&self.sheet_id, &["values", range])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token.expose_secret())
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "range": range, "values": values }))
            .send()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn read_rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        let values = self.get_values(&self.range("A:Z")).await?.values;
        let rows = rows_from_values(values);
        *self.row_numbers.lock().await = rows.iter().map(|r| r.number).collect();
        Ok(rows)
    }

    /// Sheet row for position `row` of the last `read_all`, reading again
    /// when the position is not known yet.
    async fn sheet_row(&self, row: usize) -> Result<usize, StoreError> {
        if let Some(number) = self.row_numbers.lock().await.get(row).copied() {
            return Ok(number);
        }
        self.read_rows()
            .await?
            .get(row)
            .map(|r| r.number)
            .ok_or(StoreError::RowNotFound { row })
    }

    async fn ensure_header(&mut self) -> Result<(), StoreError> {
        let header_range = self.range("1:1");
        let header = self
            .get_values(&header_range)
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot read header row: {e}")))?
            .values
            .into_iter()
            .next()
            .unwrap_or_default();

        if header.is_empty() {
            let row = COLUMNS.iter().map(|c| Value::String(c.to_string())).collect();
            self.put_values(&self.range("A1"), vec![row]).await?;
            debug!("Wrote header row");
            return Ok(());
        }

        match ColumnMap::from_header(&header).priority {
            Some(col) => self.priority_column = col,
            None => {
                let col = header.len();
                let cell = format!("{}1", column_letter(col));
                self.put_values(&self.range(&cell), vec![vec![Value::String("Priority".into())]])
                    .await?;
                self.priority_column = col;
                debug!(column = col, "Added Priority header");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SheetsStore {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn append(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        let token = self.credentials.access_token().await?;
        let range = self.range("A:A");
        let url = spreadsheet_url(&self.sheet_id, &["values", &format!("{range}:append")])?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&serde_json::json!({ "values": [record_to_row(record)] }))
            .send()
            .await
            .map_err(|e| StoreError::Append(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Append(format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<AnnotationRecord>, StoreError> {
        Ok(self.read_rows().await?.into_iter().map(|r| r.record).collect())
    }

    async fn set_priority(&self, row: usize, priority: u8) -> Result<(), StoreError> {
        let number = self.sheet_row(row).await?;
        let cell = format!("{}{}", column_letter(self.priority_column), number);
        debug!(row, sheet_row = number, priority, "Writing priority");
        self.put_values(&self.range(&cell), vec![vec![Value::from(priority)]])
            .await
    }
}

fn spreadsheet_url(sheet_id: &str, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = Url::parse(SHEETS_API_BASE)
        .map_err(|e| StoreError::Unavailable(format!("bad API base: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Unavailable("bad API base".into()))?
        .push(sheet_id)
        .extend(segments);
    Ok(url)
}

fn record_to_row(record: &AnnotationRecord) -> Vec<Value> {
    vec![
        Value::String(record.timestamp.clone()),
        Value::String(record.sender.clone()),
        Value::String(record.subject.clone()),
        Value::String(record.summary.clone()),
        Value::String(record.category.clone()),
        record.priority.map(Value::from).unwrap_or(Value::String(String::new())),
    ]
}

/// Convert a value grid (header row first) into records tagged with their
/// sheet row numbers.
///
/// Falls back to the standard column order when row 1 is not a header.
fn rows_from_values(values: Vec<Vec<Value>>) -> Vec<SheetRow> {
    let mut rows = values.into_iter().enumerate().peekable();
    let map = match rows.peek() {
        Some((_, first)) => {
            let map = ColumnMap::from_header(first);
            if map.timestamp.is_some() || map.summary.is_some() {
                rows.next();
                map
            } else {
                ColumnMap::standard()
            }
        }
        None => return Vec::new(),
    };

    rows.filter(|(_, row)| row.iter().any(|cell| !cell_text(cell).is_empty()))
        .map(|(index, row)| {
            let get = |col: Option<usize>| {
                col.and_then(|c| row.get(c))
                    .map(cell_text)
                    .unwrap_or_default()
            };
            SheetRow {
                number: index + 1,
                record: AnnotationRecord {
                    timestamp: get(map.timestamp),
                    sender: get(map.sender),
                    subject: get(map.subject),
                    summary: get(map.summary),
                    category: get(map.category),
                    priority: get(map.priority)
                        .trim()
                        .parse::<u8>()
                        .ok()
                        .filter(|p| (1..=5).contains(p)),
                },
            }
        })
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 0-based column index to A1 letters (0 → A, 25 → Z, 26 → AA).
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn grid(value: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(value).unwrap()
    }

    fn records_from_values(values: Vec<Vec<Value>>) -> Vec<AnnotationRecord> {
        rows_from_values(values).into_iter().map(|r| r.record).collect()
    }

    fn row_numbers(values: Value) -> Vec<usize> {
        rows_from_values(grid(values)).iter().map(|r| r.number).collect()
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(5), "F");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
    }

    #[test]
    fn url_encodes_ranges() {
        let url = spreadsheet_url("abc", &["values", "'My Sheet'!A:A:append"]).unwrap();
        assert!(url.as_str().starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc/values/"));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn reads_rows_using_header_positions() {
        let values = grid(json!([
            ["Timestamp", "Sender", "Subject", "Summary", "Category", "Priority"],
            ["2025-01-01 10:00:00", "Bob <b@x.io>", "Hi", "Says hi", "Personal", "4"],
            ["2025-01-02 11:00:00", "Ann", "Pay", "Invoice", "Finance"]
        ]));
        let records = records_from_values(values);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].priority, Some(4));
        assert_eq!(records[1].category, "Finance");
        assert_eq!(records[1].priority, None);
    }

    #[test]
    fn reordered_header_is_respected() {
        let values = grid(json!([
            ["Category", "Summary", "Timestamp"],
            ["Job", "Offer letter", "2025-01-01 10:00:00"]
        ]));
        let records = records_from_values(values);
        assert_eq!(records[0].category, "Job");
        assert_eq!(records[0].summary, "Offer letter");
        assert_eq!(records[0].sender, "");
    }

    #[test]
    fn headerless_grid_uses_standard_order() {
        let values = grid(json!([["2025-01-01 10:00:00", "Bob", "Hi", "Says hi", "Personal"]]));
        let records = records_from_values(values);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender, "Bob");
    }

    #[test]
    fn blank_rows_and_bad_priorities_are_skipped() {
        let values = grid(json!([
            ["Timestamp", "Sender", "Subject", "Summary", "Category", "Priority"],
            [],
            ["", "", ""],
            ["t", "s", "j", "m", "Other", "9"]
        ]));
        let records = records_from_values(values);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].priority, None);
    }

    #[test]
    fn priority_rows_skip_blank_sheet_rows() {
        let numbers = row_numbers(json!([
            ["Timestamp", "Sender", "Subject", "Summary", "Category", "Priority"],
            [],
            ["t1", "Ann", "A", "first", "Job"],
            ["", ""],
            ["t2", "Bob", "B", "second", "Finance"]
        ]));
        // Record 0 lives on sheet row 3, record 1 on row 5.
        assert_eq!(numbers, vec![3, 5]);
    }

    #[test]
    fn headerless_rows_start_at_one() {
        let numbers = row_numbers(json!([
            ["t1", "Ann", "A", "first", "Job"],
            [],
            ["t2", "Bob", "B", "second", "Finance"]
        ]));
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn row_layout_matches_columns() {
        let record = AnnotationRecord {
            timestamp: "t".into(),
            sender: "s".into(),
            subject: "j".into(),
            summary: "m".into(),
            category: "Job".into(),
            priority: Some(2),
        };
        let row = record_to_row(&record);
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[4], json!("Job"));
        assert_eq!(row[5], json!(2));
    }
}
