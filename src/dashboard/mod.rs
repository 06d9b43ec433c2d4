//! Text dashboard over the record store.
//!
//! Reads every record, fills in missing priority scores (cached back to the
//! store), and aggregates overview metrics, a daily trend, category and
//! sender breakdowns, a filtered table and a digest of recent summaries.

mod render;

pub use render::render;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::oracle::Annotator;
use crate::oracle::annotate::DEFAULT_PRIORITY;
use crate::store::{AnnotationRecord, RecordStore};

/// A bracketed address such as `<alice@example.com>`.
static SENDER_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("valid regex"));

/// Printed instead of a report when the store is empty.
pub const NO_DATA: &str = "No data yet. Run `inbox-digest run` to populate.";

/// Number of recent summaries fed to the digest.
const DIGEST_WINDOW: usize = 10;

const TOP_SENDERS: usize = 10;

const SENDER_DISPLAY_CHARS: usize = 20;

/// Row filters for the summaries table.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Free-text query; only its keywords are honored.
    pub query: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
}

/// One row of the summaries table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub date: Option<NaiveDate>,
    pub sender_name: String,
    pub subject: String,
    pub summary: String,
    pub category: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total: usize,
    pub unique_senders: usize,
    pub categories: usize,
    pub avg_priority: f64,
}

/// Everything the dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub overview: Overview,
    /// Count per day, ascending. Rows with unparseable timestamps are absent.
    pub trend: Vec<(NaiveDate, usize)>,
    /// Count descending, name ascending.
    pub categories: Vec<(String, usize)>,
    pub top_senders: Vec<(String, usize)>,
    /// Sorted distinct categories, for the category filter.
    pub category_options: Vec<String>,
    pub rows: Vec<ReportRow>,
    pub digest: Option<String>,
}

pub struct Dashboard {
    store: Arc<dyn RecordStore>,
    annotator: Annotator,
}

impl Dashboard {
    pub fn new(store: Arc<dyn RecordStore>, annotator: Annotator) -> Self {
        Self { store, annotator }
    }

    /// Build the report. `Ok(None)` when the store holds no records.
    pub async fn build(
        &self,
        filter: &ReportFilter,
        with_digest: bool,
    ) -> Result<Option<Report>, StoreError> {
        let mut records = self.store.read_all().await?;
        if records.is_empty() {
            return Ok(None);
        }
        info!(count = records.len(), store = self.store.name(), "Loaded records");

        self.fill_priorities(&mut records).await;

        let digest = if with_digest {
            Some(self.annotator.digest(&recent_summaries(&records, DIGEST_WINDOW)).await)
        } else {
            None
        };

        Ok(Some(aggregate(&records, filter, digest)))
    }

    /// Score rows without a priority and cache the score in the store.
    async fn fill_priorities(&self, records: &mut [AnnotationRecord]) {
        let mut scored = 0usize;
        for (row, record) in records.iter_mut().enumerate() {
            if record.priority.is_some() {
                continue;
            }
            let priority = self.annotator.score_priority(&record.summary).await;
            record.priority = Some(priority);
            scored += 1;

            if let Err(e) = self.store.set_priority(row, priority).await {
                warn!(row, error = %e, "Failed to cache priority");
            }
        }
        if scored > 0 {
            debug!(scored, "Scored missing priorities");
        }
    }
}

/// Sender with `<address>` parts removed; `"Unknown"` if nothing is left.
pub fn clean_sender(sender: &str) -> String {
    let name = SENDER_ADDRESS.replace_all(sender, "");
    let name = name.trim();
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

/// First `max` characters plus `"..."` when longer.
pub fn shorten(name: &str, max: usize) -> String {
    if name.chars().count() > max {
        let mut short: String = name.chars().take(max).collect();
        short.push_str("...");
        short
    } else {
        name.to_string()
    }
}

/// Keyword filter over categories. Keywords are cumulative.
///
/// `job` keeps categories containing "job", `event` keeps "event", and
/// `finance`/`invoice` keep "fin". Case-insensitive. An empty query keeps
/// everything.
pub fn keyword_matches(query: &str, category: &str) -> bool {
    let query = query.to_lowercase();
    let category = category.to_lowercase();
    let mut keep = true;
    if query.contains("job") {
        keep &= category.contains("job");
    }
    if query.contains("event") {
        keep &= category.contains("event");
    }
    if query.contains("finance") || query.contains("invoice") {
        keep &= category.contains("fin");
    }
    keep
}

fn recent_summaries(records: &[AnnotationRecord], window: usize) -> Vec<String> {
    let start = records.len().saturating_sub(window);
    records[start..].iter().map(|r| r.summary.clone()).collect()
}

/// Sort counts descending, ties by name.
fn ranked<K: Ord + Clone>(counts: HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn aggregate(records: &[AnnotationRecord], filter: &ReportFilter, digest: Option<String>) -> Report {
    let rows: Vec<ReportRow> = records
        .iter()
        .map(|r| ReportRow {
            date: r.created_at().map(|dt| dt.date()),
            sender_name: clean_sender(&r.sender),
            subject: r.subject.clone(),
            summary: r.summary.clone(),
            category: r.category.clone(),
            priority: r.priority.unwrap_or(DEFAULT_PRIORITY),
        })
        .collect();

    let unique_senders = rows.iter().map(|r| r.sender_name.as_str()).collect::<HashSet<_>>().len();
    let category_options: Vec<String> = rows
        .iter()
        .map(|r| r.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let avg_priority = rows.iter().map(|r| f64::from(r.priority)).sum::<f64>() / rows.len() as f64;

    let mut trend: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in rows.iter().filter_map(|r| r.date) {
        *trend.entry(date).or_default() += 1;
    }

    let mut categories: HashMap<String, usize> = HashMap::new();
    let mut senders: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        *categories.entry(row.category.clone()).or_default() += 1;
        *senders
            .entry(shorten(&row.sender_name, SENDER_DISPLAY_CHARS))
            .or_default() += 1;
    }
    let mut top_senders = ranked(senders);
    top_senders.truncate(TOP_SENDERS);

    let query = filter.query.as_deref().unwrap_or("");
    let filtered = rows
        .into_iter()
        .filter(|r| keyword_matches(query, &r.category))
        .filter(|r| filter.category.as_ref().is_none_or(|c| &r.category == c))
        .collect();

    Report {
        overview: Overview {
            total: records.len(),
            unique_senders,
            categories: category_options.len(),
            avg_priority: (avg_priority * 10.0).round() / 10.0,
        },
        trend: trend.into_iter().collect(),
        categories: ranked(categories),
        top_senders,
        category_options,
        rows: filtered,
        digest,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::OracleConfig;
    use crate::error::OracleError;
    use crate::oracle::LanguageOracle;
    use crate::store::LibSqlStore;

    struct CountingOracle {
        answer: String,
        calls: Mutex<usize>,
    }

    impl CountingOracle {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.into(),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LanguageOracle for CountingOracle {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, OracleError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.answer.clone())
        }
    }

    fn record(ts: &str, sender: &str, category: &str) -> AnnotationRecord {
        AnnotationRecord {
            timestamp: ts.into(),
            sender: sender.into(),
            subject: "subject".into(),
            summary: format!("{category} mail"),
            category: category.into(),
            priority: Some(2),
        }
    }

    #[test]
    fn clean_sender_strips_addresses() {
        assert_eq!(clean_sender("Alice Smith <alice@example.com>"), "Alice Smith");
        assert_eq!(clean_sender("<noreply@example.com>"), "Unknown");
        assert_eq!(clean_sender("  "), "Unknown");
        assert_eq!(clean_sender("bob@example.com"), "bob@example.com");
        assert_eq!(clean_sender("A <a@x> and B <b@x>"), "A  and B");
        assert_eq!(clean_sender("Broken <unterminated"), "Broken <unterminated");
    }

    #[test]
    fn clean_sender_drops_every_bracketed_address() {
        assert_eq!(clean_sender("Team <a@x.io> <b@y.io>"), "Team");
        assert_eq!(clean_sender("\"Doe, Jane\" <jane@x.io>"), "\"Doe, Jane\"");
        assert_eq!(clean_sender("a < b <c@x.io>"), "a < b");
    }

    #[test]
    fn shorten_truncates_long_names() {
        assert_eq!(shorten("Short", 20), "Short");
        assert_eq!(shorten("Exactly Twenty Chars", 20), "Exactly Twenty Chars");
        assert_eq!(
            shorten("The Very Long Newsletter Name", 20),
            "The Very Long Newsle..."
        );
    }

    #[test]
    fn keyword_filter_rules() {
        assert!(keyword_matches("", "Anything"));
        assert!(keyword_matches("show job emails", "Job"));
        assert!(!keyword_matches("show job emails", "Finance"));
        assert!(keyword_matches("any invoices?", "Finance"));
        assert!(keyword_matches("FINANCE", "finance"));
        assert!(!keyword_matches("event", "Order"));
        assert!(!keyword_matches("job and event", "Job"));
        assert!(keyword_matches("what arrived today", "Order"));
    }

    #[test]
    fn aggregate_counts_and_orders() {
        let records = vec![
            record("2025-01-02 09:00:00", "Alice <a@x.io>", "Job"),
            record("2025-01-01 09:00:00", "Bob <b@x.io>", "Finance"),
            record("2025-01-02 10:00:00", "Alice <a@x.io>", "Finance"),
            record("garbage", "Carol", "Event"),
        ];
        let report = aggregate(&records, &ReportFilter::default(), None);

        assert_eq!(report.overview.total, 4);
        assert_eq!(report.overview.unique_senders, 3);
        assert_eq!(report.overview.categories, 3);
        assert_eq!(report.overview.avg_priority, 2.0);

        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        assert_eq!(report.trend, vec![(d(1), 1), (d(2), 2)]);

        assert_eq!(
            report.categories,
            vec![("Finance".to_string(), 2), ("Event".to_string(), 1), ("Job".to_string(), 1)]
        );
        assert_eq!(report.top_senders[0], ("Alice".to_string(), 2));
        assert_eq!(report.category_options, ["Event", "Finance", "Job"]);
        assert_eq!(report.rows.len(), 4);
    }

    #[test]
    fn filters_apply_to_rows_only() {
        let records = vec![
            record("2025-01-02 09:00:00", "Alice", "Job"),
            record("2025-01-02 09:00:00", "Bob", "Finance"),
            record("2025-01-02 09:00:00", "Carol", "Event"),
        ];
        let filter = ReportFilter {
            query: Some("invoice".into()),
            category: None,
        };
        let report = aggregate(&records, &filter, None);
        assert_eq!(report.overview.total, 3);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].category, "Finance");

        let filter = ReportFilter {
            query: None,
            category: Some("Event".into()),
        };
        let report = aggregate(&records, &filter, None);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].sender_name, "Carol");
    }

    #[test]
    fn top_senders_capped_at_ten() {
        let records: Vec<_> = (0..15)
            .map(|i| record("2025-01-02 09:00:00", &format!("Sender {i:02}"), "Other"))
            .collect();
        let report = aggregate(&records, &ReportFilter::default(), None);
        assert_eq!(report.top_senders.len(), 10);
        assert_eq!(report.top_senders[0].0, "Sender 00");
    }

    #[tokio::test]
    async fn empty_store_builds_nothing() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let oracle = CountingOracle::new("4");
        let dashboard = Dashboard::new(store, Annotator::new(oracle.clone(), OracleConfig::default()));
        assert!(dashboard.build(&ReportFilter::default(), true).await.unwrap().is_none());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn missing_priorities_are_scored_once_and_cached() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        for category in ["Job", "Finance"] {
            let mut r = record("2025-01-02 09:00:00", "Alice", category);
            r.priority = None;
            store.append(&r).await.unwrap();
        }

        let oracle = CountingOracle::new("4");
        let dashboard = Dashboard::new(
            store.clone(),
            Annotator::new(oracle.clone(), OracleConfig::default()),
        );

        let report = dashboard.build(&ReportFilter::default(), false).await.unwrap().unwrap();
        assert_eq!(report.overview.avg_priority, 4.0);
        assert_eq!(oracle.calls(), 2);
        assert!(report.digest.is_none());

        let cached = store.read_all().await.unwrap();
        assert!(cached.iter().all(|r| r.priority == Some(4)));

        dashboard.build(&ReportFilter::default(), false).await.unwrap();
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn digest_uses_last_ten_summaries() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        for i in 0..12 {
            let mut r = record("2025-01-02 09:00:00", "Alice", "Job");
            r.summary = format!("summary {i}");
            store.append(&r).await.unwrap();
        }
        let oracle = CountingOracle::new("- one\n- two");
        let dashboard = Dashboard::new(store, Annotator::new(oracle.clone(), OracleConfig::default()));

        let report = dashboard.build(&ReportFilter::default(), true).await.unwrap().unwrap();
        assert_eq!(report.digest.as_deref(), Some("- one\n- two"));
        assert_eq!(oracle.calls(), 1);

        let records = dashboard.store.read_all().await.unwrap();
        let recent = recent_summaries(&records, DIGEST_WINDOW);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], "summary 2");
    }
}
