//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_DB_PATH: &str = "./data/inbox-digest.db";

/// Which record store backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Google Sheets spreadsheet, first sheet of the given id.
    Sheets { sheet_id: String },
    /// Local libSQL database file.
    Local { path: PathBuf },
}

/// Oracle invocation settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Executable to spawn (`ollama` by default).
    pub command: String,
    /// Model name passed as `run <model>`.
    pub model: String,
    pub summary_timeout: Duration,
    pub category_timeout: Duration,
    pub priority_timeout: Duration,
    pub digest_timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: "ollama".to_string(),
            model: "mistral".to_string(),
            summary_timeout: Duration::from_secs(120),
            category_timeout: Duration::from_secs(60),
            priority_timeout: Duration::from_secs(30),
            digest_timeout: Duration::from_secs(60),
        }
    }
}

/// Pipeline policy constants.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum messages processed per run.
    pub batch_size: usize,
    /// Page size used when listing unread messages.
    pub page_size: u32,
    /// Fixed delay between messages (rate-limit throttle).
    pub message_delay: Duration,
    /// Interval between runs in `watch` mode.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            page_size: 100,
            message_delay: Duration::from_millis(200),
            poll_interval: Duration::from_secs(300),
        }
    }
}

/// Application configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token_path: PathBuf,
    pub store: StoreKind,
    pub pipeline: PipelineConfig,
    pub oracle: OracleConfig,
    /// Directory for daily-rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_path = lookup("INBOX_DIGEST_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("token.json"));

        let sheet_id = lookup("INBOX_DIGEST_SHEET_ID").filter(|s| !s.trim().is_empty());
        let db_path = lookup("INBOX_DIGEST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let store_kind = lookup("INBOX_DIGEST_STORE").unwrap_or_else(|| {
            if sheet_id.is_some() {
                "sheets".to_string()
            } else {
                "local".to_string()
            }
        });
        let store = resolve_store(&store_kind, sheet_id, db_path)?;

        let defaults = PipelineConfig::default();
        let batch_size: usize = parse_or(&lookup, "INBOX_DIGEST_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_DIGEST_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }
        let page_size: u32 = parse_or(&lookup, "INBOX_DIGEST_PAGE_SIZE", defaults.page_size)?;
        let delay_ms: u64 = parse_or(&lookup, "INBOX_DIGEST_DELAY_MS", 200)?;
        let poll_secs: u64 = parse_or(&lookup, "INBOX_DIGEST_POLL_INTERVAL_SECS", 300)?;

        let oracle_defaults = OracleConfig::default();
        let oracle = OracleConfig {
            command: lookup("INBOX_DIGEST_ORACLE_COMMAND").unwrap_or(oracle_defaults.command),
            model: lookup("INBOX_DIGEST_MODEL").unwrap_or(oracle_defaults.model),
            summary_timeout: secs_or(&lookup, "INBOX_DIGEST_SUMMARY_TIMEOUT_SECS", 120)?,
            category_timeout: secs_or(&lookup, "INBOX_DIGEST_CATEGORY_TIMEOUT_SECS", 60)?,
            priority_timeout: secs_or(&lookup, "INBOX_DIGEST_PRIORITY_TIMEOUT_SECS", 30)?,
            digest_timeout: secs_or(&lookup, "INBOX_DIGEST_DIGEST_TIMEOUT_SECS", 60)?,
        };

        Ok(Self {
            token_path,
            store,
            pipeline: PipelineConfig {
                batch_size,
                page_size: page_size.max(1),
                message_delay: Duration::from_millis(delay_ms),
                poll_interval: Duration::from_secs(poll_secs.max(1)),
            },
            oracle,
            log_dir: lookup("INBOX_DIGEST_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Re-select the store from command-line overrides.
    ///
    /// Unset arguments keep the current choice; a sheet id alone switches
    /// to the spreadsheet store.
    pub fn select_store(
        &mut self,
        kind: Option<&str>,
        sheet_id: Option<String>,
        db_path: Option<PathBuf>,
    ) -> Result<(), ConfigError> {
        let (current_kind, current_sheet, current_path) = match &self.store {
            StoreKind::Sheets { sheet_id } => ("sheets", Some(sheet_id.clone()), None),
            StoreKind::Local { path } => ("local", None, Some(path.clone())),
        };
        let kind = match (kind, &sheet_id) {
            (Some(kind), _) => kind,
            (None, Some(_)) => "sheets",
            (None, None) => current_kind,
        };
        let db_path = db_path
            .or(current_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        self.store = resolve_store(kind, sheet_id.or(current_sheet), db_path)?;
        Ok(())
    }
}

fn resolve_store(
    kind: &str,
    sheet_id: Option<String>,
    db_path: PathBuf,
) -> Result<StoreKind, ConfigError> {
    match kind.to_ascii_lowercase().as_str() {
        "sheets" => match sheet_id {
            Some(sheet_id) => Ok(StoreKind::Sheets { sheet_id }),
            None => Err(ConfigError::MissingRequired {
                key: "INBOX_DIGEST_SHEET_ID".into(),
                hint: "Set it to the spreadsheet id, or use INBOX_DIGEST_STORE=local".into(),
            }),
        },
        "local" => Ok(StoreKind::Local { path: db_path }),
        other => Err(ConfigError::InvalidValue {
            key: "INBOX_DIGEST_STORE".into(),
            message: format!("unknown store kind '{other}' (expected 'sheets' or 'local')"),
        }),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default).map(Duration::from_secs)
}
