//! Error types for inbox-digest.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Credential errors. `Missing` is startup-fatal.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credential available at {path}: {reason}")]
    Missing { path: String, reason: String },

    #[error("Token file {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Access token expired and cannot be refreshed: {0}")]
    Expired(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// Mailbox (message source) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Cannot enumerate unread messages at all. Run-fatal.
    #[error("Failed to list unread messages: {0}")]
    Listing(String),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Transient mailbox error: {0}")]
    Transient(String),

    #[error("Failed to mark message {id} as read: {reason}")]
    MarkRead { id: String, reason: String },

    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),

    /// HTTP client could not be constructed. Startup-fatal.
    #[error("Mailbox client setup failed: {0}")]
    Client(String),
}

/// Language oracle errors. Always recoverable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle {command} unavailable: {reason}")]
    Unavailable { command: String, reason: String },

    #[error("Oracle {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Oracle {command} exited with status {code}: {stderr}")]
    Exited {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be opened. Startup-fatal.
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Append failed: {0}")]
    Append(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Row {row} not found")]
    RowNotFound { row: usize },

    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),
}

/// Pipeline run errors. Only listing failure aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Run aborted: {0}")]
    Listing(#[from] MailboxError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_failure_converts_into_top_level() {
        let err: Error = PipelineError::Listing(MailboxError::Listing("offline".into())).into();
        assert_eq!(
            err.to_string(),
            "Pipeline error: Run aborted: Failed to list unread messages: offline"
        );
    }

    fn read_rows() -> std::result::Result<usize, StoreError> {
        Err(StoreError::Query("database is locked".into()))
    }

    fn report() -> Result<usize> {
        let rows = read_rows()?;
        Ok(rows)
    }

    #[test]
    fn command_errors_display_as_messages() {
        let err = report().unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Query(_))));
        assert_eq!(err.to_string(), "Store error: Query failed: database is locked");
        assert!(!err.to_string().contains("Query("));

        let err: Error = MailboxError::Client("no roots".into()).into();
        assert_eq!(err.to_string(), "Mailbox error: Mailbox client setup failed: no roots");
    }

    #[test]
    fn oracle_timeout_message_names_command() {
        let err = OracleError::Timeout {
            command: "ollama".into(),
            timeout: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("ollama"));
        assert!(err.to_string().contains("60s"));
    }
}
