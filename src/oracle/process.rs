//! Subprocess-backed oracle.
//!
//! Each call spawns `<command> run <model> <prompt>`, captures stdout and
//! enforces a timeout. The child is killed when the timeout fires.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::oracle::LanguageOracle;

/// Maximum stderr kept in error messages.
const MAX_STDERR_CHARS: usize = 500;

/// Local model invoked as a short-lived process per call.
#[derive(Debug, Clone)]
pub struct ProcessOracle {
    command: String,
    args: Vec<String>,
}

impl ProcessOracle {
    /// Oracle running `<command> run <model> <prompt>`.
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["run".to_string(), model.into()],
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(&config.command, &config.model)
    }

    /// Oracle running `<command> <args...> <prompt>` with arbitrary leading args.
    pub fn with_args(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl LanguageOracle for ProcessOracle {
    fn name(&self) -> &str {
        &self.command
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::Unavailable {
                command: self.command.clone(),
                reason: format!("failed to spawn: {e}"),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OracleError::Unavailable {
                    command: self.command.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %self.command, ?timeout, "Oracle call timed out");
                return Err(OracleError::Timeout {
                    command: self.command.clone(),
                    timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(OracleError::Exited {
                command: self.command.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(command = %self.command, chars = text.len(), "Oracle responded");
        Ok(text)
    }
}
