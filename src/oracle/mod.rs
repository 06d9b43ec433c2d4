//! Language oracle integration.
//!
//! The oracle is an opaque text-in/text-out model. The pipeline only depends
//! on the `LanguageOracle` trait so the backend (local process, hosted API)
//! can be swapped without touching pipeline logic.
//!
//! - **ProcessOracle**: spawns a local model CLI (`ollama run <model> <prompt>`)
//!   per call, bounded by a wall-clock timeout.

pub mod annotate;
pub mod process;

pub use annotate::Annotator;
pub use process::ProcessOracle;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::OracleError;

/// A text-generation backend.
///
/// Implementations never retry; a failed call is reported once and the
/// caller substitutes its fallback value.
#[async_trait]
pub trait LanguageOracle: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Generate text for `prompt`, failing if no answer arrives within `timeout`.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError>;
}
