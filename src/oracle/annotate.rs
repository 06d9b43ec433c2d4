//! Oracle call shapes with their fallback policies.
//!
//! Every method here is infallible: oracle failures are logged and replaced
//! by a fixed fallback so a single bad call never aborts a run.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::oracle::LanguageOracle;

/// Summary used when the message has no text at all.
pub const EMPTY_INPUT_SUMMARY: &str = "(No content to summarize)";

/// Summary used when the oracle answers with nothing.
pub const EMPTY_OUTPUT_SUMMARY: &str = "(No summary returned)";

/// Category used when no classification was attempted or it failed.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Category used when the oracle answers with nothing usable.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Closed label set named in the categorize prompt.
pub const CATEGORY_LABELS: &[&str] = &["Job", "Finance", "Event", "Order", "Personal", "Other"];

/// Priority used when scoring is skipped or fails.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Digest text when the oracle returns nothing.
pub const EMPTY_DIGEST: &str = "(no digest returned)";

static PRIORITY_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[1-5]").expect("valid regex"));

/// Where a summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
    /// Produced by the oracle.
    Generated,
    /// Input was empty; oracle not called.
    EmptyInput,
    /// Oracle returned no text.
    EmptyOutput,
    /// Oracle call failed.
    Fallback,
}

/// A summary plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

impl Summary {
    pub fn is_generated(&self) -> bool {
        self.source == SummarySource::Generated
    }
}

/// Summarize / categorize / score / digest on top of a `LanguageOracle`.
pub struct Annotator {
    oracle: Arc<dyn LanguageOracle>,
    config: OracleConfig,
}

impl Annotator {
    pub fn new(oracle: Arc<dyn LanguageOracle>, config: OracleConfig) -> Self {
        Self { oracle, config }
    }

    /// Produce a 1–2 sentence summary of `text`.
    pub async fn summarize(&self, text: &str) -> Summary {
        if text.trim().is_empty() {
            return Summary {
                text: EMPTY_INPUT_SUMMARY.to_string(),
                source: SummarySource::EmptyInput,
            };
        }

        let prompt = build_summary_prompt(text);
        match self
            .oracle
            .generate(&prompt, self.config.summary_timeout)
            .await
        {
            Ok(output) if output.trim().is_empty() => Summary {
                text: EMPTY_OUTPUT_SUMMARY.to_string(),
                source: SummarySource::EmptyOutput,
            },
            Ok(output) => Summary {
                text: output.trim().to_string(),
                source: SummarySource::Generated,
            },
            Err(e) => {
                warn!(oracle = self.oracle.name(), error = %e, "Summarize failed, using fallback");
                Summary {
                    text: format!("(Summary unavailable: {e})"),
                    source: SummarySource::Fallback,
                }
            }
        }
    }

    /// Classify a summary into a single capitalized label.
    ///
    /// Only oracle-generated summaries are sent to the oracle; placeholders
    /// and fallbacks are `Uncategorized` without a call.
    pub async fn categorize(&self, summary: &Summary) -> String {
        if !summary.is_generated() || summary.text.trim().is_empty() {
            return UNCATEGORIZED.to_string();
        }

        let prompt = build_category_prompt(&summary.text);
        match self
            .oracle
            .generate(&prompt, self.config.category_timeout)
            .await
        {
            Ok(output) => {
                normalize_category(&output).unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
            }
            Err(e) => {
                warn!(oracle = self.oracle.name(), error = %e, "Categorize failed, using fallback");
                UNCATEGORIZED.to_string()
            }
        }
    }

    /// Score importance 1 (low) to 5 (high).
    pub async fn score_priority(&self, summary: &str) -> u8 {
        if summary.trim().is_empty() {
            return DEFAULT_PRIORITY;
        }
        let prompt = format!(
            "Rate this email importance from 1 (low) to 5 (high):\n{summary}\nAnswer only the number."
        );
        match self
            .oracle
            .generate(&prompt, self.config.priority_timeout)
            .await
        {
            Ok(output) => parse_priority(&output).unwrap_or(DEFAULT_PRIORITY),
            Err(e) => {
                debug!(error = %e, "Priority scoring failed, using default");
                DEFAULT_PRIORITY
            }
        }
    }

    /// Condense recent summaries into 4–6 bullet points. Display only.
    pub async fn digest(&self, summaries: &[String]) -> String {
        if summaries.is_empty() {
            return EMPTY_DIGEST.to_string();
        }
        let joined = summaries
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Summarize these emails into 4-6 bullet points (concise daily digest):\n{joined}"
        );
        match self
            .oracle
            .generate(&prompt, self.config.digest_timeout)
            .await
        {
            Ok(output) if output.trim().is_empty() => EMPTY_DIGEST.to_string(),
            Ok(output) => output.trim().to_string(),
            Err(e) => format!("(digest unavailable: {e})"),
        }
    }
}

fn build_summary_prompt(text: &str) -> String {
    format!("Summarize this email in 1–2 clear sentences:\n\n{text}")
}

fn build_category_prompt(summary: &str) -> String {
    format!(
        "Classify this email into one of these categories: [{}].\n\nEmail summary:\n{summary}\n\nCategory:",
        CATEGORY_LABELS.join(", ")
    )
}

/// First token of the oracle output, punctuation stripped, capitalized.
///
/// Best effort only: the result is not checked against `CATEGORY_LABELS`.
pub fn normalize_category(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?;
    let token = token.trim_matches(|c: char| !c.is_alphanumeric());
    let mut chars = token.chars();
    let first = chars.next()?;
    let mut label: String = first.to_uppercase().collect();
    label.push_str(&chars.as_str().to_lowercase());
    Some(label)
}

/// First digit 1–5 in the output.
pub fn parse_priority(raw: &str) -> Option<u8> {
    PRIORITY_DIGIT
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::OracleError;

    /// Oracle returning a fixed answer and recording prompts.
    struct ScriptedOracle {
        answer: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answer.clone().map_err(|_| OracleError::Timeout {
                command: "scripted".into(),
                timeout,
            })
        }
    }

    fn annotator(oracle: Arc<ScriptedOracle>) -> Annotator {
        Annotator::new(oracle, OracleConfig::default())
    }

    #[test]
    fn normalize_takes_first_token_capitalized() {
        assert_eq!(normalize_category("finance, probably").as_deref(), Some("Finance"));
        assert_eq!(normalize_category("JOB").as_deref(), Some("Job"));
        assert_eq!(normalize_category("  **Event**\nbecause").as_deref(), Some("Event"));
        assert_eq!(normalize_category("").as_deref(), None);
        assert_eq!(normalize_category("...").as_deref(), None);
    }

    #[test]
    fn parse_priority_finds_first_valid_digit() {
        assert_eq!(parse_priority("4"), Some(4));
        assert_eq!(parse_priority("I'd say 5/5"), Some(5));
        assert_eq!(parse_priority("0 or 9"), None);
        assert_eq!(parse_priority("high"), None);
    }

    #[test]
    fn category_prompt_names_label_set() {
        let prompt = build_category_prompt("Invoice due Friday");
        for label in CATEGORY_LABELS {
            assert!(prompt.contains(label));
        }
        assert!(prompt.contains("Invoice due Friday"));
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_oracle_call() {
        let oracle = ScriptedOracle::answering("should not be used");
        let annotator = annotator(oracle.clone());

        let summary = annotator.summarize("   \n").await;
        assert_eq!(summary.text, EMPTY_INPUT_SUMMARY);
        assert_eq!(summary.source, SummarySource::EmptyInput);

        let category = annotator.categorize(&summary).await;
        assert_eq!(category, UNCATEGORIZED);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn summarize_trims_oracle_output() {
        let oracle = ScriptedOracle::answering("  Your invoice is due.  \n");
        let summary = annotator(oracle.clone()).summarize("Invoice #42 due").await;
        assert_eq!(summary.text, "Your invoice is due.");
        assert!(summary.is_generated());
        assert!(oracle.prompts.lock().unwrap()[0].contains("Invoice #42 due"));
    }

    #[tokio::test]
    async fn empty_oracle_output_gets_placeholder() {
        let oracle = ScriptedOracle::answering("   ");
        let annotator = annotator(oracle);
        let summary = annotator.summarize("hello").await;
        assert_eq!(summary.text, EMPTY_OUTPUT_SUMMARY);
    }

    #[tokio::test]
    async fn failing_oracle_yields_fallbacks() {
        let oracle = ScriptedOracle::failing();
        let annotator = annotator(oracle.clone());

        let summary = annotator.summarize("hello").await;
        assert_eq!(summary.source, SummarySource::Fallback);
        assert!(!summary.text.is_empty());

        assert_eq!(annotator.categorize(&summary).await, UNCATEGORIZED);
        assert_eq!(annotator.score_priority("x").await, DEFAULT_PRIORITY);
        assert!(annotator.digest(&["a".into()]).await.starts_with("(digest unavailable"));
        // summarize + priority + digest; categorize skipped the fallback summary
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn categorize_normalizes_output() {
        let oracle = ScriptedOracle::answering("finance, probably");
        let annotator = annotator(oracle);
        let summary = Summary {
            text: "Bank statement ready".into(),
            source: SummarySource::Generated,
        };
        assert_eq!(annotator.categorize(&summary).await, "Finance");
    }

    #[tokio::test]
    async fn categorize_blank_output_is_other() {
        let annotator = annotator(ScriptedOracle::answering(""));
        let summary = Summary {
            text: "Something".into(),
            source: SummarySource::Generated,
        };
        assert_eq!(annotator.categorize(&summary).await, DEFAULT_CATEGORY);
    }

    #[tokio::test]
    async fn digest_of_nothing_skips_oracle() {
        let oracle = ScriptedOracle::answering("- bullet");
        let annotator = annotator(oracle.clone());
        assert_eq!(annotator.digest(&[]).await, EMPTY_DIGEST);
        assert_eq!(oracle.calls(), 0);
    }
}
