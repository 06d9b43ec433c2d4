//! Shared types for the annotation pipeline.

use std::fmt;

use serde::Serialize;

// ── Per-message state ───────────────────────────────────────────────

/// Progress of one message through a run.
///
/// `Fetched → Summarized → Categorized → Persisted → MarkedRead → Done`.
/// A message that cannot be fetched never leaves `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Fetched,
    Summarized,
    Categorized,
    Persisted,
    MarkedRead,
    Done,
    Failed,
}

impl MessageState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Summarized => "summarized",
            Self::Categorized => "categorized",
            Self::Persisted => "persisted",
            Self::MarkedRead => "marked_read",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one selected message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub id: String,
    /// Last state reached.
    pub state: MessageState,
    /// The message was fetched, summarized and categorized.
    pub processed: bool,
    pub saved: bool,
    pub marked_read: bool,
}

impl MessageOutcome {
    pub fn fetch_failed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: MessageState::Failed,
            processed: false,
            saved: false,
            marked_read: false,
        }
    }
}

// ── Run statistics ──────────────────────────────────────────────────

/// Counters for one run.
///
/// `saved <= processed <= selected <= seen` and `marked_read <= processed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Unread ids listed.
    pub seen: usize,
    /// Ids taken under the batch ceiling.
    pub selected: usize,
    pub fetch_failed: usize,
    pub processed: usize,
    pub saved: usize,
    pub marked_read: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        if !outcome.processed {
            self.fetch_failed += 1;
            return;
        }
        self.processed += 1;
        if outcome.saved {
            self.saved += 1;
        }
        if outcome.marked_read {
            self.marked_read += 1;
        }
    }

    /// Unread messages left for a later run.
    pub fn deferred(&self) -> usize {
        self.seen.saturating_sub(self.selected)
    }

    /// Add another run's counters to this one.
    pub fn absorb(&mut self, other: &RunStats) {
        self.seen += other.seen;
        self.selected += other.selected;
        self.fetch_failed += other.fetch_failed;
        self.processed += other.processed;
        self.saved += other.saved;
        self.marked_read += other.marked_read;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed | {} saved | {} marked as read",
            self.processed, self.saved, self.marked_read
        )
    }
}

/// Totals for a `watch` session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Runs that completed.
    pub runs: usize,
    /// Runs aborted by a listing failure.
    pub failed_runs: usize,
    pub totals: RunStats,
}
