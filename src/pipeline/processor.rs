//! Annotation pipeline: list unread → fetch → summarize → categorize →
//! append → mark read.
//!
//! Runs are strictly sequential. Per-message failures are logged with the
//! state reached and never abort the run; only a listing failure does.

use std::future::Future;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::mailbox::{self, MessageRef, MessageSource};
use crate::oracle::Annotator;
use crate::pipeline::types::{MessageOutcome, MessageState, RunStats, WatchSummary};
use crate::store::{AnnotationRecord, RecordStore};

/// Log a progress line every this many messages.
const PROGRESS_EVERY: usize = 25;

pub struct AnnotationPipeline {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn RecordStore>,
    annotator: Annotator,
    config: PipelineConfig,
}

impl AnnotationPipeline {
    pub fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn RecordStore>,
        annotator: Annotator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            store,
            annotator,
            config,
        }
    }

    /// Process up to `batch_size` unread messages once.
    pub async fn run_once(&self) -> Result<RunStats, PipelineError> {
        let run_id = Uuid::new_v4();
        self.run_inner()
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn run_inner(&self) -> Result<RunStats, PipelineError> {
        let refs = mailbox::collect_unread(self.source.as_ref(), self.config.page_size)
            .await
            .map_err(|e| {
                error!(source = self.source.name(), error = %e, "Unread listing failed, aborting run");
                PipelineError::Listing(e)
            })?;

        let mut stats = RunStats {
            seen: refs.len(),
            ..Default::default()
        };
        if refs.is_empty() {
            info!("No unread messages");
            return Ok(stats);
        }

        let selected = select_batch(refs, self.config.batch_size);
        stats.selected = selected.len();
        info!(
            seen = stats.seen,
            selected = stats.selected,
            deferred = stats.deferred(),
            "Processing unread batch"
        );

        for (index, msg_ref) in selected.iter().enumerate() {
            let outcome = self.process_one(msg_ref).await;
            stats.record(&outcome);

            let done = index + 1;
            if done % PROGRESS_EVERY == 0 {
                info!(done, total = stats.selected, "Progress");
            }

            if !self.config.message_delay.is_zero() {
                tokio::time::sleep(self.config.message_delay).await;
            }
        }

        info!(
            processed = stats.processed,
            saved = stats.saved,
            marked_read = stats.marked_read,
            fetch_failed = stats.fetch_failed,
            "Run complete"
        );
        Ok(stats)
    }

    /// Drive one message to `Done`, or as far as it gets.
    async fn process_one(&self, msg_ref: &MessageRef) -> MessageOutcome {
        let id = msg_ref.id.as_str();

        let message = match self.source.fetch_full(id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(id, state = %MessageState::Failed, error = %e, "Fetch failed, skipping");
                return MessageOutcome::fetch_failed(id);
            }
        };
        let mut state = MessageState::Fetched;
        debug!(id, sender = %message.sender, subject = %message.subject, "Fetched");

        let summary = self.annotator.summarize(&message.snippet).await;
        state = advance(id, state, MessageState::Summarized);

        let category = self.annotator.categorize(&summary).await;
        state = advance(id, state, MessageState::Categorized);

        let record = AnnotationRecord::now(&message.sender, &message.subject, &summary.text, &category);
        let saved = match self.store.append(&record).await {
            Ok(()) => {
                state = advance(id, state, MessageState::Persisted);
                true
            }
            Err(e) => {
                error!(id, state = %state, store = self.store.name(), error = %e, "Append failed, record lost");
                false
            }
        };

        // Attempted regardless of the append outcome.
        let marked_read = match self.source.mark_read(id).await {
            Ok(()) => {
                state = advance(id, state, MessageState::MarkedRead);
                true
            }
            Err(e) => {
                warn!(id, state = %state, error = %e, "Mark-read failed, message stays unread");
                false
            }
        };

        if saved && marked_read {
            state = advance(id, state, MessageState::Done);
        }
        info!(id, category = %category, state = %state, "Message processed");

        MessageOutcome {
            id: id.to_string(),
            state,
            processed: true,
            saved,
            marked_read,
        }
    }

    /// Run every `poll_interval` until `shutdown` resolves.
    ///
    /// The first run starts immediately. A listing failure ends that run
    /// only. Shutdown is observed between runs.
    pub async fn watch<F>(&self, shutdown: F) -> WatchSummary
    where
        F: Future<Output = ()>,
    {
        let mut summary = WatchSummary::default();
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Watch loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(runs = summary.runs, "Watch loop shutting down");
                    return summary;
                }
                _ = tick.tick() => {}
            }

            match self.run_once().await {
                Ok(stats) => {
                    summary.runs += 1;
                    summary.totals.absorb(&stats);
                    info!(run = summary.runs, "{stats}");
                }
                Err(e) => {
                    summary.failed_runs += 1;
                    warn!(error = %e, "Run failed, retrying next tick");
                }
            }
        }
    }
}

fn advance(id: &str, from: MessageState, to: MessageState) -> MessageState {
    debug!(id, from = %from, to = %to, "State transition");
    to
}

/// First `ceiling` refs in listing order; the rest wait for a later run.
fn select_batch(mut refs: Vec<MessageRef>, ceiling: usize) -> Vec<MessageRef> {
    refs.truncate(ceiling);
    refs
}
