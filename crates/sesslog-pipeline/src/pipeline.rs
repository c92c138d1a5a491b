//! One logging invocation: read state, extract delta, classify, summarize,
//! publish, write state.
//!
//! State is written only after a step completes, so an invocation killed at
//! any point leaves the record as of its last completed step.

use crate::admission::{cooldown_remaining, Skip};
use sesslog_core::{LineRange, LogEntry, LogError, PublishError, SessionEvent, Verdict};
use sesslog_publish::{PublishReceipt, Publisher};
use sesslog_queue::RetryQueue;
use sesslog_store::{SessionLock, StateRecord, StateStore};
use sesslog_summarize::{ClassifyInput, Classifier, Summarizer, SummaryInput};
use sesslog_transcript::{extract_delta, Conversation, TranscriptError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub locks_dir: PathBuf,
    pub cooldown: Duration,
}

/// Terminal state of an invocation that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing new in the transcript.
    Empty,
    /// Delta judged not worth logging; cursor advanced.
    Trivial { lines: LineRange, reason: String },
    /// Entry delivered; cursor advanced and rolling context replaced.
    Published {
        lines: LineRange,
        receipt: Option<PublishReceipt>,
    },
    /// Delivery failed; cursor advanced, rolling context kept, job queued.
    Queued {
        lines: LineRange,
        job_id: i64,
        error: PublishError,
    },
}

/// Result of an admission-gated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Skipped(Skip),
    Ran(Outcome),
}

/// The logging pipeline with its collaborators.
pub struct Pipeline<'a> {
    pub store: &'a dyn StateStore,
    pub classifier: &'a dyn Classifier,
    pub summarizer: &'a dyn Summarizer,
    pub publisher: &'a dyn Publisher,
    pub queue: &'a RetryQueue,
    pub config: PipelineConfig,
}

impl Pipeline<'_> {
    /// Admission control, then the state machine under the session lock.
    pub fn invoke(&self, event: &SessionEvent) -> Result<Invocation, LogError> {
        if event.stop_hook_active {
            tracing::debug!(session_id = %event.session_id, "re-entrant stop, skipping");
            return Ok(Invocation::Skipped(Skip::ReentrantStop));
        }

        let record = self.load(&event.session_id)?;
        if let Some(remaining) = cooldown_remaining(
            record.as_ref(),
            self.config.cooldown,
            time::OffsetDateTime::now_utc(),
        ) {
            tracing::debug!(session_id = %event.session_id, ?remaining, "cooling down, skipping");
            return Ok(Invocation::Skipped(Skip::Cooldown { remaining }));
        }

        let Some(_lock) = SessionLock::try_acquire(&self.config.locks_dir, &event.session_id)
            .map_err(LogError::StateStore)?
        else {
            tracing::debug!(session_id = %event.session_id, "session busy, skipping");
            return Ok(Invocation::Skipped(Skip::Busy));
        };

        self.run(event).map(Invocation::Ran)
    }

    /// The per-invocation state machine. Callers hold the session lock.
    pub fn run(&self, event: &SessionEvent) -> Result<Outcome, LogError> {
        let session_id = event.session_id.as_str();
        let stored = self.load(session_id)?;
        let is_new = stored.is_none();
        let mut record = stored.unwrap_or_default();

        let transcript = PathBuf::from(&event.transcript_path);
        let delta = extract_delta(&transcript, record.lines_processed).map_err(|e| match e {
            TranscriptError::Unavailable { path, source } => {
                LogError::TranscriptUnavailable { path, source }
            }
        })?;
        if delta.reset {
            // Earlier context stays as background; any entry of the new
            // transcript outranks it.
            record.generation += 1;
        }

        if delta.is_empty() {
            if is_new || delta.reset {
                record.lines_processed = delta.total();
                self.save(session_id, &record)?;
            }
            return Ok(Outcome::Empty);
        }

        let lines = delta.range;
        let conversation = Conversation::from_delta(event.source, session_id, &delta);
        tracing::debug!(
            session_id,
            %lines,
            messages = conversation.messages.len(),
            tokens = conversation.token_estimate(),
            "delta extracted"
        );

        let verdict = self
            .classifier
            .classify(&ClassifyInput {
                conversation: &conversation,
                rolling_context: &record.rolling_context,
            })
            .unwrap_or_else(|e| {
                tracing::warn!(session_id, error = %e, "classifier failed, treating delta as substantive");
                Verdict::Substantive {
                    reason: "classifier unavailable".to_string(),
                }
            });

        if let Verdict::Trivial { reason } = verdict {
            tracing::info!(session_id, %lines, %reason, "skipping trivial delta");
            record.lines_processed = lines.end;
            self.save(session_id, &record)?;
            return Ok(Outcome::Trivial { lines, reason });
        }

        let summary = self
            .summarizer
            .summarize(&SummaryInput {
                event,
                conversation: &conversation,
                rolling_context: &record.rolling_context,
            })
            .map_err(|e| LogError::Summarizer(e.to_string()))?;

        let entry = LogEntry::new(event, sesslog_core::now_local_rfc3339(), lines, summary)
            .with_generation(record.generation);
        let delivered = match self.publisher.publish(&entry) {
            Ok(receipt) => Ok(Some(receipt)),
            Err(PublishError::AlreadyExists) => {
                tracing::info!(session_id, %lines, "entry already at target");
                Ok(None)
            }
            Err(error) => Err(error),
        };

        let now = sesslog_core::now_rfc3339();
        record.lines_processed = lines.end;
        record.last_logged_at = Some(now.clone());
        match delivered {
            Ok(receipt) => {
                record.adopt_context(&entry.context, entry.generation, lines.end);
                record.last_published_at = Some(now);
                self.save(session_id, &record)?;
                Ok(Outcome::Published { lines, receipt })
            }
            Err(error) => {
                tracing::warn!(session_id, %lines, %error, "publish failed, queueing for retry");
                // Queue before the cursor moves past the delta.
                let job_id = self
                    .queue
                    .enqueue(&entry, &error.to_string())
                    .map_err(LogError::Queue)?;
                self.save(session_id, &record)?;
                Ok(Outcome::Queued {
                    lines,
                    job_id,
                    error,
                })
            }
        }
    }

    fn load(&self, session_id: &str) -> Result<Option<StateRecord>, LogError> {
        load_record(self.store, session_id)
    }

    fn save(&self, session_id: &str, record: &StateRecord) -> Result<(), LogError> {
        save_record(self.store, session_id, record)
    }
}

pub(crate) fn load_record(
    store: &dyn StateStore,
    session_id: &str,
) -> Result<Option<StateRecord>, LogError> {
    store.load(session_id).map_err(LogError::StateStore)
}

pub(crate) fn save_record(
    store: &dyn StateStore,
    session_id: &str,
    record: &StateRecord,
) -> Result<(), LogError> {
    store.save(session_id, record).map_err(LogError::StateStore)
}
