//! Re-delivery of queued entries. The summarizer is never involved: a job
//! publishes exactly the entry frozen when it was queued.

use crate::pipeline::{load_record, save_record};
use sesslog_core::{LogEntry, LogError, PublishError};
use sesslog_publish::Publisher;
use sesslog_queue::{JobStatus, RetryJob, RetryQueue};
use sesslog_store::{SessionLock, StateStore};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Entry is at the target; job succeeded.
    Delivered,
    /// Attempt failed; job stays pending.
    StillFailing { attempts: u32, error: PublishError },
    /// Attempt failed and the ceiling was exceeded.
    Abandoned { error: PublishError },
    /// The session is being logged right now; nothing was attempted.
    Busy,
    /// Job already reached a terminal state.
    NotPending(JobStatus),
}

/// Tally of a `replay_pending` sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub busy: usize,
    pub errors: usize,
}

impl ReplayReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed + self.abandoned
    }
}

/// Re-publishes queued entries under the session lock.
pub struct Replayer<'a> {
    pub store: &'a dyn StateStore,
    pub publisher: &'a dyn Publisher,
    pub queue: &'a RetryQueue,
    pub locks_dir: PathBuf,
    pub max_attempts: u32,
}

impl Replayer<'_> {
    /// Replay one queued job.
    pub fn replay(&self, job_id: i64) -> Result<ReplayOutcome, LogError> {
        let job = self
            .queue
            .get(job_id)
            .map_err(LogError::Queue)?
            .ok_or_else(|| LogError::Queue(anyhow::anyhow!("no retry job with id {job_id}")))?;
        self.replay_job(&job)
    }

    /// Replay every pending job, oldest first. Per-job errors are logged and
    /// counted; the sweep continues.
    pub fn replay_pending(&self) -> Result<ReplayReport, LogError> {
        let jobs = self.queue.pending().map_err(LogError::Queue)?;
        let mut report = ReplayReport::default();
        for job in &jobs {
            match self.replay_job(job) {
                Ok(ReplayOutcome::Delivered) => report.delivered += 1,
                Ok(ReplayOutcome::StillFailing { .. }) => report.failed += 1,
                Ok(ReplayOutcome::Abandoned { .. }) => report.abandoned += 1,
                Ok(ReplayOutcome::Busy) => report.busy += 1,
                Ok(ReplayOutcome::NotPending(_)) => {}
                Err(e) => {
                    tracing::warn!(job_id = job.id, error = %e, "replay failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    fn replay_job(&self, job: &RetryJob) -> Result<ReplayOutcome, LogError> {
        if job.status != JobStatus::Pending {
            return Ok(ReplayOutcome::NotPending(job.status));
        }
        let Some(_lock) = SessionLock::try_acquire(&self.locks_dir, &job.session_id)
            .map_err(LogError::StateStore)?
        else {
            tracing::debug!(job_id = job.id, session_id = %job.session_id, "session busy, leaving job pending");
            return Ok(ReplayOutcome::Busy);
        };

        match self.publisher.publish(&job.entry) {
            Ok(_) | Err(PublishError::AlreadyExists) => {
                self.adopt_delivered(&job.entry)?;
                self.queue.mark_succeeded(job.id).map_err(LogError::Queue)?;
                Ok(ReplayOutcome::Delivered)
            }
            Err(error) => {
                let status = self
                    .queue
                    .record_failure(job.id, &error.to_string(), self.max_attempts)
                    .map_err(LogError::Queue)?;
                Ok(match status {
                    JobStatus::Abandoned => ReplayOutcome::Abandoned { error },
                    _ => ReplayOutcome::StillFailing {
                        attempts: job.attempts + 1,
                        error,
                    },
                })
            }
        }
    }

    /// Install a delivered entry's context, unless the session already holds
    /// context from a later entry. The cursor is not touched.
    fn adopt_delivered(&self, entry: &LogEntry) -> Result<(), LogError> {
        let Some(mut record) = load_record(self.store, &entry.session_id)? else {
            tracing::debug!(session_id = %entry.session_id, "no state record for replayed entry");
            return Ok(());
        };
        if !record.adopt_context(&entry.context, entry.generation, entry.lines.end) {
            tracing::debug!(
                session_id = %entry.session_id,
                generation = entry.generation,
                lines = %entry.lines,
                context_generation = record.context_generation,
                context_through = record.context_through,
                "newer context already held"
            );
        }
        let now = sesslog_core::now_rfc3339();
        record.last_logged_at = Some(now.clone());
        record.last_published_at = Some(now);
        save_record(self.store, &entry.session_id, &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tool_record, user_record, Harness};
    use crate::Outcome;
    use sesslog_core::LineRange;
    use sesslog_store::StateRecord;

    fn queued_job(h: &Harness, session_id: &str, error: PublishError) -> i64 {
        h.write_transcript(&[user_record("build it"), tool_record("Write", "src/a.rs")]);
        h.publisher.fail_next(error);
        match h.pipeline().run(&h.event(session_id)).unwrap() {
            Outcome::Queued { job_id, .. } => job_id,
            other => panic!("expected a queued outcome, got {other:?}"),
        }
    }

    #[test]
    fn failing_replays_count_attempts_until_abandoned() {
        let h = Harness::new();
        let id = queued_job(&h, "s1", PublishError::RateLimited);
        let replayer = h.replayer(2);

        h.publisher.fail_next(PublishError::Server { status: 502 });
        assert_eq!(
            replayer.replay(id).unwrap(),
            ReplayOutcome::StillFailing {
                attempts: 2,
                error: PublishError::Server { status: 502 }
            }
        );
        h.publisher.fail_next(PublishError::Server { status: 502 });
        assert!(matches!(
            replayer.replay(id).unwrap(),
            ReplayOutcome::Abandoned { .. }
        ));
        assert_eq!(replayer.replay(id).unwrap(), ReplayOutcome::NotPending(JobStatus::Abandoned));

        let job = h.queue.get(id).unwrap().unwrap();
        assert_eq!(job.attempts, 3);
        assert_eq!(job.last_error, "publish target server error (HTTP 502)");
        assert_eq!(h.summarizer.calls.get(), 1);
    }

    #[test]
    fn replay_never_clobbers_newer_context() {
        let h = Harness::new();
        let id = queued_job(&h, "s1", PublishError::Timeout);

        // A later invocation delivers lines (2, 4] before the replay happens.
        h.write_transcript(&[
            user_record("build it"),
            tool_record("Write", "src/a.rs"),
            user_record("and tests"),
            tool_record("Write", "tests/a.rs"),
        ]);
        assert!(matches!(
            h.pipeline().run(&h.event("s1")).unwrap(),
            Outcome::Published { .. }
        ));
        assert_eq!(h.store.load("s1").unwrap().unwrap().rolling_context, "context 2");

        assert_eq!(h.replayer(5).replay(id).unwrap(), ReplayOutcome::Delivered);
        let rec = h.store.load("s1").unwrap().unwrap();
        assert_eq!(rec.rolling_context, "context 2");
        assert_eq!(rec.context_through, 4);
        assert_eq!(rec.lines_processed, 4);
    }

    #[test]
    fn replay_from_before_a_transcript_rotation_keeps_newer_context() {
        let h = Harness::new();
        let mut long = Vec::new();
        for i in 0..10 {
            long.push(user_record(&format!("step {i}")));
            long.push(tool_record("Write", &format!("src/step{i}.rs")));
        }
        h.write_transcript(&long);
        h.publisher.fail_next(PublishError::Server { status: 503 });
        let Outcome::Queued { job_id, lines, .. } = h.pipeline().run(&h.event("s1")).unwrap() else {
            panic!("expected a queued outcome");
        };
        assert_eq!(lines, LineRange::new(0, 20));

        // Rotated transcript: line numbers start over and the new entry is delivered.
        h.write_transcript(&[user_record("start over"), tool_record("Write", "a.rs")]);
        assert!(matches!(
            h.pipeline().run(&h.event("s1")).unwrap(),
            Outcome::Published { .. }
        ));
        let before = h.store.load("s1").unwrap().unwrap();
        assert_eq!(before.rolling_context, "context 2");

        assert_eq!(h.replayer(5).replay(job_id).unwrap(), ReplayOutcome::Delivered);
        let after = h.store.load("s1").unwrap().unwrap();
        assert_eq!(after.rolling_context, "context 2");
        assert_eq!((after.context_generation, after.context_through), (1, 2));
        assert_eq!(after.lines_processed, 2);
    }

    #[test]
    fn already_delivered_entry_completes_the_job() {
        let h = Harness::new();
        let id = queued_job(&h, "s1", PublishError::Timeout);
        h.publisher.fail_next(PublishError::AlreadyExists);
        assert_eq!(h.replayer(5).replay(id).unwrap(), ReplayOutcome::Delivered);
        assert_eq!(
            h.store.load("s1").unwrap().unwrap().rolling_context,
            "context 1"
        );
    }

    #[test]
    fn busy_session_leaves_job_untouched() {
        let h = Harness::new();
        let id = queued_job(&h, "s1", PublishError::RateLimited);
        let published_before = h.publisher.calls();
        let _held = SessionLock::try_acquire(&h.paths.locks_dir, "s1")
            .unwrap()
            .unwrap();

        assert_eq!(h.replayer(5).replay(id).unwrap(), ReplayOutcome::Busy);
        assert_eq!(h.publisher.calls(), published_before);
        assert_eq!(h.queue.get(id).unwrap().unwrap().attempts, 1);
    }

    #[test]
    fn sweep_reports_each_pending_job() {
        let h = Harness::new();
        let a = queued_job(&h, "s1", PublishError::RateLimited);
        let b = queued_job(&h, "s2", PublishError::RateLimited);
        h.publisher.fail_next(PublishError::Server { status: 500 });

        let report = h.replayer(5).replay_pending().unwrap();
        assert_eq!(
            report,
            ReplayReport {
                delivered: 1,
                failed: 1,
                ..Default::default()
            }
        );
        assert_eq!(report.attempted(), 2);
        assert_eq!(h.queue.get(a).unwrap().unwrap().status, JobStatus::Pending);
        assert_eq!(h.queue.get(b).unwrap().unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn unknown_job_is_a_queue_error() {
        let h = Harness::new();
        assert!(matches!(h.replayer(5).replay(99), Err(LogError::Queue(_))));
    }

    #[test]
    fn replay_without_state_record_still_succeeds() {
        let h = Harness::new();
        let id = queued_job(&h, "s1", PublishError::RateLimited);
        std::fs::remove_dir_all(&h.paths.sessions_dir).unwrap();
        assert_eq!(h.replayer(5).replay(id).unwrap(), ReplayOutcome::Delivered);
        assert_eq!(h.store.load("s1").unwrap(), None::<StateRecord>);
    }
}
