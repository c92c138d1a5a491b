//! Durable queue of log entries whose delivery failed.
//!
//! Each job holds the fully formed entry, frozen when it was summarized, so a
//! replay publishes exactly what would have been logged the first time.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sesslog_core::LogEntry;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    first_line INTEGER NOT NULL,
    last_line INTEGER NOT NULL,
    entry TEXT NOT NULL,
    last_error TEXT NOT NULL DEFAULT '',
    attempts INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'pending',
    first_failed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_session ON jobs(session_id);
";

const JOB_COLUMNS: &str =
    "id, session_id, entry, last_error, attempts, status, first_failed_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Abandoned,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "succeeded" => Ok(JobStatus::Succeeded),
            "abandoned" => Ok(JobStatus::Abandoned),
            other => anyhow::bail!("unknown job status: {other}"),
        }
    }
}

/// A persisted failed publish attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RetryJob {
    pub id: i64,
    pub session_id: String,
    pub entry: LogEntry,
    pub last_error: String,
    pub attempts: u32,
    pub status: JobStatus,
    pub first_failed_at: String,
    pub updated_at: String,
}

/// Per-status job totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub succeeded: u64,
    pub abandoned: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.succeeded + self.abandoned
    }
}

/// SQLite-backed retry queue.
pub struct RetryQueue {
    conn: Connection,
}

impl RetryQueue {
    /// Open or create the queue database with its schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        let queue = Self { conn };
        queue.conn.execute_batch(SCHEMA_SQL)?;
        Ok(queue)
    }

    /// In-memory queue, for tests and dry runs.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Record a failed first attempt. The job starts `pending` with one attempt.
    pub fn enqueue(&self, entry: &LogEntry, reason: &str) -> anyhow::Result<i64> {
        let now = sesslog_core::now_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs
             (session_id, first_line, last_line, entry, last_error, attempts, status,
              first_failed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 'pending', ?6, ?6)",
            params![
                entry.session_id,
                entry.lines.start as i64,
                entry.lines.end as i64,
                serde_json::to_string(entry)?,
                reason,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(job_id = id, session_id = %entry.session_id, lines = %entry.lines, reason, "queued failed delivery");
        Ok(id)
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<RetryJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let raw = self
            .conn
            .query_row(&sql, params![id], RawJob::from_row)
            .optional()?;
        raw.map(RawJob::into_job).transpose()
    }

    /// Jobs in id order, optionally restricted to one status. Rows that
    /// cannot be decoded are logged and skipped.
    pub fn list(&self, status: Option<JobStatus>) -> anyhow::Result<Vec<RetryJob>> {
        let raws = match status {
            Some(status) => {
                let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY id");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status.as_str()], RawJob::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], RawJob::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(raws
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id;
                raw.into_job()
                    .map_err(|e| tracing::warn!(job_id = id, error = %e, "skipping unreadable job"))
                    .ok()
            })
            .collect())
    }

    pub fn pending(&self) -> anyhow::Result<Vec<RetryJob>> {
        self.list(Some(JobStatus::Pending))
    }

    /// Terminal transition after a successful replay.
    pub fn mark_succeeded(&self, id: i64) -> anyhow::Result<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = 'succeeded', updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, sesslog_core::now_rfc3339()],
        )?;
        if changed == 0 {
            anyhow::bail!("job {id} is not pending");
        }
        tracing::info!(job_id = id, "delivery replay succeeded");
        Ok(())
    }

    /// Count another failed attempt. The job is abandoned once its attempt
    /// count exceeds `max_attempts`. Returns the resulting status.
    pub fn record_failure(
        &self,
        id: i64,
        reason: &str,
        max_attempts: u32,
    ) -> anyhow::Result<JobStatus> {
        let changed = self.conn.execute(
            "UPDATE jobs
             SET attempts = attempts + 1,
                 last_error = ?2,
                 updated_at = ?3,
                 status = CASE WHEN attempts + 1 > ?4 THEN 'abandoned' ELSE 'pending' END
             WHERE id = ?1 AND status = 'pending'",
            params![id, reason, sesslog_core::now_rfc3339(), max_attempts as i64],
        )?;
        if changed == 0 {
            anyhow::bail!("job {id} is not pending");
        }
        let status: String =
            self.conn
                .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })?;
        let status = status.parse()?;
        if status == JobStatus::Abandoned {
            tracing::warn!(job_id = id, reason, "giving up on delivery");
        }
        Ok(status)
    }

    pub fn counts(&self) -> anyhow::Result<QueueCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n as u64;
            match status.parse() {
                Ok(JobStatus::Pending) => counts.pending = n,
                Ok(JobStatus::Succeeded) => counts.succeeded = n,
                Ok(JobStatus::Abandoned) => counts.abandoned = n,
                Err(_) => tracing::warn!(%status, jobs = n, "ignoring jobs with unknown status"),
            }
        }
        Ok(counts)
    }

    /// Delete succeeded jobs last touched more than `older_than_days` ago.
    pub fn prune(&self, older_than_days: u32) -> anyhow::Result<usize> {
        let cutoff =
            time::OffsetDateTime::now_utc() - time::Duration::days(i64::from(older_than_days));
        self.prune_before(cutoff)
    }

    fn prune_before(&self, cutoff: time::OffsetDateTime) -> anyhow::Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, updated_at FROM jobs WHERE status = 'succeeded'")?;
        let stale: Vec<i64> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(_, updated_at)| {
                sesslog_core::parse_rfc3339(updated_at).is_some_and(|ts| ts < cutoff)
            })
            .map(|(id, _)| id)
            .collect();

        for id in &stale {
            self.conn
                .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        }
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), "pruned delivered jobs");
        }
        Ok(stale.len())
    }
}

/// Row as stored, before the entry JSON and status are decoded.
struct RawJob {
    id: i64,
    session_id: String,
    entry: String,
    last_error: String,
    attempts: i64,
    status: String,
    first_failed_at: String,
    updated_at: String,
}

impl RawJob {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            entry: row.get(2)?,
            last_error: row.get(3)?,
            attempts: row.get(4)?,
            status: row.get(5)?,
            first_failed_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_job(self) -> anyhow::Result<RetryJob> {
        let entry: LogEntry = serde_json::from_str(&self.entry)
            .map_err(|e| anyhow::anyhow!("job {} has an unreadable entry: {e}", self.id))?;
        Ok(RetryJob {
            id: self.id,
            session_id: self.session_id,
            entry,
            last_error: self.last_error,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            status: self.status.parse()?,
            first_failed_at: self.first_failed_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sesslog_core::{LineRange, Source};

    fn entry(session_id: &str, start: u64, end: u64) -> LogEntry {
        LogEntry {
            session_id: session_id.into(),
            source: Source::ClaudeCode,
            timestamp: "2026-10-19T14:05:00+02:00".into(),
            machine: "laptop".into(),
            project: "/home/dev/api".into(),
            tmux_session: None,
            lines: LineRange::new(start, end),
            generation: 0,
            summary: "Added logout".into(),
            prs: vec![],
            services: vec![],
            artifacts: vec![],
            context: "auth module".into(),
        }
    }

    #[test]
    fn enqueue_starts_pending_with_one_attempt() {
        let q = RetryQueue::open_in_memory().unwrap();
        let id = q.enqueue(&entry("s1", 5, 12), "HTTP 503").unwrap();
        let job = q.get(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error, "HTTP 503");
        assert_eq!(job.entry, entry("s1", 5, 12));
        assert_eq!(job.first_failed_at, job.updated_at);
    }

    #[test]
    fn missing_job_is_none() {
        let q = RetryQueue::open_in_memory().unwrap();
        assert!(q.get(42).unwrap().is_none());
    }

    #[test]
    fn success_is_terminal() {
        let q = RetryQueue::open_in_memory().unwrap();
        let id = q.enqueue(&entry("s1", 5, 12), "HTTP 503").unwrap();
        q.mark_succeeded(id).unwrap();
        assert_eq!(q.get(id).unwrap().unwrap().status, JobStatus::Succeeded);
        assert!(q.mark_succeeded(id).is_err());
        assert!(q.record_failure(id, "late", 5).is_err());
        assert!(q.pending().unwrap().is_empty());
    }

    #[test]
    fn abandoned_after_exceeding_ceiling() {
        let q = RetryQueue::open_in_memory().unwrap();
        let id = q.enqueue(&entry("s1", 5, 12), "HTTP 503").unwrap();
        assert_eq!(q.record_failure(id, "HTTP 502", 3).unwrap(), JobStatus::Pending);
        assert_eq!(q.record_failure(id, "HTTP 502", 3).unwrap(), JobStatus::Pending);
        assert_eq!(
            q.record_failure(id, "HTTP 401", 3).unwrap(),
            JobStatus::Abandoned
        );
        let job = q.get(id).unwrap().unwrap();
        assert_eq!(job.attempts, 4);
        assert_eq!(job.last_error, "HTTP 401");
        assert!(q.record_failure(id, "again", 3).is_err());
    }

    #[test]
    fn list_filters_by_status_in_id_order() {
        let q = RetryQueue::open_in_memory().unwrap();
        let a = q.enqueue(&entry("s1", 0, 5), "e").unwrap();
        let b = q.enqueue(&entry("s2", 0, 7), "e").unwrap();
        let c = q.enqueue(&entry("s1", 5, 9), "e").unwrap();
        q.mark_succeeded(b).unwrap();

        let pending: Vec<i64> = q.pending().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(pending, vec![a, c]);
        assert_eq!(q.list(None).unwrap().len(), 3);
        assert_eq!(q.list(Some(JobStatus::Succeeded)).unwrap()[0].id, b);
        assert_eq!(
            q.counts().unwrap(),
            QueueCounts {
                pending: 2,
                succeeded: 1,
                abandoned: 0
            }
        );
    }

    #[test]
    fn corrupt_rows_do_not_hide_the_rest() {
        let q = RetryQueue::open_in_memory().unwrap();
        let good = q.enqueue(&entry("s1", 0, 4), "HTTP 503").unwrap();
        let now = sesslog_core::now_rfc3339();
        q.conn
            .execute(
                "INSERT INTO jobs (session_id, first_line, last_line, entry, first_failed_at, updated_at)
                 VALUES ('s2', 0, 3, 'not json', ?1, ?1)",
                params![now],
            )
            .unwrap();
        q.conn
            .execute(
                "INSERT INTO jobs (session_id, first_line, last_line, entry, status, first_failed_at, updated_at)
                 VALUES ('s3', 0, 3, ?1, 'weird', ?2, ?2)",
                params![serde_json::to_string(&entry("s3", 0, 3)).unwrap(), now],
            )
            .unwrap();

        let pending: Vec<i64> = q.pending().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(pending, [good]);
        assert_eq!(q.list(None).unwrap().len(), 1);
        assert_eq!(q.counts().unwrap().pending, 2);
        assert!(q.get(good + 1).is_err());
    }

    #[test]
    fn prune_only_removes_old_succeeded_jobs() {
        let q = RetryQueue::open_in_memory().unwrap();
        let done = q.enqueue(&entry("s1", 0, 5), "e").unwrap();
        let open = q.enqueue(&entry("s1", 5, 9), "e").unwrap();
        q.mark_succeeded(done).unwrap();

        assert_eq!(q.prune(7).unwrap(), 0);
        let future = time::OffsetDateTime::now_utc() + time::Duration::days(1);
        assert_eq!(q.prune_before(future).unwrap(), 1);
        assert!(q.get(done).unwrap().is_none());
        assert!(q.get(open).unwrap().is_some());
    }

    #[test]
    fn survives_reopen_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("state").join("queue.db");
        let id = {
            let q = RetryQueue::open_or_create(&db).unwrap();
            q.enqueue(&entry("s1", 5, 12), "timeout").unwrap()
        };
        let q = RetryQueue::open_or_create(&db).unwrap();
        let job = q.get(id).unwrap().unwrap();
        assert_eq!(job.session_id, "s1");
        assert_eq!(job.entry.lines, LineRange::new(5, 12));
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in [JobStatus::Pending, JobStatus::Succeeded, JobStatus::Abandoned] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Abandoned.is_terminal());
    }
}
