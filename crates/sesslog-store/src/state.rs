//! Durable per-session progress records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted progress for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRecord {
    /// Transcript lines already considered. Never decreases except when the
    /// transcript itself was truncated or rotated.
    pub lines_processed: u64,
    /// Bumped each time the transcript is found truncated or rotated, so
    /// line numbers of different transcripts are never compared directly.
    #[serde(default)]
    pub generation: u64,
    /// Digest of prior summarized work; replaced on each confirmed delivery.
    #[serde(default)]
    pub rolling_context: String,
    /// Generation of the entry whose digest `rolling_context` holds.
    #[serde(default)]
    pub context_generation: u64,
    /// End line of the entry whose digest `rolling_context` holds.
    #[serde(default)]
    pub context_through: u64,
    /// Last successful or attempted publish (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_logged_at: Option<String>,
    /// Last confirmed delivery (RFC 3339); drives the cooldown gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<String>,
}

impl StateRecord {
    /// Install a delivered entry's context unless a newer one is already held.
    /// Entries are ordered by `(generation, end line)`. Returns whether the
    /// context changed hands.
    pub fn adopt_context(&mut self, context: &str, generation: u64, through: u64) -> bool {
        if (generation, through) < (self.context_generation, self.context_through) {
            return false;
        }
        self.rolling_context = context.to_string();
        self.context_generation = generation;
        self.context_through = through;
        true
    }
}

/// Load/save contract for session progress.
///
/// `save` is an atomic replace: concurrent readers observe either the old or
/// the new record, never a partial write.
pub trait StateStore {
    fn load(&self, session_id: &str) -> anyhow::Result<Option<StateRecord>>;
    fn save(&self, session_id: &str, record: &StateRecord) -> anyhow::Result<()>;
}

/// One JSON file per session under `sessions/`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", crate::session_key(session_id)))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, session_id: &str) -> anyhow::Result<Option<StateRecord>> {
        let path = self.record_path(session_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::anyhow!("cannot read {}: {}", path.display(), e));
            }
        };
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    session_id,
                    path = %path.display(),
                    error = %e,
                    "corrupted state record, starting over"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, session_id: &str, record: &StateRecord) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(record)?;
        crate::write_atomic(&self.record_path(session_id), data.as_bytes())
    }
}
