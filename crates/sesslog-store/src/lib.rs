mod lock;
mod state;

pub use lock::SessionLock;
pub use state::{FileStateStore, StateRecord, StateStore};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Return the state root: `$SESSLOG_HOME`, else `<state_dir>/sesslog`
/// (XDG state home on Linux), else `<data_dir>/sesslog`, else `~/.sesslog`.
pub fn store_root() -> PathBuf {
    if let Some(home) = std::env::var_os("SESSLOG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("sesslog")
    } else if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("sesslog")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".sesslog")
    } else {
        PathBuf::from(".sesslog-store")
    }
}

/// Well-known paths under a state root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub sessions_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub queue_db: PathBuf,
    pub log_file: PathBuf,
}

impl StorePaths {
    /// Derive all paths from a root. Pure computation, no I/O.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            sessions_dir: root.join("sessions"),
            locks_dir: root.join("locks"),
            queue_db: root.join("queue.db"),
            log_file: root.join("sesslog.log"),
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [&self.root, &self.sessions_dir, &self.locks_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// File-system safe key for a session id.
///
/// Ids made of `[A-Za-z0-9_-]` are used as-is; anything else (path
/// separators, dots, unicode) is replaced by a blake3 digest prefix.
pub fn session_key(session_id: &str) -> String {
    let safe = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        session_id.to_string()
    } else {
        let hash = blake3::hash(session_id.as_bytes());
        format!("h-{}", &hash.to_hex()[..32])
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
