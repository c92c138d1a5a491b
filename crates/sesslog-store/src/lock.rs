use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive per-session lock backed by `locks/<session-key>.lock`.
/// Released when dropped (or when the process dies).
#[derive(Debug)]
pub struct SessionLock {
    _file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Try to acquire the lock for `session_id` without blocking.
    ///
    /// Returns `Ok(None)` when another invocation currently holds it.
    pub fn try_acquire(locks_dir: &Path, session_id: &str) -> anyhow::Result<Option<Self>> {
        fs::create_dir_all(locks_dir)?;
        let path = locks_dir.join(format!("{}.lock", crate::session_key(session_id)));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("cannot open lock file {}: {}", path.display(), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "cannot lock {}: {}",
                path.display(),
                e
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
