use sesslog_core::LineRange;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("cannot read transcript {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The unprocessed suffix of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// `(cursor, total]` where `cursor` is the stored progress, or 0 after a reset.
    pub range: LineRange,
    /// Raw lines in `range`, in transcript order.
    pub lines: Vec<String>,
    /// The transcript was shorter than the stored cursor (truncated or
    /// rotated) and is being treated as a fresh session.
    pub reset: bool,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Transcript length after this delta; the cursor to store once acted upon.
    pub fn total(&self) -> u64 {
        self.range.end
    }
}

/// Read `path` fully and return every complete line after `cursor`.
///
/// Only newline-terminated lines are counted: a record still being appended
/// is left for the next invocation instead of being half-consumed.
pub fn extract_delta(path: &Path, cursor: u64) -> Result<Delta, TranscriptError> {
    let data = std::fs::read(path).map_err(|source| TranscriptError::Unavailable {
        path: path.to_path_buf(),
        source,
    })?;

    // Partial line protection: only consume up to the last newline
    let consumable_len = match data.iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    };
    let complete = &data[..consumable_len];
    let total = complete.iter().filter(|&&b| b == b'\n').count() as u64;

    // Truncation detection: transcript shrank below the cursor
    let (start, reset) = if total < cursor {
        tracing::warn!(
            path = %path.display(),
            cursor,
            total,
            "transcript shorter than stored cursor, treating as a fresh session"
        );
        (0, true)
    } else {
        (cursor, false)
    };

    let lines = complete
        .split(|&b| b == b'\n')
        .take(total as usize)
        .skip(start as usize)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .collect();

    Ok(Delta {
        range: LineRange::new(start, total),
        lines,
        reset,
    })
}
