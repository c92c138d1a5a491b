//! Error taxonomy for a logging invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single logging invocation.
///
/// Only `Classifier` and `Publish` are recoverable inside the pipeline; every
/// other variant aborts the invocation before the state record is written.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("transcript unavailable at {}: {source}", path.display())]
    TranscriptUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("summarizer error: {0}")]
    Summarizer(String),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("state store error: {0}")]
    StateStore(#[source] anyhow::Error),

    #[error("retry queue error: {0}")]
    Queue(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Outcome of a failed publish attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("publish rate limited")]
    RateLimited,

    #[error("publish target server error (HTTP {status})")]
    Server { status: u16 },

    /// No response within the deadline; the write may or may not have landed.
    #[error("publish timed out")]
    Timeout,

    #[error("publish transport error: {0}")]
    Transport(String),

    /// The addressed block already exists at the target, i.e. an earlier
    /// attempt for the same entry was applied.
    #[error("entry already exists at target")]
    AlreadyExists,
}
