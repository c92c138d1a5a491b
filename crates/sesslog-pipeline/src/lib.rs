//! Incremental session logging.
//!
//! Each stop event runs one short-lived [`Pipeline`] invocation: only the
//! transcript lines added since the last invocation are classified,
//! summarized against the session's rolling context, and published. Failed
//! deliveries land in the retry queue and are re-published by a [`Replayer`].

mod admission;
mod hook;
mod pipeline;
mod replay;
mod settings;

#[cfg(test)]
mod testing;

pub use admission::{cooldown_remaining, Skip};
pub use hook::{parse_hook_input, HookInput};
pub use pipeline::{Invocation, Outcome, Pipeline, PipelineConfig};
pub use replay::{ReplayOutcome, ReplayReport, Replayer};
pub use settings::{config_path, detect_machine, CompletionBackend, LlmBackend, Settings};
