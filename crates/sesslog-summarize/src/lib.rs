//! Model-backed collaborators of the logging pipeline.
//!
//! Both the classifier and the summarizer are narrow traits with a single
//! operation, so the pipeline can run against deterministic stubs in tests.
//! The production implementations share one [`Completion`] client.

mod classify;
mod client;
mod prompt;
mod summarize;

pub use classify::{parse_verdict, ClassifyInput, Classifier, LlmClassifier};
pub use client::{
    AnthropicClient, ClaudeCliClient, Completion, CompletionError, CompletionRequest, ModelTier,
    RUNNING_ENV,
};
pub use summarize::{
    parse_summary, LlmSummarizer, SummarizeError, Summarizer, SummaryInput, ROLLING_CONTEXT_MAX,
};
