use crate::client::{Completion, CompletionError, CompletionRequest, ModelTier};
use crate::prompt;
use regex::Regex;
use serde_json::Value;
use sesslog_core::{ArtifactInfo, PrInfo, ServiceInfo, SessionEvent, SessionSummary};
use sesslog_transcript::{floor_char_boundary, Conversation};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_PROMPT_BYTES: usize = 100_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on the carried-forward digest.
pub const ROLLING_CONTEXT_MAX: usize = 600;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("unparseable summary: {0}")]
    Parse(String),
}

pub struct SummaryInput<'a> {
    pub event: &'a SessionEvent,
    pub conversation: &'a Conversation,
    pub rolling_context: &'a str,
}

/// Structured summary of a delta, written against the rolling context.
pub trait Summarizer {
    fn summarize(&self, input: &SummaryInput<'_>) -> Result<SessionSummary, SummarizeError>;
}

/// Summarizer backed by a full-tier completion returning JSON.
pub struct LlmSummarizer<C> {
    client: C,
    max_prompt_bytes: usize,
    timeout: Duration,
}

impl<C: Completion> LlmSummarizer<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            max_prompt_bytes: DEFAULT_MAX_PROMPT_BYTES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, max_prompt_bytes: usize, timeout: Duration) -> Self {
        self.max_prompt_bytes = max_prompt_bytes;
        self.timeout = timeout;
        self
    }
}

impl<C: Completion> Summarizer for LlmSummarizer<C> {
    fn summarize(&self, input: &SummaryInput<'_>) -> Result<SessionSummary, SummarizeError> {
        let transcript = input.conversation.render_bounded(self.max_prompt_bytes);
        let req = CompletionRequest {
            tier: ModelTier::Full,
            prompt: prompt::summary(&transcript, input.event, input.rolling_context),
            max_tokens: 1024,
            timeout: self.timeout,
        };
        let reply = self.client.complete(&req)?;
        parse_summary(&reply)
    }
}

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Parse a model reply into a summary.
///
/// Accepts bare JSON, JSON inside markdown fences, or JSON surrounded by
/// prose. List items missing their key field are dropped.
pub fn parse_summary(reply: &str) -> Result<SessionSummary, SummarizeError> {
    let text = reply.trim();
    let text = if text.starts_with("```") {
        text.lines()
            .filter(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    };

    let data: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(first) => {
            let found = JSON_OBJECT
                .find(&text)
                .ok_or_else(|| SummarizeError::Parse(format!("no JSON found in response: {first}")))?;
            serde_json::from_str(found.as_str())
                .map_err(|e| SummarizeError::Parse(format!("failed to parse JSON response: {e}")))?
        }
    };
    if !data.is_object() {
        return Err(SummarizeError::Parse("response is not a JSON object".into()));
    }

    let summary = data
        .get("summary")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary available")
        .to_string();

    let prs = items(&data, "prs")
        .filter(|pr| pr.get("url").and_then(|u| u.as_str()).is_some())
        .filter_map(|pr| serde_json::from_value::<PrInfo>(pr.clone()).ok())
        .collect();
    let services = items(&data, "services")
        .filter(|svc| svc.get("name").and_then(|n| n.as_str()).is_some())
        .filter_map(|svc| serde_json::from_value::<ServiceInfo>(svc.clone()).ok())
        .collect();
    let artifacts = items(&data, "artifacts")
        .filter(|art| art.is_object())
        .filter_map(|art| serde_json::from_value::<ArtifactInfo>(art.clone()).ok())
        .collect();

    let context = data
        .get("context")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&summary);
    let context = cap(context, ROLLING_CONTEXT_MAX);

    Ok(SessionSummary {
        summary,
        prs,
        services,
        artifacts,
        context,
    })
}

fn items<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or_default()
        .iter()
}

fn cap(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..floor_char_boundary(s, max)])
    }
}
