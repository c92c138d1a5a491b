use crate::client::{Completion, CompletionError, CompletionRequest, ModelTier};
use crate::prompt;
use sesslog_core::Verdict;
use sesslog_transcript::Conversation;
use std::time::Duration;

/// Classifier prompts are bounded tighter than summaries.
const DEFAULT_MAX_PROMPT_BYTES: usize = 10_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ClassifyInput<'a> {
    pub conversation: &'a Conversation,
    pub rolling_context: &'a str,
}

/// Cheap judgement on whether a delta is worth summarizing.
pub trait Classifier {
    fn classify(&self, input: &ClassifyInput<'_>) -> Result<Verdict, CompletionError>;
}

/// Classifier backed by a single fast-tier completion.
pub struct LlmClassifier<C> {
    client: C,
    max_prompt_bytes: usize,
    timeout: Duration,
}

impl<C: Completion> LlmClassifier<C> {
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

impl<C: Completion> Classifier for LlmClassifier<C> {
    fn classify(&self, input: &ClassifyInput<'_>) -> Result<Verdict, CompletionError> {
        if input.conversation.is_empty() {
            return Ok(Verdict::Trivial {
                reason: "No conversational content".to_string(),
            });
        }

        let transcript = input.conversation.render_bounded(self.max_prompt_bytes);
        let activity = input.conversation.activity().describe();
        let req = CompletionRequest {
            tier: ModelTier::Fast,
            prompt: prompt::triviality(&transcript, &activity, input.rolling_context),
            max_tokens: 32,
            timeout: self.timeout,
        };
        let reply = self.client.complete(&req)?;
        Ok(parse_verdict(&reply))
    }
}

/// Parse a `YES <reason>` / `NO <reason>` reply. Anything unclear is
/// substantive so real work is never dropped on a garbled answer.
pub fn parse_verdict(reply: &str) -> Verdict {
    let trimmed = reply.trim().trim_matches('"').trim();
    if let Some(rest) = strip_prefix_ignore_case(trimmed, "NO") {
        Verdict::Trivial {
            reason: reason_or(rest, "Trivial activity"),
        }
    } else if let Some(rest) = strip_prefix_ignore_case(trimmed, "YES") {
        Verdict::Substantive {
            reason: reason_or(rest, "Worth logging"),
        }
    } else {
        Verdict::Substantive {
            reason: "Unclear triviality check".to_string(),
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn reason_or(rest: &str, fallback: &str) -> String {
    let reason = rest.trim_start_matches([' ', ':', '-', ',', '.']).trim();
    if reason.is_empty() {
        fallback.to_string()
    } else {
        reason.to_string()
    }
}
