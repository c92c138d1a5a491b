use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
/// Attempts per request; rate limits, 5xx and timeouts are retried.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(4);

/// Env marker set on model subprocesses so their own stop hooks stay quiet.
pub const RUNNING_ENV: &str = "SESSLOG_RUNNING";

/// Cost/latency tier of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Cheap, low-latency model for yes/no judgements.
    Fast,
    /// Full model for structured summaries.
    Full,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    pub prompt: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API error (HTTP {status}): {body}")]
    Http { status: u16, body: String },
    #[error("completion rate limited")]
    RateLimited,
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion returned no text")]
    Empty,
    #[error("claude CLI error: {0}")]
    Cli(String),
}

impl CompletionError {
    fn is_retryable(&self) -> bool {
        match self {
            CompletionError::RateLimited | CompletionError::Timeout(_) => true,
            CompletionError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Text completion: prompt in, text out.
pub trait Completion {
    fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError>;
}

// ── Anthropic Messages API ──

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Non-streaming client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    api_key: String,
    fast_model: String,
    full_model: String,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        fast_model: impl Into<String>,
        full_model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            fast_model: fast_model.into(),
            full_model: full_model.into(),
        }
    }

    fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Full => &self.full_model,
        }
    }

    fn send_once(&self, req: &CompletionRequest) -> Result<String, CompletionError> {
        let body = MessagesRequest {
            model: self.model(req.tier),
            max_tokens: req.max_tokens,
            messages: [UserMessage {
                role: "user",
                content: &req.prompt,
            }],
        };
        let payload =
            serde_json::to_string(&body).map_err(|e| CompletionError::Transport(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(req.timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();
        let mut response = agent
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("Content-Type", "application/json")
            .send(payload)
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => CompletionError::Timeout(req.timeout),
                other => CompletionError::Transport(other.to_string()),
            })?;

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        match status {
            200..=299 => extract_message_text(&text),
            429 | 529 => Err(CompletionError::RateLimited),
            _ => Err(CompletionError::Http { status, body: text }),
        }
    }
}

impl Completion for AnthropicClient {
    fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.send_once(req) {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_DELAY * 2u32.pow(attempt - 1);
                    tracing::debug!(attempt, error = %e, ?delay, "retrying completion");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Join the `text` blocks of a Messages API response.
fn extract_message_text(body: &str) -> Result<String, CompletionError> {
    let parsed: serde_json::Value =
        serde_json::from_str(body).map_err(|e| CompletionError::Transport(e.to_string()))?;
    let text = parsed
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        Err(CompletionError::Empty)
    } else {
        Ok(text)
    }
}

// ── claude CLI (print mode) ──

/// Runs `claude -p` for each completion, reusing the local CLI login.
#[derive(Debug, Clone)]
pub struct ClaudeCliClient {
    claude_bin: PathBuf,
    fast_model: Option<String>,
    full_model: Option<String>,
}

impl Default for ClaudeCliClient {
    fn default() -> Self {
        Self {
            claude_bin: PathBuf::from("claude"),
            fast_model: Some("haiku".to_string()),
            full_model: None,
        }
    }
}

impl ClaudeCliClient {
    pub fn with_bin(mut self, claude_bin: PathBuf) -> Self {
        self.claude_bin = claude_bin;
        self
    }

    pub fn with_models(mut self, fast: Option<String>, full: Option<String>) -> Self {
        self.fast_model = fast;
        self.full_model = full;
        self
    }

    /// `--model` passed for a tier; `None` leaves the CLI's default.
    pub fn model(&self, tier: ModelTier) -> Option<&str> {
        match tier {
            ModelTier::Fast => self.fast_model.as_deref(),
            ModelTier::Full => self.full_model.as_deref(),
        }
    }
}

impl Completion for ClaudeCliClient {
    fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError> {
        let mut cmd = Command::new(&self.claude_bin);
        cmd.arg("-p").arg(&req.prompt);
        if let Some(model) = self.model(req.tier) {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("--output-format")
            .arg("text")
            .env(RUNNING_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            CompletionError::Cli(format!(
                "cannot run {:?} ({e}); make sure the claude CLI is installed and in PATH",
                self.claude_bin
            ))
        })?;

        // Drain pipes on threads so a chatty child cannot fill them and stall.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + req.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CompletionError::Timeout(req.timeout));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(CompletionError::Cli(e.to_string())),
            }
        };

        let out = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let err = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            let err = err.trim();
            let lower = err.to_lowercase();
            if lower.contains("rate") || lower.contains("limit") {
                return Err(CompletionError::RateLimited);
            }
            return Err(CompletionError::Cli(err.to_string()));
        }
        if out.trim().is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(out.trim().to_string())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
