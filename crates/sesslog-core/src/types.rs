use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The assistant tool a transcript came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ClaudeCode => "claude-code",
            Source::Codex => "codex",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" | "claude" => Ok(Source::ClaudeCode),
            "codex" => Ok(Source::Codex),
            other => anyhow::bail!("unknown source: {other} (expected claude-code or codex)"),
        }
    }
}

/// Trigger input delivered on each session-stop event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub source: Source,
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
    pub machine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    /// Set when the stop event was raised while a stop hook was already
    /// running (chained stop). Such events are dropped before any work.
    #[serde(default)]
    pub stop_hook_active: bool,
}

impl SessionEvent {
    /// Multiplexer label worth rendering (`none` and blank values are dropped).
    pub fn tmux_label(&self) -> Option<&str> {
        self.tmux_session
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "none")
    }
}

/// Half-open-on-the-left transcript line range `(start, end]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineRange {
    pub start: u64,
    pub end: u64,
}

impl LineRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrInfo {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// created, updated, reviewed
    #[serde(default = "default_pr_action")]
    pub action: String,
}

fn default_pr_action() -> String {
    "created".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    /// started, deployed, stopped
    #[serde(default = "default_service_action")]
    pub action: String,
}

fn default_service_action() -> String {
    "started".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// file, config, script
    #[serde(rename = "type", default = "default_artifact_kind")]
    pub kind: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
}

fn default_artifact_kind() -> String {
    "file".to_string()
}

/// Structured summary of one delta, as produced by the summarizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub summary: String,
    #[serde(default)]
    pub prs: Vec<PrInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactInfo>,
    /// Digest of all work so far, carried forward as the next rolling context.
    #[serde(default)]
    pub context: String,
}

/// The write-once artifact delivered to the knowledge graph.
///
/// Frozen at summarization time: replays publish exactly this value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub session_id: String,
    pub source: Source,
    /// Local time of the invocation, RFC 3339 with offset.
    pub timestamp: String,
    pub machine: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    /// Transcript lines this entry covers.
    pub lines: LineRange,
    /// Session generation the line range belongs to; see `StateRecord`.
    #[serde(default)]
    pub generation: u64,
    pub summary: String,
    #[serde(default)]
    pub prs: Vec<PrInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactInfo>,
    /// Rolling context to install once this entry is confirmed delivered.
    #[serde(default)]
    pub context: String,
}

impl LogEntry {
    pub fn new(
        event: &SessionEvent,
        timestamp: String,
        lines: LineRange,
        summary: SessionSummary,
    ) -> Self {
        Self {
            session_id: event.session_id.clone(),
            source: event.source,
            timestamp,
            machine: event.machine.clone(),
            project: event.cwd.clone(),
            tmux_session: event.tmux_label().map(str::to_string),
            lines,
            generation: 0,
            summary: summary.summary,
            prs: summary.prs,
            services: summary.services,
            artifacts: summary.artifacts,
            context: summary.context,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

/// Classifier judgement on a delta. Consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Trivial { reason: String },
    Substantive { reason: String },
}

impl Verdict {
    pub fn is_trivial(&self) -> bool {
        matches!(self, Verdict::Trivial { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Verdict::Trivial { reason } | Verdict::Substantive { reason } => reason,
        }
    }
}
