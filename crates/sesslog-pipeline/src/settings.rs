//! Runtime settings: `config.json` under the user config dir, then env overrides.

use serde::Deserialize;
use sesslog_core::LogError;
use sesslog_publish::RoamPublisher;
use sesslog_store::StorePaths;
use sesslog_summarize::{
    AnthropicClient, ClaudeCliClient, Completion, CompletionError, CompletionRequest,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_COOLDOWN_SECS: u64 = 300;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_MAX_PROMPT_CHARS: usize = 100_000;
const DEFAULT_CLASSIFIER_PROMPT_CHARS: usize = 10_000;
const DEFAULT_FAST_MODEL: &str = "claude-haiku-4-5";
const DEFAULT_FULL_MODEL: &str = "claude-sonnet-4-5";

/// Which completion client the model collaborators use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmBackend {
    /// Anthropic Messages API over HTTP.
    Anthropic,
    /// The local `claude` CLI in print mode.
    ClaudeCli,
}

impl FromStr for LlmBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "anthropic" => Ok(LlmBackend::Anthropic),
            "claude-cli" | "claude" => Ok(LlmBackend::ClaudeCli),
            other => anyhow::bail!("unknown LLM backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// State directory root; defaults to the platform state dir.
    pub home: Option<PathBuf>,
    pub roam_graph: Option<String>,
    pub roam_token: Option<String>,
    pub roam_base_url: Option<String>,
    pub llm_backend: LlmBackend,
    pub anthropic_api_key: Option<String>,
    pub fast_model: String,
    pub full_model: String,
    pub claude_bin: Option<PathBuf>,
    pub cooldown_secs: u64,
    pub max_attempts: u32,
    pub max_prompt_chars: usize,
    pub classifier_prompt_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: None,
            roam_graph: None,
            roam_token: None,
            roam_base_url: None,
            llm_backend: LlmBackend::Anthropic,
            anthropic_api_key: None,
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            full_model: DEFAULT_FULL_MODEL.to_string(),
            claude_bin: None,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            classifier_prompt_chars: DEFAULT_CLASSIFIER_PROMPT_CHARS,
        }
    }
}

/// `<config_dir>/sesslog/config.json`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sesslog").join("config.json"))
}

impl Settings {
    /// Load from the default config file (if any), then apply process env.
    pub fn load() -> anyhow::Result<Self> {
        let mut settings = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Read a config file. A missing file yields defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("cannot read config {}: {e}", path.display())),
        }
    }

    /// Overlay `SESSLOG_*` / `ANTHROPIC_API_KEY` values. Unparseable numbers
    /// and unknown backends keep the current value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SESSLOG_HOME") {
            self.home = Some(PathBuf::from(v));
        }
        if let Some(v) = var("SESSLOG_ROAM_GRAPH") {
            self.roam_graph = Some(v);
        }
        if let Some(v) = var("SESSLOG_ROAM_TOKEN") {
            self.roam_token = Some(v);
        }
        if let Some(v) = var("SESSLOG_ROAM_BASE_URL") {
            self.roam_base_url = Some(v);
        }
        if let Some(v) = var("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(kind) = var("SESSLOG_LLM_BACKEND").and_then(|v| v.parse().ok()) {
            self.llm_backend = kind;
        }
        if let Some(n) = var("SESSLOG_COOLDOWN_SECS").and_then(|v| v.trim().parse().ok()) {
            self.cooldown_secs = n;
        }
        if let Some(n) = var("SESSLOG_MAX_ATTEMPTS").and_then(|v| v.trim().parse().ok()) {
            self.max_attempts = n;
        }
        if let Some(n) = var("SESSLOG_MAX_PROMPT_CHARS").and_then(|v| v.trim().parse().ok()) {
            self.max_prompt_chars = n;
        }
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths::at(
            self.home
                .clone()
                .unwrap_or_else(sesslog_store::store_root),
        )
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// The configured publisher. Missing credentials are a config error.
    pub fn publisher(&self) -> Result<RoamPublisher, LogError> {
        let graph = self
            .roam_graph
            .as_deref()
            .ok_or_else(|| LogError::Config("no Roam graph (set SESSLOG_ROAM_GRAPH)".into()))?;
        let token = self
            .roam_token
            .as_deref()
            .ok_or_else(|| LogError::Config("no Roam API token (set SESSLOG_ROAM_TOKEN)".into()))?;
        let publisher = RoamPublisher::new(graph, token);
        Ok(match &self.roam_base_url {
            Some(url) => publisher.with_base_url(url.as_str()),
            None => publisher,
        })
    }

    /// The configured completion client.
    pub fn completion(&self) -> Result<CompletionBackend, LogError> {
        match self.llm_backend {
            LlmBackend::Anthropic => {
                let key = self.anthropic_api_key.as_deref().ok_or_else(|| {
                    LogError::Config(
                        "no Anthropic API key (set ANTHROPIC_API_KEY or SESSLOG_LLM_BACKEND=claude-cli)"
                            .into(),
                    )
                })?;
                Ok(CompletionBackend::Anthropic(AnthropicClient::new(
                    key,
                    &self.fast_model,
                    &self.full_model,
                )))
            }
            LlmBackend::ClaudeCli => {
                let client = ClaudeCliClient::default().with_models(
                    Some(self.fast_model.clone()),
                    Some(self.full_model.clone()),
                );
                Ok(CompletionBackend::ClaudeCli(match &self.claude_bin {
                    Some(bin) => client.with_bin(bin.clone()),
                    None => client,
                }))
            }
        }
    }
}

/// Completion client chosen at runtime.
#[derive(Debug, Clone)]
pub enum CompletionBackend {
    Anthropic(AnthropicClient),
    ClaudeCli(ClaudeCliClient),
}

impl Completion for CompletionBackend {
    fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError> {
        match self {
            CompletionBackend::Anthropic(c) => c.complete(req),
            CompletionBackend::ClaudeCli(c) => c.complete(req),
        }
    }
}

/// Best-effort machine label: `HOSTNAME`/`COMPUTERNAME`, then `/etc/hostname`.
pub fn detect_machine() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sesslog_summarize::ModelTier;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.cooldown(), Duration::from_secs(300));
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.max_prompt_chars, 100_000);
        assert_eq!(s.classifier_prompt_chars, 10_000);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut s: Settings =
            serde_json::from_str(r#"{"roam_graph":"file-graph","cooldown_secs":60}"#).unwrap();
        assert_eq!(s.max_attempts, 5);
        s.apply_env(env(&[
            ("SESSLOG_ROAM_GRAPH", "env-graph"),
            ("SESSLOG_MAX_ATTEMPTS", "2"),
            ("SESSLOG_LLM_BACKEND", "claude-cli"),
        ]));
        assert_eq!(s.roam_graph.as_deref(), Some("env-graph"));
        assert_eq!(s.cooldown_secs, 60);
        assert_eq!(s.max_attempts, 2);
        assert_eq!(s.llm_backend, LlmBackend::ClaudeCli);
    }

    #[test]
    fn bad_env_values_fall_back() {
        let mut s = Settings::default();
        s.apply_env(env(&[
            ("SESSLOG_COOLDOWN_SECS", "not_a_number"),
            ("SESSLOG_LLM_BACKEND", "gpt"),
            ("SESSLOG_ROAM_TOKEN", "   "),
        ]));
        assert_eq!(s.cooldown_secs, 300);
        assert_eq!(s.llm_backend, LlmBackend::Anthropic);
        assert!(s.roam_token.is_none());
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let mut s = Settings::default();
        assert!(matches!(s.publisher(), Err(LogError::Config(_))));
        assert!(matches!(s.completion(), Err(LogError::Config(_))));

        s.roam_graph = Some("g".into());
        s.roam_token = Some("t".into());
        s.llm_backend = LlmBackend::ClaudeCli;
        assert!(s.publisher().is_ok());
        assert!(matches!(
            s.completion(),
            Ok(CompletionBackend::ClaudeCli(_))
        ));
    }

    #[test]
    fn claude_cli_backend_uses_configured_models() {
        let s: Settings = serde_json::from_str(
            r#"{"llm_backend":"claude-cli","fast_model":"claude-haiku-4-5","full_model":"claude-opus-4-1"}"#,
        )
        .unwrap();
        let Ok(CompletionBackend::ClaudeCli(client)) = s.completion() else {
            panic!("expected the claude CLI backend");
        };
        assert_eq!(client.model(ModelTier::Fast), Some("claude-haiku-4-5"));
        assert_eq!(client.model(ModelTier::Full), Some("claude-opus-4-1"));
    }

    #[test]
    fn config_file_missing_or_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        assert_eq!(Settings::from_file(&path).unwrap().max_attempts, 5);
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn home_override_drives_layout() {
        let mut s = Settings::default();
        s.apply_env(env(&[("SESSLOG_HOME", "/tmp/sesslog-test")]));
        assert_eq!(
            s.store_paths().queue_db,
            PathBuf::from("/tmp/sesslog-test/queue.db")
        );
    }
}
