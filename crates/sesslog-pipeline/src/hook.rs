//! Stop-hook payloads as delivered on stdin by the assistant.

use sesslog_core::{SessionEvent, Source};

/// Fields of a Stop-hook payload the logger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
    pub stop_hook_active: bool,
}

impl HookInput {
    pub fn into_event(self, source: Source, machine: String, tmux: Option<String>) -> SessionEvent {
        SessionEvent {
            source,
            session_id: self.session_id,
            transcript_path: self.transcript_path,
            cwd: self.cwd,
            machine,
            tmux_session: tmux,
            stop_hook_active: self.stop_hook_active,
        }
    }
}

/// Parse a hook payload. Keys may be snake_case or camelCase.
pub fn parse_hook_input(stdin: &str) -> anyhow::Result<HookInput> {
    let raw: serde_json::Value = serde_json::from_str(stdin.trim())
        .map_err(|e| anyhow::anyhow!("hook payload is not JSON: {e}"))?;
    let session_id = get_str(&raw, "session_id");
    if session_id.is_empty() {
        anyhow::bail!("hook payload has no session_id");
    }
    let transcript_path = get_str(&raw, "transcript_path");
    if transcript_path.is_empty() {
        anyhow::bail!("hook payload has no transcript_path");
    }
    Ok(HookInput {
        session_id,
        transcript_path,
        cwd: get_str(&raw, "cwd"),
        stop_hook_active: get_bool(&raw, "stop_hook_active"),
    })
}

fn get_str(v: &serde_json::Value, snake_key: &str) -> String {
    lookup(v, snake_key)
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string()
}

fn get_bool(v: &serde_json::Value, snake_key: &str) -> bool {
    lookup(v, snake_key)
        .and_then(|x| x.as_bool())
        .unwrap_or(false)
}

fn lookup<'a>(v: &'a serde_json::Value, snake_key: &str) -> Option<&'a serde_json::Value> {
    v.get(snake_key)
        .or_else(|| v.get(snake_to_camel(snake_key)))
}

fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snake_case_payload() {
        let input = parse_hook_input(
            r#"{"session_id":"abc","transcript_path":"/t.jsonl","cwd":"/p","hook_event_name":"Stop","stop_hook_active":false}"#,
        )
        .unwrap();
        assert_eq!(input.session_id, "abc");
        assert_eq!(input.transcript_path, "/t.jsonl");
        assert_eq!(input.cwd, "/p");
        assert!(!input.stop_hook_active);
    }

    #[test]
    fn parses_camel_case_payload() {
        let input = parse_hook_input(
            r#"{"sessionId":"abc","transcriptPath":"/t.jsonl","stopHookActive":true}"#,
        )
        .unwrap();
        assert_eq!(input.session_id, "abc");
        assert!(input.stop_hook_active);
        assert_eq!(input.cwd, "");
    }

    #[test]
    fn rejects_incomplete_payloads() {
        assert!(parse_hook_input("").is_err());
        assert!(parse_hook_input(r#"{"transcript_path":"/t"}"#).is_err());
        assert!(parse_hook_input(r#"{"session_id":"abc"}"#).is_err());
    }

    #[test]
    fn into_event_carries_metadata() {
        let ev = HookInput {
            session_id: "abc".into(),
            transcript_path: "/t.jsonl".into(),
            cwd: "/p".into(),
            stop_hook_active: false,
        }
        .into_event(Source::ClaudeCode, "laptop".into(), Some("dev:0".into()));
        assert_eq!(ev.machine, "laptop");
        assert_eq!(ev.tmux_label(), Some("dev:0"));
    }

    #[test]
    fn camel_conversion() {
        assert_eq!(snake_to_camel("stop_hook_active"), "stopHookActive");
        assert_eq!(snake_to_camel("cwd"), "cwd");
    }
}
