//! Per-source transcript record parsing.

use serde_json::Value;
use sesslog_core::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// A tool invocation seen in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub name: String,
    /// File path or command the tool acted on, when the input names one.
    pub target: Option<String>,
}

/// One conversational turn extracted from a transcript record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub tools: Vec<ToolUse>,
}

/// Parse raw transcript lines into conversational messages.
///
/// Unparseable lines and non-conversational records (progress, snapshots,
/// system notices) are skipped. For `codex`, whose history file is shared
/// across sessions, only records of `session_id` are kept.
pub fn parse_lines(source: Source, session_id: &str, lines: &[String]) -> Vec<Message> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|record| match source {
            Source::ClaudeCode => parse_claude_record(&record),
            Source::Codex => parse_codex_record(&record, session_id),
        })
        .collect()
}

fn parse_claude_record(record: &Value) -> Option<Message> {
    let record_type = record.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if record_type != "user" && record_type != "assistant" {
        return None;
    }

    let message = record.get("message")?;
    let role = match message
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or(record_type)
    {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    let mut parts: Vec<String> = Vec::new();
    let mut tools = Vec::new();
    match message.get("content") {
        Some(Value::String(s)) => parts.push(s.clone()),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                match block {
                    Value::String(s) => parts.push(s.clone()),
                    Value::Object(_) => match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                                parts.push(text.to_string());
                            }
                        }
                        Some("tool_use") => {
                            let name = block
                                .get("name")
                                .and_then(|n| n.as_str())
                                .unwrap_or("unknown")
                                .to_string();
                            parts.push(format!("[Tool: {name}]"));
                            tools.push(ToolUse {
                                target: tool_target(block.get("input")),
                                name,
                            });
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
        _ => {}
    }

    let text = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }
    Some(Message { role, text, tools })
}

fn tool_target(input: Option<&Value>) -> Option<String> {
    let input = input?;
    ["file_path", "notebook_path", "path", "command", "pattern"]
        .iter()
        .find_map(|key| input.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn parse_codex_record(record: &Value, session_id: &str) -> Option<Message> {
    if !session_id.is_empty()
        && record.get("session_id").and_then(|v| v.as_str()) != Some(session_id)
    {
        return None;
    }
    let text = record.get("text").and_then(|v| v.as_str())?.trim();
    if text.is_empty() {
        return None;
    }
    Some(Message {
        role: Role::User,
        text: text.to_string(),
        tools: Vec::new(),
    })
}
