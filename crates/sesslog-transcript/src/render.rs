use crate::delta::Delta;
use crate::parse::{parse_lines, Message};
use sesslog_core::Source;

const TRUNCATION_MARKER: &str = "[...truncated...]\n";

/// Tools that only observe the workspace.
const PASSIVE_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "LS",
    "NotebookRead",
    "WebFetch",
    "WebSearch",
    "TodoRead",
    "TodoWrite",
];

/// Tools that create or modify files.
const MUTATING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Return the largest byte index `<= i` that is a valid char boundary.
/// Equivalent to `str::floor_char_boundary` (unstable nightly API).
pub fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn ceil_char_boundary(s: &str, i: usize) -> usize {
    let mut pos = i.min(s.len());
    while pos < s.len() && !s.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Keep the most recent `max_bytes` of `text`, starting at the first message
/// boundary inside the kept window when there is one.
pub fn truncate_tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let start = ceil_char_boundary(text, text.len() - max_bytes);
    let tail = &text[start..];
    let boundary = ["\n\nUser: ", "\n\nAssistant: "]
        .iter()
        .filter_map(|marker| tail.find(marker))
        .filter(|&pos| pos > 0)
        .min();
    match boundary {
        // skip the blank line separating messages
        Some(pos) => format!("{TRUNCATION_MARKER}{}", &tail[pos + 2..]),
        None => format!("{TRUNCATION_MARKER}{tail}"),
    }
}

/// Counts of tool calls by effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolActivity {
    pub passive: usize,
    pub mutating: usize,
    pub other: usize,
    /// Targets of mutating tools, in first-seen order.
    pub touched: Vec<String>,
}

impl ToolActivity {
    pub fn total(&self) -> usize {
        self.passive + self.mutating + self.other
    }

    /// One-line hint for the classifier prompt.
    pub fn describe(&self) -> String {
        if self.total() == 0 {
            return "no tool calls".to_string();
        }
        let mut line = format!(
            "{} passive (read/search), {} file-modifying, {} other tool calls",
            self.passive, self.mutating, self.other
        );
        if !self.touched.is_empty() {
            let shown: Vec<&str> = self.touched.iter().take(5).map(String::as_str).collect();
            line.push_str(&format!("; modified: {}", shown.join(", ")));
        }
        line
    }
}

/// Conversational view of a delta, ready for prompting.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn from_delta(source: Source, session_id: &str, delta: &Delta) -> Self {
        Self {
            messages: parse_lines(source, session_id, &delta.lines),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `User: ...` / `Assistant: ...` paragraphs.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Rendered text bounded to the most recent `max_bytes`.
    pub fn render_bounded(&self, max_bytes: usize) -> String {
        truncate_tail(&self.render(), max_bytes)
    }

    /// Rough token count: 4 characters per token.
    pub fn token_estimate(&self) -> usize {
        self.render().len() / 4
    }

    pub fn activity(&self) -> ToolActivity {
        let mut activity = ToolActivity::default();
        for tool in self.messages.iter().flat_map(|m| &m.tools) {
            if PASSIVE_TOOLS.contains(&tool.name.as_str()) {
                activity.passive += 1;
            } else if MUTATING_TOOLS.contains(&tool.name.as_str()) {
                activity.mutating += 1;
                if let Some(target) = &tool.target {
                    if !activity.touched.contains(target) {
                        activity.touched.push(target.clone());
                    }
                }
            } else {
                activity.other += 1;
            }
        }
        activity
    }
}
