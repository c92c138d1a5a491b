//! Prompt templates.

use sesslog_core::SessionEvent;

const NO_CONTEXT: &str = "(none: this is the first entry for this session)";

fn context_or_placeholder(rolling_context: &str) -> &str {
    if rolling_context.trim().is_empty() {
        NO_CONTEXT
    } else {
        rolling_context
    }
}

pub(crate) fn triviality(transcript: &str, activity: &str, rolling_context: &str) -> String {
    format!(
        r#"Is this new stretch of a coding session worth logging? Consider:
- Just browsing/reading files without changes = NOT worth logging
- Abandoned/incomplete work with no output = NOT worth logging
- Very short with no meaningful activity = NOT worth logging
- Actual code changes, PRs, or substantial work = WORTH logging

<earlier_work>
{context}
</earlier_work>

<tool_activity>
{activity}
</tool_activity>

<transcript>
{transcript}
</transcript>

Reply with EXACTLY "YES" or "NO" followed by a 5-word reason.
Example: "NO Just browsed files briefly" or "YES Implemented new authentication feature""#,
        context = context_or_placeholder(rolling_context),
    )
}

pub(crate) fn summary(transcript: &str, event: &SessionEvent, rolling_context: &str) -> String {
    format!(
        r#"You are analyzing the newest part of an AI coding session transcript. Extract a structured summary of this part only.

<earlier_work>
{context}
</earlier_work>

<transcript>
{transcript}
</transcript>

<session>
Machine: {machine}
Project: {project}
Agent: {agent}
</session>

Return a JSON object with these fields:
- "summary": 1-2 sentence description of what was accomplished in this part
- "prs": Array of {{"url": "...", "title": "...", "action": "created|updated|reviewed"}}
- "services": Array of {{"name": "...", "action": "started|deployed|stopped"}}
- "artifacts": Array of {{"type": "file|config|script", "path": "...", "description": "..."}}
- "context": one sentence digest of the whole session so far (earlier work plus this part), used as background for the next entry

Rules:
- Treat <earlier_work> as background: say "continuing X" instead of repeating it
- Be concise - this is a log entry, not documentation
- Only include PRs with actual GitHub URLs from the transcript
- Only include services that were explicitly started/deployed
- Artifacts = notable files created (not every file touched)
- If nothing notable happened, say so briefly

Return ONLY valid JSON, no markdown or explanation."#,
        context = context_or_placeholder(rolling_context),
        machine = event.machine,
        project = event.cwd,
        agent = event.source,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sesslog_core::Source;

    #[test]
    fn triviality_includes_all_sections() {
        let p = triviality("User: hi", "no tool calls", "");
        assert!(p.contains("User: hi"));
        assert!(p.contains("no tool calls"));
        assert!(p.contains(NO_CONTEXT));
    }

    #[test]
    fn summary_carries_rolling_context_and_metadata() {
        let event = SessionEvent {
            source: Source::ClaudeCode,
            session_id: "s1".into(),
            transcript_path: "/tmp/t.jsonl".into(),
            cwd: "/home/dev/api".into(),
            machine: "laptop".into(),
            tmux_session: None,
            stop_hook_active: false,
        };
        let p = summary("User: add endpoint", &event, "Set up the auth module");
        assert!(p.contains("Set up the auth module"));
        assert!(p.contains("Project: /home/dev/api"));
        assert!(p.contains("Agent: claude-code"));
        assert!(p.contains(r#"{"url": "...""#));
    }
}
