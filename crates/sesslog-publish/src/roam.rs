use crate::{PublishReceipt, Publisher};
use sesslog_core::{LineRange, LogEntry, PublishError};
use std::time::Duration;

const ROAM_API_BASE: &str = "https://api.roamresearch.com";
const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ARTIFACTS: usize = 3;
const UID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

// ── Block layout ──

/// Deterministic 9-character Roam block uid for an entry.
///
/// Keyed on the session, line range and frozen entry timestamp: every publish
/// attempt of the same entry addresses the same block, while a range reused
/// after a transcript reset does not.
pub fn block_uid(session_id: &str, lines: LineRange, timestamp: &str) -> String {
    let key = format!(
        "sesslog:{session_id}:{}:{}:{timestamp}",
        lines.start, lines.end
    );
    blake3::hash(key.as_bytes())
        .as_bytes()
        .iter()
        .take(9)
        .map(|b| UID_ALPHABET[(*b as usize) % UID_ALPHABET.len()] as char)
        .collect()
}

/// Roam daily note title, e.g. `October 19th, 2026`.
pub fn daily_page_title(dt: time::OffsetDateTime) -> String {
    let day = dt.day();
    let suffix = match (day % 10, day) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{} {day}{suffix}, {}", dt.month(), dt.year())
}

/// Parent block text and ordered child block texts for an entry.
pub fn render_blocks(entry: &LogEntry) -> (String, Vec<String>) {
    let clock = sesslog_core::parse_rfc3339(&entry.timestamp)
        .map(|dt| format!("{:02}:{:02}", dt.hour(), dt.minute()))
        .unwrap_or_else(|| "--:--".to_string());
    let parent = format!("**{clock}** `{}` [[{}]]", entry.machine, entry.source);

    let mut children = vec![format!("project:: `{}`", entry.project)];
    if let Some(tmux) = &entry.tmux_session {
        children.push(format!("tmux:: `{tmux}`"));
    }
    children.push(entry.summary.clone());

    for pr in &entry.prs {
        let title = if pr.title.is_empty() {
            "Pull Request"
        } else {
            &pr.title
        };
        let mut line = format!("#PR [{title}]({})", pr.url);
        if !pr.action.is_empty() && pr.action != "created" {
            line.push_str(&format!(" ({})", pr.action));
        }
        children.push(line);
    }
    for svc in &entry.services {
        children.push(format!("#service `{}` {}", svc.name, svc.action));
    }
    for art in entry.artifacts.iter().take(MAX_ARTIFACTS) {
        children.push(format!("#artifact `{}` - {}", art.path, art.description));
    }
    (parent, children)
}

fn page_for(entry: &LogEntry) -> String {
    let dt = sesslog_core::parse_rfc3339(&entry.timestamp).unwrap_or_else(|| {
        time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc())
    });
    daily_page_title(dt)
}

/// `batch-actions` payload creating the parent block and its children.
fn batch_payload(entry: &LogEntry, page: &str, uid: &str) -> serde_json::Value {
    let (parent, children) = render_blocks(entry);
    let mut actions = vec![serde_json::json!({
        "action": "create-block",
        "location": { "page-title": page, "order": "last" },
        "block": { "uid": uid, "string": parent },
    })];
    actions.extend(children.into_iter().enumerate().map(|(i, child)| {
        serde_json::json!({
            "action": "create-block",
            "location": { "parent-uid": uid, "order": i },
            "block": { "string": child },
        })
    }));
    serde_json::json!({
        "action": "batch-actions",
        "actions": actions,
    })
}

// ── Delivery ──

/// Publisher writing to a Roam Research graph through the backend write API.
#[derive(Debug, Clone)]
pub struct RoamPublisher {
    graph: String,
    token: String,
    base_url: String,
    timeout: Duration,
}

impl RoamPublisher {
    pub fn new(graph: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            token: token.into(),
            base_url: ROAM_API_BASE.to_string(),
            timeout: TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn write_url(&self) -> String {
        format!("{}/api/graph/{}/write", self.base_url, self.graph)
    }

    fn post(&self, url: &str, body: &str) -> Result<(u16, Option<String>, String), PublishError> {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .max_redirects(0)
            .build()
            .new_agent();
        let mut response = agent
            .post(url)
            .header("X-Authorization", &format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => PublishError::Timeout,
                other => PublishError::Transport(other.to_string()),
            })?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.body_mut().read_to_string().unwrap_or_default();
        Ok((status, location, text))
    }
}

impl Publisher for RoamPublisher {
    fn publish(&self, entry: &LogEntry) -> Result<PublishReceipt, PublishError> {
        let page = page_for(entry);
        let uid = block_uid(&entry.session_id, entry.lines, &entry.timestamp);
        let body = batch_payload(entry, &page, &uid).to_string();

        let (mut status, location, mut text) = self.post(&self.write_url(), &body)?;
        // Roam answers with a redirect to the graph's peer host; the request
        // (body and auth header) is replayed there once.
        if matches!(status, 307 | 308) {
            let target = location.ok_or_else(|| {
                PublishError::Transport("redirect without location".to_string())
            })?;
            tracing::debug!(%target, "following roam redirect");
            (status, _, text) = self.post(&target, &body)?;
        }

        classify_status(status, &text)?;
        tracing::info!(
            session_id = %entry.session_id,
            lines = %entry.lines,
            %page,
            block_uid = %uid,
            "published entry"
        );
        Ok(PublishReceipt {
            page,
            block_uid: uid,
        })
    }
}

fn classify_status(status: u16, body: &str) -> Result<(), PublishError> {
    match status {
        200..=299 => Ok(()),
        429 => Err(PublishError::RateLimited),
        500..=599 => Err(PublishError::Server { status }),
        _ if body.to_lowercase().contains("already exists") => Err(PublishError::AlreadyExists),
        _ => Err(PublishError::Rejected {
            status,
            body: body.chars().take(500).collect(),
        }),
    }
}
