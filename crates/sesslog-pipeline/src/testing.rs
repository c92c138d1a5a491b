//! Deterministic collaborators and a temp-dir harness for pipeline tests.

use crate::pipeline::{Pipeline, PipelineConfig};
use crate::replay::Replayer;
use sesslog_core::{LogEntry, PublishError, SessionEvent, SessionSummary, Source, Verdict};
use sesslog_publish::{PublishReceipt, Publisher};
use sesslog_queue::RetryQueue;
use sesslog_store::{FileStateStore, StateRecord, StateStore, StorePaths};
use sesslog_summarize::{
    ClassifyInput, Classifier, CompletionError, SummarizeError, Summarizer, SummaryInput,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

pub struct StubClassifier {
    pub verdict: RefCell<Result<Verdict, ()>>,
    pub calls: Cell<usize>,
}

impl StubClassifier {
    pub fn set(&self, verdict: Result<Verdict, ()>) {
        *self.verdict.borrow_mut() = verdict;
    }
}

impl Classifier for StubClassifier {
    fn classify(&self, _input: &ClassifyInput<'_>) -> Result<Verdict, CompletionError> {
        self.calls.set(self.calls.get() + 1);
        self.verdict
            .borrow()
            .clone()
            .map_err(|()| CompletionError::RateLimited)
    }
}

pub struct StubSummarizer {
    pub fail: Cell<bool>,
    pub calls: Cell<usize>,
    /// Rolling context passed in on each call.
    pub seen_context: RefCell<Vec<String>>,
}

impl Summarizer for StubSummarizer {
    fn summarize(&self, input: &SummaryInput<'_>) -> Result<SessionSummary, SummarizeError> {
        self.calls.set(self.calls.get() + 1);
        self.seen_context
            .borrow_mut()
            .push(input.rolling_context.to_string());
        if self.fail.get() {
            return Err(SummarizeError::Parse("no JSON found in response".into()));
        }
        let n = self.calls.get();
        Ok(SessionSummary {
            summary: format!("summary {n}"),
            context: format!("context {n}"),
            ..Default::default()
        })
    }
}

pub struct StubPublisher {
    /// Scripted outcomes, consumed in order; success once exhausted.
    pub script: RefCell<VecDeque<Result<(), PublishError>>>,
    pub published: RefCell<Vec<LogEntry>>,
}

impl StubPublisher {
    pub fn fail_next(&self, error: PublishError) {
        self.script.borrow_mut().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.published.borrow().len()
    }
}

impl Publisher for StubPublisher {
    fn publish(&self, entry: &LogEntry) -> Result<PublishReceipt, PublishError> {
        self.published.borrow_mut().push(entry.clone());
        self.script.borrow_mut().pop_front().unwrap_or(Ok(()))?;
        Ok(PublishReceipt {
            page: "October 19th, 2026".into(),
            block_uid: format!("{}-{}", entry.lines.start, entry.lines.end),
        })
    }
}

/// A state store whose medium is gone.
pub struct UnavailableStore;

impl StateStore for UnavailableStore {
    fn load(&self, _session_id: &str) -> anyhow::Result<Option<StateRecord>> {
        anyhow::bail!("state directory unavailable")
    }

    fn save(&self, _session_id: &str, _record: &StateRecord) -> anyhow::Result<()> {
        anyhow::bail!("state directory unavailable")
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub paths: StorePaths,
    pub store: FileStateStore,
    pub classifier: StubClassifier,
    pub summarizer: StubSummarizer,
    pub publisher: StubPublisher,
    pub queue: RetryQueue,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::at(dir.path().join("home"));
        paths.ensure_layout().unwrap();
        Self {
            store: FileStateStore::new(paths.sessions_dir.clone()),
            queue: RetryQueue::open_or_create(&paths.queue_db).unwrap(),
            paths,
            dir,
            classifier: StubClassifier {
                verdict: RefCell::new(Ok(Verdict::Substantive {
                    reason: "created files".into(),
                })),
                calls: Cell::new(0),
            },
            summarizer: StubSummarizer {
                fail: Cell::new(false),
                calls: Cell::new(0),
                seen_context: RefCell::new(vec![]),
            },
            publisher: StubPublisher {
                script: RefCell::new(VecDeque::new()),
                published: RefCell::new(vec![]),
            },
        }
    }

    pub fn pipeline(&self) -> Pipeline<'_> {
        self.pipeline_with_cooldown(Duration::ZERO)
    }

    pub fn pipeline_with_cooldown(&self, cooldown: Duration) -> Pipeline<'_> {
        self.pipeline_over(&self.store, cooldown)
    }

    pub fn pipeline_over<'a>(&'a self, store: &'a dyn StateStore, cooldown: Duration) -> Pipeline<'a> {
        Pipeline {
            store,
            classifier: &self.classifier,
            summarizer: &self.summarizer,
            publisher: &self.publisher,
            queue: &self.queue,
            config: PipelineConfig {
                locks_dir: self.paths.locks_dir.clone(),
                cooldown,
            },
        }
    }

    pub fn replayer(&self, max_attempts: u32) -> Replayer<'_> {
        Replayer {
            store: &self.store,
            publisher: &self.publisher,
            queue: &self.queue,
            locks_dir: self.paths.locks_dir.clone(),
            max_attempts,
        }
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir.path().join("transcript.jsonl")
    }

    /// Overwrite the transcript with `records`, one per line.
    pub fn write_transcript(&self, records: &[String]) {
        let mut body = records.join("\n");
        if !records.is_empty() {
            body.push('\n');
        }
        std::fs::write(self.transcript_path(), body).unwrap();
    }

    pub fn event(&self, session_id: &str) -> SessionEvent {
        SessionEvent {
            source: Source::ClaudeCode,
            session_id: session_id.into(),
            transcript_path: self.transcript_path().to_string_lossy().into_owned(),
            cwd: "/home/dev/api".into(),
            machine: "laptop".into(),
            tmux_session: None,
            stop_hook_active: false,
        }
    }
}

pub fn user_record(text: &str) -> String {
    serde_json::json!({
        "type": "user",
        "message": {"role": "user", "content": text}
    })
    .to_string()
}

pub fn tool_record(tool: &str, file_path: &str) -> String {
    serde_json::json!({
        "type": "assistant",
        "message": {
            "role": "assistant",
            "content": [{"type": "tool_use", "name": tool, "input": {"file_path": file_path}}]
        }
    })
    .to_string()
}

/// `n` passive file reads.
pub fn reads(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| tool_record("Read", &format!("src/mod{i}.rs")))
        .collect()
}
