use sesslog_core::{LogError, SessionEvent, Source};
use sesslog_pipeline::{Invocation, Outcome, Pipeline, PipelineConfig, Settings};
use sesslog_queue::RetryQueue;
use sesslog_store::FileStateStore;
use sesslog_summarize::{LlmClassifier, LlmSummarizer, RUNNING_ENV};
use std::path::PathBuf;
use std::time::Duration;

const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);
const SUMMARIZER_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LogParams {
    pub source: Source,
    pub session_id: String,
    pub transcript: PathBuf,
    pub cwd: String,
    pub machine: Option<String>,
    pub tmux: Option<String>,
    pub stop_hook_active: bool,
}

/// `sesslog log`
pub fn execute(params: LogParams) -> anyhow::Result<()> {
    if std::env::var_os(RUNNING_ENV).is_some() {
        tracing::debug!("invoked from inside a logger model call, skipping");
        return Ok(());
    }

    let event = SessionEvent {
        source: params.source,
        session_id: params.session_id,
        transcript_path: params.transcript.to_string_lossy().into_owned(),
        cwd: params.cwd,
        machine: params
            .machine
            .unwrap_or_else(sesslog_pipeline::detect_machine),
        tmux_session: params.tmux,
        stop_hook_active: params.stop_hook_active,
    };

    let settings = Settings::load()?;
    // Credentials first: nothing is read or written without them.
    let publisher = settings.publisher()?;
    let client = settings.completion()?;

    let paths = settings.store_paths();
    paths.ensure_layout().map_err(LogError::StateStore)?;
    let store = FileStateStore::new(paths.sessions_dir.clone());
    let queue = RetryQueue::open_or_create(&paths.queue_db).map_err(LogError::Queue)?;
    let classifier = LlmClassifier::new(client.clone())
        .with_limits(settings.classifier_prompt_chars, CLASSIFIER_TIMEOUT);
    let summarizer =
        LlmSummarizer::new(client).with_limits(settings.max_prompt_chars, SUMMARIZER_TIMEOUT);

    let pipeline = Pipeline {
        store: &store,
        classifier: &classifier,
        summarizer: &summarizer,
        publisher: &publisher,
        queue: &queue,
        config: PipelineConfig {
            locks_dir: paths.locks_dir.clone(),
            cooldown: settings.cooldown(),
        },
    };

    let session_id = event.session_id.as_str();
    match pipeline.invoke(&event)? {
        Invocation::Skipped(skip) => {
            tracing::debug!(session_id, ?skip, "invocation skipped");
        }
        Invocation::Ran(Outcome::Empty) => {
            tracing::debug!(session_id, "no new transcript lines");
        }
        Invocation::Ran(Outcome::Trivial { .. }) => {}
        Invocation::Ran(Outcome::Published { lines, receipt }) => {
            let page = receipt.map(|r| r.page).unwrap_or_default();
            tracing::info!(session_id, %lines, %page, "logged session");
        }
        Invocation::Ran(Outcome::Queued { job_id, .. }) => {
            tracing::warn!(session_id, job_id, "delivery failed; run `sesslog retry` later");
        }
    }
    Ok(())
}
