mod cmd_hook;
mod cmd_log;
mod cmd_prune;
mod cmd_retry;
mod cmd_status;

use clap::{Parser, Subcommand};
use sesslog_core::Source;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sesslog",
    version,
    about = "Incremental logging of AI coding sessions to Roam Research"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log the new part of a session transcript (foreground)
    Log {
        /// Assistant that produced the transcript: claude-code or codex
        #[arg(long)]
        source: Source,
        /// Stable session id
        #[arg(long)]
        session_id: String,
        /// Path to the session transcript (JSONL)
        #[arg(long)]
        transcript: PathBuf,
        /// Project directory of the session
        #[arg(long)]
        cwd: String,
        /// Machine label (default: hostname)
        #[arg(long)]
        machine: Option<String>,
        /// Terminal multiplexer session label
        #[arg(long)]
        tmux: Option<String>,
        /// The stop event fired while a stop hook was already running
        #[arg(long)]
        stop_hook_active: bool,
    },
    /// Stop-hook entry point: read the hook payload on stdin and log in the background
    Hook {
        #[arg(long, default_value = "claude-code")]
        source: Source,
    },
    /// Re-publish queued entries whose delivery failed
    Retry {
        /// Only this job
        #[arg(long)]
        job: Option<i64>,
        /// Print nothing when there is nothing to do
        #[arg(long)]
        quiet: bool,
    },
    /// Show the retry queue
    Status {
        /// List every job, not just pending ones
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete delivered jobs older than N days
    Prune {
        #[arg(long, default_value = "7")]
        older_than_days: u32,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SESSLOG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.cmd {
        Command::Log {
            source,
            session_id,
            transcript,
            cwd,
            machine,
            tmux,
            stop_hook_active,
        } => cmd_log::execute(cmd_log::LogParams {
            source,
            session_id,
            transcript,
            cwd,
            machine,
            tmux,
            stop_hook_active,
        }),
        Command::Hook { source } => cmd_hook::execute(source),
        Command::Retry { job, quiet } => cmd_retry::execute(job, quiet),
        Command::Status { all, json } => cmd_status::execute(all, json),
        Command::Prune { older_than_days } => cmd_prune::execute(older_than_days),
    }
}
