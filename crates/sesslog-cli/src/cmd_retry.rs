use sesslog_core::LogError;
use sesslog_pipeline::{ReplayOutcome, Replayer, Settings};
use sesslog_queue::RetryQueue;
use sesslog_store::FileStateStore;

/// `sesslog retry`
pub fn execute(job: Option<i64>, quiet: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let publisher = settings.publisher()?;
    let paths = settings.store_paths();
    paths.ensure_layout().map_err(LogError::StateStore)?;
    let store = FileStateStore::new(paths.sessions_dir.clone());
    let queue = RetryQueue::open_or_create(&paths.queue_db).map_err(LogError::Queue)?;

    let replayer = Replayer {
        store: &store,
        publisher: &publisher,
        queue: &queue,
        locks_dir: paths.locks_dir.clone(),
        max_attempts: settings.max_attempts,
    };

    if let Some(id) = job {
        match replayer.replay(id)? {
            ReplayOutcome::Delivered => println!("Job {id}: delivered"),
            ReplayOutcome::StillFailing { attempts, error } => {
                println!("Job {id}: still failing after {attempts} attempts ({error})")
            }
            ReplayOutcome::Abandoned { error } => println!("Job {id}: abandoned ({error})"),
            ReplayOutcome::Busy => println!("Job {id}: session is being logged, try again later"),
            ReplayOutcome::NotPending(status) => println!("Job {id}: already {status}"),
        }
        return Ok(());
    }

    let report = replayer.replay_pending()?;
    if report.attempted() == 0 && report.busy == 0 && report.errors == 0 {
        if !quiet {
            println!("No pending jobs.");
        }
        return Ok(());
    }
    println!(
        "Retried {}: {} delivered, {} still failing, {} abandoned",
        report.attempted(),
        report.delivered,
        report.failed,
        report.abandoned
    );
    if report.busy > 0 {
        println!("Skipped {} job(s) of sessions being logged right now", report.busy);
    }
    if report.errors > 0 {
        println!("{} job(s) could not be replayed; see the log output", report.errors);
    }
    Ok(())
}
