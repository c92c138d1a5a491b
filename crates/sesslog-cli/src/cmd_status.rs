use sesslog_pipeline::Settings;
use sesslog_queue::{JobStatus, QueueCounts, RetryJob, RetryQueue};

/// `sesslog status`
pub fn execute(all: bool, json: bool) -> anyhow::Result<()> {
    let paths = Settings::load()?.store_paths();
    let (counts, jobs) = if paths.queue_db.exists() {
        let queue = RetryQueue::open_or_create(&paths.queue_db)?;
        let filter = if all { None } else { Some(JobStatus::Pending) };
        (queue.counts()?, queue.list(filter)?)
    } else {
        (QueueCounts::default(), Vec::new())
    };

    if json {
        let out = serde_json::json!({
            "state_dir": paths.root,
            "counts": counts,
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("State directory: {}", paths.root.display());
    println!(
        "Retry queue: {} pending, {} succeeded, {} abandoned",
        counts.pending, counts.succeeded, counts.abandoned
    );
    if jobs.is_empty() {
        return Ok(());
    }
    println!();
    for job in &jobs {
        println!("{}", format_job(job));
    }
    Ok(())
}

fn format_job(job: &RetryJob) -> String {
    let error: String = job.last_error.chars().take(80).collect();
    format!(
        "  #{:<4} {:<9} {} {} attempts={} first_failed={}\n        {}",
        job.id,
        job.status.as_str(),
        short_id(&job.session_id),
        job.entry.lines,
        job.attempts,
        job.first_failed_at,
        error
    )
}

fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map(|(i, _)| &id[..i]).unwrap_or(id)
}
