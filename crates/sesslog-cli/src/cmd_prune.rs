use sesslog_pipeline::Settings;
use sesslog_queue::RetryQueue;

/// `sesslog prune`
pub fn execute(older_than_days: u32) -> anyhow::Result<()> {
    let paths = Settings::load()?.store_paths();
    if !paths.queue_db.exists() {
        println!("No retry queue yet.");
        return Ok(());
    }
    let queue = RetryQueue::open_or_create(&paths.queue_db)?;
    let removed = queue.prune(older_than_days)?;
    println!("Removed {removed} delivered job(s) older than {older_than_days} days");
    Ok(())
}
