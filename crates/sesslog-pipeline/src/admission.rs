//! Time-based admission control, evaluated before the session lock.
//!
//! Bounds remote-call volume during bursty stop events. Progress tracking does
//! not depend on it: a skipped invocation leaves the delta for the next one.

use sesslog_store::StateRecord;
use std::time::Duration;
use time::OffsetDateTime;

/// Why an invocation was turned away before doing any work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Stop event raised while a stop hook was already running.
    ReentrantStop,
    /// Last delivery for this session is more recent than the cooldown.
    Cooldown { remaining: Duration },
    /// Another invocation holds the session lock.
    Busy,
}

/// Remaining cooldown for a session, or `None` when it may proceed.
///
/// Unknown or unparseable delivery times admit. A delivery time in the future
/// (clock change) is treated as just now.
pub fn cooldown_remaining(
    record: Option<&StateRecord>,
    cooldown: Duration,
    now: OffsetDateTime,
) -> Option<Duration> {
    if cooldown.is_zero() {
        return None;
    }
    let last = record?
        .last_published_at
        .as_deref()
        .and_then(sesslog_core::parse_rfc3339)?;
    let elapsed = Duration::try_from(now - last).unwrap_or(Duration::ZERO);
    cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
}
