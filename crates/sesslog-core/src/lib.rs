pub mod error;
pub mod types;

pub use error::{LogError, PublishError};
pub use types::*;

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    format_rfc3339(time::OffsetDateTime::now_utc())
}

/// Current local time as an RFC 3339 string, falling back to UTC when the
/// local offset cannot be determined (e.g. multi-threaded processes on Unix).
pub fn now_local_rfc3339() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    format_rfc3339(now)
}

/// Parse an RFC 3339 timestamp, returning `None` when malformed.
pub fn parse_rfc3339(ts: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(ts.trim(), &time::format_description::well_known::Rfc3339).ok()
}

fn format_rfc3339(dt: time::OffsetDateTime) -> String {
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trip() {
        let ts = now_rfc3339();
        let parsed = parse_rfc3339(&ts).unwrap();
        assert_eq!(parsed.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_none());
        assert!(parse_rfc3339("").is_none());
    }
}
