use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

pub fn current_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as Timestamp
}

/// Seconds elapsed from `start` to `now`, zero if `now` is earlier
pub fn seconds_between(start: Timestamp, now: Timestamp) -> u64 {
    now.saturating_sub(start).max(0) as u64
}

pub fn format_timestamp(timestamp: Timestamp) -> String {
    let datetime = chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default();
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
