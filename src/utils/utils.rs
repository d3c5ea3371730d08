use chrono::{DateTime, TimeZone, Utc};
use std::time::Instant;
use tracing::debug;

// Run a synchronous operation and log how long it took
pub fn measure_time<F, T>(operation_name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();

    debug!("{} completed in {:.2?}", operation_name, elapsed);

    result
}

// Format a timestamp for logging
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

// Convert an epoch-millisecond timestamp to a readable format
pub fn format_timestamp(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => format_time(&dt),
        None => format!("<invalid timestamp {}>", timestamp_ms),
    }
}

// Truncate long strings (hashes, keys) for logging
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis() {
        assert_eq!(format_timestamp(86_400_000), "1970-01-02 00:00:00 UTC");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_string("abcdef", 3), "abc...");
        assert_eq!(truncate_string("삼성전자", 2), "삼성...");
        assert_eq!(truncate_string("ab", 3), "ab");
    }

    #[test]
    fn measure_time_passes_result_through() {
        assert_eq!(measure_time("add", || 2 + 2), 4);
    }
}
