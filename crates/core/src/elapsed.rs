//! `HH:MM:SS` label for time since the last status transition.

/// Formats the time between `since_ms` and `now_ms` as `HH:MM:SS`.
///
/// Hours are not wrapped at 24. A `now_ms` earlier than `since_ms` (clock
/// skew between hosts) renders as `00:00:00`.
pub fn format_elapsed(since_ms: i64, now_ms: i64) -> String {
    let total_secs = (now_ms - since_ms).max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
