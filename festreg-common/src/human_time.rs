//! Human-readable countdown formatting
//!
//! Countdowns render as `M:SS` below one hour and `H:MM:SS` from one hour
//! up. Session TTLs are minutes long, so days are never shown.

/// Threshold (seconds) above which hours are displayed
const HOUR: u64 = 3600;

/// Format a remaining-seconds value for display
///
/// # Examples
///
/// ```
/// use festreg_common::human_time::format_countdown;
///
/// assert_eq!(format_countdown(0), "0:00");
/// assert_eq!(format_countdown(65), "1:05");
/// assert_eq!(format_countdown(600), "10:00");
/// assert_eq!(format_countdown(3661), "1:01:01");
/// ```
pub fn format_countdown(seconds: u64) -> String {
    if seconds < HOUR {
        format!("{}:{:02}", seconds / 60, seconds % 60)
    } else {
        let hours = seconds / HOUR;
        let mins = (seconds % HOUR) / 60;
        let secs = seconds % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    }
}

/// Format an optional countdown; `None` renders as `--:--`
///
/// # Examples
///
/// ```
/// use festreg_common::human_time::format_countdown_opt;
///
/// assert_eq!(format_countdown_opt(Some(59)), "0:59");
/// assert_eq!(format_countdown_opt(None), "--:--");
/// ```
pub fn format_countdown_opt(seconds: Option<u64>) -> String {
    match seconds {
        Some(seconds) => format_countdown(seconds),
        None => "--:--".to_string(),
    }
}
