// Cell formatting for the proximity table

use chrono::{DateTime, Local, Utc};

/// Format RSSI for display
pub fn format_rssi(rssi: i32) -> String {
    format!("{}dBm", rssi)
}

/// Format a duration in whole seconds
pub fn format_secs(secs: u64) -> String {
    format!("{}s", secs)
}

/// Local wall-clock time as HH:MM:SS
pub fn format_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
