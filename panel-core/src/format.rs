//! Human-readable formatting for sizes, timestamps and uptime

use chrono::{DateTime, Local, Utc};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// `1536` -> `"1.50 KB"`
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

pub fn human_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `"{d}d {h}h {m}m {s}s"`, days omitted when zero
pub fn human_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {secs}s")
    } else {
        format!("{hours}h {minutes}m {secs}s")
    }
}

/// Round to one decimal place for display stability
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
