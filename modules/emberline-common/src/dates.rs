//! Relative-time helpers for explanation trails and display fields.

use chrono::{DateTime, Utc};

/// Whole minutes between `ts` and `now`, clamped at zero for posts whose
/// clock runs slightly ahead of ours.
pub fn minutes_since(ts: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - ts).num_minutes().max(0)
}

/// Render the elapsed time since `ts` as a coarse human string:
/// "just now", "N minutes ago", "N hours ago", "N days ago".
pub fn since_now(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = minutes_since(ts, now);
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{} {} ago", minutes, plural(minutes, "minute"));
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} {} ago", hours, plural(hours, "hour"));
    }
    let days = hours / 24;
    format!("{} {} ago", days, plural(days, "day"))
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{unit}s")
    }
}
