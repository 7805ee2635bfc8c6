use chrono::{DateTime, NaiveDate, TimeZone};

/// Calendar day of a moment, as seen in the timezone of `reference`.
pub fn calendar_day<Tz: TimeZone, Other: TimeZone>(
    moment: &DateTime<Other>,
    reference: &Tz,
) -> NaiveDate {
    moment.with_timezone(reference).date_naive()
}

/// Formats seconds as `mm:ss`. Negative values are shown as overtime with a `+` prefix.
pub fn format_clock(seconds: i64) -> String {
    let sign = if seconds < 0 { "+" } else { "" };
    let seconds = seconds.unsigned_abs();
    format!("{sign}{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Human readable duration, for example `45s`, `12m`, `1h` or `1h 25m`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
