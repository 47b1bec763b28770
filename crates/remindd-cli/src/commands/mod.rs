pub mod config;
pub mod event;
pub mod reminder;
pub mod run;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a timestamp argument: RFC3339, `YYYY-MM-DD HH:MM`, or a bare
/// `YYYY-MM-DD` (midnight). Naive forms are taken as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(format!(
        "cannot parse '{s}' as a time (expected RFC3339, 'YYYY-MM-DD HH:MM', or 'YYYY-MM-DD')"
    ))
}

/// Parse a duration string like "30m", "2h", "1d", or "1h30m" into seconds.
pub fn parse_duration(time_str: &str) -> Option<i64> {
    let time_str = time_str.trim().to_lowercase();
    let mut total_seconds: i64 = 0;
    let mut current_number = String::new();

    for c in time_str.chars() {
        if c.is_ascii_digit() {
            current_number.push(c);
        } else if !current_number.is_empty() {
            let value: i64 = current_number.parse().ok()?;
            current_number.clear();

            let seconds = match c {
                's' => value,
                'm' => value * 60,
                'h' => value * 60 * 60,
                'd' => value * 60 * 60 * 24,
                'w' => value * 60 * 60 * 24 * 7,
                _ => return None,
            };
            total_seconds += seconds;
        }
    }

    if total_seconds > 0 {
        Some(total_seconds)
    } else {
        None
    }
}
