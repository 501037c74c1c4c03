//! Strict UTC timestamp parsing.

use std::ops::Range;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Parses a `YYYY-MM-DDTHH:MM:SSZ` instant into a [`SystemTime`].
///
/// Only this exact shape is accepted: no offsets, no fractional seconds,
/// no lowercase designators.
pub fn parse_utc_timestamp(text: &str) -> Result<SystemTime, String> {
    let seconds = parse_unix_seconds(text)?;
    let time = if seconds >= 0 {
        UNIX_EPOCH + Duration::from_secs(seconds as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(seconds.unsigned_abs())
    };
    Ok(time)
}

fn parse_unix_seconds(text: &str) -> Result<i64, String> {
    let bytes = text.as_bytes();
    if bytes.len() != 20 || !text.is_ascii() {
        return Err(shape_error(text));
    }
    for (index, expected) in [
        (4, b'-'),
        (7, b'-'),
        (10, b'T'),
        (13, b':'),
        (16, b':'),
        (19, b'Z'),
    ] {
        if bytes[index] != expected {
            return Err(shape_error(text));
        }
    }

    let year = field(text, 0..4)?;
    let month = field(text, 5..7)?;
    let day = field(text, 8..10)?;
    let hour = field(text, 11..13)?;
    let minute = field(text, 14..16)?;
    let second = field(text, 17..19)?;

    if !(1..=12).contains(&month) {
        return Err(format!("month {month} is out of range"));
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(format!("day {day} is out of range for {year}-{month:02}"));
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(format!(
            "time of day {hour:02}:{minute:02}:{second:02} is out of range"
        ));
    }

    Ok(days_from_civil(year, month, day) * 86_400 + hour * 3_600 + minute * 60 + second)
}

fn shape_error(text: &str) -> String {
    format!("timestamp {text:?} must look like 2024-06-21T12:00:00Z")
}

fn field(text: &str, range: Range<usize>) -> Result<i64, String> {
    let digits = &text[range];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("timestamp field {digits:?} is not numeric"));
    }
    digits
        .parse::<i64>()
        .map_err(|_| format!("timestamp field {digits:?} is not numeric"))
}

fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

// Gregorian date to days since 1970-01-01, valid across the whole range.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let adjusted_year = if month <= 2 { year - 1 } else { year };
    let era = adjusted_year.div_euclid(400);
    let year_of_era = adjusted_year - era * 400;
    let shifted_month = (month + 9) % 12;
    let day_of_year = (153 * shifted_month + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}
