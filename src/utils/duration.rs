//! Parsing of notification intervals.
//!
//! Accepts the usual short suffixes (`ns`, `us`, `ms`, `s`, `m`, `h`) plus
//! calendar-ish ones: `d` (24h), `w` (7d), `mo` (30d) and `y` (365d).
//! Components may be fractional and may be chained, e.g. `1h30m` or `1.5d`.

use std::time::Duration;
use thiserror::Error;

const SECOND: f64 = 1e9;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration '{0}': expected a number")]
    MissingNumber(String),

    #[error("invalid duration '{input}': unknown unit '{unit}'")]
    UnknownUnit { input: String, unit: String },

    #[error("invalid duration '{0}': missing unit")]
    MissingUnit(String),
}

/// Returns the length in nanoseconds of a unit suffix.
fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => SECOND,
        "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        "w" => 7.0 * DAY,
        "mo" => 30.0 * DAY,
        "y" => 365.0 * DAY,
        _ => return None,
    };
    Some(nanos)
}

/// Parses an extended duration string such as `10s`, `5m`, `2d`, `3mo` or `1h30m`.
///
/// A bare `0` is accepted and yields a zero duration.
pub fn parse_extended_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0.0_f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(DurationError::MissingNumber(input.to_string()));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| DurationError::MissingNumber(input.to_string()))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = &rest[..unit_len];
        let nanos = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            input: input.to_string(),
            unit: unit.to_string(),
        })?;
        total += value * nanos;
        rest = &rest[unit_len..];
    }

    Ok(Duration::from_nanos(total.round() as u64))
}
