//! Clip offset parsing.
//!
//! Offsets are free-form for the trim tool, but the common clock forms are
//! understood here so an inverted range can be rejected before any work runs:
//! `SS`, `MM:SS` and `HH:MM:SS`, each with optional fractional seconds.

use thiserror::Error;

/// Errors produced while interpreting an offset as a clock value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or SS (optionally with .mmm)")]
    InvalidFormat(String),
}

/// Parse a clock-style offset into seconds.
///
/// ```
/// use clipper_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("00:00:05").unwrap(), 5.0);
/// assert_eq!(parse_timestamp("01:30").unwrap(), 90.0);
/// assert_eq!(parse_timestamp("12.5").unwrap(), 12.5);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let names: &[&'static str] = match parts.len() {
        1 => &["seconds"],
        2 => &["minutes", "seconds"],
        3 => &["hours", "minutes", "seconds"],
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    let mut total = 0.0;
    for (part, name) in parts.iter().zip(names) {
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidValue(name, part.to_string()))?;
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(name, part.to_string()));
        }
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Compare two offsets when both are clock values.
///
/// Returns `Some(true)` when `end` lies strictly after `start`, `Some(false)`
/// when it does not, and `None` when either side uses a form this module does
/// not understand (ordering is then left to the trim tool).
pub fn range_is_ordered(start: &str, end: &str) -> Option<bool> {
    match (parse_timestamp(start), parse_timestamp(end)) {
        (Ok(s), Ok(e)) => Some(e > s),
        _ => None,
    }
}
