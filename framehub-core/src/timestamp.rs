//! Wire timestamps.
//!
//! `sent_at` travels as local wall-clock time in the fixed pattern
//! `DD/MM/YY HH:MM:SS.ffffff`. Parsing is strict: a string is accepted
//! only if formatting the parsed value reproduces it byte for byte.

use chrono::{Local, NaiveDateTime, SubsecRound};

use crate::error::LinkError;

/// `strftime` pattern of the wire timestamp.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S%.6f";

/// Length of every well-formed wire timestamp.
pub const TIMESTAMP_LEN: usize = 24;

/// Current local wall-clock time, truncated to the wire's precision.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

/// Format an instant for the wire.
pub fn encode(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire timestamp.
pub fn parse(value: &str) -> Result<NaiveDateTime, LinkError> {
    let malformed = |reason: String| LinkError::MalformedTimestamp {
        value: value.to_string(),
        reason,
    };

    if value.len() != TIMESTAMP_LEN {
        return Err(malformed(format!(
            "expected {TIMESTAMP_LEN} characters, got {}",
            value.len()
        )));
    }

    let parsed = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| malformed(e.to_string()))?;

    if encode(&parsed) != value {
        return Err(malformed("does not round-trip".into()));
    }
    Ok(parsed)
}
