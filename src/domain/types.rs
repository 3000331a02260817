use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

use crate::error::LoadgenError;

// ============================================================================
// Duration strings
// ============================================================================

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 86_400 * 1_000_000_000),
];

/// Parse a grouped duration string such as `2h`, `1h30m`, `1.5s` or `500ms`.
///
/// A bare number is only accepted when it is zero.
pub fn parse_duration(input: &str) -> Result<Duration, LoadgenError> {
    let invalid = |reason: &str| LoadgenError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(invalid("empty duration"));
    }
    if compact.chars().all(|c| c == '0') {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = compact.as_str();
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit"))?;
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, nanos)| *nanos)
            .ok_or_else(|| invalid(&format!("unknown unit '{unit}'")))?;

        total = total
            .checked_add(scale_number(number, scale).ok_or_else(|| invalid("bad number"))?)
            .ok_or_else(|| invalid("duration overflow"))?;
        rest = next;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid("duration overflow"))?;
    Ok(Duration::from_nanos(nanos))
}

/// Multiply a decimal literal by a unit scale without going through f64.
fn scale_number(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.contains('.') {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(scale)?;

    let mut divisor: u128 = 1;
    let mut frac_value: u128 = 0;
    for digit in frac.chars().take(18) {
        frac_value = frac_value * 10 + digit.to_digit(10)? as u128;
        divisor *= 10;
    }
    value = value.checked_add(frac_value.checked_mul(scale)? / divisor)?;
    Some(value)
}

/// Render a duration in the same grouped form `parse_duration` accepts.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let mut nanos = duration.as_nanos();
    let mut out = String::new();
    for (name, scale) in [
        ("h", 3_600 * 1_000_000_000u128),
        ("m", 60 * 1_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ] {
        let count = nanos / scale;
        if count > 0 {
            out.push_str(&format!("{count}{name}"));
            nanos -= count * scale;
        }
    }
    out
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Deserialize either a duration string or an integer number of seconds.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}

pub(crate) fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}
