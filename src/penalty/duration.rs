//! Timeout resolution.
//!
//! Turns the free-form `timeout` option into whole seconds. The chain is:
//!
//! 1. structured duration (`humantime` syntax such as `5m` or `1h 30m`, or
//!    ISO-8601 such as `PT5M`);
//! 2. if the text is not in either grammar, a plain integer number of
//!    seconds;
//! 3. otherwise the caller's default.
//!
//! A non-positive result also falls back to the default, so a resolved
//! timeout is never zero.

use std::time::Duration;

use tracing::{debug, warn};

/// Why a structured parse did not produce a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructuredError {
    /// Text is not a duration expression at all
    Grammar,
    /// Text is a duration expression but its value does not fit
    Overflow,
}

/// Resolves an optional timeout input to seconds, falling back to `default`.
///
/// Never returns 0 as long as `default` is positive.
#[must_use]
pub fn resolve_timeout(input: Option<&str>, default: u64) -> u64 {
    let Some(raw) = input else {
        return default;
    };
    parse_timeout(raw).unwrap_or_else(|| {
        debug!(input = %raw, default, "using default timeout");
        default
    })
}

/// Parses a timeout input with the fallback chain, returning `None` where
/// [`resolve_timeout`] would fall back to its default.
#[must_use]
pub fn parse_timeout(raw: &str) -> Option<u64> {
    let text = raw.trim();
    let seconds: i128 = match parse_structured(text) {
        Ok(duration) => i128::from(duration.as_secs()),
        Err(StructuredError::Grammar) => match text.parse::<i64>() {
            Ok(n) => i128::from(n),
            Err(_) => return None,
        },
        Err(StructuredError::Overflow) => {
            warn!(input = %text, "could not determine timeout");
            return None;
        }
    };

    if seconds <= 0 {
        warn!(input = %text, seconds = %seconds, "resolved an inappropriate timeout duration");
        return None;
    }
    u64::try_from(seconds).ok()
}

/// Formats seconds the way replies show them (`10s`, `2m`, `1h 30m`).
#[must_use]
pub fn format_secs(seconds: u64) -> String {
    humantime::format_duration(Duration::from_secs(seconds)).to_string()
}

fn parse_structured(text: &str) -> Result<Duration, StructuredError> {
    match humantime::parse_duration(text) {
        Ok(duration) => Ok(duration),
        Err(humantime::DurationError::NumberOverflow) => Err(StructuredError::Overflow),
        Err(_) => parse_iso8601(text),
    }
}

/// Parses `P[nD][T[nH][nM][n[.f]S]]`.
fn parse_iso8601(text: &str) -> Result<Duration, StructuredError> {
    let body = text.strip_prefix('P').ok_or(StructuredError::Grammar)?;
    if body.is_empty() {
        return Err(StructuredError::Grammar);
    }

    let (date, time) = match body.split_once('T') {
        Some((_, "")) => return Err(StructuredError::Grammar),
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total = Duration::ZERO;
    let mut add = |amount: Duration| -> Result<(), StructuredError> {
        total = total.checked_add(amount).ok_or(StructuredError::Overflow)?;
        Ok(())
    };

    if !date.is_empty() {
        let days = date.strip_suffix('D').ok_or(StructuredError::Grammar)?;
        add(scaled(parse_whole(days)?, 86_400)?)?;
    }

    if let Some(mut rest) = time {
        // Units must appear in H, M, S order, each at most once.
        for (unit, scale) in [('H', 3_600), ('M', 60)] {
            if let Some(pos) = rest.find(unit) {
                add(scaled(parse_whole(&rest[..pos])?, scale)?)?;
                rest = &rest[pos + 1..];
            }
        }
        if !rest.is_empty() {
            let seconds = rest.strip_suffix('S').ok_or(StructuredError::Grammar)?;
            add(parse_seconds(seconds)?)?;
        }
    }

    Ok(total)
}

fn parse_whole(digits: &str) -> Result<u64, StructuredError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StructuredError::Grammar);
    }
    digits.parse().map_err(|_| StructuredError::Overflow)
}

fn scaled(value: u64, scale: u64) -> Result<Duration, StructuredError> {
    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or(StructuredError::Overflow)
}

fn parse_seconds(text: &str) -> Result<Duration, StructuredError> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let secs = parse_whole(whole)?;
    if fraction.is_empty() {
        return Ok(Duration::from_secs(secs));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StructuredError::Grammar);
    }
    // Only the first nine digits are representable as nanoseconds.
    let digits: String = fraction.chars().take(9).collect();
    let nanos = digits.parse::<u32>().map_err(|_| StructuredError::Grammar)?
        * 10u32.pow(9 - u32::try_from(digits.len()).unwrap_or(9));
    Ok(Duration::new(secs, nanos))
}
