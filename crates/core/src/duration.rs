// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Textual duration parsing.
//!
//! Workflow code never reads the clock directly; sleeps and retry intervals
//! are expressed in textual units ("1 second", "120s", "2 minutes") and
//! resolved to whole seconds at interruption time.

use crate::error::CoreError;

/// Parse a textual duration into whole seconds.
///
/// Accepts `<n><unit>` and `<n> <unit>` forms where unit is one of
/// s/sec/second(s), m/min/minute(s), h/hr/hour(s), d/day(s), w/week(s).
/// Fractional quantities round down after unit multiplication.
pub fn parse_duration(text: &str) -> Result<u64, CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidDuration(text.to_string()));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| CoreError::InvalidDuration(text.to_string()))?;
    let (num_part, unit_part) = trimmed.split_at(split);

    let quantity: f64 = num_part
        .parse()
        .map_err(|_| CoreError::InvalidDuration(text.to_string()))?;

    let multiplier: u64 = match unit_part.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return Err(CoreError::InvalidDuration(text.to_string())),
    };

    if quantity < 0.0 || !quantity.is_finite() {
        return Err(CoreError::InvalidDuration(text.to_string()));
    }

    Ok((quantity * multiplier as f64) as u64)
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
