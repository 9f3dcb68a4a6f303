// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry and backoff policies.
//!
//! Two layers retry independently: the stream router redelivers messages
//! with a doubling backoff, and workflow calls (proxied activities, child
//! jobs) carry a `RetryPolicy` resolved against the meshflow defaults.

use crate::config::HmshConfig;
use crate::duration::parse_duration;
use serde::{Deserialize, Serialize};

/// Backoff before the router re-enqueues a retryable message.
///
/// Doubles from `INITIAL_STREAM_BACKOFF` per attempt, capped at
/// `MAX_STREAM_BACKOFF`.
pub fn stream_backoff_ms(attempt: u32, config: &HmshConfig) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(32));
    config
        .initial_stream_backoff_ms
        .saturating_mul(factor)
        .min(config.max_stream_backoff_ms)
}

/// Retry policy for workflow-level calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts before the call is maxed out (597).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_attempts: Option<u32>,
    /// Ceiling on the graduated interval, textual ("120s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_interval: Option<String>,
    /// Multiplier applied per attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_coefficient: Option<u32>,
    /// When false, a failed call resolves with the error payload instead
    /// of propagating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throw_on_error: Option<bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: None,
            maximum_interval: None,
            backoff_coefficient: None,
            throw_on_error: None,
        }
    }
}

impl RetryPolicy {
    /// Effective attempt ceiling under the given config defaults.
    pub fn attempts(&self, config: &HmshConfig) -> u32 {
        self.maximum_attempts
            .unwrap_or(config.meshflow_max_attempts)
    }

    /// Effective interval ceiling in seconds.
    ///
    /// An unset or unparseable interval falls back to the meshflow default;
    /// a parsed value of zero is treated as unset.
    pub fn max_interval_secs(&self, config: &HmshConfig) -> u64 {
        let fallback =
            parse_duration(&config.meshflow_max_interval).unwrap_or(120);
        match self.maximum_interval.as_deref() {
            Some(text) => match parse_duration(text) {
                Ok(0) | Err(_) => fallback,
                Ok(secs) => secs,
            },
            None => fallback,
        }
    }

    /// Delay before the next attempt, in seconds.
    pub fn next_delay_secs(&self, attempt: u32, config: &HmshConfig) -> u64 {
        let base = self.backoff_coefficient.unwrap_or(config.meshflow_exp_backoff) as u64;
        let delay = base.saturating_pow(attempt.min(10));
        delay.min(self.max_interval_secs(config))
    }

    /// Whether errors propagate to the caller (default true).
    pub fn throws(&self) -> bool {
        self.throw_on_error.unwrap_or(true)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
