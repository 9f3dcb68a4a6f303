// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config() -> HmshConfig {
    HmshConfig::default()
}

#[test]
fn stream_backoff_doubles_and_caps() {
    let cfg = HmshConfig {
        initial_stream_backoff_ms: 2,
        max_stream_backoff_ms: 10,
        ..HmshConfig::default()
    };
    assert_eq!(stream_backoff_ms(1, &cfg), 2);
    assert_eq!(stream_backoff_ms(2, &cfg), 4);
    assert_eq!(stream_backoff_ms(3, &cfg), 8);
    assert_eq!(stream_backoff_ms(4, &cfg), 10);
    assert_eq!(stream_backoff_ms(30, &cfg), 10);
}

#[test]
fn policy_defaults_come_from_config() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.attempts(&config()), 3);
    assert_eq!(policy.max_interval_secs(&config()), 120);
    assert!(policy.throws());
}

#[test]
fn policy_overrides_take_precedence() {
    let policy = RetryPolicy {
        maximum_attempts: Some(5),
        maximum_interval: Some("30s".to_string()),
        backoff_coefficient: Some(2),
        throw_on_error: Some(false),
    };
    assert_eq!(policy.attempts(&config()), 5);
    assert_eq!(policy.max_interval_secs(&config()), 30);
    assert!(!policy.throws());
}

#[test]
fn zero_maximum_interval_treated_as_unset() {
    let policy = RetryPolicy {
        maximum_interval: Some("0s".to_string()),
        ..RetryPolicy::default()
    };
    assert_eq!(policy.max_interval_secs(&config()), 120);
}

#[test]
fn next_delay_graduates_and_caps() {
    let policy = RetryPolicy {
        backoff_coefficient: Some(10),
        maximum_interval: Some("120s".to_string()),
        ..RetryPolicy::default()
    };
    assert_eq!(policy.next_delay_secs(1, &config()), 10);
    assert_eq!(policy.next_delay_secs(2, &config()), 100);
    assert_eq!(policy.next_delay_secs(3, &config()), 120);
}

#[test]
fn serde_uses_camel_case() {
    let policy = RetryPolicy {
        maximum_attempts: Some(2),
        ..RetryPolicy::default()
    };
    let json = serde_json::to_value(&policy).unwrap();
    assert_eq!(json["maximumAttempts"], 2);
}
