// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn defaults_are_sane() {
    let config = HmshConfig::default();
    assert_eq!(config.block_time_ms, 10_000);
    assert_eq!(config.xclaim_count, 3);
    assert_eq!(config.meshflow_max_attempts, 3);
    assert_eq!(config.meshflow_max_interval, "120s");
    assert_eq!(config.meshflow_exp_backoff, 10);
}

#[test]
#[serial]
fn from_env_reads_overrides() {
    std::env::set_var("HMSH_BLOCK_TIME_MS", "250");
    std::env::set_var("HMSH_FIDELITY_SECONDS", "1");
    let config = HmshConfig::from_env();
    std::env::remove_var("HMSH_BLOCK_TIME_MS");
    std::env::remove_var("HMSH_FIDELITY_SECONDS");
    assert_eq!(config.block_time_ms, 250);
    assert_eq!(config.fidelity_seconds, 1);
}

#[test]
#[serial]
fn from_env_ignores_unparseable() {
    std::env::set_var("HMSH_XCLAIM_COUNT", "not-a-number");
    let config = HmshConfig::from_env();
    std::env::remove_var("HMSH_XCLAIM_COUNT");
    assert_eq!(config.xclaim_count, 3);
}

#[test]
#[serial]
fn xclaim_count_is_hard_capped() {
    std::env::set_var("HMSH_XCLAIM_COUNT", "9");
    let config = HmshConfig::from_env();
    std::env::remove_var("HMSH_XCLAIM_COUNT");
    assert_eq!(config.xclaim_count, 3);
}
