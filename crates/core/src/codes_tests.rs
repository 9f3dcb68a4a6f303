// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    sleep = { code::WF_SLEEP },
    all = { code::WF_ALL },
    child = { code::WF_CHILD },
    proxy = { code::WF_PROXY },
    wait = { code::WF_WAIT },
)]
fn interruption_codes(c: u16) {
    assert!(is_interruption(c));
    assert!(!is_terminal_error(c));
}

#[parameterized(
    success = { code::SUCCESS },
    pending = { code::PENDING },
    timeout = { code::TIMEOUT },
    fatal = { code::WF_FATAL },
)]
fn non_interruption_codes(c: u16) {
    assert!(!is_interruption(c));
}

#[test]
fn retryable_band() {
    assert!(is_stream_retryable(code::UNKNOWN));
    assert!(is_stream_retryable(code::WF_RETRYABLE));
    assert!(!is_stream_retryable(code::WF_FATAL));
    assert!(!is_stream_retryable(code::WF_SLEEP));
    assert!(!is_stream_retryable(code::SUCCESS));
}

#[test]
fn terminal_errors() {
    assert!(is_terminal_error(code::NOT_FOUND));
    assert!(is_terminal_error(code::INTERRUPTED));
    assert!(is_terminal_error(code::WF_MAXED));
    assert!(!is_terminal_error(code::SUCCESS));
    assert!(!is_terminal_error(code::PENDING));
}
