// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status codes carried on stream messages and job errors.
//!
//! The 2xx–5xx band mirrors HTTP semantics; the 58x/59x band is reserved
//! for workflow-runtime control flow and is never user-visible as an error.

/// HTTP-style and workflow-runtime status codes.
pub mod code {
    /// Operation completed.
    pub const SUCCESS: u16 = 200;
    /// Accepted but kept alive for another delivery (web-hook keep-alive).
    pub const PENDING: u16 = 202;
    /// Job or hook target does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// Job was interrupted.
    pub const INTERRUPTED: u16 = 410;
    /// Unclassified failure.
    pub const UNKNOWN: u16 = 500;
    /// A waiter timed out.
    pub const TIMEOUT: u16 = 504;

    /// Workflow suspended on a sleep.
    pub const WF_SLEEP: u16 = 588;
    /// Workflow suspended on a composite batch (`all`).
    pub const WF_ALL: u16 = 589;
    /// Workflow suspended on an awaited child job.
    pub const WF_CHILD: u16 = 590;
    /// Workflow suspended on a proxied activity.
    pub const WF_PROXY: u16 = 591;
    /// Workflow suspended waiting for a signal.
    pub const WF_WAIT: u16 = 595;
    /// A replayed call stored a timeout error.
    pub const WF_TIMEOUT: u16 = 596;
    /// A replayed call exhausted its retry budget.
    pub const WF_MAXED: u16 = 597;
    /// A replayed call stored a fatal (non-retryable) error.
    pub const WF_FATAL: u16 = 598;
    /// A replayed call stored a retryable error.
    pub const WF_RETRYABLE: u16 = 599;
}

/// True for codes that suspend a workflow frame pending an external
/// dependency (sleep, batch, child, proxy, wait-for).
pub fn is_interruption(c: u16) -> bool {
    matches!(
        c,
        code::WF_SLEEP | code::WF_ALL | code::WF_CHILD | code::WF_PROXY | code::WF_WAIT
    )
}

/// True for codes the stream router retries when no explicit message
/// policy says otherwise.
pub fn is_stream_retryable(c: u16) -> bool {
    c == code::UNKNOWN || c == code::WF_RETRYABLE
}

/// True when the code ends the job with an error the caller sees.
pub fn is_terminal_error(c: u16) -> bool {
    matches!(
        c,
        code::NOT_FOUND | code::INTERRUPTED | code::TIMEOUT | code::WF_FATAL | code::WF_MAXED
    )
}

#[cfg(test)]
#[path = "codes_tests.rs"]
mod tests;
