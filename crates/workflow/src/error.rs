// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow error kinds.
//!
//! `Interrupted` is control flow, never user-visible as a failure; the
//! 596–599 kinds are reconstructed from stored replay records so a replay
//! rethrows exactly what the original call stored.

use hm_core::codes::code;
use thiserror::Error;

/// Errors surfaced inside workflow functions.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The frame suspended; descriptors are in the interruption registry.
    #[error("workflow frame suspended")]
    Interrupted,
    /// Non-retryable failure (598).
    #[error("fatal: {0}")]
    Fatal(String),
    /// Retry budget exhausted (597).
    #[error("retries exhausted: {0}")]
    Maxed(String),
    /// A call timed out (596).
    #[error("timed out: {0}")]
    Timeout(String),
    /// Retryable failure (599); the engine re-runs the frame.
    #[error("retryable: {0}")]
    Retryable(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("host error: {0}")]
    Host(String),
}

impl WorkflowError {
    /// Wire code reported for this error kind.
    pub fn code(&self) -> u16 {
        match self {
            WorkflowError::Interrupted => code::WF_ALL,
            WorkflowError::Fatal(_) => code::WF_FATAL,
            WorkflowError::Maxed(_) => code::WF_MAXED,
            WorkflowError::Timeout(_) => code::WF_TIMEOUT,
            WorkflowError::Retryable(_) => code::WF_RETRYABLE,
            WorkflowError::Json(_) | WorkflowError::Host(_) => code::WF_RETRYABLE,
        }
    }

    /// Reconstruct the error kind a replay record stored.
    pub fn from_stored(stored_code: u16, message: String) -> Self {
        match stored_code {
            code::WF_FATAL => WorkflowError::Fatal(message),
            code::WF_MAXED => WorkflowError::Maxed(message),
            code::WF_TIMEOUT => WorkflowError::Timeout(message),
            _ => WorkflowError::Retryable(message),
        }
    }
}
