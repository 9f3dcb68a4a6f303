// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the engine runtime.
//!
//! Routers swallow `Collation`, `InactiveJob`, and `Generational`
//! outcomes (expected under redelivery); everything else is retried or
//! surfaced per the message's policy.

use hm_core::{JobError, JobId};
use thiserror::Error;

/// Errors that can occur in the engine runtime
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target job is gone or scrubbed; drop silently.
    #[error("inactive job: {0}")]
    InactiveJob(JobId),
    /// The message belongs to an older generation of a recreated jid; drop.
    #[error("stale generation for job {jid}: message {message_gid}, current {current_gid}")]
    Generational {
        jid: JobId,
        message_gid: String,
        current_gid: String,
    },
    /// The GUID ledger reported a duplicate delivery; expected, swallowed.
    #[error("duplicate delivery for job {jid} activity {aid}")]
    Collation { jid: JobId, aid: String },
    /// State read failure surfaced to the waiting caller.
    #[error("state read failed: {0}")]
    GetState(String),
    /// A job may only be published once per jid.
    #[error("duplicate job: {0}")]
    DuplicateJob(JobId),
    /// The awaited job finished with an error payload.
    #[error("job failed: {0}")]
    JobFailed(JobError),
    /// A pub-and-await caller outlived its wait window.
    #[error("timed out awaiting job: {0}")]
    Timeout(JobId),
    #[error("no app deployed")]
    NoApp,
    #[error("app version not active: {0}")]
    VersionNotActive(String),
    #[error("malformed stream message: {0}")]
    Malformed(String),
    #[error("core error: {0}")]
    Core(#[from] hm_core::CoreError),
    #[error("pipe error: {0}")]
    Pipe(#[from] hm_pipe::PipeError),
    #[error("store error: {0}")]
    Store(#[from] hm_store::StoreError),
    #[error("provider error: {0}")]
    Provider(#[from] hm_providers::ProviderError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Outcomes the router acks without retry or error routing.
    pub fn is_swallowed(&self) -> bool {
        matches!(
            self,
            EngineError::InactiveJob(_)
                | EngineError::Generational { .. }
                | EngineError::Collation { .. }
        )
    }
}


impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        use EngineError::*;
        match (self, other) {
            (InactiveJob(a), InactiveJob(b)) => a == b,
            (
                Generational {
                    jid,
                    message_gid,
                    current_gid,
                },
                Generational {
                    jid: jid2,
                    message_gid: message_gid2,
                    current_gid: current_gid2,
                },
            ) => jid == jid2 && message_gid == message_gid2 && current_gid == current_gid2,
            (Collation { jid, aid }, Collation { jid: jid2, aid: aid2 }) => {
                jid == jid2 && aid == aid2
            }
            (GetState(a), GetState(b)) => a == b,
            (DuplicateJob(a), DuplicateJob(b)) => a == b,
            (JobFailed(a), JobFailed(b)) => a == b,
            (Timeout(a), Timeout(b)) => a == b,
            (NoApp, NoApp) => true,
            (VersionNotActive(a), VersionNotActive(b)) => a == b,
            (Malformed(a), Malformed(b)) => a == b,
            (Core(a), Core(b)) => a.to_string() == b.to_string(),
            (Pipe(a), Pipe(b)) => a.to_string() == b.to_string(),
            (Store(a), Store(b)) => a.to_string() == b.to_string(),
            (Provider(a), Provider(b)) => a.to_string() == b.to_string(),
            (Json(a), Json(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
