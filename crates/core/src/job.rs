// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job metadata and output types.
//!
//! A job is one run of a graph. Its hash record is the single source of
//! truth: metadata fields (this module), user data, per-activity process
//! records, and the collation ledger all live in the same hash.

use crate::{AppId, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job metadata fields, stored under their wire names.
///
/// `js` is the status semaphore: non-negative means running, zero means
/// complete, negative means interrupted or expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub jid: JobId,
    /// Generational id; changes when a jid is re-created so stale messages
    /// from the prior generation can be dropped.
    pub gid: String,
    pub app: AppId,
    /// App version the job runs under.
    pub vrs: String,
    /// Subscription topic that created the job.
    pub tpc: String,
    /// Time bucket (epoch seconds rounded to the deployment granularity).
    pub ts: String,
    /// Created, epoch ms.
    pub jc: u64,
    /// Updated, epoch ms.
    pub ju: u64,
    /// Status semaphore.
    pub js: i64,
    /// Telemetry trace id threaded through activity legs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trc: Option<String>,
    /// Telemetry span id of the most recent leg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spn: Option<String>,
    /// Owning engine id for direct-return jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ngn: Option<String>,
    /// Seconds the job hash lives after completion.
    #[serde(default)]
    pub expire: u64,
    /// Serialized job error, when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl JobMetadata {
    /// Running means the semaphore has outstanding work.
    pub fn is_running(&self) -> bool {
        self.js > 0
    }

    /// Complete means the semaphore crossed to exactly zero.
    pub fn is_complete(&self) -> bool {
        self.js == 0
    }

    /// Negative semaphore marks an interrupted or expired job.
    pub fn is_interrupted(&self) -> bool {
        self.js < 0
    }

    /// Decode the serialized job error, if any.
    pub fn error(&self) -> Option<JobError> {
        self.err
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Decoded job error payload delivered to awaiting callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl JobError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stack: None,
            job_id: None,
        }
    }

    pub fn with_job(mut self, jid: JobId) -> Self {
        self.job_id = Some(jid);
        self
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Full job state returned by `get_state` and completion waiters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub metadata: JobMetadata,
    pub data: Value,
}

/// Completion event published on `<app>.executed.<jid>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub topic: String,
    pub job_output: JobOutput,
}

crate::builder! {
    pub struct JobMetadataBuilder => JobMetadata {
        into {
            gid: String = "gid-1",
            vrs: String = "1",
            tpc: String = "test.topic",
            ts: String = "0",
        }
        set {
            jid: JobId = JobId::new("job-1"),
            app: AppId = AppId::new("test"),
            jc: u64 = 1_000_000,
            ju: u64 = 1_000_000,
            js: i64 = 1,
            expire: u64 = 0,
        }
        option {
            trc: String = None,
            spn: String = None,
            ngn: String = None,
            err: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
