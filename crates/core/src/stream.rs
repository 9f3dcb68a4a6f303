// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream wire payloads.
//!
//! Every transition, worker invocation, and hook wake travels as a
//! `StreamData` message on a backend stream. Handlers return a
//! `StreamDataResponse`; the router owns ack/retry/reclaim.

use crate::{ActivityId, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Kind of work a stream message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMessageType {
    /// A time-hook fired.
    Timehook,
    /// An external web-hook signal resolved to a paused activity.
    Webhook,
    /// Start a child job on behalf of a parent.
    Await,
    /// A child job reports its result back to the parent.
    Result,
    /// Invoke a worker callback.
    Worker,
    /// A worker callback's response.
    Response,
    /// Advance an adjacent activity.
    Transition,
    /// Deliver a signal payload to a paused activity.
    Signal,
    /// Interrupt a running job.
    Interrupt,
}

crate::simple_display! {
    StreamMessageType {
        Timehook => "timehook",
        Webhook => "webhook",
        Await => "await",
        Result => "result",
        Worker => "worker",
        Response => "response",
        Transition => "transition",
        Signal => "signal",
        Interrupt => "interrupt",
    }
}

/// Handler outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Success,
    Error,
    Pending,
}

/// Per-code retry spec: `[max_retries]` or `[max_retries, "x"]` for
/// exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRetrySpec {
    Linear((u32,)),
    Exponential((u32, String)),
}

impl StreamRetrySpec {
    pub fn max_retries(&self) -> u32 {
        match self {
            StreamRetrySpec::Linear((n,)) => *n,
            StreamRetrySpec::Exponential((n, _)) => *n,
        }
    }

    pub fn exponential(&self) -> bool {
        matches!(self, StreamRetrySpec::Exponential((_, flag)) if flag == "x")
    }
}

/// Retry policies carried on a message, keyed by response code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamPolicies {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub retry: HashMap<String, StreamRetrySpec>,
}

impl StreamPolicies {
    /// Look up the retry spec for a response code.
    pub fn retry_for(&self, code: u16) -> Option<&StreamRetrySpec> {
        self.retry.get(&code.to_string())
    }
}

/// Message metadata addressing one activity occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Unique message id; the dedup key for redeliveries.
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<JobId>,
    /// Generational id of the target job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    /// Dimensional address of the target activity occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dad: Option<String>,
    pub aid: ActivityId,
    /// Telemetry trace id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trc: Option<String>,
    /// Telemetry parent span id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spn: Option<String>,
    /// Delivery attempt counter, incremented by the router on retry.
    #[serde(rename = "try", default)]
    pub attempt: u32,
    /// For child-start messages: whether the parent awaits the result.
    #[serde(rename = "await", default, skip_serializing_if = "Option::is_none")]
    pub awaits: Option<bool>,
}

/// One stream message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamData {
    pub metadata: StreamMetadata,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<StreamMessageType>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<StreamPolicies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StreamStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl StreamData {
    /// Message type, defaulting to `Transition` when untyped.
    pub fn kind(&self) -> StreamMessageType {
        self.message_type.unwrap_or(StreamMessageType::Transition)
    }
}

/// Handler response delivered back through the router.
pub type StreamDataResponse = StreamData;

crate::builder! {
    pub struct StreamDataBuilder => StreamData {
        set {
            metadata: StreamMetadata = StreamMetadata {
                guid: "guid-1".to_string(),
                aid: ActivityId::new("t1"),
                ..Default::default()
            },
            data: Value = Value::Null,
        }
        option {
            message_type: StreamMessageType = None,
            policies: StreamPolicies = None,
            status: StreamStatus = None,
            code: u16 = None,
            stack: String = None,
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
