// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quorum control-plane messages.
//!
//! Engines and workers gossip over a pub/sub channel for presence,
//! version activation, throttling, and completion broadcast.
//!
//! Serializes with `{"type": "quorum:name", ...fields}` format.
//! Unknown type tags deserialize to `Custom`.

use crate::job::JobCompletion;
use crate::EngineId;
use serde::{Deserialize, Serialize};

/// Presence profile reported in `pong` responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuorumProfile {
    pub engine_id: EngineId,
    /// Depth of the stream this member consumes, for backpressure decisions.
    #[serde(default)]
    pub stream_depth: u64,
    /// Worker topic, when the member is a worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_topic: Option<String>,
    /// App version the member currently honors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Throttle request: targeted at a guid, a worker topic, or global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Milliseconds inserted between successive stream reads.
    pub throttle: u64,
}

impl ThrottleOptions {
    /// A throttle with neither guid nor topic applies to every router.
    pub fn is_global(&self) -> bool {
        self.guid.is_none() && self.topic.is_none()
    }
}

/// Control-plane messages exchanged by quorum members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuorumMessage {
    /// Presence probe.
    #[serde(rename = "quorum:ping")]
    Ping { requestor: EngineId },

    /// Presence response with profile.
    #[serde(rename = "quorum:pong")]
    Pong {
        requestor: EngineId,
        profile: QuorumProfile,
    },

    /// Coordinate a no-downtime version switch: members invalidate graph
    /// caches and honor `until_version` on subsequent reads.
    #[serde(rename = "quorum:activate")]
    Activate {
        cache_mode: String,
        until_version: String,
    },

    /// Adjust router read delay.
    #[serde(rename = "quorum:throttle")]
    Throttle { options: ThrottleOptions },

    /// Census request with optional cap on responders.
    #[serde(rename = "quorum:rollcall")]
    Rollcall {
        requestor: EngineId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_secs: Option<u64>,
    },

    /// Completion payload broadcast for subscribers.
    #[serde(rename = "quorum:job")]
    Job { completion: JobCompletion },

    /// Catch-all for unknown message types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

#[cfg(test)]
#[path = "quorum_tests.rs"]
mod tests;
