// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent-span threading through activity legs.
//!
//! The engine does not export telemetry; it threads trace/span context
//! through job metadata (`trc`/`spn`) so each leg parents its span on the
//! previous one and an exporter bound by the host can reassemble the tree.

use crate::id::IdGen;
use serde::{Deserialize, Serialize};

/// Trace context carried on a job and stamped onto each leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryContext {
    /// 32-hex trace id, stable for the life of the job.
    pub trace_id: String,
    /// 16-hex span id of the most recent leg.
    pub span_id: String,
}

impl TelemetryContext {
    /// Mint a fresh trace context for a new job.
    pub fn root(ids: &impl IdGen) -> Self {
        let raw = ids.next().replace('-', "");
        let trace_id = pad_hex(&raw, 32);
        let span_raw = ids.next().replace('-', "");
        Self {
            span_id: pad_hex(&span_raw, 16),
            trace_id,
        }
    }

    /// Derive the context for the next leg: same trace, fresh span.
    pub fn child(&self, ids: &impl IdGen) -> Self {
        let span_raw = ids.next().replace('-', "");
        Self {
            trace_id: self.trace_id.clone(),
            span_id: pad_hex(&span_raw, 16),
        }
    }
}

fn pad_hex(raw: &str, len: usize) -> String {
    let mut s: String = raw.chars().take(len).collect();
    while s.len() < len {
        s.push('0');
    }
    s
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
