// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-mortem export.
//!
//! Inflates a job hash into a timeline of activity leg entries and
//! exits, ordered by the compound `(timestamp, activity, dimension)` key
//! so equal timestamps stay deterministically sorted.

use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::{Clock, Dimension, JobId, JobMetadata};
use hm_providers::Provider;
use hm_store::Serializer;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One leg boundary in the reconstructed timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub activity: String,
    pub dimension: String,
    /// Leg boundary: `entry` (input written) or `exit` (output written).
    pub kind: String,
    pub timestamp: u64,
}

/// Inflated job state for post-mortem analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    pub jid: JobId,
    pub metadata: JobMetadata,
    pub data: Value,
    pub timeline: Vec<TimelineEntry>,
}

pub(crate) async fn export<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
) -> Result<ExportBundle, EngineError> {
    let store = engine.store();
    let metadata = store.get_metadata(jid).await?;
    let data = store.get_job_data(jid).await?;
    let fields = store.process_fields(jid).await?;

    // (activity, dimension, section) -> leg timestamp
    let mut stamps: BTreeMap<(String, String, &'static str), u64> = BTreeMap::new();
    for (path, dad, raw) in &fields {
        let segments: Vec<&str> = path.split('/').collect();
        let [aid, section, rest @ ..] = segments.as_slice() else {
            continue;
        };
        if rest != ["metadata", "ac"] {
            continue;
        }
        let kind = match *section {
            "input" | "hook" => "entry",
            "output" | "errors" => "exit",
            _ => continue,
        };
        let timestamp = match Serializer::from_string(raw) {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            other => other.as_str().and_then(|s| s.parse().ok()).unwrap_or(0),
        };
        let slot = stamps
            .entry((aid.to_string(), dad.clone(), kind))
            .or_insert(timestamp);
        // Keep the earliest entry stamp and the latest exit stamp.
        if (kind == "entry" && timestamp < *slot) || (kind == "exit" && timestamp > *slot) {
            *slot = timestamp;
        }
    }

    let mut timeline: Vec<TimelineEntry> = stamps
        .into_iter()
        .map(|((activity, dimension, kind), timestamp)| TimelineEntry {
            activity,
            dimension,
            kind: kind.to_string(),
            timestamp,
        })
        .collect();

    // Compound sort over parsed numeric time; dimension compares by its
    // numeric segments so `/10` follows `/2`.
    timeline.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.activity.cmp(&b.activity))
            .then_with(|| {
                Dimension::from(a.dimension.as_str())
                    .numeric_key()
                    .cmp(&Dimension::from(b.dimension.as_str()).numeric_key())
            })
            .then_with(|| a.kind.cmp(&b.kind))
    });

    Ok(ExportBundle {
        jid: jid.clone(),
        metadata,
        data,
        timeline,
    })
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
