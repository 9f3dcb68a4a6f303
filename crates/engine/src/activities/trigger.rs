// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger activity: mints the job and seeds the graph.
//!
//! Triggers run inline in the publishing engine rather than through the
//! stream, so a duplicate jid rejects synchronously at the caller.

use super::{LegCtx, ParentLink, PARENT_FIELD};
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::{
    Clock, Dimension, IdGen, JobId, JobMetadata, TelemetryContext,
};
use hm_pipe::Mapper;
use hm_providers::Provider;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Width of the time bucket recorded in `ts` (ten minutes).
const TIME_BUCKET_SECS: u64 = 600;

/// Create a job for `topic` and run the trigger's step protocol.
pub(crate) async fn run<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    payload: Value,
    jid: Option<JobId>,
    parent: Option<ParentLink>,
) -> Result<JobId, EngineError> {
    let (version, trigger) = engine.with_app(|app| {
        let graph = app.graph_by_topic(topic)?;
        let trigger = graph
            .trigger()
            .ok_or_else(|| EngineError::Malformed(format!("graph {topic} has no trigger")))?;
        Ok((app.version.clone(), trigger.clone()))
    })?;

    let jid = jid.unwrap_or_else(|| JobId::new(engine.inner.jids.next()));
    let gid = engine.next_guid();
    let telemetry = TelemetryContext::root(&engine.inner.jids);
    let now_ms = engine.clock().epoch_ms();
    let now_secs = engine.clock().epoch_secs();

    let metadata = JobMetadata {
        jid: jid.clone(),
        gid: gid.clone(),
        app: engine.store().keys().app_id().clone(),
        vrs: version,
        tpc: topic.to_string(),
        ts: (now_secs - now_secs % TIME_BUCKET_SECS).to_string(),
        jc: now_ms,
        ju: now_ms,
        js: 1,
        trc: Some(telemetry.trace_id.clone()),
        spn: Some(telemetry.span_id.clone()),
        ngn: Some(engine.id().to_string()),
        expire: engine.config().expire_job_seconds,
        err: None,
    };

    let data = initial_data(&trigger, &payload)?;
    engine
        .store()
        .create_job(&metadata, &data)
        .await
        .map_err(|e| match e {
            hm_store::StoreError::DuplicateJob(j) => EngineError::DuplicateJob(j),
            other => EngineError::Store(other),
        })?;

    let ctx = LegCtx {
        jid: jid.clone(),
        gid,
        dad: Dimension::root(),
        activity: trigger,
        trc: Some(telemetry.trace_id.clone()),
    };
    super::write_record(engine, &ctx, "output", payload, None).await?;

    if let Some(parent) = parent {
        engine
            .store()
            .set_ledger_fields(
                &jid,
                HashMap::from([(PARENT_FIELD.to_string(), serde_json::to_string(&parent)?)]),
            )
            .await?;
        engine
            .store()
            .set_ledger_fields(
                &parent.jid,
                HashMap::from([(super::child_field(&jid), topic.to_string())]),
            )
            .await?;
    }

    super::run_step_protocol(engine, &ctx, "leg1").await?;
    Ok(jid)
}

/// Seed user-visible job data: the trigger's `job` maps when present,
/// otherwise the payload itself (wrapped when not an object).
fn initial_data(
    trigger: &hm_core::Activity,
    payload: &Value,
) -> Result<Value, EngineError> {
    match &trigger.job {
        Some(rules) => {
            let context = json!({
                trigger.aid.as_str(): {"output": {"data": payload}},
                "$input": {"data": payload},
            });
            Ok(Mapper::apply(rules, &context)?)
        }
        None => Ok(match payload {
            Value::Object(_) => payload.clone(),
            other => json!({ "input": other }),
        }),
    }
}
