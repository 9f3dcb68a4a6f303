// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity state machines.
//!
//! Every activity runs as up to two legs. Leg 1 loads state, maps inputs,
//! performs the kind-specific side effect, and grants semaphore credits to
//! its successors; leg 2 fires when the external dependency resolves and
//! maps outputs back into job state. Pass-through kinds collapse into one
//! leg. Each sub-step is notarized in the GUID ledger so redeliveries
//! short-circuit instead of repeating effects.

pub(crate) mod await_job;
pub(crate) mod cycle;
pub(crate) mod hook;
pub(crate) mod interrupt;
pub(crate) mod signal;
pub(crate) mod trigger;
pub(crate) mod worker;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::flow;
use crate::task;
use hm_core::codes::code;
use hm_core::{
    Activity, ActivityId, ActivityKind, Clock, Dimension, JobCompletion, JobError, JobId,
    JobOutput, StreamData, StreamMessageType, StreamStatus, Transition, TransitionConditions,
    TransitionGate,
};
use hm_pipe::{Mapper, Pipe};
use hm_providers::Provider;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Ledger field holding a child job's link back to its parent.
pub(crate) const PARENT_FIELD: &str = "-parent";
/// Ledger field holding serialized interrupt options.
pub(crate) const INTERRUPT_FIELD: &str = "-interrupt";
/// Ledger field guarding completion publication.
const DONE_FIELD: &str = "-done";

pub(crate) fn child_field(jid: &JobId) -> String {
    format!("-child:{jid}")
}

pub(crate) fn dimension_counter_field(aid: &ActivityId) -> String {
    format!("-d:{aid}")
}

/// Link from a running child job back to the awaiting parent occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ParentLink {
    pub jid: JobId,
    pub aid: ActivityId,
    pub dad: Dimension,
    /// Workflow execution index awaiting the child, when the parent is a
    /// reentrant frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Resolved addressing for one leg invocation.
#[derive(Debug, Clone)]
pub(crate) struct LegCtx {
    pub jid: JobId,
    pub gid: String,
    pub dad: Dimension,
    pub activity: Activity,
    /// Telemetry trace id threaded through every leg of the job.
    pub trc: Option<String>,
}

/// Route one engine-stream message to its handler.
pub(crate) async fn dispatch<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: StreamData,
) -> Result<(), EngineError> {
    match msg.kind() {
        StreamMessageType::Transition => {
            let ctx = resolve_ctx(engine, &msg).await?;
            match ctx.activity.kind {
                ActivityKind::Worker => worker::leg1(engine, &ctx).await,
                ActivityKind::Hook => hook::leg1(engine, &ctx).await,
                ActivityKind::Signal => signal::leg1(engine, &ctx, &msg).await,
                ActivityKind::Interrupt => interrupt::leg1(engine, &ctx).await,
                ActivityKind::Cycle => cycle::leg1(engine, &ctx).await,
                ActivityKind::Await => await_job::leg1(engine, &ctx, &msg).await,
                ActivityKind::Trigger => Err(EngineError::Malformed(
                    "transition targeting a trigger".to_string(),
                )),
            }
        }
        StreamMessageType::Response => worker::on_response(engine, msg).await,
        StreamMessageType::Timehook => task::on_timehook(engine, msg).await,
        StreamMessageType::Webhook | StreamMessageType::Signal => {
            let ctx = resolve_ctx(engine, &msg).await?;
            if ctx.activity.reentrant {
                flow::resolve_wait(engine, &ctx, &msg).await
            } else {
                hook::on_signal(engine, &ctx, &msg).await
            }
        }
        StreamMessageType::Result => {
            let ctx = resolve_ctx(engine, &msg).await?;
            if ctx.activity.reentrant {
                flow::resolve_child(engine, &ctx, &msg).await
            } else {
                await_job::on_result(engine, &ctx, &msg).await
            }
        }
        StreamMessageType::Await => await_job::on_start(engine, msg).await,
        StreamMessageType::Interrupt => interrupt::on_message(engine, msg).await,
        StreamMessageType::Worker => Err(EngineError::Malformed(
            "worker message on engine stream".to_string(),
        )),
    }
}

/// Resolve message addressing against the active app and live job state.
pub(crate) async fn resolve_ctx<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: &StreamData,
) -> Result<LegCtx, EngineError> {
    let jid = msg
        .metadata
        .jid
        .clone()
        .ok_or_else(|| EngineError::Malformed("message without jid".to_string()))?;

    let activity = engine.with_app(|app| {
        let (_, activity) = app.find_activity(&msg.metadata.aid)?;
        Ok(activity.clone())
    })?;

    let metadata = engine
        .store()
        .get_metadata(&jid)
        .await
        .map_err(|e| match e {
            hm_store::StoreError::JobNotFound(j) => EngineError::InactiveJob(j),
            other => EngineError::Store(other),
        })?;

    if metadata.js < 0 {
        return Err(EngineError::InactiveJob(jid));
    }
    if let Some(message_gid) = &msg.metadata.gid {
        if *message_gid != metadata.gid {
            return Err(EngineError::Generational {
                jid,
                message_gid: message_gid.clone(),
                current_gid: metadata.gid,
            });
        }
    }

    let dad = msg
        .metadata
        .dad
        .as_deref()
        .map(Dimension::from)
        .unwrap_or_default();

    Ok(LegCtx {
        jid,
        gid: metadata.gid,
        dad,
        activity,
        trc: metadata.trc,
    })
}

/// Notarize entry into a leg. Returns true when this delivery is a
/// duplicate (side effects must be skipped; the idempotent step protocol
/// still re-runs for crash recovery).
pub(crate) async fn notarize<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    tag: &str,
) -> Result<bool, EngineError> {
    let count = engine
        .store()
        .collate(&ctx.jid, &ctx.activity.aid, &ctx.dad, tag)
        .await?;
    if count > 1.0 {
        tracing::info!(
            jid = %ctx.jid,
            aid = %ctx.activity.aid,
            dad = %ctx.dad,
            tag,
            "duplicate delivery detected by collation ledger"
        );
    }
    Ok(count > 1.0)
}

/// Evaluate a transition guard against job context.
pub(crate) fn guard_passes(
    conditions: &Option<TransitionConditions>,
    context: &Value,
) -> Result<bool, EngineError> {
    let Some(conditions) = conditions else {
        return Ok(true);
    };
    if conditions.matches.is_empty() {
        return Ok(true);
    }
    let mut results = Vec::with_capacity(conditions.matches.len());
    for m in &conditions.matches {
        let expected = Pipe::resolve(&m.expected, context)?;
        let actual = Pipe::resolve(&m.actual, context)?;
        results.push(expected == actual);
    }
    Ok(match conditions.gate {
        TransitionGate::And => results.iter().all(|r| *r),
        TransitionGate::Or => results.iter().any(|r| *r),
    })
}

/// Map an activity's input rules, falling back to the raw payload.
pub(crate) fn map_input(
    activity: &Activity,
    context: &Value,
    fallback: &Value,
) -> Result<Value, EngineError> {
    match &activity.input {
        Some(rules) => Ok(Mapper::apply(rules, context)?),
        None => Ok(fallback.clone()),
    }
}

/// Apply the activity's `job` maps onto user-visible job data.
pub(crate) async fn apply_job_maps<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let Some(rules) = &ctx.activity.job else {
        return Ok(());
    };
    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let mapped = Mapper::apply(rules, &context)?;
    engine.store().merge_job_data(&ctx.jid, &mapped).await?;
    Ok(())
}

/// Write one section of the activity record, stamping the leg timestamp
/// and threading the telemetry parent span: each leg mints a span under
/// the job's trace and becomes the job's most-recent span (`spn`).
pub(crate) async fn write_record<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    section: &str,
    data: Value,
    response_code: Option<u16>,
) -> Result<(), EngineError> {
    let mut metadata = json!({ "ac": engine.clock().epoch_ms() });
    if let Some(response_code) = response_code {
        metadata["code"] = json!(response_code);
    }
    if let Some(trace) = &ctx.trc {
        let span = engine.next_guid();
        metadata["trc"] = json!(trace);
        metadata["spn"] = json!(span);
        engine
            .store()
            .set_metadata_fields(&ctx.jid, &[("spn", span)])
            .await?;
    }
    let value = json!({ "data": data, "metadata": metadata });
    engine
        .store()
        .set_activity_record(&ctx.jid, &ctx.activity.aid, &ctx.dad, section, &value)
        .await?;
    Ok(())
}

/// The multi-edge step protocol shared by every completing leg.
///
/// Each passing edge is stamped with its own sub-step GUID and written
/// before the semaphore credit is consumed, so a crash mid-protocol
/// leaves the ledger as the single source of truth for which edges fired.
/// Returns the number of edges that passed their guards.
pub(crate) async fn run_step_protocol<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    leg: &str,
) -> Result<usize, EngineError> {
    let store = engine.store();
    let context = store.get_job_context(&ctx.jid, &ctx.dad).await?;

    let mut fired = 0usize;
    for transition in &ctx.activity.adjacent {
        if !guard_passes(&transition.conditions, &context)? {
            continue;
        }
        fired += 1;
        let tag = format!("e:{leg}:{}", transition.to);
        if store
            .collate(&ctx.jid, &ctx.activity.aid, &ctx.dad, &tag)
            .await?
            == 1.0
        {
            append_transition(engine, ctx, transition).await?;
        }
    }

    let sem_tag = format!("s:{leg}");
    let first = store
        .collate(&ctx.jid, &ctx.activity.aid, &ctx.dad, &sem_tag)
        .await?
        == 1.0;
    if first {
        let post = store.adjust_status(&ctx.jid, fired as i64 - 1).await?;
        if post == 0 {
            try_complete(engine, &ctx.jid).await?;
        }
    } else if store.get_status(&ctx.jid).await? == 0 {
        // Crash window between adjust and publish: completion still owed.
        try_complete(engine, &ctx.jid).await?;
    }

    Ok(fired)
}

async fn append_transition<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    transition: &Transition,
) -> Result<(), EngineError> {
    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: None,
            jid: Some(ctx.jid.clone()),
            gid: Some(ctx.gid.clone()),
            dad: Some(ctx.dad.to_string()),
            aid: transition.to.clone(),
            trc: None,
            spn: None,
            attempt: 0,
            awaits: None,
        },
        message_type: Some(StreamMessageType::Transition),
        data: Value::Null,
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    engine.store().append_engine(&msg).await?;
    Ok(())
}

/// Publish the completion event exactly once per jid.
pub(crate) async fn try_complete<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
) -> Result<(), EngineError> {
    if engine.store().incr_ledger_field(jid, DONE_FIELD).await? > 1.0 {
        return Ok(());
    }
    publish_completion(engine, jid).await
}

async fn publish_completion<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
) -> Result<(), EngineError> {
    let store = engine.store();
    store
        .set_metadata_fields(jid, &[("ju", engine.clock().epoch_ms().to_string())])
        .await?;
    let metadata = store.get_metadata(jid).await?;
    let data = store.get_job_data(jid).await?;
    let output = JobOutput {
        metadata: metadata.clone(),
        data: data.clone(),
    };
    let topic = store.keys().executed_topic(jid);
    let completion = JobCompletion {
        topic: topic.clone(),
        job_output: output,
    };
    store
        .provider()
        .publish(&topic, &serde_json::to_string(&completion)?)
        .await?;

    notify_parent(engine, jid, &metadata.error(), data).await?;

    let expire = if metadata.expire > 0 {
        metadata.expire
    } else {
        engine.config().expire_job_seconds
    };
    store.expire_job(jid, expire).await?;
    Ok(())
}

/// Wake the parent's pending await edge, if this job is an awaited child.
async fn notify_parent<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
    error: &Option<JobError>,
    data: Value,
) -> Result<(), EngineError> {
    let fields = engine
        .store()
        .ledger_fields_with_prefix(jid, PARENT_FIELD)
        .await?;
    let Some(raw) = fields.get(PARENT_FIELD) else {
        return Ok(());
    };
    let parent: ParentLink = serde_json::from_str(raw)
        .map_err(|e| EngineError::Malformed(format!("parent link: {e}")))?;

    let (status, response_code, payload) = match error {
        Some(err) => (
            StreamStatus::Error,
            err.code,
            json!({"message": err.message, "job_id": jid}),
        ),
        None => (StreamStatus::Success, code::SUCCESS, data),
    };

    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: None,
            jid: Some(parent.jid.clone()),
            gid: None,
            dad: Some(parent.dad.to_string()),
            aid: parent.aid.clone(),
            trc: None,
            spn: None,
            attempt: 0,
            awaits: None,
        },
        message_type: Some(StreamMessageType::Result),
        data: json!({"index": parent.index, "output": payload, "jid": jid}),
        policies: None,
        status: Some(status),
        code: Some(response_code),
        stack: None,
    };
    engine.store().append_engine(&msg).await?;
    Ok(())
}

/// Terminate a job with an error payload. The semaphore drops to zero
/// with `err` set, so the single completion path publishes the failure.
pub(crate) async fn fail_job<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
    error: JobError,
) -> Result<(), EngineError> {
    let store = engine.store();
    if store.get_status(jid).await.is_err() {
        // Already scrubbed; nothing to fail.
        return Ok(());
    }
    store
        .set_metadata_fields(jid, &[("err", serde_json::to_string(&error)?)])
        .await?;
    store.set_status(jid, 0).await?;
    try_complete(engine, jid).await
}

#[cfg(test)]
#[path = "../activities_tests/mod.rs"]
mod tests;
