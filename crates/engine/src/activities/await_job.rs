// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Await activity: start a child job, synchronously (park until the
//! child's completion signals back) or asynchronously (record the child
//! jid and proceed).

use super::{LegCtx, ParentLink};
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::{Clock, IdGen, JobError, JobId, StreamData, StreamMessageType, StreamStatus};
use hm_providers::Provider;
use serde_json::{json, Value};

/// Leg 1: resolve the child topic and payload, then request the start.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;

    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let input = super::map_input(&ctx.activity, &context, &msg.data)?;

    let topic = ctx
        .activity
        .subtype
        .clone()
        .or_else(|| {
            input
                .get("topic")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| {
            EngineError::Malformed(format!("await {} has no child topic", ctx.activity.aid))
        })?;
    let awaits = input.get("await").and_then(Value::as_bool).unwrap_or(true);
    let payload = input.get("payload").cloned().unwrap_or(Value::Null);
    let child_jid = input
        .get("jid")
        .or_else(|| input.get("workflowId"))
        .and_then(Value::as_str)
        .map(JobId::new)
        .unwrap_or_else(|| JobId::new(engine.inner.jids.next()));

    // The minted child jid must not churn across redeliveries, so the
    // record only reflects the delivery that performed the start.
    if !duplicate {
        super::write_record(
            engine,
            ctx,
            "input",
            json!({"topic": topic, "payload": payload, "await": awaits, "jid": child_jid.as_str()}),
            None,
        )
        .await?;
        if !super::notarize(engine, ctx, "fx:leg1").await? {
            request_start(engine, ctx, &topic, payload, &child_jid, awaits, None, None).await?;
        }
    }

    if awaits {
        return Ok(()); // parks; leg 2 fires on the child's Result
    }

    // Asynchronous form: record the child jid and proceed immediately.
    if !duplicate {
        super::write_record(engine, ctx, "output", json!({"jid": child_jid.as_str()}), None)
            .await?;
        super::apply_job_maps(engine, ctx).await?;
    }
    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}

/// Append a child-start request to the engine stream.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn request_start<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    topic: &str,
    payload: Value,
    child_jid: &JobId,
    awaits: bool,
    index: Option<u32>,
    expire: Option<u64>,
) -> Result<(), EngineError> {
    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: Some(topic.to_string()),
            jid: Some(ctx.jid.clone()),
            gid: Some(ctx.gid.clone()),
            dad: Some(ctx.dad.to_string()),
            aid: ctx.activity.aid.clone(),
            trc: None,
            spn: None,
            attempt: 0,
            awaits: Some(awaits),
        },
        message_type: Some(StreamMessageType::Await),
        data: json!({
            "topic": topic,
            "payload": payload,
            "jid": child_jid.as_str(),
            "await": awaits,
            "index": index,
            "expire": expire,
        }),
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    engine.store().append_engine(&msg).await?;
    Ok(())
}

/// Engine-stream handler for child-start requests.
pub(crate) async fn on_start<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: StreamData,
) -> Result<(), EngineError> {
    let parent_jid = msg
        .metadata
        .jid
        .clone()
        .ok_or_else(|| EngineError::Malformed("child start without parent".to_string()))?;
    let topic = msg
        .data
        .get("topic")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Malformed("child start without topic".to_string()))?
        .to_string();
    let payload = msg.data.get("payload").cloned().unwrap_or(Value::Null);
    let child_jid = msg
        .data
        .get("jid")
        .and_then(Value::as_str)
        .map(JobId::new);
    let awaits = msg.metadata.awaits.unwrap_or(true);
    let index = msg
        .data
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as u32);

    let parent = awaits.then(|| ParentLink {
        jid: parent_jid.clone(),
        aid: msg.metadata.aid.clone(),
        dad: msg
            .metadata
            .dad
            .as_deref()
            .map(hm_core::Dimension::from)
            .unwrap_or_default(),
        index,
    });

    match super::trigger::run(engine, &topic, payload, child_jid, parent).await {
        Ok(started) => {
            if let Some(expire) = msg.data.get("expire").and_then(Value::as_u64) {
                engine
                    .store()
                    .set_metadata_fields(&started, &[("expire", expire.to_string())])
                    .await?;
            }
            Ok(())
        }
        Err(EngineError::DuplicateJob(child)) if awaits => {
            // The awaited child already exists: surface as an error result
            // so the parent is not parked forever.
            let response = StreamData {
                metadata: hm_core::StreamMetadata {
                    guid: engine.next_guid(),
                    jid: Some(parent_jid),
                    dad: msg.metadata.dad.clone(),
                    aid: msg.metadata.aid.clone(),
                    ..Default::default()
                },
                message_type: Some(StreamMessageType::Result),
                data: json!({"index": index, "output": {"message": format!("duplicate job: {child}")}, "jid": child.as_str()}),
                policies: None,
                status: Some(StreamStatus::Error),
                code: Some(hm_core::codes::code::UNKNOWN),
                stack: None,
            };
            engine.store().append_engine(&response).await?;
            Ok(())
        }
        Err(other) => Err(other),
    }
}

/// Leg 2: the awaited child completed (or failed).
pub(crate) async fn on_result<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg2").await?;
    let errored = matches!(msg.status, Some(StreamStatus::Error));
    let output = msg.data.get("output").cloned().unwrap_or(Value::Null);

    if !duplicate {
        super::write_record(engine, ctx, "output", output.clone(), msg.code).await?;
        if !errored {
            super::apply_job_maps(engine, ctx).await?;
        }
    }

    if errored {
        let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
        let any_edge = ctx
            .activity
            .adjacent
            .iter()
            .map(|t| super::guard_passes(&t.conditions, &context))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .any(|passed| passed);
        if !any_edge {
            let message = output
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("child job failed")
                .to_string();
            let error_code = msg.code.unwrap_or(hm_core::codes::code::UNKNOWN);
            return super::fail_job(
                engine,
                &ctx.jid,
                JobError::new(error_code, message).with_job(ctx.jid.clone()),
            )
            .await;
        }
    }

    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}
