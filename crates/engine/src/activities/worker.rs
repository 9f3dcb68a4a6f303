// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker activity: emits work to a worker stream and parks for the
//! response. Reentrant workers additionally honor the 588–595 band by
//! parking the workflow frame on its declared dependency.

use super::LegCtx;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::flow;
use hm_core::codes::{code, is_interruption};
use hm_core::{Clock, JobError, StreamData, StreamMessageType, StreamStatus};
use hm_providers::Provider;
use serde_json::Value;

/// Leg 1: map input and append the worker invocation.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;

    let topic = ctx
        .activity
        .subtype
        .clone()
        .ok_or_else(|| EngineError::Malformed(format!("worker {} has no topic", ctx.activity.aid)))?;

    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let input = super::map_input(&ctx.activity, &context, &Value::Null)?;
    super::write_record(engine, ctx, "input", input.clone(), None).await?;

    if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
        append_invocation(engine, ctx, &topic, input).await?;
    }
    // Parks holding its semaphore credit; leg 2 fires on the response.
    Ok(())
}

pub(crate) async fn append_invocation<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    topic: &str,
    input: Value,
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
            awaits: None,
        },
        message_type: Some(StreamMessageType::Worker),
        data: input,
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    engine.store().append_worker(topic, &msg).await?;
    Ok(())
}

/// Leg 2: a worker (or proxied activity) responded.
pub(crate) async fn on_response<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: StreamData,
) -> Result<(), EngineError> {
    let ctx = super::resolve_ctx(engine, &msg).await?;
    let response_code = msg.code.unwrap_or(code::SUCCESS);

    if ctx.activity.reentrant {
        // Proxied-activity responses carry the activity-worker topic.
        let is_proxy = msg.metadata.topic.as_deref() != ctx.activity.subtype.as_deref();
        if is_proxy {
            return flow::resolve_proxy(engine, &ctx, &msg).await;
        }
        if is_interruption(response_code) {
            if super::notarize(engine, &ctx, "fx:park").await? {
                return Ok(());
            }
            return flow::register(engine, &ctx, &msg).await;
        }
        return flow::finish(engine, &ctx, &msg).await;
    }

    let duplicate = super::notarize(engine, &ctx, "leg2").await?;
    let errored = matches!(msg.status, Some(StreamStatus::Error));

    if !duplicate {
        super::write_record(engine, &ctx, "output", msg.data.clone(), Some(response_code)).await?;
        if errored {
            super::write_record(engine, &ctx, "errors", msg.data.clone(), Some(response_code))
                .await?;
        } else {
            super::apply_job_maps(engine, &ctx).await?;
        }
    }

    // An error with no matching error-path edge terminates the job;
    // otherwise guards route it (e.g. a cycle back to the pivot).
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
            let message = msg
                .data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("worker failed")
                .to_string();
            return super::fail_job(
                engine,
                &ctx.jid,
                JobError::new(response_code, message).with_job(ctx.jid.clone()),
            )
            .await;
        }
    }

    super::run_step_protocol(engine, &ctx, "leg2").await?;
    Ok(())
}
