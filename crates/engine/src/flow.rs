// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reentrant-frame resolution.
//!
//! A reentrant worker's responses in the 588–595 band carry interruption
//! descriptors. This module registers each descriptor against the task
//! service (timer, signal index, child start, proxied activity), records
//! resolutions in the replay ledger, and re-invokes the frame under a
//! fresh dimension once its dependencies settle. Composite (`all`)
//! batches count down a ledger field before re-entry.

use crate::activities::{self, LegCtx};
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::codes::code;
use hm_core::{Clock, Dimension, JobError, JobId, RetryPolicy, StreamData, StreamStatus};
use hm_providers::Provider;
use hm_store::{replay_field, Serializer, TimeHookKind, TimeHookRecord, WebHookTarget};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Topic workflow `wait_for` signals arrive on.
pub const WFS_SIGNAL_TOPIC: &str = "wfs.signal";

/// Suffix of the worker stream serving proxied activities.
pub const ACTIVITY_TOPIC_SUFFIX: &str = "-activity";

/// One suspension a workflow frame declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Interruption {
    Sleep {
        index: u32,
        duration: u64,
    },
    Wait {
        index: u32,
        signal: String,
    },
    Child {
        index: u32,
        topic: String,
        payload: Value,
        #[serde(rename = "await", default = "default_true")]
        awaits: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expire: Option<u64>,
    },
    Proxy {
        index: u32,
        activity: String,
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
}

fn default_true() -> bool {
    true
}

impl Interruption {
    pub fn index(&self) -> u32 {
        match self {
            Interruption::Sleep { index, .. }
            | Interruption::Wait { index, .. }
            | Interruption::Child { index, .. }
            | Interruption::Proxy { index, .. } => *index,
        }
    }
}

fn countdown_field(dad: &Dimension) -> String {
    format!("-all:{dad}")
}

fn proxy_attempt_field(index: u32) -> String {
    format!("-try-{index}-")
}

/// Register the response's interruption descriptors.
pub(crate) async fn register<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let items: Vec<Interruption> = if msg.code == Some(code::WF_ALL) {
        serde_json::from_value(msg.data.get("items").cloned().unwrap_or(Value::Null))
            .map_err(|e| EngineError::Malformed(format!("composite descriptor: {e}")))?
    } else {
        vec![serde_json::from_value(msg.data.clone())
            .map_err(|e| EngineError::Malformed(format!("interruption descriptor: {e}")))?]
    };

    if items.is_empty() {
        return Err(EngineError::Malformed("empty interruption batch".to_string()));
    }

    if items.len() > 1 {
        engine
            .store()
            .set_ledger_fields(
                &ctx.jid,
                HashMap::from([(countdown_field(&ctx.dad), items.len().to_string())]),
            )
            .await?;
    }

    for item in items {
        match item {
            Interruption::Sleep { index, duration } => {
                let record = TimeHookRecord {
                    jid: ctx.jid.clone(),
                    gid: ctx.gid.clone(),
                    aid: ctx.activity.aid.clone(),
                    dad: ctx.dad.clone(),
                    kind: TimeHookKind::Sleep,
                    index: Some(index),
                    payload: None,
                };
                engine
                    .store()
                    .register_time_hook(&record, engine.clock().epoch_secs() + duration)
                    .await?;
            }
            Interruption::Wait { index, signal } => {
                let target = WebHookTarget {
                    jid: ctx.jid.clone(),
                    dad: ctx.dad.clone(),
                    index: Some(index),
                };
                engine
                    .store()
                    .register_web_hook(
                        WFS_SIGNAL_TOPIC,
                        &signal,
                        &target,
                        engine.config().signal_expire_secs,
                    )
                    .await?;
            }
            Interruption::Child {
                index,
                topic,
                payload,
                awaits,
                jid,
                expire,
            } => {
                let child_jid = jid
                    .map(JobId::new)
                    .unwrap_or_else(|| JobId::new(format!("{}-{}", ctx.jid, index)));
                activities::await_job::request_start(
                    engine,
                    ctx,
                    &topic,
                    payload,
                    &child_jid,
                    awaits,
                    Some(index),
                    expire,
                )
                .await?;
                if !awaits {
                    // Fire-and-forget children resolve immediately with
                    // the child jid.
                    write_replay(engine, &ctx.jid, index, &json!(child_jid.as_str())).await?;
                    settle_one(engine, ctx).await?;
                }
            }
            Interruption::Proxy {
                index,
                activity,
                args,
                retry,
            } => {
                append_proxy(engine, ctx, index, &activity, args, 1, retry.as_ref()).await?;
            }
        }
    }
    Ok(())
}

async fn append_proxy<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    index: u32,
    activity: &str,
    args: Value,
    attempt: u32,
    retry: Option<&RetryPolicy>,
) -> Result<(), EngineError> {
    let workflow_topic = ctx.activity.subtype.clone().ok_or_else(|| {
        EngineError::Malformed(format!("reentrant worker {} has no topic", ctx.activity.aid))
    })?;
    let proxy_topic = format!("{workflow_topic}{ACTIVITY_TOPIC_SUFFIX}");

    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: Some(proxy_topic.clone()),
            jid: Some(ctx.jid.clone()),
            gid: Some(ctx.gid.clone()),
            dad: Some(ctx.dad.to_string()),
            aid: ctx.activity.aid.clone(),
            trc: None,
            spn: None,
            attempt,
            awaits: None,
        },
        message_type: Some(hm_core::StreamMessageType::Worker),
        data: json!({"index": index, "activity": activity, "args": args, "retry": retry}),
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    engine.store().append_worker(&proxy_topic, &msg).await?;
    Ok(())
}

/// Record one resolved dependency and re-invoke the frame when the
/// batch (if any) is drained.
async fn resolve<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    index: u32,
    value: &Value,
) -> Result<(), EngineError> {
    write_replay(engine, &ctx.jid, index, value).await?;
    settle_one(engine, ctx).await
}

async fn write_replay<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    jid: &JobId,
    index: u32,
    value: &Value,
) -> Result<(), EngineError> {
    engine
        .store()
        .set_ledger_fields(
            jid,
            HashMap::from([(replay_field("", index), Serializer::to_string(value))]),
        )
        .await?;
    Ok(())
}

/// Decrement the composite countdown; re-invoke at zero (or when no
/// countdown exists).
async fn settle_one<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let store = engine.store();
    let field = countdown_field(&ctx.dad);
    let key_fields = store
        .ledger_fields_with_prefix(&ctx.jid, &field)
        .await?;
    if key_fields.is_empty() {
        return reinvoke(engine, ctx).await;
    }
    let post = store
        .provider()
        .hincrby(&store.keys().job(&ctx.jid), &field, -1)
        .await?;
    if post <= 0 {
        return reinvoke(engine, ctx).await;
    }
    Ok(())
}

/// Re-enter the workflow frame under the next dimension.
async fn reinvoke<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let store = engine.store();
    let ordinal = store
        .incr_ledger_field(&ctx.jid, &activities::dimension_counter_field(&ctx.activity.aid))
        .await? as u32;
    let next = LegCtx {
        dad: Dimension::at(ordinal),
        ..ctx.clone()
    };
    let topic = next.activity.subtype.clone().ok_or_else(|| {
        EngineError::Malformed(format!("reentrant worker {} has no topic", next.activity.aid))
    })?;
    activities::worker::append_invocation(engine, &next, &topic, Value::Null).await
}

/// A workflow sleep timer fired.
pub(crate) async fn resolve_sleep<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    index: u32,
) -> Result<(), EngineError> {
    if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
        return Ok(());
    }
    resolve(engine, ctx, index, &Value::Null).await
}

/// A proxy-retry timer fired: re-append the stored invocation.
pub(crate) async fn retry_proxy<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    index: u32,
    stored: &Value,
) -> Result<(), EngineError> {
    let attempt = stored
        .get("attempt")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    if activities::notarize(engine, ctx, &format!("retry:{index}:{attempt}")).await? {
        return Ok(());
    }
    let activity = stored
        .get("activity")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let args = stored.get("args").cloned().unwrap_or(Value::Null);
    let retry: Option<RetryPolicy> = stored
        .get("retry")
        .and_then(|r| serde_json::from_value(r.clone()).ok());
    append_proxy(engine, ctx, index, &activity, args, attempt, retry.as_ref()).await
}

/// A waited-for signal arrived.
pub(crate) async fn resolve_wait<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let index = msg
        .data
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as u32)
        .ok_or_else(|| EngineError::Malformed("signal delivery without index".to_string()))?;
    if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
        return Ok(());
    }
    let payload = msg.data.get("data").cloned().unwrap_or(Value::Null);
    if let (Some(topic), Some(resolved)) = (
        msg.data.get("topic").and_then(Value::as_str),
        msg.data.get("resolved").and_then(Value::as_str),
    ) {
        engine
            .store()
            .delete_web_hook(topic, resolved, Some(&ctx.jid))
            .await?;
    }
    resolve(engine, ctx, index, &payload).await
}

/// An awaited child reported its result.
pub(crate) async fn resolve_child<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let index = msg
        .data
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as u32)
        .ok_or_else(|| EngineError::Malformed("child result without index".to_string()))?;
    if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
        return Ok(());
    }
    let output = msg.data.get("output").cloned().unwrap_or(Value::Null);
    let value = if matches!(msg.status, Some(StreamStatus::Error)) {
        error_record(msg.code.unwrap_or(code::UNKNOWN), &output)
    } else {
        output
    };
    resolve(engine, ctx, index, &value).await
}

/// A proxied activity responded.
pub(crate) async fn resolve_proxy<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let index = msg
        .data
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as u32)
        .ok_or_else(|| EngineError::Malformed("proxy response without index".to_string()))?;

    if !matches!(msg.status, Some(StreamStatus::Error)) {
        if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
            return Ok(());
        }
        let result = msg.data.get("result").cloned().unwrap_or(Value::Null);
        return resolve(engine, ctx, index, &result).await;
    }

    let response_code = msg.code.unwrap_or(code::UNKNOWN);
    if response_code == code::WF_FATAL {
        if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
            return Ok(());
        }
        return resolve(engine, ctx, index, &error_record(code::WF_FATAL, &msg.data)).await;
    }

    // Retryable proxy failure: graduated re-attempts up to the policy
    // ceiling, then a maxed-out (597) replay record. The next attempt is
    // scheduled through the time-hook set at the policy's backoff delay.
    let retry: Option<RetryPolicy> = msg
        .data
        .get("retry")
        .and_then(|r| serde_json::from_value(r.clone()).ok());
    let policy = retry.clone().unwrap_or_default();
    let max_attempts = policy.attempts(engine.config());
    let attempts = engine
        .store()
        .incr_ledger_field(&ctx.jid, &proxy_attempt_field(index))
        .await? as u32;
    if attempts < max_attempts {
        let delay = policy.next_delay_secs(attempts, engine.config());
        let record = TimeHookRecord {
            jid: ctx.jid.clone(),
            gid: ctx.gid.clone(),
            aid: ctx.activity.aid.clone(),
            dad: ctx.dad.clone(),
            kind: TimeHookKind::Retry,
            index: Some(index),
            payload: Some(json!({
                "activity": msg.data.get("activity").cloned().unwrap_or(Value::Null),
                "args": msg.data.get("args").cloned().unwrap_or(Value::Null),
                "retry": retry,
                "attempt": attempts + 1,
            })),
        };
        engine
            .store()
            .register_time_hook(&record, engine.clock().epoch_secs() + delay)
            .await?;
        return Ok(());
    }
    if activities::notarize(engine, ctx, &format!("wake:{index}")).await? {
        return Ok(());
    }
    resolve(engine, ctx, index, &error_record(code::WF_MAXED, &msg.data)).await
}

/// Final (non-interruption) host response: merge the returned value and
/// finish the frame's leg.
pub(crate) async fn finish<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let response_code = msg.code.unwrap_or(code::SUCCESS);
    let duplicate = activities::notarize(engine, ctx, "leg2").await?;

    if response_code == code::SUCCESS {
        if !duplicate {
            activities::write_record(engine, ctx, "output", msg.data.clone(), Some(response_code))
                .await?;
            let response = msg.data.get("response").cloned().unwrap_or(Value::Null);
            let merged = match response {
                Value::Object(_) => response,
                other => json!({ "response": other }),
            };
            engine.store().merge_job_data(&ctx.jid, &merged).await?;
            activities::apply_job_maps(engine, ctx).await?;
        }
        activities::run_step_protocol(engine, ctx, "leg2").await?;
        return Ok(());
    }

    // 599 retryable user errors re-run the whole frame up to the
    // meshflow attempt ceiling; everything else is terminal.
    if response_code == code::WF_RETRYABLE {
        let attempts = engine
            .store()
            .incr_ledger_field(&ctx.jid, "-try-host-")
            .await? as u32;
        if attempts < engine.config().meshflow_max_attempts {
            return retry_frame(engine, ctx).await;
        }
        let message = error_message(&msg.data, "workflow retries exhausted");
        return activities::fail_job(
            engine,
            &ctx.jid,
            JobError::new(code::WF_MAXED, message).with_job(ctx.jid.clone()),
        )
        .await;
    }

    let message = error_message(&msg.data, "workflow failed");
    activities::fail_job(
        engine,
        &ctx.jid,
        JobError::new(response_code, message).with_job(ctx.jid.clone()),
    )
    .await
}

async fn retry_frame<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    reinvoke(engine, ctx).await
}

fn error_record(error_code: u16, payload: &Value) -> Value {
    json!({"$error": {"code": error_code, "message": payload.get("message").cloned().unwrap_or(Value::Null), "data": payload}})
}

fn error_message(data: &Value, fallback: &str) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
