// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task service: time-hooks and web-hooks.
//!
//! A scout loop per engine wakes every `HMSH_FIDELITY_SECONDS`, pops due
//! timer entries, and appends wake transitions. Incoming web-hook signals
//! resolve through the registered index to the parked `(jid, aid, dad)`
//! tuples; unresolvable signals are ignored (idempotent).

use crate::activities;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::flow::{self, WFS_SIGNAL_TOPIC};
use hm_core::{ActivityId, Clock, JobId, StreamData, StreamMessageType};
use hm_pipe::Pipe;
use hm_providers::Provider;
use hm_store::{TimeHookKind, TimeHookRecord, WebHookTarget};
use serde_json::{json, Value};
use std::time::Duration;

/// Periodic sweep of the time-hook sorted set. Sweeps at the fidelity
/// cadence; a failing backend backs the loop off to the scout interval.
pub(crate) async fn run_scout<P: Provider, C: Clock>(engine: Engine<P, C>) {
    let mut shutdown = engine.shutdown_rx();
    let fidelity = Duration::from_secs(engine.config().fidelity_seconds.max(1));
    let backoff = Duration::from_secs(engine.config().scout_interval_seconds.max(1));
    let mut next_sleep = fidelity;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(next_sleep) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
                continue;
            }
        }
        next_sleep = match sweep(&engine).await {
            Ok(_) => fidelity,
            Err(e) => {
                tracing::error!(error = %e, "time-hook sweep failed, backing off");
                backoff
            }
        };
    }
}

/// Pop due entries and append their wake transitions. Removal from the
/// sorted set is the cross-engine claim, so each timer fires once.
pub(crate) async fn sweep<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
) -> Result<usize, EngineError> {
    let now_secs = engine.clock().epoch_secs();
    let due = engine.store().pop_due_time_hooks(now_secs).await?;
    let fired = due.len();
    for record in due {
        let msg = StreamData {
            metadata: hm_core::StreamMetadata {
                guid: engine.next_guid(),
                topic: None,
                jid: Some(record.jid.clone()),
                gid: Some(record.gid.clone()),
                dad: Some(record.dad.to_string()),
                aid: record.aid.clone(),
                trc: None,
                spn: None,
                attempt: 0,
                awaits: None,
            },
            message_type: Some(StreamMessageType::Timehook),
            data: serde_json::to_value(&record)?,
            policies: None,
            status: None,
            code: None,
            stack: None,
        };
        engine.store().append_engine(&msg).await?;
    }
    Ok(fired)
}

/// Engine-stream handler for fired time-hooks.
pub(crate) async fn on_timehook<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: StreamData,
) -> Result<(), EngineError> {
    let record: TimeHookRecord = serde_json::from_value(msg.data.clone())
        .map_err(|e| EngineError::Malformed(format!("time-hook record: {e}")))?;
    let ctx = activities::resolve_ctx(engine, &msg).await?;

    match (record.kind, record.index) {
        (TimeHookKind::Sleep, Some(index)) if ctx.activity.reentrant => {
            flow::resolve_sleep(engine, &ctx, index).await
        }
        (TimeHookKind::Retry, Some(index)) => {
            let stored = record.payload.clone().unwrap_or(Value::Null);
            flow::retry_proxy(engine, &ctx, index, &stored).await
        }
        (TimeHookKind::Retry, None) => Err(EngineError::Malformed(
            "retry wake without an execution index".to_string(),
        )),
        (TimeHookKind::Sleep, _) | (TimeHookKind::Cycle, _) => {
            activities::hook::on_timer(engine, &ctx).await
        }
    }
}

/// Deliver one signal payload to a parked occurrence (signal-activity
/// fan-out path).
pub(crate) async fn deliver_signal<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    resolved: &str,
    target: &WebHookTarget,
    payload: Value,
) -> Result<String, EngineError> {
    let aid = signal_target_aid(engine, target, topic).await?;
    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: Some(topic.to_string()),
            jid: Some(target.jid.clone()),
            gid: None,
            dad: Some(target.dad.to_string()),
            aid,
            trc: None,
            spn: None,
            attempt: 0,
            awaits: None,
        },
        message_type: Some(StreamMessageType::Signal),
        data: json!({
            "topic": topic,
            "resolved": resolved,
            "data": payload,
            "index": target.index,
        }),
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    Ok(engine.store().append_engine(&msg).await?)
}

/// Deliver an external web-hook signal. Returns the appended stream id,
/// or an empty id when no target is parked (ignored, idempotent).
pub(crate) async fn process_web_hook<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    data: Value,
) -> Result<String, EngineError> {
    let resolved = resolve_delivery_key(engine, topic, &data)?;
    let targets = engine.store().resolve_web_hooks(topic, &resolved).await?;
    if targets.is_empty() {
        tracing::debug!(topic, resolved, "signal resolved no parked target, ignoring");
        return Ok(String::new());
    }

    let payload = data.get("data").cloned().unwrap_or(data.clone());
    let mut last_id = String::new();
    for target in &targets {
        last_id = deliver_web_hook(engine, topic, &resolved, target, payload.clone()).await?;
    }
    Ok(last_id)
}

/// Signal every parked job on the topic's resolved key, returning the
/// targeted jids.
pub(crate) async fn process_web_hook_all<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    data: Value,
) -> Result<Vec<JobId>, EngineError> {
    let resolved = resolve_delivery_key(engine, topic, &data)?;
    let targets = engine.store().resolve_web_hooks(topic, &resolved).await?;
    let payload = data.get("data").cloned().unwrap_or(data.clone());
    let mut jids = Vec::with_capacity(targets.len());
    for target in &targets {
        deliver_web_hook(engine, topic, &resolved, target, payload.clone()).await?;
        jids.push(target.jid.clone());
    }
    Ok(jids)
}

async fn deliver_web_hook<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    resolved: &str,
    target: &WebHookTarget,
    payload: Value,
) -> Result<String, EngineError> {
    let aid = signal_target_aid(engine, target, topic).await?;
    let msg = StreamData {
        metadata: hm_core::StreamMetadata {
            guid: engine.next_guid(),
            topic: Some(topic.to_string()),
            jid: Some(target.jid.clone()),
            gid: None,
            dad: Some(target.dad.to_string()),
            aid,
            trc: None,
            spn: None,
            attempt: 0,
            awaits: None,
        },
        message_type: Some(StreamMessageType::Webhook),
        data: json!({
            "topic": topic,
            "resolved": resolved,
            "data": payload,
            "index": target.index,
        }),
        policies: None,
        status: None,
        code: None,
        stack: None,
    };
    Ok(engine.store().append_engine(&msg).await?)
}

/// Delivery-time signal key: the hook rule's resolver runs against the
/// incoming payload; the workflow signal topic resolves on `id`.
fn resolve_delivery_key<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    topic: &str,
    data: &Value,
) -> Result<String, EngineError> {
    let resolver = engine.with_app(|app| {
        Ok(app
            .find_hook_rule(topic)
            .map(|(_, rule)| rule.resolver.clone()))
    })?;

    if let Some(resolver) = resolver {
        let context = json!({"$self": {"hook": {"data": data}}});
        let resolved = Pipe::resolve(&resolver, &context)?;
        if !resolved.is_null() {
            return Ok(stringify(&resolved));
        }
    }

    if topic == WFS_SIGNAL_TOPIC || topic.ends_with(&format!(".{WFS_SIGNAL_TOPIC}")) {
        return data
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Malformed("workflow signal without id".to_string()));
    }

    Err(EngineError::Malformed(format!(
        "no hook rule bound to topic {topic}"
    )))
}

/// The activity a signal wakes: the registered hook rule's target, or the
/// job's reentrant worker when the entry carries an execution index.
async fn signal_target_aid<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    target: &WebHookTarget,
    topic: &str,
) -> Result<ActivityId, EngineError> {
    if target.index.is_some() {
        let metadata = engine.store().get_metadata(&target.jid).await?;
        return engine.with_app(|app| {
            let graph = app.graph_by_topic(&metadata.tpc)?;
            graph
                .reentrant_worker()
                .map(|w| w.aid.clone())
                .ok_or_else(|| {
                    EngineError::Malformed(format!(
                        "job {} is not a reentrant workflow",
                        target.jid
                    ))
                })
        });
    }
    engine.with_app(|app| {
        app.find_hook_rule(topic)
            .map(|(_, rule)| rule.to.clone())
            .ok_or_else(|| {
                EngineError::Malformed(format!("no hook rule bound to topic {topic}"))
            })
    })
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
