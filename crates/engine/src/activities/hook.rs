// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook activity: three sub-modes decided at runtime from the resolved
//! configuration — time-hook (sleep), web-hook (topic), or pass-through.

use super::LegCtx;
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::codes::code;
use hm_core::{Clock, StreamData};
use hm_pipe::Pipe;
use hm_providers::Provider;
use hm_store::{TimeHookKind, TimeHookRecord, WebHookTarget};
use serde_json::{json, Value};

/// Leg 1: register the dependency (timer or signal index) or collapse
/// into a single leg when neither is configured.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;
    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let input = super::map_input(&ctx.activity, &context, &Value::Null)?;
    super::write_record(engine, ctx, "input", input.clone(), None).await?;

    let hook = ctx.activity.hook.clone().unwrap_or_default();

    if let Some(sleep_expr) = &hook.sleep {
        let seconds = resolve_sleep_seconds(sleep_expr, &context)?;
        super::write_record(engine, ctx, "settings", json!({"sleep": seconds}), None).await?;
        if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
            let record = TimeHookRecord {
                jid: ctx.jid.clone(),
                gid: ctx.gid.clone(),
                aid: ctx.activity.aid.clone(),
                dad: ctx.dad.clone(),
                kind: TimeHookKind::Sleep,
                index: None,
                payload: None,
            };
            engine
                .store()
                .register_time_hook(&record, engine.clock().epoch_secs() + seconds)
                .await?;
        }
        return Ok(()); // parks until the timer fires
    }

    if let Some(topic) = &hook.topic {
        let resolved = resolve_registration_key(engine, ctx, topic, &input, &context)?;
        super::write_record(
            engine,
            ctx,
            "settings",
            json!({"topic": topic, "resolved": resolved}),
            None,
        )
        .await?;
        if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
            let target = WebHookTarget {
                jid: ctx.jid.clone(),
                dad: ctx.dad.clone(),
                index: None,
            };
            engine
                .store()
                .register_web_hook(topic, &resolved, &target, engine.config().signal_expire_secs)
                .await?;
        }
        return Ok(()); // parks until the signal arrives
    }

    // Pass-through: early completion notarization collapses both legs.
    super::write_record(engine, ctx, "output", input, None).await?;
    if !duplicate {
        super::apply_job_maps(engine, ctx).await?;
    }
    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}

/// Leg 2 wake from the task service's time-hook scout.
pub(crate) async fn on_timer<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg2").await?;
    if !duplicate {
        super::write_record(
            engine,
            ctx,
            "output",
            json!({"awoken": engine.clock().epoch_secs()}),
            None,
        )
        .await?;
        super::apply_job_maps(engine, ctx).await?;
    }
    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}

/// Leg 2 wake from an external web-hook signal (or a signal activity's
/// fan-out).
///
/// Repeated deliveries are legal while the registration is kept alive,
/// so the dedup key is the delivery guid, not the leg. Processing that
/// resolves to 200 consumes the index entry and advances; 202 absorbs
/// the payload and keeps the entry alive for another delivery.
pub(crate) async fn on_signal<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let duplicate =
        super::notarize(engine, ctx, &format!("leg2:{}", msg.metadata.guid)).await?;
    let payload = msg.data.get("data").cloned().unwrap_or(Value::Null);
    if !duplicate {
        super::write_record(engine, ctx, "hook", payload.clone(), None).await?;
        super::write_record(engine, ctx, "output", payload, None).await?;
        super::apply_job_maps(engine, ctx).await?;
    }

    let delivery_code = completion_code(engine, ctx).await?;
    if delivery_code == code::PENDING {
        // Accepted but still parked; the index entry survives.
        return Ok(());
    }

    if !duplicate {
        if let (Some(topic), Some(resolved)) = (
            msg.data.get("topic").and_then(Value::as_str),
            msg.data.get("resolved").and_then(Value::as_str),
        ) {
            engine
                .store()
                .delete_web_hook(topic, resolved, Some(&ctx.jid))
                .await?;
        }
    }
    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}

/// Resolve the web-hook delivery's completion code from the hook's
/// `code` expression against job context (the delivery's payload is
/// already written, so the expression can inspect it). Defaults to 200.
async fn completion_code<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<u16, EngineError> {
    let Some(expr) = ctx.activity.hook.as_ref().and_then(|h| h.code.clone()) else {
        return Ok(code::SUCCESS);
    };
    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    Ok(match Pipe::resolve(&expr, &context)? {
        Value::Number(n) => n.as_u64().unwrap_or(code::SUCCESS as u64) as u16,
        Value::String(s) => s.parse().unwrap_or(code::SUCCESS),
        _ => code::SUCCESS,
    })
}

/// Sleep expressions resolve to whole seconds: a number literal, a
/// textual duration, or a pipe expression yielding either.
fn resolve_sleep_seconds(expr: &Value, context: &Value) -> Result<u64, EngineError> {
    let resolved = Pipe::resolve(expr, context)?;
    match &resolved {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        Value::String(text) => Ok(hm_core::parse_duration(text)?),
        other => Err(EngineError::Malformed(format!(
            "sleep expression resolved to {other}"
        ))),
    }
}

/// Registration-time signal key.
///
/// A mapped input naming `key` wins; otherwise the graph's hook rule
/// resolver runs with the mapped input standing in as the hook payload,
/// so registration and delivery agree on the same expression.
fn resolve_registration_key<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    topic: &str,
    input: &Value,
    context: &Value,
) -> Result<String, EngineError> {
    if let Some(key) = input.get("key") {
        if !key.is_null() {
            return Ok(stringify(key));
        }
    }

    let resolver = engine.with_app(|app| {
        Ok(app
            .find_hook_rule(topic)
            .map(|(_, rule)| rule.resolver.clone()))
    })?;
    let Some(resolver) = resolver else {
        return Ok(stringify(input));
    };

    let mut extended = context.clone();
    if let Value::Object(map) = &mut extended {
        map.insert("$self".to_string(), json!({"hook": {"data": input}}));
    }
    let resolved = Pipe::resolve(&resolver, &extended)?;
    if resolved.is_null() {
        return Err(EngineError::Malformed(format!(
            "hook rule for {topic} resolved no key for {}",
            ctx.jid
        )));
    }
    Ok(stringify(&resolved))
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
