// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal activity: fans a payload out to every job parked on the
//! resolved signal key.

use super::LegCtx;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::task;
use hm_core::{Clock, StreamData};
use hm_providers::Provider;
use serde_json::{json, Value};

/// Single leg: resolve the key, deliver to every parked occurrence,
/// optionally scrub the index, then proceed.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
    msg: &StreamData,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;

    let topic = ctx.activity.subtype.clone().ok_or_else(|| {
        EngineError::Malformed(format!("signal {} has no topic", ctx.activity.aid))
    })?;

    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let input = super::map_input(&ctx.activity, &context, &msg.data)?;
    super::write_record(engine, ctx, "input", input.clone(), None).await?;

    let key = input
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::Malformed(format!("signal {} input has no key", ctx.activity.aid))
        })?
        .to_string();
    let payload = input.get("data").cloned().unwrap_or(Value::Null);
    let scrub = input.get("scrub").and_then(Value::as_bool).unwrap_or(false);

    let mut delivered: Vec<String> = Vec::new();
    if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
        let targets = engine.store().resolve_web_hooks(&topic, &key).await?;
        for target in &targets {
            task::deliver_signal(engine, &topic, &key, target, payload.clone()).await?;
            delivered.push(target.jid.to_string());
        }
        if scrub {
            engine.store().delete_web_hook(&topic, &key, None).await?;
        }
    }

    super::write_record(engine, ctx, "output", json!({"targets": delivered}), None).await?;
    if !duplicate {
        super::apply_job_maps(engine, ctx).await?;
    }
    super::run_step_protocol(engine, ctx, "leg2").await?;
    Ok(())
}
