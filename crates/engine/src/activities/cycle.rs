// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle activity: back-edge to an ancestor under a fresh dimension.
//!
//! Cycles never reuse activity records; each traversal allocates the next
//! dimensional suffix and the prior occurrence's output stays addressable
//! under its old dad.

use super::LegCtx;
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::{Clock, Dimension, StreamData, StreamMessageType};
use hm_providers::Provider;
use serde_json::{json, Value};

/// Single leg: allocate the next dimension and re-enter the ancestor.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;

    let ancestor = ctx.activity.ancestor.clone().ok_or_else(|| {
        EngineError::Malformed(format!("cycle {} has no ancestor", ctx.activity.aid))
    })?;

    let store = engine.store();
    // One counter per ancestor keeps re-entry dimensions monotonic even
    // when several cycle activities target the same pivot.
    let reentry_dad = if super::notarize(engine, ctx, "fx:leg1").await? || duplicate {
        // Redelivery: the transition either fired or the edge guard below
        // will short-circuit; recompute nothing.
        None
    } else {
        let ordinal = store
            .incr_ledger_field(&ctx.jid, &super::dimension_counter_field(&ancestor))
            .await? as u32;
        Some(Dimension::at(ordinal))
    };

    if let Some(new_dad) = &reentry_dad {
        super::write_record(
            engine,
            ctx,
            "output",
            json!({"ancestor": ancestor.as_str(), "dimension": new_dad.as_str()}),
            None,
        )
        .await?;

        let msg = StreamData {
            metadata: hm_core::StreamMetadata {
                guid: engine.next_guid(),
                topic: None,
                jid: Some(ctx.jid.clone()),
                gid: Some(ctx.gid.clone()),
                dad: Some(new_dad.to_string()),
                aid: ancestor.clone(),
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
        store.append_engine(&msg).await?;
    }

    // Grant the ancestor's re-entry credit, consume this leg's: net zero.
    if store
        .collate(&ctx.jid, &ctx.activity.aid, &ctx.dad, "s:leg1")
        .await?
        == 1.0
    {
        let post = store.adjust_status(&ctx.jid, 0).await?;
        if post == 0 {
            super::try_complete(engine, &ctx.jid).await?;
        }
    }
    Ok(())
}
