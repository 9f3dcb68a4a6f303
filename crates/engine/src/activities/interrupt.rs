// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interrupt activity and the engine-wide interrupt operation.
//!
//! Self-interrupt ends the owning job with a 410; a targeted interrupt
//! fires best-effort at another jid and then proceeds through the step
//! protocol. `descend` walks child links recursively.

use super::{LegCtx, INTERRUPT_FIELD};
use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::codes::code;
use hm_core::{Clock, InterruptConfig, JobError, JobId, StreamData};
use hm_pipe::Pipe;
use hm_providers::Provider;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Single leg for the interrupt activity kind.
pub(crate) async fn leg1<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    ctx: &LegCtx,
) -> Result<(), EngineError> {
    let duplicate = super::notarize(engine, ctx, "leg1").await?;
    let options = ctx.activity.interrupt.clone().unwrap_or_default();

    let context = engine.store().get_job_context(&ctx.jid, &ctx.dad).await?;
    let target = match &options.target {
        Some(expr) => match Pipe::resolve(expr, &context)? {
            Value::String(jid) if !jid.is_empty() => Some(JobId::new(jid)),
            Value::Null => None,
            other => {
                return Err(EngineError::Malformed(format!(
                    "interrupt target resolved to {other}"
                )))
            }
        },
        None => None,
    };

    match target {
        Some(target_jid) => {
            // Best-effort: a missing target does not fail this job.
            if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
                if let Err(e) = interrupt_job(engine, &target_jid, &options).await {
                    tracing::warn!(target = %target_jid, error = %e, "targeted interrupt failed");
                }
            }
            super::write_record(
                engine,
                ctx,
                "output",
                serde_json::json!({"interrupted": target_jid.as_str()}),
                None,
            )
            .await?;
            if !duplicate {
                super::apply_job_maps(engine, ctx).await?;
            }
            super::run_step_protocol(engine, ctx, "leg2").await?;
            Ok(())
        }
        None => {
            // Self-interrupt: the job ends here.
            if !duplicate && !super::notarize(engine, ctx, "fx:leg1").await? {
                interrupt_job(engine, &ctx.jid, &options).await?;
            }
            Ok(())
        }
    }
}

/// Interrupt messages arriving over the stream (cross-engine and
/// dead-letter routing).
pub(crate) async fn on_message<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: StreamData,
) -> Result<(), EngineError> {
    let jid = msg
        .metadata
        .jid
        .clone()
        .ok_or_else(|| EngineError::Malformed("interrupt without jid".to_string()))?;
    let options: InterruptConfig = serde_json::from_value(msg.data).unwrap_or_default();
    interrupt_job(engine, &jid, &options).await
}

/// Terminate a job: negative semaphore, optional 410 error, completion
/// publication, child descent, and expiry per options.
pub(crate) fn interrupt_job<'a, P: Provider, C: Clock>(
    engine: &'a Engine<P, C>,
    jid: &'a JobId,
    options: &'a InterruptConfig,
) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
    Box::pin(async move {
        let store = engine.store();
        let status = match store.get_status(jid).await {
            Ok(s) => s,
            Err(hm_store::StoreError::JobNotFound(j)) => {
                return Err(EngineError::InactiveJob(j))
            }
            Err(e) => return Err(EngineError::Store(e)),
        };
        if status <= 0 {
            // Already complete or interrupted; nothing to stop.
            return Ok(());
        }

        store
            .set_ledger_fields(
                jid,
                HashMap::from([(INTERRUPT_FIELD.to_string(), serde_json::to_string(options)?)]),
            )
            .await?;

        // `throw: false` suppresses the error payload so waiters resolve
        // with the job's final data instead.
        if options.throw.unwrap_or(true) {
            let reason = options
                .reason
                .clone()
                .unwrap_or_else(|| "interrupted".to_string());
            let error = JobError::new(code::INTERRUPTED, reason).with_job(jid.clone());
            store
                .set_metadata_fields(jid, &[("err", serde_json::to_string(&error)?)])
                .await?;
        }
        store.set_status(jid, -1).await?;
        super::try_complete(engine, jid).await?;

        if options.descend {
            let children = store
                .ledger_fields_with_prefix(jid, "-child:")
                .await?;
            for field in children.keys() {
                let child = JobId::new(field.trim_start_matches("-child:"));
                if let Err(e) = interrupt_job(engine, &child, options).await {
                    if !e.is_swallowed() {
                        tracing::warn!(child = %child, error = %e, "descend interrupt failed");
                    }
                }
            }
        }

        match options.expire {
            Some(0) => {
                store.delete_job(jid).await?;
            }
            Some(secs) => {
                store.expire_job(jid, secs).await?;
            }
            None => {
                store
                    .expire_job(jid, engine.config().expire_job_seconds)
                    .await?;
            }
        }
        Ok(())
    })
}
