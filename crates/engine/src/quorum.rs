// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quorum control plane.
//!
//! Engines and workers exchange presence, throttle, and version-activation
//! messages over a shared pub/sub channel. Version activation requires
//! clean ping/pong cycles before the active-version pointer flips.

use crate::engine::Engine;
use crate::error::EngineError;
use hm_core::{Clock, QuorumMessage, QuorumProfile};
use hm_providers::Provider;
use parking_lot::Mutex;
use std::time::Duration;

/// Live quorum observations for one engine.
#[derive(Default)]
pub(crate) struct QuorumState {
    pongs: Mutex<Vec<QuorumProfile>>,
}

impl QuorumState {
    fn clear(&self) {
        self.pongs.lock().clear();
    }

    fn record(&self, profile: QuorumProfile) {
        self.pongs.lock().push(profile);
    }

    fn drain(&self) -> Vec<QuorumProfile> {
        std::mem::take(&mut *self.pongs.lock())
    }
}

/// Publish a control-plane message on the quorum channel.
pub(crate) async fn publish<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: &QuorumMessage,
) -> Result<u64, EngineError> {
    let channel = engine.store().keys().quorum();
    let payload = serde_json::to_string(msg)?;
    Ok(engine.store().provider().publish(&channel, &payload).await?)
}

/// Listen for quorum messages until shutdown.
pub(crate) async fn run_listener<P: Provider, C: Clock>(engine: Engine<P, C>) {
    let channel = engine.store().keys().quorum();
    let mut sub = engine.store().provider().subscribe(&channel);
    let mut shutdown = engine.shutdown_rx();
    loop {
        let message = tokio::select! {
            m = sub.recv() => m,
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
                continue;
            }
        };
        let Some(message) = message else { break };
        let parsed: QuorumMessage = match serde_json::from_str(&message.payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable quorum message");
                continue;
            }
        };
        if let Err(e) = handle(&engine, parsed).await {
            tracing::error!(error = %e, "quorum message handling failed");
        }
    }
}

async fn handle<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    msg: QuorumMessage,
) -> Result<(), EngineError> {
    match msg {
        QuorumMessage::Ping { requestor } => {
            let profile = self_profile(engine).await;
            publish(engine, &QuorumMessage::Pong { requestor, profile }).await?;
        }
        QuorumMessage::Pong { profile, .. } => {
            engine.inner.quorum.record(profile);
        }
        QuorumMessage::Activate { until_version, .. } => {
            engine.apply_version(&until_version).await?;
        }
        QuorumMessage::Throttle { options } => {
            let targeted_elsewhere = options
                .guid
                .as_deref()
                .map(|guid| guid != engine.id().as_str())
                .unwrap_or(false);
            if !targeted_elsewhere {
                engine.inner.throttles.apply(&options);
            }
        }
        QuorumMessage::Rollcall { requestor, .. } => {
            let profile = self_profile(engine).await;
            publish(engine, &QuorumMessage::Pong { requestor, profile }).await?;
        }
        QuorumMessage::Job { completion } => {
            engine.deliver_completion(completion);
        }
        QuorumMessage::Custom => {}
    }
    Ok(())
}

/// Presence profile: stream depth feeds operator backpressure decisions.
async fn self_profile<P: Provider, C: Clock>(engine: &Engine<P, C>) -> QuorumProfile {
    let stream_depth = engine
        .store()
        .provider()
        .xlen(&engine.store().engine_stream())
        .await
        .unwrap_or(0);
    let app_version = engine
        .inner
        .app
        .read()
        .as_ref()
        .map(|app| app.version.clone());
    let worker_topic = engine.inner.workers.lock().keys().next().cloned();
    QuorumProfile {
        engine_id: engine.id().clone(),
        stream_depth,
        worker_topic,
        app_version,
    }
}

/// Census: ping the mesh and collect one delay window of pongs.
pub(crate) async fn roll_call<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    max: Option<u32>,
) -> Result<Vec<QuorumProfile>, EngineError> {
    engine.inner.quorum.clear();
    publish(
        engine,
        &QuorumMessage::Rollcall {
            requestor: engine.id().clone(),
            max,
            interval_secs: None,
        },
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(engine.config().quorum_delay_ms)).await;
    let mut profiles = engine.inner.quorum.drain();
    if let Some(max) = max {
        profiles.truncate(max as usize);
    }
    Ok(profiles)
}

/// No-downtime version activation.
///
/// Requires `HMSH_QUORUM_ROLLCALL_CYCLES` clean ping/pong cycles spaced
/// `HMSH_QUORUM_DELAY_MS` apart; retries whole rounds up to
/// `HMSH_ACTIVATION_MAX_RETRY` before giving up. On success the active
/// pointer flips, peers invalidate their graph caches, and this engine
/// swaps its own cache.
pub(crate) async fn activate<P: Provider, C: Clock>(
    engine: &Engine<P, C>,
    version: &str,
) -> Result<(), EngineError> {
    // Ensure the manifest exists before coordinating.
    engine.store().load_app(version).await?;

    let cycles = engine.config().quorum_rollcall_cycles.max(1);
    let delay = Duration::from_millis(engine.config().quorum_delay_ms);

    for round in 0..engine.config().activation_max_retry.max(1) {
        let mut healthy = true;
        for _ in 0..cycles {
            engine.inner.quorum.clear();
            publish(
                engine,
                &QuorumMessage::Ping {
                    requestor: engine.id().clone(),
                },
            )
            .await?;
            tokio::time::sleep(delay).await;
            if engine.inner.quorum.drain().is_empty() {
                healthy = false;
                break;
            }
        }
        if healthy {
            engine.store().activate_version(version).await?;
            publish(
                engine,
                &QuorumMessage::Activate {
                    cache_mode: "nocache".to_string(),
                    until_version: version.to_string(),
                },
            )
            .await?;
            engine.apply_version(version).await?;
            return Ok(());
        }
        tracing::warn!(version, round, "activation round failed, retrying");
    }
    Err(EngineError::VersionNotActive(version.to_string()))
}

#[cfg(test)]
#[path = "quorum_tests.rs"]
mod tests;
