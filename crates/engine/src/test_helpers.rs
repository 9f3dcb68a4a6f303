// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the engine crate.

use crate::engine::{Engine, EngineOptions};
use hm_core::{App, AppId, FakeClock, HmshConfig};
use hm_providers::MemoryProvider;

/// Convenience alias for the fully-typed test engine.
pub(crate) type TestEngine = Engine<MemoryProvider<FakeClock>, FakeClock>;

/// Test config: tight read blocks and single-cycle quorum so loops stay
/// responsive under the single-threaded test runtime.
pub(crate) fn test_config() -> HmshConfig {
    HmshConfig {
        block_time_ms: 25,
        fidelity_seconds: 1,
        quorum_delay_ms: 25,
        quorum_rollcall_cycles: 1,
        activation_max_retry: 1,
        // Keep completed hashes alive for post-completion assertions
        expire_job_seconds: 3_600,
        ..HmshConfig::default()
    }
}

/// Build a started engine over a fresh in-memory provider with the app
/// deployed.
pub(crate) async fn started_engine(app: App) -> (TestEngine, FakeClock) {
    let clock = FakeClock::new();
    let provider = MemoryProvider::new(clock.clone());
    let engine = Engine::new(
        provider,
        clock.clone(),
        EngineOptions {
            namespace: "test".to_string(),
            app: AppId::new("test"),
            config: test_config(),
        },
    );
    engine.start().await.unwrap();
    engine.deploy(app).await.unwrap();
    (engine, clock)
}

/// Poll until `probe` returns true or the budget elapses.
pub(crate) async fn wait_until<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
