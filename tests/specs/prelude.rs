//! Shared harness for behavioral specs.

use hm_core::{App, AppId, HmshConfig, SystemClock};
use hm_engine::{Engine, EngineOptions};
use hm_providers::MemoryProvider;
use std::sync::Once;

pub type SpecEngine = Engine<MemoryProvider<SystemClock>, SystemClock>;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = std::env::var("HMSH_LOGLEVEL").unwrap_or_else(|_| "warn".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    });
}

/// Spec config: one-second timer fidelity, tight stream reads, and a
/// single-cycle quorum so activation completes quickly.
pub fn spec_config() -> HmshConfig {
    HmshConfig {
        block_time_ms: 25,
        fidelity_seconds: 1,
        quorum_delay_ms: 25,
        quorum_rollcall_cycles: 1,
        activation_max_retry: 1,
        expire_job_seconds: 3_600,
        ..HmshConfig::default()
    }
}

/// A started engine over a fresh in-memory provider with `app` deployed.
pub async fn spec_engine(app: App) -> SpecEngine {
    init_tracing();
    let provider = MemoryProvider::default();
    let engine = Engine::new(
        provider,
        SystemClock,
        EngineOptions {
            namespace: "spec".to_string(),
            app: AppId::new("spec"),
            config: spec_config(),
        },
    );
    engine.start().await.unwrap();
    engine.deploy(app).await.unwrap();
    engine
}

/// A second engine over the same provider (multi-engine mesh specs).
pub async fn join_engine(peer: &SpecEngine) -> SpecEngine {
    let engine = Engine::new(
        peer.store().provider().clone(),
        SystemClock,
        EngineOptions {
            namespace: "spec".to_string(),
            app: AppId::new("spec"),
            config: spec_config(),
        },
    );
    engine.start().await.unwrap();
    engine.sync_active_version().await.unwrap();
    engine
}

/// Poll until `probe` returns true or ~8 seconds elapse.
pub async fn wait_until<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}
