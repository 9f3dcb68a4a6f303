// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::test_config;
use hm_core::{AppId, FakeClock, StreamPolicies, StreamRetrySpec, StreamStatus};
use hm_providers::MemoryProvider;
use parking_lot::Mutex as PlMutex;
use serde_json::json;
use tokio::sync::watch;

/// Recording handler: scripted outcomes per call, in order.
struct ScriptedHandler {
    outcomes: PlMutex<Vec<Outcome>>,
    handled: PlMutex<Vec<StreamData>>,
    delivered: PlMutex<Vec<StreamData>>,
    dead: PlMutex<Vec<(StreamData, u16)>>,
}

enum Outcome {
    Ok,
    Respond(u16, StreamStatus),
    Fail,
}

impl ScriptedHandler {
    fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: PlMutex::new(outcomes),
            handled: PlMutex::new(Vec::new()),
            delivered: PlMutex::new(Vec::new()),
            dead: PlMutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StreamHandler for ScriptedHandler {
    async fn handle(&self, msg: StreamData) -> Result<Option<StreamData>, EngineError> {
        self.handled.lock().push(msg.clone());
        let outcome = {
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                Outcome::Ok
            } else {
                outcomes.remove(0)
            }
        };
        match outcome {
            Outcome::Ok => Ok(None),
            Outcome::Respond(code, status) => {
                let mut response = msg;
                response.code = Some(code);
                response.status = Some(status);
                Ok(Some(response))
            }
            Outcome::Fail => Err(EngineError::GetState("scripted failure".to_string())),
        }
    }

    async fn deliver(&self, response: StreamData) -> Result<(), EngineError> {
        self.delivered.lock().push(response);
        Ok(())
    }

    async fn dead_letter(&self, msg: StreamData, code: u16) -> Result<(), EngineError> {
        self.dead.lock().push((msg, code));
        Ok(())
    }
}

struct Harness {
    store: Store<MemoryProvider<FakeClock>>,
    clock: FakeClock,
    shutdown: watch::Sender<bool>,
}

impl Harness {
    fn new() -> Self {
        let clock = FakeClock::new();
        let provider = MemoryProvider::new(clock.clone());
        let store = Store::new(provider, "test", AppId::new("test"));
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            clock,
            shutdown,
        }
    }

    fn spawn_router(&self, handler: Arc<dyn StreamHandler>, config: HmshConfig) {
        let router = StreamRouter::new(
            self.store.clone(),
            config,
            RouterConfig {
                stream: self.store.engine_stream(),
                group: "engine".to_string(),
                consumer: "c1".to_string(),
                topic: None,
            },
            Arc::new(crate::throttle::ThrottleRegistry::new()),
            self.shutdown.subscribe(),
        );
        tokio::spawn(router.run(handler));
    }

    async fn append(&self, msg: &StreamData) {
        self.store.append_engine(msg).await.unwrap();
    }
}

fn message() -> StreamData {
    StreamData::builder().build()
}

fn quick_config() -> HmshConfig {
    HmshConfig {
        block_time_ms: 10,
        initial_stream_backoff_ms: 1,
        max_stream_backoff_ms: 4,
        max_stream_retries: 2,
        ..test_config()
    }
}

async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
}

#[tokio::test]
async fn dispatches_and_acks_messages() {
    let harness = Harness::new();
    let handler = ScriptedHandler::new(vec![]);
    harness.spawn_router(handler.clone(), quick_config());

    harness.append(&message()).await;
    harness.append(&message()).await;
    settle().await;

    assert_eq!(handler.handled.lock().len(), 2);
    assert_eq!(harness.store.provider().pending_total(&harness.store.engine_stream()), 0);
}

#[tokio::test]
async fn handler_errors_retry_then_dead_letter() {
    let harness = Harness::new();
    // Fails on every delivery: 1 original + 2 retries, then dead-letter
    let handler = ScriptedHandler::new(vec![Outcome::Fail, Outcome::Fail, Outcome::Fail]);
    harness.spawn_router(handler.clone(), quick_config());

    harness.append(&message()).await;
    settle().await;

    let handled = handler.handled.lock();
    assert_eq!(handled.len(), 3, "original plus two retries");
    assert_eq!(handled[1].metadata.attempt, 1);
    assert_eq!(handled[2].metadata.attempt, 2);
    drop(handled);

    let dead = handler.dead.lock();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1, hm_core::codes::code::UNKNOWN);
}

#[tokio::test]
async fn response_retry_honors_message_policy() {
    let harness = Harness::new();
    let handler = ScriptedHandler::new(vec![
        Outcome::Respond(500, StreamStatus::Error),
        Outcome::Respond(500, StreamStatus::Error),
        Outcome::Respond(200, StreamStatus::Success),
    ]);
    harness.spawn_router(handler.clone(), quick_config());

    let mut msg = message();
    msg.policies = Some(StreamPolicies {
        retry: [("500".to_string(), StreamRetrySpec::Exponential((2, "x".to_string())))]
            .into_iter()
            .collect(),
    });
    harness.append(&msg).await;
    settle().await;

    assert_eq!(handler.handled.lock().len(), 3);
    let delivered = handler.delivered.lock();
    assert_eq!(delivered.len(), 1, "only the final success is delivered");
    assert_eq!(delivered[0].code, Some(200));
}

#[tokio::test]
async fn response_without_policy_is_delivered_as_is() {
    let harness = Harness::new();
    let handler = ScriptedHandler::new(vec![Outcome::Respond(500, StreamStatus::Error)]);
    harness.spawn_router(handler.clone(), quick_config());

    harness.append(&message()).await;
    settle().await;

    assert_eq!(handler.handled.lock().len(), 1);
    let delivered = handler.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].code, Some(500));
}

#[tokio::test]
async fn swallowed_errors_ack_without_retry() {
    let harness = Harness::new();
    struct Swallower;
    #[async_trait]
    impl StreamHandler for Swallower {
        async fn handle(&self, msg: StreamData) -> Result<Option<StreamData>, EngineError> {
            Err(EngineError::Collation {
                jid: msg.metadata.jid.unwrap_or_default(),
                aid: msg.metadata.aid.to_string(),
            })
        }
        async fn deliver(&self, _: StreamData) -> Result<(), EngineError> {
            Ok(())
        }
        async fn dead_letter(&self, _: StreamData, _: u16) -> Result<(), EngineError> {
            Ok(())
        }
    }
    harness.spawn_router(Arc::new(Swallower), quick_config());

    harness.append(&message()).await;
    settle().await;

    assert_eq!(
        harness.store.provider().pending_total(&harness.store.engine_stream()),
        0,
        "collation duplicates are acked and dropped"
    );
}

#[tokio::test]
async fn reclaims_stalled_message_from_dead_consumer() {
    let harness = Harness::new();
    let stream = harness.store.engine_stream();
    let provider = harness.store.provider().clone();

    // A dead consumer read the message and never acked
    provider.xgroup_create(&stream, "engine").await.unwrap();
    harness.append(&message()).await;
    let taken = provider
        .xread_group(&stream, "engine", "dead", 10, 0)
        .await
        .unwrap();
    assert_eq!(taken.len(), 1);
    harness.clock.advance(std::time::Duration::from_millis(120_000));

    let handler = ScriptedHandler::new(vec![]);
    let config = HmshConfig {
        xclaim_delay_ms: 1_000,
        ..quick_config()
    };
    harness.spawn_router(handler.clone(), config);
    // Reclaim runs every few reads; wait for a couple of passes
    tokio::time::sleep(std::time::Duration::from_millis(700)).await;

    assert_eq!(handler.handled.lock().len(), 1, "stalled message reprocessed");
    assert_eq!(provider.pending_total(&stream), 0);
}

#[tokio::test]
async fn reclaim_ceiling_routes_to_dead_letter() {
    let harness = Harness::new();
    let stream = harness.store.engine_stream();
    let provider = harness.store.provider().clone();

    provider.xgroup_create(&stream, "engine").await.unwrap();
    harness.append(&message()).await;
    let taken = provider
        .xread_group(&stream, "engine", "dead", 10, 0)
        .await
        .unwrap();
    // Simulate repeated failed claims pushing past the ceiling
    for _ in 0..3 {
        harness.clock.advance(std::time::Duration::from_millis(120_000));
        provider
            .xclaim(&stream, "engine", "dead", 1_000, &[taken[0].id.clone()])
            .await
            .unwrap();
    }
    harness.clock.advance(std::time::Duration::from_millis(120_000));

    let handler = ScriptedHandler::new(vec![]);
    let config = HmshConfig {
        xclaim_delay_ms: 1_000,
        xclaim_count: 3,
        ..quick_config()
    };
    harness.spawn_router(handler.clone(), config);
    tokio::time::sleep(std::time::Duration::from_millis(700)).await;

    assert!(handler.handled.lock().is_empty(), "not reprocessed");
    let dead = handler.dead.lock();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1, hm_core::codes::code::TIMEOUT);
    drop(dead);
    assert_eq!(provider.pending_total(&stream), 0);
}

#[tokio::test]
async fn drains_on_shutdown() {
    let harness = Harness::new();
    let handler = ScriptedHandler::new(vec![]);
    harness.spawn_router(handler.clone(), quick_config());
    settle().await;

    harness.shutdown.send(true).unwrap();
    settle().await;
    harness.append(&message()).await;
    settle().await;

    assert!(handler.handled.lock().is_empty(), "no reads after shutdown");
}
