// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::host::EffectHost;
use async_trait::async_trait;
use hm_core::codes::code;
use hm_core::{InterruptConfig, JobId};
use hm_engine::Interruption;
use hm_store::{replay_field, Serializer};
use parking_lot::Mutex as PlMutex;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Recording host: counts guard acquisitions and stores records in
/// memory so at-most-once semantics are observable.
#[derive(Default)]
struct FakeHost {
    guards: PlMutex<HashMap<String, f64>>,
    records: PlMutex<HashMap<String, String>>,
    signals: PlMutex<Vec<(String, Value)>>,
    enriched: PlMutex<Vec<Value>>,
    interrupts: PlMutex<Vec<JobId>>,
}

#[async_trait]
impl EffectHost for FakeHost {
    async fn once_guard(&self, _jid: &JobId, field: &str) -> Result<f64, WorkflowError> {
        let mut guards = self.guards.lock();
        let count = guards.entry(field.to_string()).or_insert(0.0);
        *count += 1.0;
        Ok(*count)
    }

    async fn record(&self, _jid: &JobId, field: &str, value: &Value) -> Result<(), WorkflowError> {
        self.records
            .lock()
            .insert(field.to_string(), Serializer::to_string(value));
        Ok(())
    }

    async fn signal(&self, signal_id: &str, data: Value) -> Result<(), WorkflowError> {
        self.signals.lock().push((signal_id.to_string(), data));
        Ok(())
    }

    async fn publish(&self, _jid: &JobId, _events: Value) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn enrich(&self, _jid: &JobId, fields: Value) -> Result<(), WorkflowError> {
        self.enriched.lock().push(fields);
        Ok(())
    }

    async fn interrupt(
        &self,
        jid: &JobId,
        _options: InterruptConfig,
    ) -> Result<(), WorkflowError> {
        self.interrupts.lock().push(jid.clone());
        Ok(())
    }
}

fn ctx_with(replay: HashMap<String, String>) -> (WorkflowContext, std::sync::Arc<FakeHost>) {
    let host = std::sync::Arc::new(FakeHost::default());
    let ctx = WorkflowContext::new(
        JobId::new("job-1"),
        "flow.run",
        replay,
        json!({"seed": 4}),
        host.clone(),
    );
    (ctx, host)
}

fn replay_entry(index: u32, value: &Value) -> (String, String) {
    (replay_field("", index), Serializer::to_string(value))
}

// --- suspension + replay ---

#[tokio::test]
async fn first_sleep_registers_descriptor_and_suspends() {
    let (ctx, _) = ctx_with(HashMap::new());
    let err = ctx.sleep_for("2 minutes").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Interrupted));
    let registry = ctx.take_registry();
    assert_eq!(
        registry,
        vec![Interruption::Sleep {
            index: 0,
            duration: 120
        }]
    );
}

#[tokio::test]
async fn replayed_sleep_returns_without_suspending() {
    let (ctx, _) = ctx_with(HashMap::from([replay_entry(0, &json!(null))]));
    assert_eq!(ctx.sleep_for("2 minutes").await.unwrap(), 120);
    assert!(ctx.take_registry().is_empty());
}

#[tokio::test]
async fn wait_for_replays_stored_payload() {
    let (ctx, _) = ctx_with(HashMap::from([replay_entry(0, &json!({"v": 1}))]));
    let got: Value = ctx.wait_for("a").await.unwrap();
    assert_eq!(got, json!({"v": 1}));
}

#[tokio::test]
async fn indexes_are_monotonic_within_a_frame() {
    let (ctx, _) = ctx_with(HashMap::new());
    let a = ctx.defer_wait_for("a");
    let b = ctx.defer_wait_for("b");
    let c = ctx.defer_sleep("1s").unwrap();
    assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
}

#[tokio::test]
async fn deterministic_replay_produces_identical_descriptors() {
    // Two independent invocations over the same replay table must issue
    // identical interruption sequences.
    let replay = HashMap::from([replay_entry(0, &json!({"v": 1}))]);
    let mut sequences = Vec::new();
    for _ in 0..2 {
        let (ctx, _) = ctx_with(replay.clone());
        let first: Value = ctx.wait_for("a").await.unwrap();
        assert_eq!(first, json!({"v": 1}));
        let _ = ctx.random();
        let err = ctx.sleep_for("30s").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Interrupted));
        sequences.push(ctx.take_registry());
    }
    assert_eq!(sequences[0], sequences[1]);
}

// --- all() batches ---

#[tokio::test]
async fn all_registers_every_unresolved_branch() {
    let (ctx, _) = ctx_with(HashMap::new());
    let a = ctx.defer_wait_for("a");
    let b = ctx.defer_wait_for("b");
    let err = ctx.all(vec![a, b]).unwrap_err();
    assert!(matches!(err, WorkflowError::Interrupted));
    let registry = ctx.take_registry();
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry[0],
        Interruption::Wait {
            index: 0,
            signal: "a".to_string()
        }
    );
}

#[tokio::test]
async fn all_resolves_when_every_branch_replayed() {
    let (ctx, _) = ctx_with(HashMap::from([
        replay_entry(0, &json!({"v": 1})),
        replay_entry(1, &json!({"v": 2})),
    ]));
    let a = ctx.defer_wait_for("a");
    let b = ctx.defer_wait_for("b");
    let values = ctx.all(vec![a, b]).unwrap();
    assert_eq!(values, vec![json!({"v": 1}), json!({"v": 2})]);
}

#[tokio::test]
async fn all_rejects_oversized_batches() {
    let (ctx, _) = ctx_with(HashMap::new());
    let batch: Vec<Deferred> = (0..=MAX_BATCH).map(|_| ctx.defer_wait_for("x")).collect();
    assert!(matches!(
        ctx.all(batch),
        Err(WorkflowError::Fatal(_))
    ));
}

// --- replayed errors ---

#[tokio::test]
async fn stored_error_records_map_to_error_kinds() {
    for (stored_code, expect_fatal) in [(code::WF_FATAL, true), (code::WF_RETRYABLE, false)] {
        let record = json!({"$error": {"code": stored_code, "message": "stored"}});
        let (ctx, _) = ctx_with(HashMap::from([replay_entry(0, &record)]));
        let err = ctx.wait_for::<Value>("a").await.unwrap_err();
        match err {
            WorkflowError::Fatal(m) if expect_fatal => assert_eq!(m, "stored"),
            WorkflowError::Retryable(m) if !expect_fatal => assert_eq!(m, "stored"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}

#[tokio::test]
async fn maxed_and_timeout_records_reconstruct() {
    let maxed = json!({"$error": {"code": code::WF_MAXED, "message": "m"}});
    let (ctx, _) = ctx_with(HashMap::from([replay_entry(0, &maxed)]));
    assert!(matches!(
        ctx.proxy::<Value>("work", json!(null), None).await,
        Err(WorkflowError::Maxed(_))
    ));

    let timeout = json!({"$error": {"code": code::WF_TIMEOUT, "message": "t"}});
    let (ctx, _) = ctx_with(HashMap::from([replay_entry(0, &timeout)]));
    assert!(matches!(
        ctx.exec_child::<Value>("child.run", json!(null), None).await,
        Err(WorkflowError::Timeout(_))
    ));
}

// --- determinism ---

#[tokio::test]
async fn random_is_stable_across_replays() {
    let (ctx1, _) = ctx_with(HashMap::new());
    let (ctx2, _) = ctx_with(HashMap::new());
    // Same index, same value on both invocations
    let first1 = ctx1.random();
    let first2 = ctx2.random();
    assert_eq!(first1, first2);
    // Later indexes draw different values
    assert_ne!(first1, ctx1.random());
}

#[tokio::test]
async fn search_reads_job_data_snapshot() {
    let (ctx, _) = ctx_with(HashMap::new());
    assert_eq!(ctx.search()["seed"], json!(4));
}

// --- at-most-once effects ---

#[tokio::test]
async fn signal_fires_once_per_index() {
    let (ctx, host) = ctx_with(HashMap::new());
    ctx.signal("go", json!({"n": 1})).await.unwrap();
    assert_eq!(host.signals.lock().len(), 1);

    // Replay of the same frame: the recorded slot short-circuits
    let replay: HashMap<String, String> = host.records.lock().clone();
    let ctx2 = WorkflowContext::new(
        JobId::new("job-1"),
        "flow.run",
        replay,
        json!({}),
        host.clone(),
    );
    ctx2.signal("go", json!({"n": 1})).await.unwrap();
    assert_eq!(host.signals.lock().len(), 1, "effect must not re-fire");
}

#[tokio::test]
async fn once_executes_and_replays_stored_value() {
    let (ctx, host) = ctx_with(HashMap::new());
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let calls_in = calls.clone();
    let value: i64 = ctx
        .once(|| async move {
            calls_in.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(41)
        })
        .await
        .unwrap();
    assert_eq!(value, 41);

    let replay: HashMap<String, String> = host.records.lock().clone();
    let ctx2 = WorkflowContext::new(
        JobId::new("job-1"),
        "flow.run",
        replay,
        json!({}),
        host.clone(),
    );
    let calls_in = calls.clone();
    let replayed: i64 = ctx2
        .once(|| async move {
            calls_in.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(0)
        })
        .await
        .unwrap();
    assert_eq!(replayed, 41, "replay returns the stored value");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn once_with_lost_record_is_retryable() {
    let (ctx, host) = ctx_with(HashMap::new());
    // Simulate a prior crash after the guard fired but before the record
    host.guards.lock().insert(hm_store::effect_field("", 0), 1.0);
    let result: Result<i64, _> = ctx.once(|| async move { Ok(7) }).await;
    assert!(matches!(result, Err(WorkflowError::Retryable(_))));
}

#[tokio::test]
async fn enrich_and_interrupt_are_guarded() {
    let (ctx, host) = ctx_with(HashMap::new());
    ctx.enrich(json!({"k": "v"})).await.unwrap();
    ctx.interrupt(&JobId::new("other"), InterruptConfig::default())
        .await
        .unwrap();
    assert_eq!(host.enriched.lock().len(), 1);
    assert_eq!(host.interrupts.lock().len(), 1);
}
