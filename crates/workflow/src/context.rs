// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow context: execution-index bookkeeping, replay lookups,
//! suspension surfaces, and at-most-once side effects.

use crate::error::WorkflowError;
use crate::host::EffectHost;
use hm_core::{parse_duration, InterruptConfig, JobId, RetryPolicy};
use hm_engine::Interruption;
use hm_store::{effect_field, replay_field, Serializer};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Ceiling on concurrent branches per frame, capping registry size.
pub const MAX_BATCH: usize = 25;

/// Facts about the running frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInfo {
    pub jid: JobId,
    pub topic: String,
    /// Dimension prefix scoping this frame's execution indexes.
    pub dimension: String,
    /// Number of replayed entries available to this invocation.
    pub replay_len: usize,
}

/// A suspension-point call that has not yet been awaited.
///
/// Created by the `defer_*` surfaces; resolve through the direct surface
/// or batch with [`WorkflowContext::all`].
pub struct Deferred {
    index: u32,
    resolved: Option<Result<Value, WorkflowError>>,
    interruption: Option<Interruption>,
}

impl Deferred {
    /// Execution index this call consumed.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// True when a replayed result is already available.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

struct CtxInner {
    jid: JobId,
    topic: String,
    dimension: String,
    replay: HashMap<String, String>,
    counter: AtomicU32,
    registry: Mutex<Vec<Interruption>>,
    host: Arc<dyn EffectHost>,
    job_data: Value,
}

/// Handle passed to every workflow function invocation.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<CtxInner>,
}

impl WorkflowContext {
    pub fn new(
        jid: JobId,
        topic: impl Into<String>,
        replay: HashMap<String, String>,
        job_data: Value,
        host: Arc<dyn EffectHost>,
    ) -> Self {
        Self {
            inner: Arc::new(CtxInner {
                jid,
                topic: topic.into(),
                dimension: String::new(),
                replay,
                counter: AtomicU32::new(0),
                registry: Mutex::new(Vec::new()),
                host,
                job_data,
            }),
        }
    }

    pub fn info(&self) -> WorkflowInfo {
        WorkflowInfo {
            jid: self.inner.jid.clone(),
            topic: self.inner.topic.clone(),
            dimension: self.inner.dimension.clone(),
            replay_len: self.inner.replay.len(),
        }
    }

    /// Drain the interruption registry (host side, at frame top).
    pub fn take_registry(&self) -> Vec<Interruption> {
        std::mem::take(&mut *self.inner.registry.lock())
    }

    fn next_index(&self) -> u32 {
        self.inner.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Stored replay entry for an index, decoded; `$error` records
    /// reconstruct their error kind.
    fn replay_lookup(&self, index: u32) -> Option<Result<Value, WorkflowError>> {
        let field = replay_field(&self.inner.dimension, index);
        let raw = self.inner.replay.get(&field)?;
        let value = Serializer::from_string(raw);
        if let Some(stored) = value.get("$error") {
            let stored_code = stored.get("code").and_then(Value::as_u64).unwrap_or(599) as u16;
            let message = stored
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("replayed error")
                .to_string();
            return Some(Err(WorkflowError::from_stored(stored_code, message)));
        }
        Some(Ok(value))
    }

    fn suspend(&self, interruption: Interruption) -> WorkflowError {
        self.inner.registry.lock().push(interruption);
        WorkflowError::Interrupted
    }

    // --- suspension surfaces ---

    /// Suspend for a textual duration; replays as the slept seconds.
    pub async fn sleep_for(&self, duration: &str) -> Result<u64, WorkflowError> {
        let deferred = self.defer_sleep(duration)?;
        self.resolve_one(deferred)
            .await
            .map(|v| v.as_u64().unwrap_or(0))
    }

    pub fn defer_sleep(&self, duration: &str) -> Result<Deferred, WorkflowError> {
        let seconds =
            parse_duration(duration).map_err(|e| WorkflowError::Fatal(e.to_string()))?;
        let index = self.next_index();
        Ok(match self.replay_lookup(index) {
            Some(result) => Deferred {
                index,
                // A slept timer replays as its duration
                resolved: Some(result.map(|_| json!(seconds))),
                interruption: None,
            },
            None => Deferred {
                index,
                resolved: None,
                interruption: Some(Interruption::Sleep {
                    index,
                    duration: seconds,
                }),
            },
        })
    }

    /// Suspend until an external signal with this id arrives.
    pub async fn wait_for<T: DeserializeOwned>(&self, signal_id: &str) -> Result<T, WorkflowError> {
        let deferred = self.defer_wait_for(signal_id);
        let value = self.resolve_one(deferred).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn defer_wait_for(&self, signal_id: &str) -> Deferred {
        let index = self.next_index();
        match self.replay_lookup(index) {
            Some(result) => Deferred {
                index,
                resolved: Some(result),
                interruption: None,
            },
            None => Deferred {
                index,
                resolved: None,
                interruption: Some(Interruption::Wait {
                    index,
                    signal: signal_id.to_string(),
                }),
            },
        }
    }

    /// Start a child job and suspend until it completes.
    pub async fn exec_child<T: DeserializeOwned>(
        &self,
        topic: &str,
        payload: Value,
        jid: Option<&str>,
    ) -> Result<T, WorkflowError> {
        let deferred = self.defer_child(topic, payload, true, jid);
        let value = self.resolve_one(deferred).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start a child job without awaiting it; resolves to the child jid.
    pub async fn start_child(
        &self,
        topic: &str,
        payload: Value,
        jid: Option<&str>,
    ) -> Result<JobId, WorkflowError> {
        let deferred = self.defer_child(topic, payload, false, jid);
        let value = self.resolve_one(deferred).await?;
        Ok(JobId::new(value.as_str().unwrap_or_default()))
    }

    pub fn defer_child(
        &self,
        topic: &str,
        payload: Value,
        awaits: bool,
        jid: Option<&str>,
    ) -> Deferred {
        let index = self.next_index();
        match self.replay_lookup(index) {
            Some(result) => Deferred {
                index,
                resolved: Some(result),
                interruption: None,
            },
            None => Deferred {
                index,
                resolved: None,
                interruption: Some(Interruption::Child {
                    index,
                    topic: topic.to_string(),
                    payload,
                    awaits,
                    jid: jid.map(str::to_string),
                    expire: None,
                }),
            },
        }
    }

    /// Invoke a proxied activity and suspend until it responds.
    pub async fn proxy<T: DeserializeOwned>(
        &self,
        activity: &str,
        args: Value,
        retry: Option<RetryPolicy>,
    ) -> Result<T, WorkflowError> {
        let deferred = self.defer_proxy(activity, args, retry);
        let value = self.resolve_one(deferred).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn defer_proxy(
        &self,
        activity: &str,
        args: Value,
        retry: Option<RetryPolicy>,
    ) -> Deferred {
        let index = self.next_index();
        match self.replay_lookup(index) {
            Some(result) => Deferred {
                index,
                resolved: Some(result),
                interruption: None,
            },
            None => Deferred {
                index,
                resolved: None,
                interruption: Some(Interruption::Proxy {
                    index,
                    activity: activity.to_string(),
                    args,
                    retry,
                }),
            },
        }
    }

    /// Await a batch of deferred calls together (`Promise.all` form).
    ///
    /// Registers every unresolved member and suspends unless all are
    /// already replayed.
    pub fn all(&self, deferreds: Vec<Deferred>) -> Result<Vec<Value>, WorkflowError> {
        if deferreds.len() > MAX_BATCH {
            return Err(WorkflowError::Fatal(format!(
                "all() batch of {} exceeds the {MAX_BATCH}-branch ceiling",
                deferreds.len()
            )));
        }
        let mut values = Vec::with_capacity(deferreds.len());
        let mut pending = Vec::new();
        for deferred in deferreds {
            match deferred.resolved {
                Some(Ok(value)) => values.push(value),
                Some(Err(e)) => return Err(e),
                None => {
                    if let Some(interruption) = deferred.interruption {
                        pending.push(interruption);
                    }
                }
            }
        }
        if pending.is_empty() {
            return Ok(values);
        }
        let mut registry = self.inner.registry.lock();
        registry.extend(pending);
        Err(WorkflowError::Interrupted)
    }

    async fn resolve_one(&self, deferred: Deferred) -> Result<Value, WorkflowError> {
        match deferred.resolved {
            Some(result) => result,
            None => match deferred.interruption {
                Some(interruption) => {
                    // Brief defer lets sibling branches enqueue first.
                    tokio::task::yield_now().await;
                    Err(self.suspend(interruption))
                }
                None => Err(WorkflowError::Host(
                    "deferred call with neither value nor descriptor".to_string(),
                )),
            },
        }
    }

    // --- determinism helpers ---

    /// Deterministic random in `[0, 1)`: seeded by the execution index,
    /// identical across replays.
    pub fn random(&self) -> f64 {
        let index = self.next_index();
        rand::rngs::StdRng::seed_from_u64(index as u64).gen::<f64>()
    }

    /// Job data snapshot for read-only queries.
    pub fn search(&self) -> &Value {
        &self.inner.job_data
    }

    // --- at-most-once side effects ---

    /// Run an effectful closure once per execution index; replays return
    /// the stored value without re-executing.
    pub async fn once<F, Fut, T>(&self, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
        T: Serialize + DeserializeOwned,
    {
        let index = self.next_index();
        if let Some(result) = self.replay_lookup(index) {
            return Ok(serde_json::from_value(result?)?);
        }
        let first = self.acquire_effect(index).await?;
        if !first {
            // Another replay raced the effect but its result is not yet
            // recorded; retry the frame rather than re-running the effect.
            return Err(WorkflowError::Retryable(
                "once() effect in flight without a stored result".to_string(),
            ));
        }
        let value = f().await?;
        self.record_replay(index, &serde_json::to_value(&value)?)
            .await?;
        Ok(value)
    }

    /// Send a signal to jobs waiting on `signal_id`; fires once.
    pub async fn signal(&self, signal_id: &str, data: Value) -> Result<(), WorkflowError> {
        self.effect_once(|host, jid| {
            let signal_id = signal_id.to_string();
            async move {
                let _ = jid;
                host.signal(&signal_id, data).await
            }
        })
        .await
    }

    /// Deliver a self-addressed hook signal; fires once.
    pub async fn hook(&self, signal_id: &str, data: Value) -> Result<(), WorkflowError> {
        self.effect_once(|host, jid| {
            let signal_id = signal_id.to_string();
            async move {
                let _ = jid;
                host.signal(&signal_id, data).await
            }
        })
        .await
    }

    /// Publish events to this job's event channel; fires once.
    pub async fn emit(&self, events: Value) -> Result<(), WorkflowError> {
        self.effect_once(|host, jid| async move { host.publish(&jid, events).await })
            .await
    }

    /// Merge fields into user-visible job data; fires once.
    pub async fn enrich(&self, fields: Value) -> Result<(), WorkflowError> {
        self.effect_once(|host, jid| async move { host.enrich(&jid, fields).await })
            .await
    }

    /// Record a trace annotation; fires once.
    pub async fn trace(&self, attrs: Value) -> Result<(), WorkflowError> {
        let jid = self.inner.jid.clone();
        self.effect_once(move |_, _| async move {
            tracing::info!(jid = %jid, attrs = %attrs, "workflow trace");
            Ok(())
        })
        .await
    }

    /// Interrupt another job; fires once.
    pub async fn interrupt(
        &self,
        target: &JobId,
        options: InterruptConfig,
    ) -> Result<(), WorkflowError> {
        let target = target.clone();
        self.effect_once(move |host, _| async move { host.interrupt(&target, options).await })
            .await
    }

    /// Shared at-most-once wrapper: consume an index, guard the effect
    /// field, run the effect on first acquisition, and mark the replay
    /// slot so later frames skip the call entirely.
    async fn effect_once<F, Fut>(&self, f: F) -> Result<(), WorkflowError>
    where
        F: FnOnce(Arc<dyn EffectHost>, JobId) -> Fut,
        Fut: Future<Output = Result<(), WorkflowError>>,
    {
        let index = self.next_index();
        if self.replay_lookup(index).is_some() {
            return Ok(());
        }
        if self.acquire_effect(index).await? {
            f(Arc::clone(&self.inner.host), self.inner.jid.clone()).await?;
            self.record_replay(index, &Value::Bool(true)).await?;
        }
        Ok(())
    }

    async fn acquire_effect(&self, index: u32) -> Result<bool, WorkflowError> {
        let field = effect_field(&self.inner.dimension, index);
        let count = self
            .inner
            .host
            .once_guard(&self.inner.jid, &field)
            .await?;
        Ok(count <= 1.0)
    }

    async fn record_replay(&self, index: u32, value: &Value) -> Result<(), WorkflowError> {
        let field = replay_field(&self.inner.dimension, index);
        self.inner.host.record(&self.inner.jid, &field, value).await
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
