// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine facade.
//!
//! One `Engine` embeds the runtime core in a host process: it owns the
//! store, the router loops, the completion listener, the time-hook scout,
//! and the quorum presence task. All public operations go through this
//! type; subsystems receive it as an explicit context.

use crate::activities;
use crate::error::EngineError;
use crate::export::{self, ExportBundle};
use crate::quorum::{self, QuorumState};
use crate::router::{RouterConfig, StreamHandler, StreamRouter};
use crate::task;
use crate::throttle::ThrottleRegistry;
use async_trait::async_trait;
use hm_core::{
    App, AppId, Clock, EngineId, GuidGen, HmshConfig, IdGen, InterruptConfig, JobCompletion,
    JobError, JobId, JobOutput, QuorumProfile, StreamData, StreamDataResponse, StreamMessageType,
    ThrottleOptions, UuidIdGen,
};
use hm_providers::Provider;
use hm_store::Store;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Boxed worker callback future.
pub type WorkerFuture = Pin<Box<dyn Future<Output = StreamDataResponse> + Send>>;
/// Registered worker callback.
pub type WorkerCallback = Arc<dyn Fn(StreamData) -> WorkerFuture + Send + Sync>;
/// Completion subscriber callback.
pub type CompletionCallback = Arc<dyn Fn(JobCompletion) + Send + Sync>;

/// Construction options for an engine instance.
pub struct EngineOptions {
    pub namespace: String,
    pub app: AppId,
    pub config: HmshConfig,
}

#[derive(Default)]
pub(crate) struct SubscriptionTable {
    pub(crate) topics: HashMap<String, Vec<CompletionCallback>>,
    pub(crate) patterns: Vec<(String, CompletionCallback)>,
}

pub(crate) struct EngineInner<P: Provider, C: Clock> {
    pub(crate) id: EngineId,
    pub(crate) config: HmshConfig,
    pub(crate) clock: C,
    pub(crate) store: Store<P>,
    pub(crate) guids: GuidGen,
    pub(crate) jids: UuidIdGen,
    pub(crate) app: RwLock<Option<App>>,
    pub(crate) throttles: Arc<ThrottleRegistry>,
    pub(crate) workers: Mutex<HashMap<String, WorkerCallback>>,
    pub(crate) waiters: Mutex<HashMap<String, Vec<oneshot::Sender<JobOutput>>>>,
    pub(crate) subs: Mutex<SubscriptionTable>,
    pub(crate) quorum: QuorumState,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
}

/// A running engine instance.
pub struct Engine<P: Provider, C: Clock> {
    pub(crate) inner: Arc<EngineInner<P, C>>,
}

impl<P: Provider, C: Clock> Clone for Engine<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Provider, C: Clock> Engine<P, C> {
    pub fn new(provider: P, clock: C, options: EngineOptions) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let guids = GuidGen::new(options.config.guid_size);
        Self {
            inner: Arc::new(EngineInner {
                id: EngineId::new(UuidIdGen.next()),
                store: Store::new(provider, options.namespace, options.app.clone()),
                config: options.config,
                clock,
                guids,
                jids: UuidIdGen,
                app: RwLock::new(None),
                throttles: Arc::new(ThrottleRegistry::new()),
                workers: Mutex::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
                subs: Mutex::new(SubscriptionTable::default()),
                quorum: QuorumState::default(),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        }
    }

    pub fn id(&self) -> &EngineId {
        &self.inner.id
    }

    pub fn config(&self) -> &HmshConfig {
        &self.inner.config
    }

    pub(crate) fn clock(&self) -> &C {
        &self.inner.clock
    }

    pub fn store(&self) -> &Store<P> {
        &self.inner.store
    }

    pub(crate) fn next_guid(&self) -> String {
        self.inner.guids.next()
    }

    /// Read-lock the active app.
    pub(crate) fn with_app<T>(
        &self,
        f: impl FnOnce(&App) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let guard = self.inner.app.read();
        match guard.as_ref() {
            Some(app) => f(app),
            None => Err(EngineError::NoApp),
        }
    }

    // --- lifecycle ---

    /// Start the router loops and background tasks.
    pub async fn start(&self) -> Result<(), EngineError> {
        // Engine-role router on the shared transition stream
        let handler: Arc<dyn StreamHandler> = Arc::new(EngineHandler {
            engine: self.clone(),
        });
        self.spawn_router(
            RouterConfig {
                stream: self.inner.store.engine_stream(),
                group: "engine".to_string(),
                consumer: self.inner.id.to_string(),
                topic: None,
            },
            handler,
        );

        self.spawn(task::run_scout(self.clone()));
        self.spawn(Self::run_completion_listener(self.clone()));
        self.spawn(quorum::run_listener(self.clone()));
        Ok(())
    }

    /// Register a worker callback and start its router.
    pub fn register_worker<F, Fut>(&self, topic: &str, callback: F)
    where
        F: Fn(StreamData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StreamDataResponse> + Send + 'static,
    {
        let callback: WorkerCallback = Arc::new(move |msg| Box::pin(callback(msg)));
        self.inner
            .workers
            .lock()
            .insert(topic.to_string(), callback.clone());

        let handler: Arc<dyn StreamHandler> = Arc::new(WorkerHandler {
            engine: self.clone(),
            callback,
        });
        self.spawn_router(
            RouterConfig {
                stream: self.inner.store.worker_stream(topic),
                group: "worker".to_string(),
                consumer: self.inner.id.to_string(),
                topic: Some(topic.to_string()),
            },
            handler,
        );
    }

    fn spawn_router(&self, config: RouterConfig, handler: Arc<dyn StreamHandler>) {
        let router = StreamRouter::new(
            self.inner.store.clone(),
            self.inner.config.clone(),
            config,
            Arc::clone(&self.inner.throttles),
            self.inner.shutdown_tx.subscribe(),
        );
        self.spawn(router.run(handler));
    }

    pub(crate) fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.inner.tasks.lock().push(tokio::spawn(fut));
    }

    pub(crate) fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Cooperative shutdown: routers drain in-flight work and exit.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    // --- version lifecycle ---

    /// Persist an app manifest. The first deploy also activates itself.
    pub async fn deploy(&self, app: App) -> Result<(), EngineError> {
        self.inner.store.save_app(&app).await?;
        if self.inner.store.active_version().await?.is_none() {
            self.inner.store.activate_version(&app.version).await?;
            *self.inner.app.write() = Some(app);
        }
        Ok(())
    }

    /// Quorum-coordinated activation of a deployed version.
    pub async fn activate(&self, version: &str) -> Result<(), EngineError> {
        quorum::activate(self, version).await
    }

    /// Swap the local graph cache to a version (quorum `activate` path).
    pub(crate) async fn apply_version(&self, version: &str) -> Result<(), EngineError> {
        let app = self.inner.store.load_app(version).await?;
        self.inner.store.load_symbols().await?;
        *self.inner.app.write() = Some(app);
        Ok(())
    }

    /// Adopt the backend's active version (engines joining a live mesh).
    pub async fn sync_active_version(&self) -> Result<(), EngineError> {
        let version = self
            .inner
            .store
            .active_version()
            .await?
            .ok_or(EngineError::NoApp)?;
        self.apply_version(&version).await
    }

    // --- job operations ---

    /// Start a job. Errors with `DuplicateJob` when the jid already exists.
    pub async fn pub_job(
        &self,
        topic: &str,
        payload: Value,
        jid: Option<JobId>,
    ) -> Result<JobId, EngineError> {
        activities::trigger::run(self, topic, payload, jid, None).await
    }

    /// Start a job and await its completion event.
    pub async fn pub_sub(
        &self,
        topic: &str,
        payload: Value,
        jid: Option<JobId>,
        timeout_ms: Option<u64>,
    ) -> Result<JobOutput, EngineError> {
        let jid = jid.unwrap_or_else(|| JobId::new(self.inner.jids.next()));
        let rx = self.add_waiter(&jid);
        if let Err(e) = self.pub_job(topic, payload, Some(jid.clone())).await {
            self.inner.waiters.lock().remove(jid.as_str());
            return Err(e);
        }

        let window = timeout_ms
            .unwrap_or(self.inner.config.ott_wait_ms)
            .min(self.inner.config.max_timeout_ms);
        let output = tokio::time::timeout(Duration::from_millis(window), rx)
            .await
            .map_err(|_| EngineError::Timeout(jid.clone()))?
            .map_err(|_| EngineError::GetState("completion channel closed".to_string()))?;

        match output.metadata.error() {
            Some(err) => Err(EngineError::JobFailed(err)),
            None => Ok(output),
        }
    }

    pub(crate) fn add_waiter(&self, jid: &JobId) -> oneshot::Receiver<JobOutput> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .lock()
            .entry(jid.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Subscribe to completion events for a topic.
    pub fn sub<F>(&self, topic: &str, callback: F)
    where
        F: Fn(JobCompletion) + Send + Sync + 'static,
    {
        self.inner
            .subs
            .lock()
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Subscribe to completion events matching a `*` glob.
    pub fn psub<F>(&self, pattern: &str, callback: F)
    where
        F: Fn(JobCompletion) + Send + Sync + 'static,
    {
        self.inner
            .subs
            .lock()
            .patterns
            .push((pattern.to_string(), Arc::new(callback)));
    }

    pub fn unsub(&self, topic: &str) {
        self.inner.subs.lock().topics.remove(topic);
    }

    pub fn punsub(&self, pattern: &str) {
        self.inner.subs.lock().patterns.retain(|(p, _)| p != pattern);
    }

    /// Deliver a web-hook signal to parked activities.
    pub async fn hook(&self, topic: &str, data: Value) -> Result<String, EngineError> {
        task::process_web_hook(self, topic, data).await
    }

    /// Signal every job parked on the topic's resolved key.
    pub async fn hook_all(&self, topic: &str, data: Value) -> Result<Vec<JobId>, EngineError> {
        task::process_web_hook_all(self, topic, data).await
    }

    /// Full job state.
    pub async fn get_state(&self, jid: &JobId) -> Result<JobOutput, EngineError> {
        let metadata = self.inner.store.get_metadata(jid).await.map_err(|e| match e {
            hm_store::StoreError::JobNotFound(j) => EngineError::InactiveJob(j),
            other => EngineError::Store(other),
        })?;
        let data = self.inner.store.get_job_data(jid).await?;
        Ok(JobOutput { metadata, data })
    }

    /// Status semaphore value.
    pub async fn get_status(&self, jid: &JobId) -> Result<i64, EngineError> {
        self.inner.store.get_status(jid).await.map_err(|e| match e {
            hm_store::StoreError::JobNotFound(j) => EngineError::InactiveJob(j),
            other => EngineError::Store(other),
        })
    }

    /// Selected job-data fields.
    pub async fn get_query_state(
        &self,
        jid: &JobId,
        fields: &[&str],
    ) -> Result<Value, EngineError> {
        let data = self.inner.store.get_job_data(jid).await?;
        let mut out = serde_json::Map::new();
        for field in fields {
            out.insert(
                field.to_string(),
                data.get(*field).cloned().unwrap_or(Value::Null),
            );
        }
        Ok(Value::Object(out))
    }

    /// Interrupt a running job.
    pub async fn interrupt(
        &self,
        jid: &JobId,
        options: InterruptConfig,
    ) -> Result<(), EngineError> {
        activities::interrupt::interrupt_job(self, jid, &options).await
    }

    /// Inflated timeline for post-mortem analysis.
    pub async fn export(&self, jid: &JobId) -> Result<ExportBundle, EngineError> {
        export::export(self, jid).await
    }

    /// Remove a completed job's state immediately.
    pub async fn scrub(&self, jid: &JobId) -> Result<(), EngineError> {
        let status = self.get_status(jid).await?;
        if status > 0 {
            return Err(EngineError::GetState(format!(
                "refusing to scrub running job {jid}"
            )));
        }
        self.inner.store.delete_job(jid).await?;
        Ok(())
    }

    /// Broadcast a throttle adjustment and persist the rate.
    pub async fn throttle(&self, options: ThrottleOptions) -> Result<(), EngineError> {
        match &options.topic {
            Some(topic) => self.inner.store.set_topic_throttle(topic, options.throttle).await?,
            None => {
                if options.guid.is_none() {
                    self.inner.store.set_global_throttle(options.throttle).await?;
                }
            }
        }
        quorum::publish(
            self,
            &hm_core::QuorumMessage::Throttle {
                options: options.clone(),
            },
        )
        .await?;
        // Apply locally as well; the broadcast reaches peers.
        if options.guid.is_none() || options.guid.as_deref() == Some(self.inner.id.as_str()) {
            self.inner.throttles.apply(&options);
        }
        Ok(())
    }

    /// Census of live quorum members.
    pub async fn roll_call(&self, max: Option<u32>) -> Result<Vec<QuorumProfile>, EngineError> {
        quorum::roll_call(self, max).await
    }

    /// Effective router read delay for a topic (`None` = engine stream).
    pub fn throttle_rate(&self, topic: Option<&str>) -> u64 {
        self.inner.throttles.rate_for(topic)
    }

    // --- completion delivery ---

    /// Listen for completion events and deliver them to local waiters
    /// and subscribers.
    async fn run_completion_listener(engine: Engine<P, C>) {
        let pattern = engine.inner.store.keys().executed_pattern();
        let mut sub = engine.inner.store.provider().psubscribe(&pattern);
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
            let completion: JobCompletion = match serde_json::from_str(&message.payload) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable completion event");
                    continue;
                }
            };
            engine.deliver_completion(completion);
        }
    }

    pub(crate) fn deliver_completion(&self, completion: JobCompletion) {
        let jid = completion.job_output.metadata.jid.to_string();
        let waiters = self.inner.waiters.lock().remove(&jid).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(completion.job_output.clone());
        }

        // Snapshot matching callbacks so none run under the lock.
        let callbacks: Vec<CompletionCallback> = {
            let subs = self.inner.subs.lock();
            let job_topic = &completion.job_output.metadata.tpc;
            let mut matched = Vec::new();
            for (topic, cbs) in &subs.topics {
                if topic == job_topic || *topic == completion.topic {
                    matched.extend(cbs.iter().cloned());
                }
            }
            for (pattern, cb) in &subs.patterns {
                if glob_match(pattern, job_topic) || glob_match(pattern, &completion.topic) {
                    matched.push(cb.clone());
                }
            }
            matched
        };
        for cb in callbacks {
            cb(completion.clone());
        }
    }
}

/// `*`-glob matching for completion subscriptions.
pub(crate) fn glob_match(pattern: &str, topic: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == topic;
    }
    let mut remainder = topic;
    let mut parts = pattern.split('*').peekable();
    let mut first = true;
    while let Some(part) = parts.next() {
        let last = parts.peek().is_none();
        if first {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if last {
            return part.is_empty() || remainder.ends_with(part);
        } else if !part.is_empty() {
            match remainder.find(part) {
                Some(at) => remainder = &remainder[at + part.len()..],
                None => return false,
            }
        }
        first = false;
    }
    true
}

/// Engine-role stream handler: processes transitions and resolutions.
struct EngineHandler<P: Provider, C: Clock> {
    engine: Engine<P, C>,
}

#[async_trait]
impl<P: Provider, C: Clock> StreamHandler for EngineHandler<P, C> {
    async fn handle(&self, msg: StreamData) -> Result<Option<StreamData>, EngineError> {
        activities::dispatch(&self.engine, msg).await?;
        Ok(None)
    }

    async fn deliver(&self, _response: StreamData) -> Result<(), EngineError> {
        Ok(())
    }

    async fn dead_letter(&self, msg: StreamData, error_code: u16) -> Result<(), EngineError> {
        let Some(jid) = msg.metadata.jid.clone() else {
            return Ok(());
        };
        activities::fail_job(
            &self.engine,
            &jid,
            JobError::new(error_code, "stream delivery budget exhausted").with_job(jid.clone()),
        )
        .await
    }
}

/// Worker-role stream handler: invokes the registered callback and
/// reports the response back on the engine stream.
struct WorkerHandler<P: Provider, C: Clock> {
    engine: Engine<P, C>,
    callback: WorkerCallback,
}

#[async_trait]
impl<P: Provider, C: Clock> StreamHandler for WorkerHandler<P, C> {
    async fn handle(&self, msg: StreamData) -> Result<Option<StreamData>, EngineError> {
        if msg.kind() != StreamMessageType::Worker {
            return Err(EngineError::Malformed(format!(
                "worker stream got {} message",
                msg.kind()
            )));
        }
        let result = (self.callback)(msg.clone()).await;
        let mut response = StreamData {
            metadata: msg.metadata.clone(),
            message_type: Some(StreamMessageType::Response),
            data: result.data,
            policies: None,
            status: result.status,
            code: result.code,
            stack: result.stack,
        };
        response.metadata.guid = self.engine.next_guid();
        Ok(Some(response))
    }

    async fn deliver(&self, response: StreamData) -> Result<(), EngineError> {
        self.engine.store().append_engine(&response).await?;
        Ok(())
    }

    async fn dead_letter(&self, msg: StreamData, error_code: u16) -> Result<(), EngineError> {
        let mut response = StreamData {
            metadata: msg.metadata.clone(),
            message_type: Some(StreamMessageType::Response),
            data: Value::Null,
            policies: None,
            status: Some(hm_core::StreamStatus::Error),
            code: Some(error_code),
            stack: None,
        };
        response.metadata.guid = self.engine.next_guid();
        self.engine.store().append_engine(&response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
