// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow hosting over an engine.
//!
//! `MeshFlow::worker` registers the workflow host on its topic: each
//! invocation rebuilds the frame from the replay ledger, runs the user
//! function, and reports either the final value (200) or the collected
//! interruption descriptors (588–595). `MeshFlow::activities` registers
//! the companion activity worker serving proxied calls on
//! `<topic>-activity`.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use async_trait::async_trait;
use hm_core::codes::code;
use hm_core::{
    Activity, ActivityKind, Clock, Graph, InterruptConfig, JobId, StreamData, StreamDataResponse,
    StreamStatus, Transition,
};
use hm_engine::{Engine, Interruption, WFS_SIGNAL_TOPIC};
use hm_providers::Provider;
use hm_store::REPLAY_PREFIX;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Side-effect seam the context calls back into. Implemented over an
/// engine handle; object-safe so user functions stay untyped.
#[async_trait]
pub trait EffectHost: Send + Sync {
    /// Bump an at-most-once guard field; returns the post count.
    async fn once_guard(&self, jid: &JobId, field: &str) -> Result<f64, WorkflowError>;
    /// Store a replay record.
    async fn record(&self, jid: &JobId, field: &str, value: &Value) -> Result<(), WorkflowError>;
    /// Deliver a workflow signal to waiting jobs.
    async fn signal(&self, signal_id: &str, data: Value) -> Result<(), WorkflowError>;
    /// Publish events on the job's event channel.
    async fn publish(&self, jid: &JobId, events: Value) -> Result<(), WorkflowError>;
    /// Merge fields into user-visible job data.
    async fn enrich(&self, jid: &JobId, fields: Value) -> Result<(), WorkflowError>;
    /// Interrupt another job.
    async fn interrupt(&self, jid: &JobId, options: InterruptConfig)
        -> Result<(), WorkflowError>;
}

struct EngineHost<P: Provider, C: Clock> {
    engine: Engine<P, C>,
}

#[async_trait]
impl<P: Provider, C: Clock> EffectHost for EngineHost<P, C> {
    async fn once_guard(&self, jid: &JobId, field: &str) -> Result<f64, WorkflowError> {
        self.engine
            .store()
            .incr_ledger_field(jid, field)
            .await
            .map_err(|e| WorkflowError::Host(e.to_string()))
    }

    async fn record(&self, jid: &JobId, field: &str, value: &Value) -> Result<(), WorkflowError> {
        self.engine
            .store()
            .set_ledger_fields(
                jid,
                HashMap::from([(field.to_string(), hm_store::Serializer::to_string(value))]),
            )
            .await
            .map_err(|e| WorkflowError::Host(e.to_string()))
    }

    async fn signal(&self, signal_id: &str, data: Value) -> Result<(), WorkflowError> {
        self.engine
            .hook(WFS_SIGNAL_TOPIC, json!({"id": signal_id, "data": data}))
            .await
            .map(|_| ())
            .map_err(|e| WorkflowError::Host(e.to_string()))
    }

    async fn publish(&self, jid: &JobId, events: Value) -> Result<(), WorkflowError> {
        let topic = format!("{}.events.{}", self.engine.store().keys().app_id(), jid);
        self.engine
            .store()
            .provider()
            .publish(&topic, &events.to_string())
            .await
            .map(|_| ())
            .map_err(|e| WorkflowError::Host(e.to_string()))
    }

    async fn enrich(&self, jid: &JobId, fields: Value) -> Result<(), WorkflowError> {
        self.engine
            .store()
            .merge_job_data(jid, &fields)
            .await
            .map_err(|e| WorkflowError::Host(e.to_string()))
    }

    async fn interrupt(
        &self,
        jid: &JobId,
        options: InterruptConfig,
    ) -> Result<(), WorkflowError> {
        match self.engine.interrupt(jid, options).await {
            Ok(()) => Ok(()),
            // Interrupting a finished job is a no-op, not a failure.
            Err(e) if matches!(e, hm_engine::EngineError::InactiveJob(_)) => Ok(()),
            Err(e) => Err(WorkflowError::Host(e.to_string())),
        }
    }
}

/// Boxed workflow function.
pub type WorkflowFuture = Pin<Box<dyn Future<Output = Result<Value, WorkflowError>> + Send>>;
type WorkflowFn = Arc<dyn Fn(WorkflowContext) -> WorkflowFuture + Send + Sync>;

/// Boxed proxied-activity function.
pub type ActivityFuture = Pin<Box<dyn Future<Output = Result<Value, WorkflowError>> + Send>>;
type ActivityFn = Arc<dyn Fn(Value) -> ActivityFuture + Send + Sync>;

/// Named proxied activities served by the activity worker.
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    activities: HashMap<String, ActivityFn>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        let func: ActivityFn = Arc::new(move |args| Box::pin(f(args)));
        self.activities.insert(name.to_string(), func);
        self
    }

    fn get(&self, name: &str) -> Option<ActivityFn> {
        self.activities.get(name).cloned()
    }
}

/// The minimal graph a workflow topic deploys: trigger into a reentrant
/// host worker.
pub fn workflow_graph(topic: &str) -> Graph {
    Graph::new(topic)
        .activity(
            Activity::of("t1", ActivityKind::Trigger)
                .adjacent(Transition::to("w1"))
                .build(),
        )
        .activity(
            Activity::of("w1", ActivityKind::Worker)
                .subtype(topic)
                .parent("t1")
                .reentrant()
                .build(),
        )
}

/// Workflow registration facade.
pub struct MeshFlow;

impl MeshFlow {
    /// Register a workflow function as the host worker for `topic`.
    pub fn worker<P, C, F, Fut>(engine: &Engine<P, C>, topic: &str, func: F)
    where
        P: Provider,
        C: Clock,
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        let func: WorkflowFn = Arc::new(move |ctx| Box::pin(func(ctx)));
        let host: Arc<dyn EffectHost> = Arc::new(EngineHost {
            engine: engine.clone(),
        });
        let topic = topic.to_string();
        let run_engine = engine.clone();

        engine.register_worker(&topic.clone(), move |msg: StreamData| {
            let func = Arc::clone(&func);
            let host = Arc::clone(&host);
            let engine = run_engine.clone();
            let topic = topic.clone();
            async move { run_frame(engine, topic, func, host, msg).await }
        });
    }

    /// Register the proxied-activity worker on `<topic>-activity`.
    pub fn activities<P, C>(engine: &Engine<P, C>, topic: &str, registry: ActivityRegistry)
    where
        P: Provider,
        C: Clock,
    {
        let stream_topic = format!("{topic}{}", hm_engine::ACTIVITY_TOPIC_SUFFIX);
        engine.register_worker(&stream_topic, move |msg: StreamData| {
            let registry = registry.clone();
            async move { run_activity(registry, msg).await }
        });
    }
}

/// Drive one frame invocation: rebuild replay state, run the function,
/// and classify the outcome.
async fn run_frame<P: Provider, C: Clock>(
    engine: Engine<P, C>,
    topic: String,
    func: WorkflowFn,
    host: Arc<dyn EffectHost>,
    msg: StreamData,
) -> StreamDataResponse {
    let Some(jid) = msg.metadata.jid.clone() else {
        return error_response(msg, code::WF_FATAL, "frame invocation without jid");
    };

    let replay = match engine
        .store()
        .ledger_fields_with_prefix(&jid, REPLAY_PREFIX)
        .await
    {
        Ok(fields) => fields,
        Err(e) => return error_response(msg, code::WF_RETRYABLE, &e.to_string()),
    };
    let job_data = engine
        .store()
        .get_job_data(&jid)
        .await
        .unwrap_or(Value::Null);

    let ctx = WorkflowContext::new(jid, topic, replay, job_data, host);
    let outcome = func(ctx.clone()).await;

    match outcome {
        Ok(value) => StreamDataResponse {
            status: Some(StreamStatus::Success),
            code: Some(code::SUCCESS),
            data: json!({"response": value, "done": true}),
            ..msg
        },
        Err(WorkflowError::Interrupted) => {
            let items = ctx.take_registry();
            match items.len() {
                0 => error_response(
                    msg,
                    code::WF_FATAL,
                    "frame suspended with an empty interruption registry",
                ),
                1 => {
                    let item = &items[0];
                    let item_code = interruption_code(item);
                    let data = serde_json::to_value(item).unwrap_or(Value::Null);
                    StreamDataResponse {
                        status: Some(StreamStatus::Pending),
                        code: Some(item_code),
                        data,
                        ..msg
                    }
                }
                _ => StreamDataResponse {
                    status: Some(StreamStatus::Pending),
                    code: Some(code::WF_ALL),
                    data: json!({
                        "items": serde_json::to_value(&items).unwrap_or(Value::Null)
                    }),
                    ..msg
                },
            }
        }
        Err(e) => {
            let message = e.to_string();
            error_response(msg, e.code(), &message)
        }
    }
}

fn interruption_code(item: &Interruption) -> u16 {
    match item {
        Interruption::Sleep { .. } => code::WF_SLEEP,
        Interruption::Wait { .. } => code::WF_WAIT,
        Interruption::Child { .. } => code::WF_CHILD,
        Interruption::Proxy { .. } => code::WF_PROXY,
    }
}

/// Serve one proxied-activity invocation.
async fn run_activity(registry: ActivityRegistry, msg: StreamData) -> StreamDataResponse {
    let index = msg.data.get("index").cloned().unwrap_or(Value::Null);
    let name = msg
        .data
        .get("activity")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let args = msg.data.get("args").cloned().unwrap_or(Value::Null);
    let retry = msg.data.get("retry").cloned().unwrap_or(Value::Null);

    let Some(func) = registry.get(&name) else {
        return StreamDataResponse {
            status: Some(StreamStatus::Error),
            code: Some(code::WF_FATAL),
            data: json!({
                "index": index,
                "activity": name,
                "args": args,
                "retry": retry,
                "message": format!("unknown activity: {name}"),
            }),
            ..msg
        };
    };

    match func(args.clone()).await {
        Ok(result) => StreamDataResponse {
            status: Some(StreamStatus::Success),
            code: Some(code::SUCCESS),
            data: json!({"index": index, "result": result}),
            ..msg
        },
        Err(e) => StreamDataResponse {
            status: Some(StreamStatus::Error),
            code: Some(e.code()),
            data: json!({
                "index": index,
                "activity": name,
                "args": args,
                "retry": retry,
                "message": e.to_string(),
            }),
            ..msg
        },
    }
}

fn error_response(msg: StreamData, error_code: u16, message: &str) -> StreamDataResponse {
    StreamDataResponse {
        status: Some(StreamStatus::Error),
        code: Some(error_code),
        data: json!({"message": message}),
        ..msg
    }
}
