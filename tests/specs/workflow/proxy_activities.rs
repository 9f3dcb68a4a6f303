//! Proxied activities: at-most-once side effects over the activity
//! worker, with graduated retries and a maxed-out terminal kind.

use crate::prelude::*;
use hm_core::codes::code;
use hm_core::RetryPolicy;
use hm_engine::EngineError;
use hm_workflow::{workflow_graph, ActivityRegistry, MeshFlow, WorkflowError};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn proxy_result_replays_into_the_frame() {
    let app = hm_core::App::new("spec", "1").graph(workflow_graph("math.flow"));
    let engine = spec_engine(app).await;

    let calls = Arc::new(AtomicU32::new(0));
    let registry = {
        let calls = Arc::clone(&calls);
        ActivityRegistry::new().register("add", move |args: serde_json::Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let sum: i64 = args
                    .as_array()
                    .map(|items| items.iter().filter_map(|v| v.as_i64()).sum())
                    .unwrap_or(0);
                Ok(json!(sum))
            }
        })
    };
    MeshFlow::activities(&engine, "math.flow", registry);
    MeshFlow::worker(&engine, "math.flow", |ctx| async move {
        let sum: i64 = ctx.proxy("add", json!([3, 4]), None).await?;
        let doubled: i64 = ctx.proxy("add", json!([sum, sum]), None).await?;
        Ok(json!({"sum": sum, "doubled": doubled}))
    });

    let output = engine
        .pub_sub("math.flow", json!({}), None, Some(10_000))
        .await
        .unwrap();
    assert_eq!(output.data["sum"], json!(7));
    assert_eq!(output.data["doubled"], json!(14));
    // Each proxied call executed exactly once across all replays
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retryable_proxy_maxes_out_as_597() {
    let app = hm_core::App::new("spec", "1").graph(workflow_graph("flaky.flow"));
    let engine = spec_engine(app).await;

    let calls = Arc::new(AtomicU32::new(0));
    let registry = {
        let calls = Arc::clone(&calls);
        ActivityRegistry::new().register("never", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<serde_json::Value, _>(WorkflowError::Retryable("still down".to_string()))
            }
        })
    };
    MeshFlow::activities(&engine, "flaky.flow", registry);
    MeshFlow::worker(&engine, "flaky.flow", |ctx| async move {
        // Unit coefficient keeps the graduated retry delay at one second
        let retry = RetryPolicy {
            maximum_attempts: Some(2),
            backoff_coefficient: Some(1),
            maximum_interval: Some("2s".to_string()),
            ..RetryPolicy::default()
        };
        match ctx.proxy::<serde_json::Value>("never", json!(null), Some(retry)).await {
            Err(WorkflowError::Maxed(_)) => Err(WorkflowError::Fatal("maxed as expected".into())),
            Err(e) => Err(e),
            Ok(_) => Err(WorkflowError::Fatal("unexpected success".into())),
        }
    });

    let started = std::time::Instant::now();
    let result = engine
        .pub_sub("flaky.flow", json!({}), None, Some(10_000))
        .await;
    match result {
        Err(EngineError::JobFailed(err)) => {
            assert_eq!(err.code, code::WF_FATAL);
            assert_eq!(err.message, "fatal: maxed as expected");
        }
        other => panic!("expected failed job, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2, "policy capped the attempts");
    assert!(
        started.elapsed().as_secs_f64() >= 1.0,
        "the second attempt must wait out the graduated backoff"
    );
}
