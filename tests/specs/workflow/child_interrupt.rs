//! S3 — child cascade with interrupt: the parent starts a child, a
//! fire-and-forget sibling interrupts it with `throw: false`, and the
//! parent resolves with the child's progress so far.

use crate::prelude::*;
use hm_core::{InterruptConfig, JobId};
use hm_workflow::{workflow_graph, MeshFlow};
use serde_json::{json, Value};

#[tokio::test]
async fn interrupted_child_resolves_parent_with_partial_data() {
    let app = hm_core::App::new("spec", "1")
        .graph(workflow_graph("winter"))
        .graph(workflow_graph("snowball"))
        .graph(workflow_graph("snowplow"));
    let engine = spec_engine(app).await;

    // Parent: await the child and, in the same batch, launch the
    // fire-and-forget interrupter.
    MeshFlow::worker(&engine, "winter", |ctx| async move {
        let args = ctx.search().clone();
        let child = ctx.defer_child(
            "snowball",
            json!({"seed": args["seed"], "speed": args["speed"]}),
            true,
            Some("abcSuccess"),
        );
        let plow = ctx.defer_child(
            "snowplow",
            json!({"target": "abcSuccess", "throw": args["throw"]}),
            false,
            None,
        );
        let results = ctx.all(vec![child, plow])?;
        Ok(results.into_iter().next().unwrap_or(Value::Null))
    });

    // Child: record height and sheer, then wait for a spring that never
    // comes. `shave` is only written after the wait.
    MeshFlow::worker(&engine, "snowball", |ctx| async move {
        let args = ctx.search().clone();
        let height = args["seed"].as_i64().unwrap_or(0) * args["speed"].as_i64().unwrap_or(0);
        ctx.enrich(json!({"height": height})).await?;
        ctx.enrich(json!({"sheer": 0.25})).await?;
        let _spring: Value = ctx.wait_for("spring").await?;
        ctx.enrich(json!({"shave": true})).await?;
        Ok(json!({"melted": false}))
    });

    // Interrupter: give the child time to make progress, then stop it
    // without throwing.
    MeshFlow::worker(&engine, "snowplow", |ctx| async move {
        ctx.sleep_for("1 second").await?;
        let args = ctx.search().clone();
        let target = JobId::new(args["target"].as_str().unwrap_or_default());
        ctx.interrupt(
            &target,
            InterruptConfig {
                throw: Some(false),
                ..InterruptConfig::default()
            },
        )
        .await?;
        Ok(json!({"plowed": true}))
    });

    let output = engine
        .pub_sub(
            "winter",
            json!({"seed": 4, "speed": 6, "throw": false, "workflowId": "abcSuccess"}),
            None,
            Some(15_000),
        )
        .await
        .unwrap();

    // The child got as far as height and sheer before the interrupt
    assert_eq!(output.data["height"], json!(24));
    assert!(!output.data["sheer"].is_null(), "sheer should be recorded");
    assert!(output.data["shave"].is_null(), "shave is never reached");
}
