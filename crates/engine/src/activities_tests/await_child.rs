// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Await activity: synchronous and asynchronous child starts.

use crate::test_helpers::{started_engine, wait_until};
use hm_core::{Activity, ActivityKind, App, Graph, JobId, Transition};
use serde_json::json;

/// Parent graph whose await activity starts a `child.run` job.
fn parent_child_app(awaits: bool) -> App {
    App::new("test", "1")
        .graph(
            Graph::new("parent.run")
                .activity(
                    Activity::of("t1", ActivityKind::Trigger)
                        .adjacent(Transition::to("a1"))
                        .build(),
                )
                .activity(
                    Activity::of("a1", ActivityKind::Await)
                        .subtype("child.run")
                        .parent("t1")
                        .input(json!({
                            "payload": {"n": "{t1.output.data.n}"},
                            "await": awaits,
                            "jid": "{t1.output.data.child_id}",
                        }))
                        .job(json!({"child": "{a1.output.data}"}))
                        .build(),
                ),
        )
        .graph(
            Graph::new("child.run")
                .activity(
                    Activity::of("ct", ActivityKind::Trigger)
                        .adjacent(Transition::to("ch"))
                        .build(),
                )
                .activity(
                    Activity::of("ch", ActivityKind::Hook)
                        .parent("ct")
                        .job(json!({"doubled": {
                            "@pipe": [
                                ["{ct.output.data.n}", 2],
                                ["{@number.multiply}"]
                            ]
                        }}))
                        .build(),
                ),
        )
}

#[tokio::test]
async fn synchronous_child_wakes_parent_with_result() {
    let (engine, _) = started_engine(parent_child_app(true)).await;
    let output = engine
        .pub_sub(
            "parent.run",
            json!({"n": 21, "child_id": "child-sync"}),
            None,
            Some(4_000),
        )
        .await
        .unwrap();

    // Parent data holds the child's completed output
    assert_eq!(output.data["child"]["doubled"], json!(42));
    assert_eq!(output.metadata.js, 0);

    // The child job itself completed
    let child = engine.get_state(&JobId::new("child-sync")).await.unwrap();
    assert_eq!(child.metadata.js, 0);
    assert_eq!(child.data["doubled"], json!(42));
}

#[tokio::test]
async fn asynchronous_child_records_jid_and_proceeds() {
    let (engine, _) = started_engine(parent_child_app(false)).await;
    let output = engine
        .pub_sub(
            "parent.run",
            json!({"n": 5, "child_id": "child-async"}),
            None,
            Some(4_000),
        )
        .await
        .unwrap();

    // Parent resolved immediately with only the child jid recorded
    assert_eq!(output.data["child"]["jid"], json!("child-async"));

    // The child still runs to completion on its own
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move { engine.get_status(&JobId::new("child-async")).await == Ok(0) }
        })
        .await
    );
}

#[tokio::test]
async fn failed_child_fails_awaiting_parent() {
    // Child graph whose trigger feeds a worker that always errors
    let app = App::new("test", "1")
        .graph(
            Graph::new("parent.run")
                .activity(
                    Activity::of("t1", ActivityKind::Trigger)
                        .adjacent(Transition::to("a1"))
                        .build(),
                )
                .activity(
                    Activity::of("a1", ActivityKind::Await)
                        .subtype("child.run")
                        .parent("t1")
                        .input(json!({"payload": {}, "await": true}))
                        .build(),
                ),
        )
        .graph(
            Graph::new("child.run")
                .activity(
                    Activity::of("ct", ActivityKind::Trigger)
                        .adjacent(Transition::to("cw"))
                        .build(),
                )
                .activity(
                    Activity::of("cw", ActivityKind::Worker)
                        .subtype("child.work")
                        .parent("ct")
                        .build(),
                ),
        );
    let (engine, _) = started_engine(app).await;
    engine.register_worker("child.work", |msg| async move {
        hm_core::StreamDataResponse {
            status: Some(hm_core::StreamStatus::Error),
            code: Some(500),
            data: json!({"message": "child exploded"}),
            ..msg
        }
    });

    let result = engine
        .pub_sub("parent.run", json!({}), None, Some(4_000))
        .await;
    match result {
        Err(crate::error::EngineError::JobFailed(err)) => {
            assert_eq!(err.code, 500);
            assert_eq!(err.message, "child exploded");
        }
        other => panic!("expected parent failure, got {other:?}"),
    }
}
