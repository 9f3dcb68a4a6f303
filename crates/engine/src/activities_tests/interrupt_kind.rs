// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interrupt activity: self-interrupt, targeted interrupt, and descent.

use crate::test_helpers::{started_engine, wait_until};
use hm_core::{
    Activity, ActivityKind, App, Graph, InterruptConfig, JobId, Transition,
};
use serde_json::json;

fn self_interrupt_app() -> App {
    App::new("test", "1").graph(
        Graph::new("abort.run")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("i1"))
                    .build(),
            )
            .activity(
                Activity::of("i1", ActivityKind::Interrupt)
                    .parent("t1")
                    .interrupt(InterruptConfig {
                        target: None,
                        throw: Some(true),
                        descend: false,
                        reason: Some("halted by graph".to_string()),
                        expire: None,
                    })
                    .build(),
            ),
    )
}

fn targeted_interrupt_app() -> App {
    App::new("test", "1")
        .graph(
            Graph::new("victim.run")
                .activity(
                    Activity::of("t1", ActivityKind::Trigger)
                        .adjacent(Transition::to("w1"))
                        .build(),
                )
                .activity(
                    Activity::of("w1", ActivityKind::Worker)
                        .subtype("victim.work")
                        .parent("t1")
                        .build(),
                ),
        )
        .graph(
            Graph::new("killer.run")
                .activity(
                    Activity::of("kt", ActivityKind::Trigger)
                        .adjacent(Transition::to("ki"))
                        .build(),
                )
                .activity(
                    Activity::of("ki", ActivityKind::Interrupt)
                        .parent("kt")
                        .interrupt(InterruptConfig {
                            target: Some(json!("{kt.output.data.victim}")),
                            throw: Some(true),
                            descend: false,
                            reason: Some("terminated".to_string()),
                            expire: None,
                        })
                        .job(json!({"fired": true}))
                        .build(),
                ),
        )
}

#[tokio::test]
async fn self_interrupt_ends_job_with_410() {
    let (engine, _) = started_engine(self_interrupt_app()).await;
    let result = engine
        .pub_sub("abort.run", json!({}), None, Some(4_000))
        .await;
    match result {
        Err(crate::error::EngineError::JobFailed(err)) => {
            assert_eq!(err.code, 410);
            assert_eq!(err.message, "halted by graph");
        }
        other => panic!("expected interrupted job, got {other:?}"),
    }
}

#[tokio::test]
async fn targeted_interrupt_stops_other_job_and_proceeds() {
    let (engine, _) = started_engine(targeted_interrupt_app()).await;
    // Victim parks on an unserved worker topic
    let victim = engine
        .pub_job("victim.run", json!({}), Some(JobId::new("victim-1")))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let output = engine
        .pub_sub("killer.run", json!({"victim": "victim-1"}), None, Some(4_000))
        .await
        .unwrap();
    // The killer job itself completes normally
    assert_eq!(output.data["fired"], json!(true));
    assert_eq!(output.metadata.js, 0);

    assert!(
        wait_until(|| {
            let engine = engine.clone();
            let victim = victim.clone();
            async move {
                matches!(engine.get_status(&victim).await, Ok(status) if status < 0)
            }
        })
        .await,
        "victim should be interrupted"
    );
    let state = engine.get_state(&victim).await.unwrap();
    assert_eq!(state.metadata.error().map(|e| e.code), Some(410));
}

#[tokio::test]
async fn missing_target_is_best_effort() {
    let (engine, _) = started_engine(targeted_interrupt_app()).await;
    let output = engine
        .pub_sub("killer.run", json!({"victim": "nobody"}), None, Some(4_000))
        .await
        .unwrap();
    assert_eq!(output.metadata.js, 0, "killer proceeds despite missing target");
}

#[tokio::test]
async fn descend_interrupts_children() {
    // Parent awaits a child that parks on an unserved worker topic
    let app = App::new("test", "1")
        .graph(
            Graph::new("family.run")
                .activity(
                    Activity::of("t1", ActivityKind::Trigger)
                        .adjacent(Transition::to("a1"))
                        .build(),
                )
                .activity(
                    Activity::of("a1", ActivityKind::Await)
                        .subtype("kid.run")
                        .parent("t1")
                        .input(json!({"payload": {}, "await": true, "jid": "kid-1"}))
                        .build(),
                ),
        )
        .graph(
            Graph::new("kid.run")
                .activity(
                    Activity::of("kt", ActivityKind::Trigger)
                        .adjacent(Transition::to("kw"))
                        .build(),
                )
                .activity(
                    Activity::of("kw", ActivityKind::Worker)
                        .subtype("kid.work")
                        .parent("kt")
                        .build(),
                ),
        );
    let (engine, _) = started_engine(app).await;

    let parent = engine
        .pub_job("family.run", json!({}), Some(JobId::new("family-1")))
        .await
        .unwrap();
    // Wait for the child to exist and park
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move { engine.get_status(&JobId::new("kid-1")).await == Ok(1) }
        })
        .await
    );

    engine
        .interrupt(
            &parent,
            InterruptConfig {
                descend: true,
                reason: Some("shutdown".to_string()),
                ..InterruptConfig::default()
            },
        )
        .await
        .unwrap();

    assert!(engine.get_status(&parent).await.unwrap() < 0);
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                matches!(
                    engine.get_status(&JobId::new("kid-1")).await,
                    Ok(status) if status < 0
                )
            }
        })
        .await,
        "descend must interrupt the child"
    );
}
