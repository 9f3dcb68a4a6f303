// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{started_engine, wait_until};
use hm_core::{Activity, ActivityKind, App, Graph, QuorumMessage};
use hm_providers::Provider;
use serde_json::json;

fn app(version: &str) -> App {
    App::new("test", version).graph(
        Graph::new("q.run").activity(Activity::of("t1", ActivityKind::Trigger).build()),
    )
}

async fn broadcast(
    engine: &crate::test_helpers::TestEngine,
    msg: &QuorumMessage,
) {
    let channel = engine.store().keys().quorum();
    engine
        .store()
        .provider()
        .publish(&channel, &serde_json::to_string(msg).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn broadcast_activate_swaps_local_graph_cache() {
    let (engine, _) = started_engine(app("1")).await;
    engine.deploy(app("2")).await.unwrap();

    broadcast(
        &engine,
        &QuorumMessage::Activate {
            cache_mode: "nocache".to_string(),
            until_version: "2".to_string(),
        },
    )
    .await;

    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                engine
                    .pub_sub("q.run", json!({}), None, Some(1_000))
                    .await
                    .map(|o| o.metadata.vrs == "2")
                    .unwrap_or(false)
            }
        })
        .await,
        "peers honor the broadcast version on subsequent reads"
    );
}

#[tokio::test]
async fn ping_draws_a_pong_with_profile() {
    let (engine, _) = started_engine(app("1")).await;
    // Give the quorum listener a queued message to answer
    broadcast(
        &engine,
        &QuorumMessage::Ping {
            requestor: hm_core::EngineId::new("someone-else"),
        },
    )
    .await;

    // The engine's own roll_call still sees itself among responders
    let profiles = engine.roll_call(Some(5)).await.unwrap();
    assert!(!profiles.is_empty());
    assert!(profiles
        .iter()
        .any(|p| p.app_version.as_deref() == Some("1")));
}

#[tokio::test]
async fn unknown_control_messages_are_ignored() {
    let (engine, _) = started_engine(app("1")).await;
    engine
        .store()
        .provider()
        .publish(
            &engine.store().keys().quorum(),
            "{\"type\": \"quorum:future-feature\", \"payload\": 1}",
        )
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // The engine is unaffected and still serves work
    let output = engine
        .pub_sub("q.run", json!({}), None, Some(2_000))
        .await
        .unwrap();
    assert_eq!(output.metadata.js, 0);
}

#[tokio::test]
async fn activation_fails_when_version_is_unknown() {
    let (engine, _) = started_engine(app("1")).await;
    assert!(matches!(
        engine.activate("9").await,
        Err(crate::error::EngineError::Store(
            hm_store::StoreError::AppNotFound(_)
        ))
    ));
}
