// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::started_engine;
use hm_core::{Activity, ActivityKind, App, Graph, Transition};
use serde_json::json;
use std::collections::BTreeSet;

fn chain_app() -> App {
    App::new("test", "1").graph(
        Graph::new("chain.run")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("h1"))
                    .build(),
            )
            .activity(
                Activity::of("h1", ActivityKind::Hook)
                    .parent("t1")
                    .adjacent(Transition::to("h2"))
                    .build(),
            )
            .activity(Activity::of("h2", ActivityKind::Hook).parent("h1").build()),
    )
}

#[tokio::test]
async fn timeline_covers_every_activity_record() {
    let (engine, _) = started_engine(chain_app()).await;
    let output = engine
        .pub_sub("chain.run", json!({"x": 1}), None, Some(2_000))
        .await
        .unwrap();
    let bundle = engine.export(&output.metadata.jid).await.unwrap();

    let timeline_set: BTreeSet<(String, String)> = bundle
        .timeline
        .iter()
        .map(|e| (e.activity.clone(), e.dimension.clone()))
        .collect();

    let record_set: BTreeSet<(String, String)> = engine
        .store()
        .process_fields(&output.metadata.jid)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|(path, dad, _)| {
            path.split('/').next().map(|aid| (aid.to_string(), dad))
        })
        .collect();

    assert_eq!(timeline_set, record_set);
    assert!(timeline_set.contains(&("t1".to_string(), "/0".to_string())));
    assert!(timeline_set.contains(&("h2".to_string(), "/0".to_string())));
}

#[tokio::test]
async fn timeline_sorted_by_compound_key() {
    let (engine, _) = started_engine(chain_app()).await;
    let output = engine
        .pub_sub("chain.run", json!({}), None, Some(2_000))
        .await
        .unwrap();
    let bundle = engine.export(&output.metadata.jid).await.unwrap();

    let mut prev = 0u64;
    for entry in &bundle.timeline {
        assert!(entry.timestamp >= prev, "timeline out of order");
        prev = entry.timestamp;
    }
}

#[tokio::test]
async fn bundle_carries_metadata_and_data() {
    let (engine, _) = started_engine(chain_app()).await;
    let output = engine
        .pub_sub("chain.run", json!({"k": "v"}), None, Some(2_000))
        .await
        .unwrap();
    let bundle = engine.export(&output.metadata.jid).await.unwrap();
    assert_eq!(bundle.jid, output.metadata.jid);
    assert_eq!(bundle.data["k"], json!("v"));
    assert_eq!(bundle.metadata.js, 0);
}
