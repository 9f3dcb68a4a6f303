// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn builder_assembles_descriptor() {
    let activity = Activity::of("w1", ActivityKind::Worker)
        .subtype("calc.exec")
        .parent("t1")
        .input(json!({"values": "{t1.output.data.values}"}))
        .adjacent(Transition::to("h1"))
        .adjacent(Transition::to("h2"))
        .build();

    assert_eq!(activity.aid, "w1");
    assert_eq!(activity.kind, ActivityKind::Worker);
    assert_eq!(activity.subtype.as_deref(), Some("calc.exec"));
    assert_eq!(activity.fanout(), 2);
}

#[test]
fn sleep_and_hook_topic_share_hook_config() {
    let activity = Activity::of("h1", ActivityKind::Hook)
        .sleep(json!(30))
        .build();
    assert_eq!(activity.hook.as_ref().and_then(|h| h.sleep.clone()), Some(json!(30)));

    let webhook = Activity::of("h2", ActivityKind::Hook)
        .hook_topic("wfs.signal")
        .build();
    assert_eq!(
        webhook.hook.as_ref().and_then(|h| h.topic.clone()),
        Some("wfs.signal".to_string())
    );
}

#[test]
fn kind_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ActivityKind::Interrupt).unwrap(),
        "\"interrupt\""
    );
    assert_eq!(ActivityKind::Await.to_string(), "await");
}

#[test]
fn transition_conditions_deserialize_with_match_key() {
    let conditions: TransitionConditions = serde_json::from_value(json!({
        "gate": "or",
        "match": [
            {"expected": true, "actual": "{t1.output.data.ok}"}
        ]
    }))
    .unwrap();
    assert_eq!(conditions.gate, TransitionGate::Or);
    assert_eq!(conditions.matches.len(), 1);
}

#[test]
fn transition_gate_defaults_to_and() {
    let conditions: TransitionConditions =
        serde_json::from_value(json!({"match": []})).unwrap();
    assert_eq!(conditions.gate, TransitionGate::And);
}

#[test]
fn guarded_transition_carries_conditions() {
    let t = Transition::guarded(
        "next",
        TransitionConditions {
            gate: TransitionGate::And,
            matches: vec![TransitionMatch {
                expected: json!(200),
                actual: json!("{w1.output.metadata.code}"),
            }],
        },
    );
    assert!(t.conditions.is_some());
    assert_eq!(t.to, "next");
}

#[test]
fn descriptor_serde_roundtrip() {
    let activity = Activity::of("i1", ActivityKind::Interrupt)
        .interrupt(InterruptConfig {
            target: Some(json!("{t1.output.data.child_id}")),
            throw: Some(false),
            descend: true,
            reason: Some("cascade".to_string()),
            expire: Some(0),
        })
        .build();
    let raw = serde_json::to_string(&activity).unwrap();
    let back: Activity = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, activity);
}
