// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{ActivityId, JobId};
use serde_json::json;

#[test]
fn message_type_serializes_lowercase() {
    let json = serde_json::to_string(&StreamMessageType::Timehook).unwrap();
    assert_eq!(json, "\"timehook\"");
}

#[test]
fn kind_defaults_to_transition() {
    let msg = StreamData::builder().build();
    assert_eq!(msg.kind(), StreamMessageType::Transition);
}

#[test]
fn try_field_uses_wire_name() {
    let mut msg = StreamData::builder().build();
    msg.metadata.attempt = 2;
    let v = serde_json::to_value(&msg).unwrap();
    assert_eq!(v["metadata"]["try"], 2);
}

#[test]
fn awaits_field_uses_wire_name() {
    let mut msg = StreamData::builder().build();
    msg.metadata.awaits = Some(false);
    let v = serde_json::to_value(&msg).unwrap();
    assert_eq!(v["metadata"]["await"], false);
}

#[test]
fn retry_spec_forms() {
    let linear: StreamRetrySpec = serde_json::from_value(json!([3])).unwrap();
    assert_eq!(linear.max_retries(), 3);
    assert!(!linear.exponential());

    let exp: StreamRetrySpec = serde_json::from_value(json!([5, "x"])).unwrap();
    assert_eq!(exp.max_retries(), 5);
    assert!(exp.exponential());
}

#[test]
fn policies_lookup_by_code() {
    let policies: StreamPolicies =
        serde_json::from_value(json!({"retry": {"500": [2, "x"]}})).unwrap();
    assert_eq!(policies.retry_for(500).map(|s| s.max_retries()), Some(2));
    assert!(policies.retry_for(404).is_none());
}

#[test]
fn wire_roundtrip_preserves_payload() {
    let msg = StreamData {
        metadata: StreamMetadata {
            guid: "g1".to_string(),
            topic: Some("calc.exec".to_string()),
            jid: Some(JobId::new("job-1")),
            gid: Some("gen-1".to_string()),
            dad: Some("/0".to_string()),
            aid: ActivityId::new("w1"),
            trc: None,
            spn: None,
            attempt: 0,
            awaits: None,
        },
        message_type: Some(StreamMessageType::Worker),
        data: json!({"x": 1}),
        policies: None,
        status: Some(StreamStatus::Success),
        code: Some(200),
        stack: None,
    };
    let raw = serde_json::to_string(&msg).unwrap();
    let back: StreamData = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, msg);
}
