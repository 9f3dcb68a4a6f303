// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{EngineId, JobMetadata, JobOutput};
use serde_json::json;

#[test]
fn ping_serializes_with_type_tag() {
    let msg = QuorumMessage::Ping {
        requestor: EngineId::new("eng-1"),
    };
    let v = serde_json::to_value(&msg).unwrap();
    assert_eq!(v["type"], "quorum:ping");
    assert_eq!(v["requestor"], "eng-1");
}

#[test]
fn pong_roundtrip() {
    let msg = QuorumMessage::Pong {
        requestor: EngineId::new("eng-1"),
        profile: QuorumProfile {
            engine_id: EngineId::new("eng-2"),
            stream_depth: 42,
            worker_topic: Some("calc.exec".to_string()),
            app_version: Some("2".to_string()),
        },
    };
    let raw = serde_json::to_string(&msg).unwrap();
    let back: QuorumMessage = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn unknown_type_deserializes_to_custom() {
    let msg: QuorumMessage =
        serde_json::from_value(json!({"type": "quorum:later-feature"})).unwrap();
    assert_eq!(msg, QuorumMessage::Custom);
}

#[test]
fn throttle_global_detection() {
    assert!(ThrottleOptions {
        guid: None,
        topic: None,
        throttle: 5000
    }
    .is_global());
    assert!(!ThrottleOptions {
        guid: None,
        topic: Some("calc.exec".to_string()),
        throttle: 2000
    }
    .is_global());
}

#[test]
fn job_broadcast_carries_completion() {
    let msg = QuorumMessage::Job {
        completion: crate::JobCompletion {
            topic: "test.executed".to_string(),
            job_output: JobOutput {
                metadata: JobMetadata::builder().build(),
                data: json!({"ok": true}),
            },
        },
    };
    let v = serde_json::to_value(&msg).unwrap();
    assert_eq!(v["type"], "quorum:job");
    assert_eq!(v["completion"]["topic"], "test.executed");
}
