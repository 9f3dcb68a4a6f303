// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::JobId;
use serde_json::json;

#[test]
fn semaphore_states() {
    let mut meta = JobMetadata::builder().build();
    assert!(meta.is_running());
    meta.js = 0;
    assert!(meta.is_complete());
    meta.js = -1;
    assert!(meta.is_interrupted());
}

#[test]
fn error_decodes_from_serialized_field() {
    let err = JobError::new(410, "interrupted").with_job(JobId::new("job-9"));
    let meta = JobMetadata::builder()
        .err(serde_json::to_string(&err).unwrap())
        .build();
    let decoded = meta.error().unwrap();
    assert_eq!(decoded.code, 410);
    assert_eq!(decoded.job_id, Some(JobId::new("job-9")));
}

#[test]
fn error_none_when_unset() {
    assert!(JobMetadata::builder().build().error().is_none());
}

#[test]
fn output_serde_roundtrip() {
    let output = JobOutput {
        metadata: JobMetadata::builder().build(),
        data: json!({"done": true, "count": 3}),
    };
    let json = serde_json::to_string(&output).unwrap();
    let back: JobOutput = serde_json::from_str(&json).unwrap();
    assert_eq!(back, output);
}

#[test]
fn completion_carries_topic_and_output() {
    let completion = JobCompletion {
        topic: "order.executed".to_string(),
        job_output: JobOutput {
            metadata: JobMetadata::builder().build(),
            data: json!({}),
        },
    };
    let v = serde_json::to_value(&completion).unwrap();
    assert_eq!(v["topic"], "order.executed");
}

#[test]
fn job_error_display() {
    let err = JobError::new(504, "timed out");
    assert_eq!(err.to_string(), "timed out (504)");
}
