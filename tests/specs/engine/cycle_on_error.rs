//! S5 — a worker failing with 500 cycles back to the pivot until it
//! succeeds; each traversal runs under a fresh dimension.

use crate::prelude::*;
use hm_core::{
    Activity, ActivityKind, App, Graph, StreamStatus, Transition, TransitionConditions,
    TransitionGate, TransitionMatch,
};
use serde_json::json;
use serial_test::serial;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn code_guard(expected: u16) -> TransitionConditions {
    TransitionConditions {
        gate: TransitionGate::And,
        matches: vec![TransitionMatch {
            expected: json!(expected),
            actual: json!("{w1.output.metadata.code}"),
        }],
    }
}

fn retry_app() -> App {
    App::new("spec", "1").graph(
        Graph::new("calc.run")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("w1"))
                    .build(),
            )
            .activity(
                Activity::of("w1", ActivityKind::Worker)
                    .subtype("calc.exec")
                    .parent("t1")
                    .job(json!({"counter": "{w1.output.data.counter}"}))
                    .adjacent(Transition::guarded("d1", code_guard(200)))
                    .adjacent(Transition::guarded("c1", code_guard(500)))
                    .build(),
            )
            .activity(Activity::of("d1", ActivityKind::Hook).parent("w1").build())
            .activity(
                Activity::of("c1", ActivityKind::Cycle)
                    .parent("w1")
                    .ancestor("w1")
                    .build(),
            ),
    )
}

#[tokio::test]
#[serial]
async fn five_hundreds_cycle_then_succeed() {
    let engine = spec_engine(retry_app()).await;
    let attempts = Arc::new(AtomicU32::new(0));
    {
        let attempts = Arc::clone(&attempts);
        engine.register_worker("calc.exec", move |msg| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 5 {
                    hm_core::StreamDataResponse {
                        status: Some(StreamStatus::Error),
                        code: Some(500),
                        data: json!({"counter": n, "message": "transient"}),
                        ..msg
                    }
                } else {
                    hm_core::StreamDataResponse {
                        status: Some(StreamStatus::Success),
                        code: Some(200),
                        data: json!({"counter": n}),
                        ..msg
                    }
                }
            }
        });
    }

    let output = engine
        .pub_sub("calc.run", json!({}), None, Some(10_000))
        .await
        .unwrap();

    // Fifth attempt succeeded; status semaphore balanced to zero
    assert_eq!(output.data["counter"], json!(5));
    assert_eq!(output.metadata.js, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 5);

    // The pivot re-entered four times: five distinct dimensions
    let bundle = engine.export(&output.metadata.jid).await.unwrap();
    let pivot_dims: BTreeSet<String> = bundle
        .timeline
        .iter()
        .filter(|e| e.activity == "w1")
        .map(|e| e.dimension.clone())
        .collect();
    assert_eq!(pivot_dims.len(), 5, "dims: {pivot_dims:?}");
    assert!(pivot_dims.contains("/0"));
    assert!(pivot_dims.contains("/4"));
}
