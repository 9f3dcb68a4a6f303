//! S1 — a sleeping hook resumes within the fidelity bound.

use crate::prelude::*;
use hm_core::{Activity, ActivityKind, App, Graph, StreamStatus, Transition};
use serde_json::json;
use serial_test::serial;
use std::time::Instant;

fn sleepy_app() -> App {
    App::new("spec", "1").graph(
        Graph::new("go")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("h1"))
                    .build(),
            )
            .activity(
                Activity::of("h1", ActivityKind::Hook)
                    .parent("t1")
                    .sleep(json!(1))
                    .adjacent(Transition::to("w1"))
                    .build(),
            )
            .activity(
                Activity::of("w1", ActivityKind::Worker)
                    .subtype("go.work")
                    .parent("h1")
                    .job(json!({"done": "{w1.output.data.done}"}))
                    .build(),
            ),
    )
}

#[tokio::test]
#[serial]
async fn sleep_then_worker_completes_within_fidelity_bound() {
    let engine = spec_engine(sleepy_app()).await;
    engine.register_worker("go.work", |msg| async move {
        hm_core::StreamDataResponse {
            status: Some(StreamStatus::Success),
            code: Some(200),
            data: json!({"done": true}),
            ..msg
        }
    });

    let started = Instant::now();
    let output = engine
        .pub_sub("go", json!({}), None, Some(10_000))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(output.data["done"], json!(true));
    assert_eq!(output.metadata.js, 0);

    // Wakes no earlier than the 1s sleep, no later than
    // sleep + 2 x fidelity plus scheduling slack.
    assert!(elapsed.as_secs_f64() >= 1.0, "woke early: {elapsed:?}");
    assert!(
        elapsed.as_secs_f64() <= 1.0 + 2.0 + 0.5,
        "woke late: {elapsed:?}"
    );
}
