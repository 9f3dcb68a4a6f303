// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal activity: fan-out to parked jobs with optional index scrub.

use crate::test_helpers::{started_engine, wait_until};
use hm_core::{Activity, ActivityKind, App, Graph, HookRule, JobId, Transition};
use serde_json::json;

/// Two graphs: `waiter.run` parks on an approval topic; `approve.run`
/// fans the approval out via a signal activity.
fn approval_app(scrub: bool) -> App {
    App::new("test", "1")
        .graph(
            Graph::new("waiter.run")
                .activity(
                    Activity::of("t1", ActivityKind::Trigger)
                        .adjacent(Transition::to("g1"))
                        .build(),
                )
                .activity(
                    Activity::of("g1", ActivityKind::Hook)
                        .parent("t1")
                        .hook_topic("review.done")
                        .input(json!({"key": "{t1.output.data.batch}"}))
                        .job(json!({"verdict": "{g1.hook.data.verdict}"}))
                        .build(),
                )
                .hook(HookRule {
                    topic: "review.done".to_string(),
                    to: hm_core::ActivityId::new("g1"),
                    resolver: json!("{$self.hook.data.batch}"),
                    scrub: false,
                }),
        )
        .graph(
            Graph::new("approve.run")
                .activity(
                    Activity::of("at", ActivityKind::Trigger)
                        .adjacent(Transition::to("s1"))
                        .build(),
                )
                .activity(
                    Activity::of("s1", ActivityKind::Signal)
                        .subtype("review.done")
                        .parent("at")
                        .input(json!({
                            "key": "{at.output.data.batch}",
                            "data": {"verdict": "approved"},
                            "scrub": scrub,
                        }))
                        .job(json!({"targets": "{s1.output.data.targets}"}))
                        .build(),
                ),
        )
}

#[tokio::test]
async fn signal_fans_out_to_every_parked_job() {
    let (engine, _) = started_engine(approval_app(false)).await;

    for jid in ["wait-a", "wait-b"] {
        engine
            .pub_job("waiter.run", json!({"batch": "b-7"}), Some(JobId::new(jid)))
            .await
            .unwrap();
    }
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                engine
                    .store()
                    .resolve_web_hooks("review.done", "b-7")
                    .await
                    .unwrap_or_default()
                    .len()
                    == 2
            }
        })
        .await
    );

    let output = engine
        .pub_sub("approve.run", json!({"batch": "b-7"}), None, Some(4_000))
        .await
        .unwrap();
    let targets = output.data["targets"].as_array().cloned().unwrap_or_default();
    assert_eq!(targets.len(), 2);

    for jid in ["wait-a", "wait-b"] {
        let jid = JobId::new(jid);
        assert!(
            wait_until(|| {
                let engine = engine.clone();
                let jid = jid.clone();
                async move { engine.get_status(&jid).await == Ok(0) }
            })
            .await
        );
        let state = engine.get_state(&jid).await.unwrap();
        assert_eq!(state.data["verdict"], json!("approved"));
    }
}

#[tokio::test]
async fn scrub_deletes_the_index_after_use() {
    let (engine, _) = started_engine(approval_app(true)).await;
    engine
        .pub_job("waiter.run", json!({"batch": "b-9"}), Some(JobId::new("wait-s")))
        .await
        .unwrap();
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                !engine
                    .store()
                    .resolve_web_hooks("review.done", "b-9")
                    .await
                    .unwrap_or_default()
                    .is_empty()
            }
        })
        .await
    );

    engine
        .pub_sub("approve.run", json!({"batch": "b-9"}), None, Some(4_000))
        .await
        .unwrap();

    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                engine
                    .store()
                    .resolve_web_hooks("review.done", "b-9")
                    .await
                    .unwrap_or_default()
                    .is_empty()
            }
        })
        .await,
        "scrub must remove the whole index entry"
    );
}

#[tokio::test]
async fn signal_with_no_parked_jobs_still_completes() {
    let (engine, _) = started_engine(approval_app(false)).await;
    let output = engine
        .pub_sub("approve.run", json!({"batch": "empty"}), None, Some(4_000))
        .await
        .unwrap();
    assert_eq!(output.data["targets"], json!([]));
    assert_eq!(output.metadata.js, 0);
}
