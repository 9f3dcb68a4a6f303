//! S4 — publishing the same jid twice rejects.

use crate::prelude::*;
use hm_core::{Activity, ActivityKind, App, Graph, JobId, Transition};
use hm_engine::EngineError;
use serde_json::json;

fn order_app() -> App {
    App::new("spec", "1").graph(
        Graph::new("order.scheduled")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("h1"))
                    .build(),
            )
            .activity(Activity::of("h1", ActivityKind::Hook).parent("t1").build()),
    )
}

#[tokio::test]
async fn second_pub_with_same_jid_throws_duplicate() {
    let engine = spec_engine(order_app()).await;
    let jid = JobId::new("ord_1002");

    let first = engine
        .pub_job(
            "order.scheduled",
            json!({"id": "ord_1002", "qty": 3}),
            Some(jid.clone()),
        )
        .await
        .unwrap();
    assert_eq!(first, jid);

    let second = engine
        .pub_job(
            "order.scheduled",
            json!({"id": "ord_1002", "qty": 3}),
            Some(jid.clone()),
        )
        .await;
    match second {
        Err(EngineError::DuplicateJob(dup)) => assert_eq!(dup, jid),
        other => panic!("expected duplicate-job error, got {other:?}"),
    }

    // The first job is unharmed and still completes
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            let jid = jid.clone();
            async move { engine.get_status(&jid).await == Ok(0) }
        })
        .await
    );
}
