//! S2 — a workflow awaits two signals; the result fans in once both
//! arrive and not before.

use crate::prelude::*;
use hm_core::JobId;
use hm_engine::WFS_SIGNAL_TOPIC;
use hm_workflow::{workflow_graph, MeshFlow};
use serde_json::json;

#[tokio::test]
async fn all_of_two_wait_fors_resolves_after_both_signals() {
    let app = hm_core::App::new("spec", "1").graph(workflow_graph("wf.signals"));
    let engine = spec_engine(app).await;
    MeshFlow::worker(&engine, "wf.signals", |ctx| async move {
        let a = ctx.defer_wait_for("a");
        let b = ctx.defer_wait_for("b");
        let results = ctx.all(vec![a, b])?;
        Ok(json!({ "results": results }))
    });

    let jid = JobId::new("fan-in-1");
    let waiter = {
        let engine = engine.clone();
        let jid = jid.clone();
        tokio::spawn(async move {
            engine
                .pub_sub("wf.signals", json!({}), Some(jid), Some(10_000))
                .await
        })
    };

    // Both waits registered in the signal index
    assert!(
        wait_until(|| {
            let engine = engine.clone();
            async move {
                let a = engine
                    .store()
                    .resolve_web_hooks(WFS_SIGNAL_TOPIC, "a")
                    .await
                    .unwrap_or_default();
                let b = engine
                    .store()
                    .resolve_web_hooks(WFS_SIGNAL_TOPIC, "b")
                    .await
                    .unwrap_or_default();
                !a.is_empty() && !b.is_empty()
            }
        })
        .await
    );

    // One signal is not enough
    engine
        .hook(WFS_SIGNAL_TOPIC, json!({"id": "a", "data": {"v": 1}}))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert!(
        engine.get_status(&jid).await.unwrap() > 0,
        "result must not resolve on a single signal"
    );

    engine
        .hook(WFS_SIGNAL_TOPIC, json!({"id": "b", "data": {"v": 2}}))
        .await
        .unwrap();

    let output = waiter.await.unwrap().unwrap();
    similar_asserts::assert_eq!(output.data["results"], json!([{"v": 1}, {"v": 2}]));
}
