//! S6 — quorum throttle broadcast: per-topic rates persist and apply on
//! every engine; a global rate overwrites both.

use crate::prelude::*;
use hm_core::{Activity, ActivityKind, App, Graph, ThrottleOptions};

fn app() -> App {
    App::new("spec", "1").graph(
        Graph::new("calc.run")
            .activity(Activity::of("t1", ActivityKind::Trigger).build()),
    )
}

#[tokio::test]
async fn topic_throttle_broadcasts_and_persists() {
    let one = spec_engine(app()).await;
    let two = join_engine(&one).await;

    one.throttle(ThrottleOptions {
        guid: None,
        topic: Some("calc.exec".to_string()),
        throttle: 2_000,
    })
    .await
    .unwrap();

    // Persisted rate reads back
    let rates = one.store().get_throttles().await.unwrap();
    assert_eq!(rates.get("calc.exec"), Some(&2_000));

    // Both engines honor the broadcast within one quorum delay
    assert!(
        wait_until(|| {
            let one = one.clone();
            let two = two.clone();
            async move {
                one.throttle_rate(Some("calc.exec")) == 2_000
                    && two.throttle_rate(Some("calc.exec")) == 2_000
            }
        })
        .await
    );

    // A subsequent global throttle overwrites both the global and the
    // per-topic effective rate
    one.throttle(ThrottleOptions {
        guid: None,
        topic: None,
        throttle: 5_000,
    })
    .await
    .unwrap();

    let rates = one.store().get_throttles().await.unwrap();
    assert_eq!(rates.get("*"), Some(&5_000));
    assert_eq!(rates.get("calc.exec"), Some(&5_000));

    assert!(
        wait_until(|| {
            let one = one.clone();
            let two = two.clone();
            async move {
                one.throttle_rate(Some("calc.exec")) == 5_000
                    && one.throttle_rate(None) == 5_000
                    && two.throttle_rate(Some("calc.exec")) == 5_000
                    && two.throttle_rate(None) == 5_000
            }
        })
        .await
    );
}

#[tokio::test]
async fn guid_targeted_throttle_only_applies_to_that_engine() {
    let one = spec_engine(app()).await;
    let two = join_engine(&one).await;

    one.throttle(ThrottleOptions {
        guid: Some(two.id().to_string()),
        topic: None,
        throttle: 750,
    })
    .await
    .unwrap();

    assert!(
        wait_until(|| {
            let two = two.clone();
            async move { two.throttle_rate(None) == 750 }
        })
        .await
    );
    assert_eq!(one.throttle_rate(None), 0, "untargeted engine unchanged");
}

#[tokio::test]
async fn roll_call_sees_both_engines() {
    let one = spec_engine(app()).await;
    let two = join_engine(&one).await;

    let profiles = one.roll_call(None).await.unwrap();
    let ids: Vec<String> = profiles.iter().map(|p| p.engine_id.to_string()).collect();
    assert!(ids.contains(&one.id().to_string()), "ids: {ids:?}");
    assert!(ids.contains(&two.id().to_string()), "ids: {ids:?}");
}
