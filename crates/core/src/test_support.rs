// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for tests across crates.

use crate::activity::{Activity, ActivityKind, Transition};
use crate::app::{App, Graph};

/// Minimal three-node app: trigger -> worker -> hook (pass-through).
///
/// Topic layout: jobs start on `test.start`; the worker activity targets
/// worker topic `test.work`.
pub fn linear_app() -> App {
    App::new("test", "1").graph(
        Graph::new("test.start")
            .activity(
                Activity::of("t1", ActivityKind::Trigger)
                    .adjacent(Transition::to("w1"))
                    .build(),
            )
            .activity(
                Activity::of("w1", ActivityKind::Worker)
                    .subtype("test.work")
                    .parent("t1")
                    .adjacent(Transition::to("h1"))
                    .build(),
            )
            .activity(
                Activity::of("h1", ActivityKind::Hook)
                    .parent("w1")
                    .build(),
            ),
    )
}

