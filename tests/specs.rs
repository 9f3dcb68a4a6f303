//! Behavioral specifications for the HotMesh runtime core.
//!
//! These tests are black-box: they drive the engine facade over the
//! in-memory provider and verify job outputs, persisted state, and
//! timing bounds. See tests/specs/prelude.rs for the shared harness.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// engine/
#[path = "specs/engine/cycle_on_error.rs"]
mod engine_cycle_on_error;
#[path = "specs/engine/duplicate_pub.rs"]
mod engine_duplicate_pub;
#[path = "specs/engine/sleep_resume.rs"]
mod engine_sleep_resume;

// workflow/
#[path = "specs/workflow/child_interrupt.rs"]
mod workflow_child_interrupt;
#[path = "specs/workflow/proxy_activities.rs"]
mod workflow_proxy_activities;
#[path = "specs/workflow/signal_fan_in.rs"]
mod workflow_signal_fan_in;

// quorum/
#[path = "specs/quorum/throttle.rs"]
mod quorum_throttle;
