// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-engine: the runtime execution core.
//!
//! Activity state machines over a dimensional process model, the stream
//! router and worker pool, the task service for time- and web-hooks, the
//! quorum control plane, and the orchestrating `Engine` facade.

mod activities;
mod engine;
mod error;
mod export;
mod flow;
mod quorum;
mod router;
mod task;
#[cfg(test)]
mod test_helpers;
mod throttle;

pub use engine::{Engine, EngineOptions, WorkerCallback, WorkerFuture};
pub use error::EngineError;
pub use export::{ExportBundle, TimelineEntry};
pub use flow::{Interruption, ACTIVITY_TOPIC_SUFFIX, WFS_SIGNAL_TOPIC};
pub use router::{RouterConfig, StreamHandler, StreamRouter};
pub use throttle::ThrottleRegistry;
