// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-workflow: the durable reentrant workflow runtime.
//!
//! User functions are ordinary async procedures over a [`WorkflowContext`].
//! Suspension points (`sleep_for`, `wait_for`, `exec_child`, proxied
//! activities, batched `all`) record interruption descriptors and return a
//! typed control-flow error that unwinds the frame through `?`. The host
//! collects the descriptors, reports them to the engine, and later
//! re-invokes the function with an extended replay table; replayed calls
//! return their stored results so execution is deterministic up to the
//! next new suspension.

mod context;
mod error;
mod host;

pub use context::{Deferred, WorkflowContext, WorkflowInfo, MAX_BATCH};
pub use error::WorkflowError;
pub use host::{
    workflow_graph, ActivityFuture, ActivityRegistry, EffectHost, MeshFlow, WorkflowFuture,
};
