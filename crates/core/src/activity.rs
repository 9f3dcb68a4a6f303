// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity descriptors.
//!
//! Activities are a small closed sum; the hook trichotomy (time-hook,
//! web-hook, pass-through) and the interrupt self/target split are decided
//! at runtime from the resolved configuration, not from the kind tag.

use crate::retry::RetryPolicy;
use crate::ActivityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// Graph entry point; mints the job.
    Trigger,
    /// Emits work to a worker stream and parks for the response.
    Worker,
    /// Sleeps, waits for a web-hook, or passes through.
    Hook,
    /// Fans a payload out to every job matching a signal key.
    Signal,
    /// Ends its own job or interrupts another.
    Interrupt,
    /// Back-edge to an ancestor activity under a fresh dimension.
    Cycle,
    /// Starts a child job, optionally awaiting its completion.
    Await,
}

crate::simple_display! {
    ActivityKind {
        Trigger => "trigger",
        Worker => "worker",
        Hook => "hook",
        Signal => "signal",
        Interrupt => "interrupt",
        Cycle => "cycle",
        Await => "await",
    }
}

/// Boolean gate for a transition's match conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionGate {
    And,
    Or,
}

/// One guard leaf: `expected` and `actual` are pipe expressions resolved
/// against job context and compared for equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatch {
    pub expected: Value,
    pub actual: Value,
}

/// Guard tree carried on an outgoing edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConditions {
    #[serde(default = "default_gate")]
    pub gate: TransitionGate,
    #[serde(rename = "match")]
    pub matches: Vec<TransitionMatch>,
}

fn default_gate() -> TransitionGate {
    TransitionGate::And
}

/// One outgoing edge in the adjacency list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to: ActivityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<TransitionConditions>,
}

impl Transition {
    pub fn to(aid: impl Into<ActivityId>) -> Self {
        Self {
            to: aid.into(),
            conditions: None,
        }
    }

    pub fn guarded(aid: impl Into<ActivityId>, conditions: TransitionConditions) -> Self {
        Self {
            to: aid.into(),
            conditions: Some(conditions),
        }
    }
}

/// Binds an external topic to a target activity. The `resolver` pipe
/// expression computes the signal key from the incoming payload (at
/// delivery time) or from job context (at registration time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRule {
    pub topic: String,
    pub to: ActivityId,
    /// Pipe expression producing the resolved signal key.
    pub resolver: Value,
    /// Delete the index entry after a successful delivery.
    #[serde(default)]
    pub scrub: bool,
}

/// One node in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub aid: ActivityId,
    pub kind: ActivityKind,
    /// Worker topic (worker kind), child topic (await kind), or signal
    /// topic (signal kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Mapping rules producing the activity's input from job context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Mapping rules applied to the activity's raw output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Mapping rules merged into job data after leg 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Value>,
    /// Hook configuration (sleep expression or web-hook topic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookConfig>,
    /// Retry policy for worker/await invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Parent activity in the graph tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ActivityId>,
    /// Outgoing edges.
    #[serde(default)]
    pub adjacent: Vec<Transition>,
    /// Cycle target (cycle kind): the ancestor to re-enter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<ActivityId>,
    /// Interrupt options (interrupt kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptConfig>,
    /// Worker kind only: responses in the workflow-interruption band
    /// (588–595) park and re-enter this activity instead of erroring.
    #[serde(default)]
    pub reentrant: bool,
}

/// Hook sub-mode configuration; which field is set decides the runtime
/// trichotomy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Sleep seconds, or a pipe expression resolving to seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<Value>,
    /// Web-hook topic to park on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Pipe expression yielding the completion code for a web-hook
    /// delivery. 200 (the default) consumes the registration; 202 keeps
    /// it alive for another delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

/// Interrupt activity options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptConfig {
    /// Pipe expression resolving to the target jid; absent for self-interrupt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
    /// Surface a 410 error on waiters (default true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throw: Option<bool>,
    /// Recursively interrupt child jobs.
    #[serde(default)]
    pub descend: bool,
    /// Reason recorded on the interrupted job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Override for the interrupted job's expire seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<u64>,
}

impl Activity {
    /// Start a builder for an activity of the given kind.
    pub fn of(aid: impl Into<ActivityId>, kind: ActivityKind) -> ActivityBuilder {
        ActivityBuilder {
            activity: Activity {
                aid: aid.into(),
                kind,
                subtype: None,
                input: None,
                output: None,
                job: None,
                hook: None,
                retry: None,
                parent: None,
                adjacent: Vec::new(),
                ancestor: None,
                interrupt: None,
                reentrant: false,
            },
        }
    }

    /// Count of outgoing edges.
    pub fn fanout(&self) -> usize {
        self.adjacent.len()
    }
}

/// Production builder for activity descriptors.
pub struct ActivityBuilder {
    activity: Activity,
}

impl ActivityBuilder {
    pub fn subtype(mut self, v: impl Into<String>) -> Self {
        self.activity.subtype = Some(v.into());
        self
    }

    pub fn input(mut self, rules: Value) -> Self {
        self.activity.input = Some(rules);
        self
    }

    pub fn output(mut self, rules: Value) -> Self {
        self.activity.output = Some(rules);
        self
    }

    pub fn job(mut self, rules: Value) -> Self {
        self.activity.job = Some(rules);
        self
    }

    pub fn hook(mut self, hook: HookConfig) -> Self {
        self.activity.hook = Some(hook);
        self
    }

    pub fn sleep(mut self, expr: Value) -> Self {
        self.activity.hook.get_or_insert_with(HookConfig::default).sleep = Some(expr);
        self
    }

    pub fn hook_topic(mut self, topic: impl Into<String>) -> Self {
        self.activity.hook.get_or_insert_with(HookConfig::default).topic = Some(topic.into());
        self
    }

    pub fn hook_code(mut self, expr: Value) -> Self {
        self.activity.hook.get_or_insert_with(HookConfig::default).code = Some(expr);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.activity.retry = Some(policy);
        self
    }

    pub fn parent(mut self, aid: impl Into<ActivityId>) -> Self {
        self.activity.parent = Some(aid.into());
        self
    }

    pub fn adjacent(mut self, transition: Transition) -> Self {
        self.activity.adjacent.push(transition);
        self
    }

    pub fn ancestor(mut self, aid: impl Into<ActivityId>) -> Self {
        self.activity.ancestor = Some(aid.into());
        self
    }

    pub fn interrupt(mut self, config: InterruptConfig) -> Self {
        self.activity.interrupt = Some(config);
        self
    }

    pub fn reentrant(mut self) -> Self {
        self.activity.reentrant = true;
        self
    }

    pub fn build(self) -> Activity {
        self.activity
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
