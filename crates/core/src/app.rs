// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App and graph descriptors.
//!
//! Graph compilation from declarative source is a collaborator concern;
//! this crate only carries the compiled descriptor form.

use crate::activity::{Activity, ActivityKind, HookRule};
use crate::error::CoreError;
use crate::{ActivityId, AppId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A directed activity graph with a root subscription topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Topic whose publication creates a job of this graph.
    pub subscribes: String,
    pub activities: IndexMap<ActivityId, Activity>,
    #[serde(default)]
    pub hooks: Vec<HookRule>,
}

impl Graph {
    pub fn new(subscribes: impl Into<String>) -> Self {
        Self {
            subscribes: subscribes.into(),
            activities: IndexMap::new(),
            hooks: Vec::new(),
        }
    }

    pub fn activity(mut self, activity: Activity) -> Self {
        self.activities.insert(activity.aid.clone(), activity);
        self
    }

    pub fn hook(mut self, rule: HookRule) -> Self {
        self.hooks.push(rule);
        self
    }

    /// The graph's trigger activity.
    pub fn trigger(&self) -> Option<&Activity> {
        self.activities
            .values()
            .find(|a| a.kind == ActivityKind::Trigger)
    }

    pub fn get(&self, aid: &ActivityId) -> Option<&Activity> {
        self.activities.get(aid)
    }

    /// The reentrant workflow host worker, when this graph has one.
    pub fn reentrant_worker(&self) -> Option<&Activity> {
        self.activities
            .values()
            .find(|a| a.kind == ActivityKind::Worker && a.reentrant)
    }

    /// Hook rule bound to an external topic.
    pub fn hook_rule(&self, topic: &str) -> Option<&HookRule> {
        self.hooks.iter().find(|h| h.topic == topic)
    }
}

/// A deployed application: versioned set of graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub version: String,
    pub graphs: Vec<Graph>,
}

impl App {
    pub fn new(id: impl Into<AppId>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            graphs: Vec::new(),
        }
    }

    pub fn graph(mut self, graph: Graph) -> Self {
        self.graphs.push(graph);
        self
    }

    /// Graph subscribed to the given topic.
    pub fn graph_by_topic(&self, topic: &str) -> Result<&Graph, CoreError> {
        self.graphs
            .iter()
            .find(|g| g.subscribes == topic)
            .ok_or_else(|| CoreError::TopicNotFound(topic.to_string()))
    }

    /// Locate an activity and its graph by activity id.
    pub fn find_activity(&self, aid: &ActivityId) -> Result<(&Graph, &Activity), CoreError> {
        for graph in &self.graphs {
            if let Some(activity) = graph.get(aid) {
                return Ok((graph, activity));
            }
        }
        Err(CoreError::ActivityNotFound(aid.to_string()))
    }

    /// Hook rule for an external topic across all graphs.
    pub fn find_hook_rule(&self, topic: &str) -> Option<(&Graph, &HookRule)> {
        self.graphs
            .iter()
            .find_map(|g| g.hook_rule(topic).map(|h| (g, h)))
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
