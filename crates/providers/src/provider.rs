// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider trait and its wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("consumer group not found: {group} on {key}")]
    GroupNotFound { key: String, group: String },
    #[error("wrong type for key: {0}")]
    WrongType(String),
    #[error("field is not a number: {key} {field}")]
    NotANumber { key: String, field: String },
    #[error("backend error: {0}")]
    Backend(String),
}

/// One entry read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Monotonic per-stream id.
    pub id: String,
    /// Serialized payload.
    pub body: String,
}

/// Pending-entry summary for reclaim decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub id: String,
    /// Consumer currently holding the entry.
    pub consumer: String,
    /// Milliseconds since last delivery.
    pub idle_ms: u64,
    /// Times the entry has been delivered.
    pub delivery_count: u32,
}

/// A message delivered to a pub/sub subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

/// Receiving half of a pub/sub subscription; dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<PublishedMessage>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<PublishedMessage>) -> Self {
        Self { rx }
    }

    /// Wait for the next message; `None` when the provider shut down.
    pub async fn recv(&mut self) -> Option<PublishedMessage> {
        self.rx.recv().await
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<PublishedMessage> {
        self.rx.try_recv().ok()
    }
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    HSet {
        key: String,
        fields: HashMap<String, String>,
    },
    HSetNx {
        key: String,
        field: String,
        value: String,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    HIncrByFloat {
        key: String,
        field: String,
        delta: f64,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    XAdd {
        key: String,
        body: String,
    },
    ZAdd {
        key: String,
        score: i64,
        member: String,
    },
    ZRem {
        key: String,
        member: String,
    },
    Set {
        key: String,
        value: String,
        ttl_secs: Option<u64>,
    },
    Del {
        key: String,
    },
    Expire {
        key: String,
        secs: u64,
    },
}

/// Reply for one batched command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Int(i64),
    Float(f64),
    Bool(bool),
    Id(String),
    Unit,
}

impl CommandReply {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CommandReply::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            CommandReply::Float(f) => Some(*f),
            CommandReply::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

/// Backend capability set the engine requires.
///
/// Implementations must make `transact` atomic: either every command in
/// the batch applies or none does. Providers without a native transaction
/// primitive serialize batches behind a compare-and-set revision.
#[async_trait]
pub trait Provider: Clone + Send + Sync + 'static {
    // --- hash ---
    async fn hset(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<u64, ProviderError>;
    /// Set a field only if absent; true when written.
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, ProviderError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ProviderError>;
    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, ProviderError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ProviderError>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, ProviderError>;
    async fn hincrbyfloat(
        &self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, ProviderError>;
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, ProviderError>;

    // --- keys ---
    async fn exists(&self, key: &str) -> Result<bool, ProviderError>;
    async fn del(&self, key: &str) -> Result<bool, ProviderError>;
    /// TTL on a whole key (hash or string); true when the key existed.
    async fn expire(&self, key: &str, secs: u64) -> Result<bool, ProviderError>;

    // --- string kv ---
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), ProviderError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ProviderError>;

    // --- sorted set ---
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<bool, ProviderError>;
    async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, ProviderError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, ProviderError>;

    // --- stream ---
    /// Idempotently create a consumer group at the stream head.
    async fn xgroup_create(&self, key: &str, group: &str) -> Result<(), ProviderError>;
    async fn xadd(&self, key: &str, body: &str) -> Result<String, ProviderError>;
    async fn xlen(&self, key: &str) -> Result<u64, ProviderError>;
    /// Read up to `count` new entries for the group, blocking up to
    /// `block_ms` when the stream is drained. Delivered entries enter the
    /// group's pending list.
    async fn xread_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, ProviderError>;
    async fn xack(&self, key: &str, group: &str, id: &str) -> Result<u64, ProviderError>;
    /// Pending entries idle at least `min_idle_ms`, oldest first.
    async fn xpending(
        &self,
        key: &str,
        group: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<PendingMessage>, ProviderError>;
    /// Claim idle pending entries for this consumer, bumping delivery counts.
    async fn xclaim(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[String],
    ) -> Result<Vec<StreamMessage>, ProviderError>;

    // --- pub/sub ---
    /// Publish to a topic; returns the number of receiving subscribers.
    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, ProviderError>;
    /// Subscribe to one topic.
    fn subscribe(&self, topic: &str) -> Subscription;
    /// Subscribe to a `*`-glob pattern. Providers without native pattern
    /// support may implement this as list-then-filter.
    fn psubscribe(&self, pattern: &str) -> Subscription;

    // --- batch ---
    /// Apply a batch atomically, returning one reply per command.
    async fn transact(&self, commands: Vec<Command>) -> Result<Vec<CommandReply>, ProviderError>;
}
