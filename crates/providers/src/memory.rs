// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process provider.
//!
//! Backs the full capability set with `parking_lot`-guarded maps: hashes,
//! strings, sorted sets, streams with consumer groups and pending lists,
//! and broadcast pub/sub with `*` glob patterns. TTLs are enforced lazily
//! against the injected clock, so tests drive expiry with a `FakeClock`.

use crate::provider::{
    Command, CommandReply, PendingMessage, Provider, ProviderError, PublishedMessage,
    StreamMessage, Subscription,
};
use async_trait::async_trait;
use hm_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct StreamGroup {
    /// Sequence of the last entry delivered to this group.
    cursor: u64,
    pending: HashMap<String, PendingEntry>,
}

struct PendingEntry {
    consumer: String,
    delivered_at_ms: u64,
    delivery_count: u32,
    body: String,
}

#[derive(Default)]
struct StreamState {
    seq: u64,
    entries: Vec<(u64, String)>,
    groups: HashMap<String, StreamGroup>,
}

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    /// member -> score
    zsets: HashMap<String, HashMap<String, i64>>,
    streams: HashMap<String, StreamState>,
    /// key -> expire-at epoch ms
    expires: HashMap<String, u64>,
}

impl State {
    /// Drop a key from every namespace if its TTL elapsed.
    fn purge_if_expired(&mut self, key: &str, now_ms: u64) {
        if let Some(&at) = self.expires.get(key) {
            if at <= now_ms {
                self.expires.remove(key);
                self.hashes.remove(key);
                self.strings.remove(key);
                self.zsets.remove(key);
            }
        }
    }

    fn key_exists(&self, key: &str) -> bool {
        self.hashes.contains_key(key)
            || self.strings.contains_key(key)
            || self.zsets.contains_key(key)
            || self.streams.contains_key(key)
    }
}

#[derive(Default)]
struct SubscriberRegistry {
    exact: HashMap<String, Vec<mpsc::UnboundedSender<PublishedMessage>>>,
    patterns: Vec<(String, mpsc::UnboundedSender<PublishedMessage>)>,
}

struct Inner {
    state: Mutex<State>,
    subs: Mutex<SubscriberRegistry>,
    /// Per-stream wakeups for blocked group reads.
    signals: Mutex<HashMap<String, Arc<Notify>>>,
}

/// In-memory backend provider.
pub struct MemoryProvider<C: Clock = SystemClock> {
    clock: C,
    inner: Arc<Inner>,
}

impl<C: Clock> Clone for MemoryProvider<C> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MemoryProvider<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> MemoryProvider<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                subs: Mutex::new(SubscriberRegistry::default()),
                signals: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn stream_signal(&self, key: &str) -> Arc<Notify> {
        let mut signals = self.inner.signals.lock();
        Arc::clone(signals.entry(key.to_string()).or_default())
    }

    fn notify_stream(&self, key: &str) {
        if let Some(signal) = self.inner.signals.lock().get(key) {
            signal.notify_waiters();
        }
    }

    /// Apply one command against locked state; streams touched by `XAdd`
    /// are pushed into `touched` so waiters can be woken after unlock.
    fn apply(
        state: &mut State,
        now_ms: u64,
        command: Command,
        touched: &mut Vec<String>,
    ) -> CommandReply {
        match command {
            Command::HSet { key, fields } => {
                state.purge_if_expired(&key, now_ms);
                let hash = state.hashes.entry(key).or_default();
                let mut added = 0i64;
                for (f, v) in fields {
                    if hash.insert(f, v).is_none() {
                        added += 1;
                    }
                }
                CommandReply::Int(added)
            }
            Command::HSetNx { key, field, value } => {
                state.purge_if_expired(&key, now_ms);
                let hash = state.hashes.entry(key).or_default();
                if hash.contains_key(&field) {
                    CommandReply::Bool(false)
                } else {
                    hash.insert(field, value);
                    CommandReply::Bool(true)
                }
            }
            Command::HIncrBy { key, field, delta } => {
                state.purge_if_expired(&key, now_ms);
                let hash = state.hashes.entry(key).or_default();
                let current: i64 = hash
                    .get(&field)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let next = current + delta;
                hash.insert(field, next.to_string());
                CommandReply::Int(next)
            }
            Command::HIncrByFloat { key, field, delta } => {
                state.purge_if_expired(&key, now_ms);
                let hash = state.hashes.entry(key).or_default();
                let current: f64 = hash
                    .get(&field)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0);
                let next = current + delta;
                hash.insert(field, format_float(next));
                CommandReply::Float(next)
            }
            Command::HDel { key, fields } => {
                state.purge_if_expired(&key, now_ms);
                let mut removed = 0i64;
                let mut emptied = false;
                if let Some(hash) = state.hashes.get_mut(&key) {
                    for f in &fields {
                        if hash.remove(f).is_some() {
                            removed += 1;
                        }
                    }
                    emptied = hash.is_empty();
                }
                if emptied {
                    state.hashes.remove(&key);
                }
                CommandReply::Int(removed)
            }
            Command::XAdd { key, body } => {
                let stream = state.streams.entry(key.clone()).or_default();
                stream.seq += 1;
                let id = format!("{}-0", stream.seq);
                stream.entries.push((stream.seq, body));
                touched.push(key);
                CommandReply::Id(id)
            }
            Command::ZAdd { key, score, member } => {
                state.purge_if_expired(&key, now_ms);
                let zset = state.zsets.entry(key).or_default();
                CommandReply::Bool(zset.insert(member, score).is_none())
            }
            Command::ZRem { key, member } => {
                let removed = state
                    .zsets
                    .get_mut(&key)
                    .map(|z| z.remove(&member).is_some())
                    .unwrap_or(false);
                CommandReply::Bool(removed)
            }
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                state.purge_if_expired(&key, now_ms);
                state.strings.insert(key.clone(), value);
                if let Some(secs) = ttl_secs {
                    state.expires.insert(key, now_ms + secs * 1000);
                } else {
                    state.expires.remove(&key);
                }
                CommandReply::Unit
            }
            Command::Del { key } => {
                state.expires.remove(&key);
                let existed = state.hashes.remove(&key).is_some()
                    | state.strings.remove(&key).is_some()
                    | state.zsets.remove(&key).is_some();
                CommandReply::Bool(existed)
            }
            Command::Expire { key, secs } => {
                state.purge_if_expired(&key, now_ms);
                if state.key_exists(&key) {
                    state.expires.insert(key, now_ms + secs * 1000);
                    CommandReply::Bool(true)
                } else {
                    CommandReply::Bool(false)
                }
            }
        }
    }

    fn glob_matches(pattern: &str, topic: &str) -> bool {
        let mut remainder = topic;
        let mut parts = pattern.split('*').peekable();
        let mut first = true;
        while let Some(part) = parts.next() {
            let last = parts.peek().is_none();
            if first && last {
                return pattern == topic;
            }
            if first {
                match remainder.strip_prefix(part) {
                    Some(rest) => remainder = rest,
                    None => return false,
                }
            } else if last {
                return part.is_empty() || remainder.ends_with(part);
            } else if !part.is_empty() {
                match remainder.find(part) {
                    Some(at) => remainder = &remainder[at + part.len()..],
                    None => return false,
                }
            }
            first = false;
        }
        true
    }

    /// Pending entry count across all groups (test inspection).
    #[cfg(any(test, feature = "test-support"))]
    pub fn pending_total(&self, key: &str) -> usize {
        let state = self.inner.state.lock();
        state
            .streams
            .get(key)
            .map(|s| s.groups.values().map(|g| g.pending.len()).sum())
            .unwrap_or(0)
    }
}

/// Render a float the way numeric hash fields store it: integral values
/// without a trailing `.0`.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

#[async_trait]
impl<C: Clock> Provider for MemoryProvider<C> {
    async fn hset(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<u64, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::HSet {
                key: key.to_string(),
                fields,
            },
            &mut touched,
        );
        Ok(reply.as_int().unwrap_or(0) as u64)
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::HSetNx {
                key: key.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            },
            &mut touched,
        );
        Ok(matches!(reply, CommandReply::Bool(true)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        let hash = state.hashes.get(key);
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(f)).cloned())
            .collect())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::HIncrBy {
                key: key.to_string(),
                field: field.to_string(),
                delta,
            },
            &mut touched,
        );
        reply.as_int().ok_or_else(|| ProviderError::NotANumber {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    async fn hincrbyfloat(
        &self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::HIncrByFloat {
                key: key.to_string(),
                field: field.to_string(),
                delta,
            },
            &mut touched,
        );
        reply.as_float().ok_or_else(|| ProviderError::NotANumber {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::HDel {
                key: key.to_string(),
                fields: fields.to_vec(),
            },
            &mut touched,
        );
        Ok(reply.as_int().unwrap_or(0) as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        Ok(state.key_exists(key))
    }

    async fn del(&self, key: &str) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::Del {
                key: key.to_string(),
            },
            &mut touched,
        );
        Ok(matches!(reply, CommandReply::Bool(true)))
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::Expire {
                key: key.to_string(),
                secs,
            },
            &mut touched,
        );
        Ok(matches!(reply, CommandReply::Bool(true)))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                ttl_secs,
            },
            &mut touched,
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        Ok(state.strings.get(key).cloned())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::ZAdd {
                key: key.to_string(),
                score,
                member: member.to_string(),
            },
            &mut touched,
        );
        Ok(matches!(reply, CommandReply::Bool(true)))
    }

    async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, ProviderError> {
        let mut state = self.inner.state.lock();
        state.purge_if_expired(key, self.clock.epoch_ms());
        let mut members: Vec<(i64, String)> = state
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, &score)| score >= min && score <= max)
                    .map(|(m, &s)| (s, m.clone()))
                    .collect()
            })
            .unwrap_or_default();
        members.sort();
        Ok(members.into_iter().map(|(_, m)| m).collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, ProviderError> {
        let mut state = self.inner.state.lock();
        let mut touched = Vec::new();
        let reply = Self::apply(
            &mut state,
            self.clock.epoch_ms(),
            Command::ZRem {
                key: key.to_string(),
                member: member.to_string(),
            },
            &mut touched,
        );
        Ok(matches!(reply, CommandReply::Bool(true)))
    }

    async fn xgroup_create(&self, key: &str, group: &str) -> Result<(), ProviderError> {
        let mut state = self.inner.state.lock();
        let stream = state.streams.entry(key.to_string()).or_default();
        // Created at sequence zero so entries appended before the router
        // started are still delivered.
        stream.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn xadd(&self, key: &str, body: &str) -> Result<String, ProviderError> {
        let id = {
            let mut state = self.inner.state.lock();
            let mut touched = Vec::new();
            let reply = Self::apply(
                &mut state,
                self.clock.epoch_ms(),
                Command::XAdd {
                    key: key.to_string(),
                    body: body.to_string(),
                },
                &mut touched,
            );
            match reply {
                CommandReply::Id(id) => id,
                _ => return Err(ProviderError::Backend("xadd reply".into())),
            }
        };
        self.notify_stream(key);
        Ok(id)
    }

    async fn xlen(&self, key: &str) -> Result<u64, ProviderError> {
        let state = self.inner.state.lock();
        Ok(state.streams.get(key).map(|s| s.entries.len() as u64).unwrap_or(0))
    }

    async fn xread_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, ProviderError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(block_ms);
        loop {
            let messages = {
                let mut state = self.inner.state.lock();
                let now_ms = self.clock.epoch_ms();
                let stream = state.streams.entry(key.to_string()).or_default();
                let cursor = stream.groups.entry(group.to_string()).or_default().cursor;

                let mut taken = Vec::new();
                for (seq, body) in &stream.entries {
                    if *seq <= cursor {
                        continue;
                    }
                    if taken.len() >= count {
                        break;
                    }
                    taken.push((*seq, body.clone()));
                }

                let group_state = stream.groups.entry(group.to_string()).or_default();
                for (seq, body) in &taken {
                    group_state.cursor = *seq;
                    group_state.pending.insert(
                        format!("{}-0", seq),
                        PendingEntry {
                            consumer: consumer.to_string(),
                            delivered_at_ms: now_ms,
                            delivery_count: 1,
                            body: body.clone(),
                        },
                    );
                }
                taken
                    .into_iter()
                    .map(|(seq, body)| StreamMessage {
                        id: format!("{}-0", seq),
                        body,
                    })
                    .collect::<Vec<_>>()
            };

            if !messages.is_empty() {
                return Ok(messages);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let signal = self.stream_signal(key);
            let _ = tokio::time::timeout(remaining, signal.notified()).await;
        }
    }

    async fn xack(&self, key: &str, group: &str, id: &str) -> Result<u64, ProviderError> {
        let mut state = self.inner.state.lock();
        let removed = state
            .streams
            .get_mut(key)
            .and_then(|s| s.groups.get_mut(group))
            .map(|g| g.pending.remove(id).is_some())
            .unwrap_or(false);
        Ok(removed as u64)
    }

    async fn xpending(
        &self,
        key: &str,
        group: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<PendingMessage>, ProviderError> {
        let state = self.inner.state.lock();
        let now_ms = self.clock.epoch_ms();
        let mut entries: Vec<PendingMessage> = state
            .streams
            .get(key)
            .and_then(|s| s.groups.get(group))
            .map(|g| {
                g.pending
                    .iter()
                    .filter_map(|(id, e)| {
                        let idle_ms = now_ms.saturating_sub(e.delivered_at_ms);
                        (idle_ms >= min_idle_ms).then(|| PendingMessage {
                            id: id.clone(),
                            consumer: e.consumer.clone(),
                            idle_ms,
                            delivery_count: e.delivery_count,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| b.idle_ms.cmp(&a.idle_ms).then(a.id.cmp(&b.id)));
        entries.truncate(count);
        Ok(entries)
    }

    async fn xclaim(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[String],
    ) -> Result<Vec<StreamMessage>, ProviderError> {
        let mut state = self.inner.state.lock();
        let now_ms = self.clock.epoch_ms();
        let group_state = state
            .streams
            .get_mut(key)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| ProviderError::GroupNotFound {
                key: key.to_string(),
                group: group.to_string(),
            })?;

        let mut claimed = Vec::new();
        for id in ids {
            if let Some(entry) = group_state.pending.get_mut(id) {
                let idle_ms = now_ms.saturating_sub(entry.delivered_at_ms);
                if idle_ms >= min_idle_ms {
                    entry.consumer = consumer.to_string();
                    entry.delivered_at_ms = now_ms;
                    entry.delivery_count += 1;
                    claimed.push(StreamMessage {
                        id: id.clone(),
                        body: entry.body.clone(),
                    });
                }
            }
        }
        Ok(claimed)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, ProviderError> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        let mut subs = self.inner.subs.lock();
        let mut delivered = 0u64;

        if let Some(senders) = subs.exact.get_mut(topic) {
            senders.retain(|tx| {
                let ok = tx.send(message.clone()).is_ok();
                delivered += ok as u64;
                ok
            });
        }
        subs.patterns.retain(|(pattern, tx)| {
            if !Self::glob_matches(pattern, topic) {
                return !tx.is_closed();
            }
            let ok = tx.send(message.clone()).is_ok();
            delivered += ok as u64;
            ok
        });

        Ok(delivered)
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subs
            .lock()
            .exact
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Subscription::new(rx)
    }

    fn psubscribe(&self, pattern: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subs
            .lock()
            .patterns
            .push((pattern.to_string(), tx));
        Subscription::new(rx)
    }

    async fn transact(&self, commands: Vec<Command>) -> Result<Vec<CommandReply>, ProviderError> {
        let (replies, touched) = {
            let mut state = self.inner.state.lock();
            let now_ms = self.clock.epoch_ms();
            let mut touched = Vec::new();
            let replies = commands
                .into_iter()
                .map(|c| Self::apply(&mut state, now_ms, c, &mut touched))
                .collect();
            (replies, touched)
        };
        for key in touched {
            self.notify_stream(&key);
        }
        Ok(replies)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
