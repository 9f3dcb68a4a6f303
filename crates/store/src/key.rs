// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical key layout.
//!
//! Every key is `hmsh<d><namespace><d><appId><d><kind><d><params>` where
//! `<d>` is the provider's delimiter (`:` by default, substituted for
//! providers that disallow it). Overlong param segments are hashed so the
//! minted key stays under provider subject limits.

use hm_core::{AppId, JobId};
use sha2::{Digest, Sha256};

/// Longest raw param segment before it is replaced by its digest.
const MAX_SEGMENT_LEN: usize = 128;

/// Key kinds the core persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    App,
    Job,
    Hooks,
    Stream,
    Quorum,
    Throttle,
    Symbols,
    Signals,
    TimeHooks,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::App => "app",
            KeyType::Job => "job",
            KeyType::Hooks => "hooks",
            KeyType::Stream => "stream",
            KeyType::Quorum => "quorum",
            KeyType::Throttle => "throttle",
            KeyType::Symbols => "symbols",
            KeyType::Signals => "signals",
            KeyType::TimeHooks => "timehooks",
        }
    }
}

/// Mints keys for one `(namespace, app)` pair.
#[derive(Debug, Clone)]
pub struct KeySpace {
    namespace: String,
    app: AppId,
    delimiter: char,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>, app: AppId) -> Self {
        Self {
            namespace: namespace.into(),
            app,
            delimiter: ':',
        }
    }

    /// Substitute the delimiter for providers that disallow `:` in subjects.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn app_id(&self) -> &AppId {
        &self.app
    }

    /// Mint a key of the given kind with param segments appended.
    pub fn mint(&self, kind: KeyType, params: &[&str]) -> String {
        let d = self.delimiter;
        let mut key = format!("hmsh{d}{}{d}{}{d}{}", self.namespace, self.app, kind.as_str());
        for param in params {
            key.push(d);
            if param.len() > MAX_SEGMENT_LEN {
                key.push_str(&digest(param));
            } else {
                key.push_str(param);
            }
        }
        key
    }

    // -- common shapes --

    pub fn app(&self) -> String {
        self.mint(KeyType::App, &[])
    }

    pub fn job(&self, jid: &JobId) -> String {
        self.mint(KeyType::Job, &[jid.as_str()])
    }

    pub fn symbols(&self) -> String {
        self.mint(KeyType::Symbols, &[])
    }

    pub fn quorum(&self) -> String {
        self.mint(KeyType::Quorum, &[])
    }

    pub fn throttle(&self) -> String {
        self.mint(KeyType::Throttle, &[])
    }

    pub fn time_hooks(&self) -> String {
        self.mint(KeyType::TimeHooks, &[])
    }

    /// Signal index entry for a `(topic, resolved)` pair.
    pub fn signal(&self, topic: &str, resolved: &str) -> String {
        self.mint(KeyType::Signals, &[topic, resolved])
    }

    /// The engine-role transition stream.
    pub fn engine_stream(&self) -> String {
        self.mint(KeyType::Stream, &["engine"])
    }

    /// A worker-role stream for one worker topic.
    pub fn worker_stream(&self, topic: &str) -> String {
        self.mint(KeyType::Stream, &["worker", topic])
    }

    /// Completion pub/sub topic for one job.
    pub fn executed_topic(&self, jid: &JobId) -> String {
        format!("{}.executed.{}", self.app, jid)
    }

    /// Pattern covering every completion topic of the app.
    pub fn executed_pattern(&self) -> String {
        format!("{}.executed.*", self.app)
    }
}

fn digest(segment: &str) -> String {
    let hash = Sha256::digest(segment.as_bytes());
    format!("{:x}", hash)[..32].to_string()
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
