// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router read-delay registry.
//!
//! Rates arrive over the quorum bus (targeted at a guid, a topic, or
//! global) and are consulted by every router before each stream read.

use hm_core::ThrottleOptions;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Rates {
    global: Option<u64>,
    topics: HashMap<String, u64>,
}

/// Shared throttle state for one engine process.
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    rates: Mutex<Rates>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a throttle request addressed to this engine.
    ///
    /// A global rate overwrites every per-topic rate; a topic rate
    /// narrows again afterwards.
    pub fn apply(&self, options: &ThrottleOptions) {
        let mut rates = self.rates.lock();
        match &options.topic {
            Some(topic) => {
                rates.topics.insert(topic.clone(), options.throttle);
            }
            None => {
                rates.global = Some(options.throttle);
                rates.topics.clear();
            }
        }
    }

    /// Effective delay before the next read on a stream.
    ///
    /// `topic` is `None` for the engine-role router.
    pub fn rate_for(&self, topic: Option<&str>) -> u64 {
        let rates = self.rates.lock();
        topic
            .and_then(|t| rates.topics.get(t).copied())
            .or(rates.global)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "throttle_tests.rs"]
mod tests;
