// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream router.
//!
//! One router loop per consumed stream. Contract: blocked group read,
//! throttle delay, dispatch, policy-driven retry with doubling backoff,
//! ack, and a periodic reclaim pass that claims messages stalled on dead
//! consumers — up to the delivery-count ceiling, after which the message
//! routes to a terminal error transition.

use crate::error::EngineError;
use async_trait::async_trait;
use hm_core::codes::{code, is_stream_retryable};
use hm_core::{stream_backoff_ms, HmshConfig, StreamData};
use hm_providers::{Provider, StreamMessage};
use hm_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info_span, Instrument};

/// Reads between reclaim passes.
const RECLAIM_EVERY_READS: u32 = 8;

/// Stream-message processor bound to one router.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    /// Process one message. `Ok(Some(response))` hands the response back
    /// for policy evaluation and delivery; `Ok(None)` means fully handled.
    async fn handle(&self, msg: StreamData) -> Result<Option<StreamData>, EngineError>;

    /// Forward a response that survived policy evaluation.
    async fn deliver(&self, response: StreamData) -> Result<(), EngineError>;

    /// Route a message that exhausted its budget to a terminal error.
    async fn dead_letter(&self, msg: StreamData, code: u16) -> Result<(), EngineError>;
}

/// Identity of one router loop.
pub struct RouterConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Worker topic when this router serves a worker stream.
    pub topic: Option<String>,
}

/// Router loop over one stream.
pub struct StreamRouter<P: Provider> {
    store: Store<P>,
    config: HmshConfig,
    router: RouterConfig,
    throttles: Arc<crate::throttle::ThrottleRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl<P: Provider> StreamRouter<P> {
    pub fn new(
        store: Store<P>,
        config: HmshConfig,
        router: RouterConfig,
        throttles: Arc<crate::throttle::ThrottleRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            config,
            router,
            throttles,
            shutdown,
        }
    }

    /// Run until shutdown. Draining mode: stop reading, finish in-flight,
    /// ack, then exit.
    pub async fn run(mut self, handler: Arc<dyn StreamHandler>) {
        let provider = self.store.provider().clone();
        let mut created = false;
        for _ in 0..=self.config.max_retries {
            match provider
                .xgroup_create(&self.router.stream, &self.router.group)
                .await
            {
                Ok(()) => {
                    created = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(stream = %self.router.stream, error = %e, "group create failed");
                    tokio::time::sleep(Duration::from_millis(self.config.graduated_interval_ms))
                        .await;
                }
            }
        }
        if !created {
            tracing::error!(stream = %self.router.stream, "giving up on group creation");
            return;
        }

        let mut reads_since_reclaim = 0u32;
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let throttle_ms = self.throttles.rate_for(self.router.topic.as_deref());
            if throttle_ms > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(throttle_ms)) => {}
                    _ = self.shutdown.changed() => continue,
                }
            }

            let read = tokio::select! {
                r = provider.xread_group(
                    &self.router.stream,
                    &self.router.group,
                    &self.router.consumer,
                    self.config.xpending_count as usize,
                    self.config.block_time_ms,
                ) => r,
                _ = self.shutdown.changed() => continue,
            };

            let messages = match read {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(stream = %self.router.stream, error = %e, "read failed");
                    tokio::time::sleep(Duration::from_millis(self.config.graduated_interval_ms))
                        .await;
                    continue;
                }
            };

            for raw in messages {
                self.process(&handler, raw).await;
            }

            reads_since_reclaim += 1;
            if reads_since_reclaim >= RECLAIM_EVERY_READS {
                reads_since_reclaim = 0;
                self.reclaim(&handler).await;
            }
        }
    }

    /// Dispatch one raw entry, then ack it. Retries re-enqueue a copy
    /// before the original is acked, so no delivery is lost in between.
    async fn process(&self, handler: &Arc<dyn StreamHandler>, raw: StreamMessage) {
        let msg: StreamData = match Store::<P>::decode_stream(&raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(stream = %self.router.stream, error = %e, "undecodable entry, acking");
                self.ack(&raw.id).await;
                return;
            }
        };

        let span = info_span!(
            "route",
            stream = %self.router.stream,
            guid = %msg.metadata.guid,
            kind = %msg.kind(),
        );
        let outcome = handler.handle(msg.clone()).instrument(span).await;

        match outcome {
            Ok(Some(response)) => {
                if self.should_retry_response(&msg, &response) {
                    let attempt = msg.metadata.attempt + 1;
                    self.backoff(attempt).await;
                    self.re_enqueue(msg).await;
                } else if let Err(e) = handler.deliver(response).await {
                    tracing::error!(error = %e, "response delivery failed");
                }
            }
            Ok(None) => {}
            Err(e) if e.is_swallowed() => {
                tracing::info!(outcome = %e, "dropped");
            }
            Err(e) => {
                let attempt = msg.metadata.attempt + 1;
                if self.error_is_retryable(&e) && attempt <= self.config.max_stream_retries {
                    tracing::warn!(error = %e, attempt, "retryable, re-enqueueing");
                    self.backoff(attempt).await;
                    self.re_enqueue(msg).await;
                } else {
                    tracing::error!(error = %e, attempt, "fatal, routing to terminal error");
                    if let Err(e2) = handler.dead_letter(msg, code::UNKNOWN).await {
                        tracing::error!(error = %e2, "dead-letter routing failed");
                    }
                }
            }
        }

        self.ack(&raw.id).await;
    }

    /// Retry when the response code matches the message's retry policy
    /// and the attempt budget is not exhausted.
    fn should_retry_response(&self, msg: &StreamData, response: &StreamData) -> bool {
        let Some(response_code) = response.code else {
            return false;
        };
        let Some(spec) = msg
            .policies
            .as_ref()
            .and_then(|p| p.retry_for(response_code))
        else {
            return false;
        };
        msg.metadata.attempt < spec.max_retries()
    }

    fn error_is_retryable(&self, error: &EngineError) -> bool {
        match error {
            EngineError::Provider(_) | EngineError::Store(_) | EngineError::GetState(_) => true,
            EngineError::JobFailed(e) => is_stream_retryable(e.code),
            _ => false,
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = stream_backoff_ms(attempt, &self.config);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Append a copy with a bumped attempt counter.
    async fn re_enqueue(&self, mut msg: StreamData) {
        msg.metadata.attempt += 1;
        match serde_json::to_string(&msg) {
            Ok(body) => {
                if let Err(e) = self
                    .store
                    .provider()
                    .xadd(&self.router.stream, &body)
                    .await
                {
                    tracing::error!(error = %e, "re-enqueue failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "re-enqueue encode failed"),
        }
    }

    async fn ack(&self, id: &str) {
        if let Err(e) = self
            .store
            .provider()
            .xack(&self.router.stream, &self.router.group, id)
            .await
        {
            tracing::error!(error = %e, "ack failed");
        }
    }

    /// Claim pending messages stalled past the reclaim delay and process
    /// them on this consumer; at the delivery ceiling, route to terminal
    /// error instead.
    async fn reclaim(&self, handler: &Arc<dyn StreamHandler>) {
        let provider = self.store.provider().clone();
        let pending = match provider
            .xpending(
                &self.router.stream,
                &self.router.group,
                self.config.xclaim_delay_ms,
                self.config.xpending_count as usize,
            )
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "pending listing failed");
                return;
            }
        };

        for entry in pending {
            if entry.consumer == self.router.consumer && entry.delivery_count == 1 {
                // Our own in-flight work; the read loop will finish it.
                continue;
            }
            if entry.delivery_count > self.config.xclaim_count {
                tracing::warn!(id = %entry.id, count = entry.delivery_count, "reclaim ceiling hit");
                let claimed = provider
                    .xclaim(
                        &self.router.stream,
                        &self.router.group,
                        &self.router.consumer,
                        self.config.xclaim_delay_ms,
                        &[entry.id.clone()],
                    )
                    .await
                    .unwrap_or_default();
                for raw in claimed {
                    if let Ok(msg) = Store::<P>::decode_stream(&raw) {
                        if let Err(e) = handler.dead_letter(msg, code::TIMEOUT).await {
                            tracing::error!(error = %e, "dead-letter routing failed");
                        }
                    }
                    self.ack(&raw.id).await;
                }
                continue;
            }

            let claimed = match provider
                .xclaim(
                    &self.router.stream,
                    &self.router.group,
                    &self.router.consumer,
                    self.config.xclaim_delay_ms,
                    &[entry.id.clone()],
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "claim failed");
                    continue;
                }
            };
            for raw in claimed {
                tracing::info!(id = %raw.id, "reclaimed stalled message");
                self.process(handler, raw).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
