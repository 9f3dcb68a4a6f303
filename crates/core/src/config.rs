// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration knobs.
//!
//! Every tunable reads from an `HMSH_*` environment variable with a
//! default. The config is constructed once and carried explicitly into
//! every subsystem; no process-wide mutable state.

/// Resolved configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct HmshConfig {
    /// Log verbosity hint surfaced to the host's subscriber setup.
    pub loglevel: String,
    /// Seconds a web-hook signal index entry lives before expiry.
    pub signal_expire_secs: u64,
    /// Clean ping/pong cycles required before a version activation round counts.
    pub quorum_rollcall_cycles: u32,
    /// Delay between quorum ping cycles.
    pub quorum_delay_ms: u64,
    /// Consecutive successful rounds required to flip the active version.
    pub activation_max_retry: u32,
    /// One-time-token wait window for pub-and-await callers.
    pub ott_wait_ms: u64,
    /// Default seconds a completed job hash lives before the scrubber removes it.
    pub expire_job_seconds: u64,
    /// Ceiling for the doubling stream redelivery backoff.
    pub max_stream_backoff_ms: u64,
    /// First stream redelivery backoff.
    pub initial_stream_backoff_ms: u64,
    /// Redeliveries the router attempts before a terminal error transition.
    pub max_stream_retries: u32,
    /// General retry ceiling for engine-internal operations.
    pub max_retries: u32,
    /// Upper bound for any single in-process wait.
    pub max_timeout_ms: u64,
    /// Step used when graduating polling intervals.
    pub graduated_interval_ms: u64,
    /// Maximum block on a consumer-group stream read.
    pub block_time_ms: u64,
    /// Pending-message age before a peer may claim it.
    pub xclaim_delay_ms: u64,
    /// Deliveries allowed before a stalled message is routed to terminal error.
    pub xclaim_count: u32,
    /// Page size when listing pending messages.
    pub xpending_count: u32,
    /// Granularity of the time-hook scout loop.
    pub fidelity_seconds: u64,
    /// Interval between full scout sweeps.
    pub scout_interval_seconds: u64,
    /// Hex length of step GUIDs in the collation ledger.
    pub guid_size: usize,
    /// Default workflow retry attempts.
    pub meshflow_max_attempts: u32,
    /// Default workflow maximum retry interval (textual).
    pub meshflow_max_interval: String,
    /// Default workflow backoff coefficient.
    pub meshflow_exp_backoff: u32,
}

impl Default for HmshConfig {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            signal_expire_secs: 3_600,
            quorum_rollcall_cycles: 12,
            quorum_delay_ms: 250,
            activation_max_retry: 3,
            ott_wait_ms: 120_000,
            expire_job_seconds: 1,
            max_stream_backoff_ms: 500,
            initial_stream_backoff_ms: 2,
            max_stream_retries: 2,
            max_retries: 3,
            max_timeout_ms: 60_000,
            graduated_interval_ms: 5_000,
            block_time_ms: 10_000,
            xclaim_delay_ms: 1_000 * 60,
            xclaim_count: 3,
            xpending_count: 10,
            fidelity_seconds: 5,
            scout_interval_seconds: 60,
            guid_size: 16,
            meshflow_max_attempts: 3,
            meshflow_max_interval: "120s".to_string(),
            meshflow_exp_backoff: 10,
        }
    }
}

impl HmshConfig {
    /// Build a config from `HMSH_*` environment variables, falling back to
    /// defaults for unset or unparseable values.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            loglevel: env_string("HMSH_LOGLEVEL", &d.loglevel),
            signal_expire_secs: env_parse("HMSH_SIGNAL_EXPIRE", d.signal_expire_secs),
            quorum_rollcall_cycles: env_parse("HMSH_QUORUM_ROLLCALL_CYCLES", d.quorum_rollcall_cycles),
            quorum_delay_ms: env_parse("HMSH_QUORUM_DELAY_MS", d.quorum_delay_ms),
            activation_max_retry: env_parse("HMSH_ACTIVATION_MAX_RETRY", d.activation_max_retry),
            ott_wait_ms: env_parse("HMSH_OTT_WAIT_TIME", d.ott_wait_ms),
            expire_job_seconds: env_parse("HMSH_EXPIRE_JOB_SECONDS", d.expire_job_seconds),
            max_stream_backoff_ms: env_parse("MAX_STREAM_BACKOFF", d.max_stream_backoff_ms),
            initial_stream_backoff_ms: env_parse("INITIAL_STREAM_BACKOFF", d.initial_stream_backoff_ms),
            max_stream_retries: env_parse("MAX_STREAM_RETRIES", d.max_stream_retries),
            max_retries: env_parse("HMSH_MAX_RETRIES", d.max_retries),
            max_timeout_ms: env_parse("HMSH_MAX_TIMEOUT_MS", d.max_timeout_ms),
            graduated_interval_ms: env_parse("HMSH_GRADUATED_INTERVAL_MS", d.graduated_interval_ms),
            block_time_ms: env_parse("HMSH_BLOCK_TIME_MS", d.block_time_ms),
            xclaim_delay_ms: env_parse("HMSH_XCLAIM_DELAY_MS", d.xclaim_delay_ms),
            xclaim_count: env_parse("HMSH_XCLAIM_COUNT", d.xclaim_count).min(3),
            xpending_count: env_parse("HMSH_XPENDING_COUNT", d.xpending_count),
            fidelity_seconds: env_parse("HMSH_FIDELITY_SECONDS", d.fidelity_seconds),
            scout_interval_seconds: env_parse("HMSH_SCOUT_INTERVAL_SECONDS", d.scout_interval_seconds),
            guid_size: env_parse("HMSH_GUID_SIZE", d.guid_size),
            meshflow_max_attempts: env_parse("HMSH_MESHFLOW_MAX_ATTEMPTS", d.meshflow_max_attempts),
            meshflow_max_interval: env_string("HMSH_MESHFLOW_MAX_INTERVAL", &d.meshflow_max_interval),
            meshflow_exp_backoff: env_parse("HMSH_MESHFLOW_EXP_BACKOFF", d.meshflow_exp_backoff),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
