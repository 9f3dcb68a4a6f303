// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store service.
//!
//! One `Store` serves one `(namespace, app)` pair. The job hash field
//! layout it maintains:
//!
//! - `:` — the status semaphore (`js`)
//! - `m:<name>` — job metadata fields
//! - `_<path>` — user-visible job data, tagged leaves
//! - `<sym>:<dad>` — activity process fields, symbol-compressed paths
//! - `-<...>` — ledger entries: collation counters and workflow
//!   replay/side-effect records

use crate::key::KeySpace;
use crate::serializer::Serializer;
use crate::symbols::SymbolTable;
use hm_core::{AppId, Dimension, JobId, JobMetadata};
use hm_providers::{Command, Provider, ProviderError, StreamMessage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Status semaphore field.
pub const STATUS_FIELD: &str = ":";
/// Prefix for metadata fields.
const META_PREFIX: &str = "m:";
/// Prefix for user data fields.
const DATA_PREFIX: &str = "_";
/// Prefix for ledger fields (collation counters, workflow records).
const LEDGER_PREFIX: &str = "-";
/// Throttle hash field holding the global rate.
const GLOBAL_THROTTLE_FIELD: &str = "*";

/// Replay-table ledger field for one workflow execution index, scoped by
/// an optional dimension prefix.
pub fn replay_field(dimension: &str, index: u32) -> String {
    format!("-wf{dimension}-{index}-")
}

/// At-most-once side-effect guard field for one workflow execution index.
pub fn effect_field(dimension: &str, index: u32) -> String {
    format!("-fx{dimension}-{index}-")
}

/// Prefix shared by every replay-table field.
pub const REPLAY_PREFIX: &str = "-wf";

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("duplicate job: {0}")]
    DuplicateJob(JobId),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("app manifest not found for version: {0}")]
    AppNotFound(String),
    #[error("corrupt record at {key}: {message}")]
    Corrupt { key: String, message: String },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a fired time-hook wakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHookKind {
    /// A sleeping hook activity's completion leg.
    Sleep,
    /// An await-cycler re-entry (delayed cycle back-edge).
    Cycle,
    /// A delayed retry of a stored invocation (graduated backoff).
    Retry,
}

/// One entry in the time-hook sorted set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeHookRecord {
    pub jid: JobId,
    pub gid: String,
    pub aid: hm_core::ActivityId,
    pub dad: Dimension,
    pub kind: TimeHookKind,
    /// Workflow execution index the wake resolves, when the sleeper is a
    /// reentrant workflow frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Stored invocation a `Retry` wake re-appends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// One parked occurrence a web-hook signal resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebHookTarget {
    pub jid: JobId,
    pub dad: Dimension,
    /// Workflow execution index, when the waiter is a reentrant frame.
    pub index: Option<u32>,
}

/// Store service over a backend provider.
pub struct Store<P: Provider> {
    provider: P,
    keys: KeySpace,
    symbols: Arc<Mutex<SymbolTable>>,
}

impl<P: Provider> Clone for Store<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            keys: self.keys.clone(),
            symbols: Arc::clone(&self.symbols),
        }
    }
}

impl<P: Provider> Store<P> {
    pub fn new(provider: P, namespace: impl Into<String>, app: AppId) -> Self {
        Self {
            provider,
            keys: KeySpace::new(namespace, app),
            symbols: Arc::new(Mutex::new(SymbolTable::new())),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    // --- app records ---

    /// Persist an app manifest under its version.
    pub async fn save_app(&self, app: &hm_core::App) -> Result<(), StoreError> {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), app.id.to_string());
        fields.insert(
            format!("manifest:{}", app.version),
            serde_json::to_string(app)?,
        );
        self.provider.hset(&self.keys.app(), fields).await?;
        Ok(())
    }

    /// Load the manifest for one version.
    pub async fn load_app(&self, version: &str) -> Result<hm_core::App, StoreError> {
        let raw = self
            .provider
            .hget(&self.keys.app(), &format!("manifest:{version}"))
            .await?
            .ok_or_else(|| StoreError::AppNotFound(version.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Flip the active version pointer.
    pub async fn activate_version(&self, version: &str) -> Result<(), StoreError> {
        let fields = HashMap::from([("active".to_string(), version.to_string())]);
        self.provider.hset(&self.keys.app(), fields).await?;
        Ok(())
    }

    pub async fn active_version(&self) -> Result<Option<String>, StoreError> {
        Ok(self.provider.hget(&self.keys.app(), "active").await?)
    }

    // --- symbol table ---

    /// Warm the symbol cache from the persisted table.
    pub async fn load_symbols(&self) -> Result<(), StoreError> {
        let map = self.provider.hgetall(&self.keys.symbols()).await?;
        *self.symbols.lock() = SymbolTable::from_map(map);
        Ok(())
    }

    async fn persist_symbols(&self, fresh: Vec<(String, String)>) -> Result<(), StoreError> {
        if fresh.is_empty() {
            return Ok(());
        }
        self.provider
            .hset(&self.keys.symbols(), fresh.into_iter().collect())
            .await?;
        Ok(())
    }

    // --- job lifecycle ---

    /// Create a job record. The status field is the existence gate: a
    /// second create for the same jid fails with `DuplicateJob`.
    pub async fn create_job(
        &self,
        metadata: &JobMetadata,
        data: &Value,
    ) -> Result<(), StoreError> {
        let key = self.keys.job(&metadata.jid);
        let created = self
            .provider
            .hsetnx(&key, STATUS_FIELD, &metadata.js.to_string())
            .await?;
        if !created {
            return Err(StoreError::DuplicateJob(metadata.jid.clone()));
        }

        let mut fields = metadata_fields(metadata);
        for (path, tagged) in Serializer::flatten(data) {
            fields.insert(format!("{DATA_PREFIX}{path}"), tagged);
        }
        self.provider.hset(&key, fields).await?;
        Ok(())
    }

    pub async fn job_exists(&self, jid: &JobId) -> Result<bool, StoreError> {
        Ok(self
            .provider
            .hget(&self.keys.job(jid), STATUS_FIELD)
            .await?
            .is_some())
    }

    /// Current semaphore value; `JobNotFound` when the record is gone.
    pub async fn get_status(&self, jid: &JobId) -> Result<i64, StoreError> {
        let raw = self
            .provider
            .hget(&self.keys.job(jid), STATUS_FIELD)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(jid.clone()))?;
        raw.parse().map_err(|_| StoreError::Corrupt {
            key: self.keys.job(jid),
            message: format!("status field: {raw}"),
        })
    }

    /// Atomically adjust the semaphore, returning the post value.
    pub async fn adjust_status(&self, jid: &JobId, delta: i64) -> Result<i64, StoreError> {
        Ok(self
            .provider
            .hincrby(&self.keys.job(jid), STATUS_FIELD, delta)
            .await?)
    }

    /// Overwrite the semaphore (interrupt paths).
    pub async fn set_status(&self, jid: &JobId, value: i64) -> Result<(), StoreError> {
        let fields = HashMap::from([(STATUS_FIELD.to_string(), value.to_string())]);
        self.provider.hset(&self.keys.job(jid), fields).await?;
        Ok(())
    }

    pub async fn get_metadata(&self, jid: &JobId) -> Result<JobMetadata, StoreError> {
        let key = self.keys.job(jid);
        let names: Vec<String> = META_NAMES
            .iter()
            .map(|n| format!("{META_PREFIX}{n}"))
            .collect();
        let mut values = self.provider.hmget(&key, &names).await?;
        let status = self
            .provider
            .hget(&key, STATUS_FIELD)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(jid.clone()))?;
        let js: i64 = status.parse().unwrap_or(0);

        let mut take = |_: &str| values.remove(0);
        let metadata = JobMetadata {
            jid: JobId::new(take("jid").unwrap_or_default()),
            gid: take("gid").unwrap_or_default(),
            app: AppId::new(take("app").unwrap_or_default()),
            vrs: take("vrs").unwrap_or_default(),
            tpc: take("tpc").unwrap_or_default(),
            ts: take("ts").unwrap_or_default(),
            jc: take("jc").and_then(|v| v.parse().ok()).unwrap_or(0),
            ju: take("ju").and_then(|v| v.parse().ok()).unwrap_or(0),
            js,
            trc: take("trc"),
            spn: take("spn"),
            ngn: take("ngn"),
            expire: take("expire").and_then(|v| v.parse().ok()).unwrap_or(0),
            err: take("err"),
        };
        Ok(metadata)
    }

    /// Update individual metadata fields.
    pub async fn set_metadata_fields(
        &self,
        jid: &JobId,
        pairs: &[(&str, String)],
    ) -> Result<(), StoreError> {
        let fields = pairs
            .iter()
            .map(|(n, v)| (format!("{META_PREFIX}{n}"), v.clone()))
            .collect();
        self.provider.hset(&self.keys.job(jid), fields).await?;
        Ok(())
    }

    /// Merge mapped output into user-visible job data.
    pub async fn merge_job_data(&self, jid: &JobId, data: &Value) -> Result<(), StoreError> {
        let fields: HashMap<String, String> = Serializer::flatten(data)
            .into_iter()
            .map(|(path, tagged)| (format!("{DATA_PREFIX}{path}"), tagged))
            .collect();
        if fields.is_empty() {
            return Ok(());
        }
        self.provider.hset(&self.keys.job(jid), fields).await?;
        Ok(())
    }

    pub async fn get_job_data(&self, jid: &JobId) -> Result<Value, StoreError> {
        let all = self.provider.hgetall(&self.keys.job(jid)).await?;
        let data: BTreeMap<String, String> = all
            .into_iter()
            .filter_map(|(field, value)| {
                field
                    .strip_prefix(DATA_PREFIX)
                    .map(|path| (path.to_string(), value))
            })
            .collect();
        Ok(Serializer::restore_hierarchy(&data))
    }

    /// Hard-delete the job hash.
    pub async fn delete_job(&self, jid: &JobId) -> Result<bool, StoreError> {
        Ok(self.provider.del(&self.keys.job(jid)).await?)
    }

    /// Schedule the job hash to expire.
    pub async fn expire_job(&self, jid: &JobId, secs: u64) -> Result<bool, StoreError> {
        Ok(self.provider.expire(&self.keys.job(jid), secs).await?)
    }

    // --- activity records ---

    /// Write one section (`input`/`output`/`hook`/`settings`/`errors`) of
    /// an activity record under its dimensional address.
    pub async fn set_activity_record(
        &self,
        jid: &JobId,
        aid: &hm_core::ActivityId,
        dad: &Dimension,
        section: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let flat = Serializer::flatten(value);
        let paths = flat
            .into_iter()
            .map(|(leaf, tagged)| {
                let path = if leaf.is_empty() {
                    format!("{aid}/{section}")
                } else {
                    format!("{aid}/{section}/{leaf}")
                };
                (path, tagged)
            })
            .collect::<Vec<_>>();

        let (compressed, fresh) = self.symbols.lock().compress(paths);
        self.persist_symbols(fresh).await?;

        let fields: HashMap<String, String> = compressed
            .into_iter()
            .map(|(sym, tagged)| (format!("{sym}:{dad}"), tagged))
            .collect();
        self.provider.hset(&self.keys.job(jid), fields).await?;
        Ok(())
    }

    /// Mapping context for a job at one dimensional address: metadata,
    /// user data, and every activity record (the addressed dimension
    /// overriding the root one).
    pub async fn get_job_context(
        &self,
        jid: &JobId,
        dad: &Dimension,
    ) -> Result<Value, StoreError> {
        let all = self.provider.hgetall(&self.keys.job(jid)).await?;
        if all.is_empty() {
            return Err(StoreError::JobNotFound(jid.clone()));
        }

        let root = Dimension::root();
        let mut base: BTreeMap<String, String> = BTreeMap::new();
        let mut overlay: BTreeMap<String, String> = BTreeMap::new();
        let mut data: BTreeMap<String, String> = BTreeMap::new();
        let symbols = self.symbols.lock().clone();

        for (field, value) in &all {
            if let Some(path) = field.strip_prefix(DATA_PREFIX) {
                data.insert(path.to_string(), value.clone());
                continue;
            }
            if field == STATUS_FIELD
                || field.starts_with(META_PREFIX)
                || field.starts_with(LEDGER_PREFIX)
            {
                continue;
            }
            // Activity process field: <sym>:<dad>
            let Some((sym, field_dad)) = field.split_once(':') else {
                continue;
            };
            let Some(path) = symbols.path_for(sym) else {
                continue;
            };
            if field_dad == root.as_str() {
                base.insert(path.to_string(), value.clone());
            }
            if field_dad == dad.as_str() {
                overlay.insert(path.to_string(), value.clone());
            }
        }

        for (path, value) in overlay {
            base.insert(path, value);
        }

        let mut context = match Serializer::restore_hierarchy(&base) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        context.insert(
            "metadata".to_string(),
            serde_json::to_value(self.get_metadata(jid).await?)?,
        );
        context.insert("data".to_string(), Serializer::restore_hierarchy(&data));
        Ok(Value::Object(context))
    }

    /// Every symbol-compressed process field, expanded to
    /// `(path, dad, tagged value)` tuples (exporter input).
    pub async fn process_fields(
        &self,
        jid: &JobId,
    ) -> Result<Vec<(String, String, String)>, StoreError> {
        let all = self.provider.hgetall(&self.keys.job(jid)).await?;
        if all.is_empty() {
            return Err(StoreError::JobNotFound(jid.clone()));
        }
        let symbols = self.symbols.lock().clone();
        let mut out = Vec::new();
        for (field, value) in all {
            if field == STATUS_FIELD
                || field.starts_with(META_PREFIX)
                || field.starts_with(DATA_PREFIX)
                || field.starts_with(LEDGER_PREFIX)
            {
                continue;
            }
            let Some((sym, dad)) = field.split_once(':') else {
                continue;
            };
            if let Some(path) = symbols.path_for(sym) {
                out.push((path.to_string(), dad.to_string(), value));
            }
        }
        Ok(out)
    }

    // --- ledger ---

    /// Bump a collation counter; the returned post value detects
    /// duplicate deliveries (first writer sees exactly 1).
    pub async fn collate(
        &self,
        jid: &JobId,
        aid: &hm_core::ActivityId,
        dad: &Dimension,
        tag: &str,
    ) -> Result<f64, StoreError> {
        let field = format!("{LEDGER_PREFIX}c:{aid}:{dad}:{tag}");
        Ok(self
            .provider
            .hincrbyfloat(&self.keys.job(jid), &field, 1.0)
            .await?)
    }

    /// Bump an arbitrary ledger counter field.
    pub async fn incr_ledger_field(&self, jid: &JobId, field: &str) -> Result<f64, StoreError> {
        Ok(self
            .provider
            .hincrbyfloat(&self.keys.job(jid), field, 1.0)
            .await?)
    }

    /// Write raw ledger fields (workflow replay records).
    pub async fn set_ledger_fields(
        &self,
        jid: &JobId,
        fields: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.provider.hset(&self.keys.job(jid), fields).await?;
        Ok(())
    }

    /// Read every ledger field sharing a prefix.
    pub async fn ledger_fields_with_prefix(
        &self,
        jid: &JobId,
        prefix: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        let all = self.provider.hgetall(&self.keys.job(jid)).await?;
        Ok(all
            .into_iter()
            .filter(|(field, _)| field.starts_with(prefix))
            .collect())
    }

    // --- streams ---

    pub fn engine_stream(&self) -> String {
        self.keys.engine_stream()
    }

    pub fn worker_stream(&self, topic: &str) -> String {
        self.keys.worker_stream(topic)
    }

    /// Append a message to the engine transition stream.
    pub async fn append_engine(
        &self,
        msg: &hm_core::StreamData,
    ) -> Result<String, StoreError> {
        let body = serde_json::to_string(msg)?;
        Ok(self.provider.xadd(&self.keys.engine_stream(), &body).await?)
    }

    /// Append a message to a worker-topic stream.
    pub async fn append_worker(
        &self,
        topic: &str,
        msg: &hm_core::StreamData,
    ) -> Result<String, StoreError> {
        let body = serde_json::to_string(msg)?;
        Ok(self
            .provider
            .xadd(&self.keys.worker_stream(topic), &body)
            .await?)
    }

    /// Decode a raw stream entry.
    pub fn decode_stream(msg: &StreamMessage) -> Result<hm_core::StreamData, StoreError> {
        Ok(serde_json::from_str(&msg.body)?)
    }

    /// Run an atomic batch against the provider.
    pub async fn transact(
        &self,
        commands: Vec<Command>,
    ) -> Result<Vec<hm_providers::CommandReply>, StoreError> {
        Ok(self.provider.transact(commands).await?)
    }

    // --- time hooks ---

    /// Register a timer; fires when the scout sweeps past `fire_at_secs`.
    pub async fn register_time_hook(
        &self,
        record: &TimeHookRecord,
        fire_at_secs: u64,
    ) -> Result<(), StoreError> {
        let member = serde_json::to_string(record)?;
        self.provider
            .zadd(&self.keys.time_hooks(), fire_at_secs as i64, &member)
            .await?;
        Ok(())
    }

    /// Pop every due entry. Removal is the claim: an entry another engine
    /// already removed is skipped, so each timer fires once.
    pub async fn pop_due_time_hooks(
        &self,
        now_secs: u64,
    ) -> Result<Vec<TimeHookRecord>, StoreError> {
        let key = self.keys.time_hooks();
        let due = self.provider.zrangebyscore(&key, 0, now_secs as i64).await?;
        let mut records = Vec::new();
        for member in due {
            if self.provider.zrem(&key, &member).await? {
                match serde_json::from_str(&member) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(error = %e, "corrupt time-hook entry, dropping");
                    }
                }
            }
        }
        Ok(records)
    }

    // --- web-hook signal index ---

    /// Index a `(topic, resolved)` pair to a paused activity occurrence.
    /// Multiple jobs may park on the same pair; each holds its own entry.
    pub async fn register_web_hook(
        &self,
        topic: &str,
        resolved: &str,
        target: &WebHookTarget,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let key = self.keys.signal(topic, resolved);
        let value = match target.index {
            Some(index) => format!("{}::{}::{}", target.dad, target.jid, index),
            None => format!("{}::{}", target.dad, target.jid),
        };
        let fields = HashMap::from([(target.jid.to_string(), value)]);
        self.provider.hset(&key, fields).await?;
        self.provider.expire(&key, ttl_secs).await?;
        Ok(())
    }

    /// Resolve a signal to every parked target.
    ///
    /// Entries written by pre-composite writers hold a bare jid; those
    /// resolve at the root dimension. A signal is unresolvable only when
    /// no entry parses in either form.
    pub async fn resolve_web_hooks(
        &self,
        topic: &str,
        resolved: &str,
    ) -> Result<Vec<WebHookTarget>, StoreError> {
        let entries = self
            .provider
            .hgetall(&self.keys.signal(topic, resolved))
            .await?;
        let mut targets: Vec<WebHookTarget> = entries
            .into_values()
            .map(|value| {
                let mut parts = value.split("::");
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(dad), Some(jid), index) => WebHookTarget {
                        jid: JobId::new(jid),
                        dad: Dimension::from(dad),
                        index: index.and_then(|i| i.parse().ok()),
                    },
                    _ => WebHookTarget {
                        jid: JobId::new(value.as_str()),
                        dad: Dimension::root(),
                        index: None,
                    },
                }
            })
            .collect();
        targets.sort_by(|a, b| a.jid.cmp(&b.jid));
        Ok(targets)
    }

    /// Remove one job's entry, or the whole pair when `jid` is `None`.
    pub async fn delete_web_hook(
        &self,
        topic: &str,
        resolved: &str,
        jid: Option<&JobId>,
    ) -> Result<(), StoreError> {
        let key = self.keys.signal(topic, resolved);
        match jid {
            Some(jid) => {
                self.provider.hdel(&key, &[jid.to_string()]).await?;
            }
            None => {
                self.provider.del(&key).await?;
            }
        }
        Ok(())
    }

    // --- throttle rates ---

    /// Persist a per-topic throttle rate.
    pub async fn set_topic_throttle(&self, topic: &str, rate_ms: u64) -> Result<(), StoreError> {
        let fields = HashMap::from([(topic.to_string(), rate_ms.to_string())]);
        self.provider.hset(&self.keys.throttle(), fields).await?;
        Ok(())
    }

    /// Persist the global rate, overwriting every per-topic rate.
    pub async fn set_global_throttle(&self, rate_ms: u64) -> Result<(), StoreError> {
        let key = self.keys.throttle();
        let existing = self.provider.hgetall(&key).await?;
        let fields = existing
            .into_keys()
            .chain(std::iter::once(GLOBAL_THROTTLE_FIELD.to_string()))
            .map(|field| (field, rate_ms.to_string()))
            .collect();
        self.provider.hset(&key, fields).await?;
        Ok(())
    }

    /// Read persisted throttle rates (`*` is the global field).
    pub async fn get_throttles(&self) -> Result<HashMap<String, u64>, StoreError> {
        let all = self.provider.hgetall(&self.keys.throttle()).await?;
        Ok(all
            .into_iter()
            .filter_map(|(field, value)| value.parse().ok().map(|rate| (field, rate)))
            .collect())
    }
}

/// Metadata field names in storage order.
const META_NAMES: &[&str] = &[
    "jid", "gid", "app", "vrs", "tpc", "ts", "jc", "ju", "trc", "spn", "ngn", "expire", "err",
];

fn metadata_fields(metadata: &JobMetadata) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut put = |name: &str, value: Option<String>| {
        if let Some(v) = value {
            fields.insert(format!("{META_PREFIX}{name}"), v);
        }
    };
    put("jid", Some(metadata.jid.to_string()));
    put("gid", Some(metadata.gid.clone()));
    put("app", Some(metadata.app.to_string()));
    put("vrs", Some(metadata.vrs.clone()));
    put("tpc", Some(metadata.tpc.clone()));
    put("ts", Some(metadata.ts.clone()));
    put("jc", Some(metadata.jc.to_string()));
    put("ju", Some(metadata.ju.to_string()));
    put("trc", metadata.trc.clone());
    put("spn", metadata.spn.clone());
    put("ngn", metadata.ngn.clone());
    put("expire", Some(metadata.expire.to_string()));
    put("err", metadata.err.clone());
    fields
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
