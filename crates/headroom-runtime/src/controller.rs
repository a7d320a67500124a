//! Concurrency/cache controller: batches generic operations onto a bounded
//! worker pool, caches results, and raises checkpoint signals

use crate::cache::{CacheStats, LruCache};
use crate::orchestrator::{Orchestrator, ProcessResult};
use headroom_compress::CompressionManifest;
use headroom_core::{get_summary, Category, CompressionLevel, Config, ConfigError, Tier};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum OperationError {
    #[error("unknown operation type: {0}")]
    UnknownOperation(String),

    #[error("invalid parameters for {op_type}: {message}")]
    InvalidParams { op_type: String, message: String },

    #[error("operation failed: {0}")]
    Failed(String),

    #[error("operation rejected at {tier}: {op_type}")]
    Rejected { op_type: String, tier: Tier },
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op_type: String,
    #[serde(default)]
    pub params: Value,
}

impl Operation {
    pub fn new(op_type: impl Into<String>, params: Value) -> Self {
        Self {
            op_type: op_type.into(),
            params,
        }
    }

    /// Cache key: the operation type plus key-sorted parameters
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.op_type, canonical_json(&self.params))
    }
}

/// Serialize `value` with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                let mut out = Map::new();
                for (k, v) in ordered {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

pub trait OperationHandler: Send + Sync {
    fn execute(&self, params: &Value) -> Result<Value, OperationError>;

    /// Whether a result may be served again for the same parameters.
    ///
    /// Handlers whose result depends on session state (tier, store
    /// contents, side effects) return false and run on every request.
    fn cacheable(&self) -> bool {
        true
    }
}

impl<F> OperationHandler for F
where
    F: Fn(&Value) -> Result<Value, OperationError> + Send + Sync,
{
    fn execute(&self, params: &Value) -> Result<Value, OperationError> {
        self(params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Position in the submitted batch
    pub index: usize,
    pub op_type: String,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl OperationResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// In submission order
    pub results: Vec<OperationResult>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Advisory; consume it with [`Controller::take_checkpoint`]
    pub checkpoint_needed: bool,
    pub tier: Tier,
    /// Cache entries dropped by the pressure gate before this batch ran
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Compress,
    Expand,
    Score,
    Status,
}

struct BuiltinHandler {
    kind: Builtin,
    orchestrator: Arc<Mutex<Orchestrator>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn str_param<'a>(op_type: &str, params: &'a Value, key: &str) -> Result<&'a str, OperationError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(op_type, format!("missing string parameter `{key}`")))
}

fn invalid(op_type: &str, message: String) -> OperationError {
    OperationError::InvalidParams {
        op_type: op_type.to_string(),
        message,
    }
}

fn parse_param<T: serde::de::DeserializeOwned>(
    op_type: &str,
    params: &Value,
    key: &str,
) -> Result<Option<T>, OperationError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| invalid(op_type, format!("`{key}`: {e}"))),
    }
}

/// Parse a string (or list of strings) parameter through `FromStr`
fn named_param<T: FromStr<Err = String>>(
    op_type: &str,
    value: Option<&Value>,
    key: &str,
) -> Result<Option<T>, OperationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|e| invalid(op_type, format!("`{key}`: {e}"))),
        Some(_) => Err(invalid(op_type, format!("`{key}` must be a string"))),
    }
}

fn categories_param(params: &Value) -> Result<Option<Vec<Category>>, OperationError> {
    match params.get("categories") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                named_param("expand", Some(item), "categories")?
                    .ok_or_else(|| invalid("expand", "`categories` has a null entry".to_string()))
            })
            .collect::<Result<Vec<Category>, _>>()
            .map(Some),
        Some(_) => Err(invalid("expand", "`categories` must be a list".to_string())),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, OperationError> {
    serde_json::to_value(value).map_err(|e| OperationError::Failed(e.to_string()))
}

impl OperationHandler for BuiltinHandler {
    fn cacheable(&self) -> bool {
        matches!(self.kind, Builtin::Expand | Builtin::Score)
    }

    fn execute(&self, params: &Value) -> Result<Value, OperationError> {
        match self.kind {
            Builtin::Compress => {
                let content = str_param("compress", params, "content")?;
                let level: Option<CompressionLevel> =
                    named_param("compress", params.get("level"), "level")?;
                let force: bool = parse_param("compress", params, "force")?.unwrap_or(true);
                let result: ProcessResult = lock(&self.orchestrator).process(content, force, level);
                to_json(&result)
            }
            Builtin::Expand => {
                let content = str_param("expand", params, "content")?;
                let manifest: Option<CompressionManifest> =
                    parse_param("expand", params, "manifest")?;
                let categories = categories_param(params)?;
                let result = lock(&self.orchestrator).expand(
                    content,
                    manifest.as_ref(),
                    categories.as_deref(),
                );
                to_json(&result)
            }
            Builtin::Score => {
                let content = str_param("score", params, "content")?;
                let orch = lock(&self.orchestrator);
                let segments = orch.score(content);
                let summary = get_summary(&segments, orch.scoring());
                Ok(json!({
                    "segments": to_json(&segments)?,
                    "summary": to_json(&summary)?,
                }))
            }
            Builtin::Status => {
                let orch = lock(&self.orchestrator);
                let monitor = orch.monitor();
                Ok(json!({
                    "tier": monitor.current_tier(),
                    "budget": to_json(monitor.budget())?,
                    "latest": to_json(&monitor.latest())?,
                    "state": orch.state(),
                    "recommendation": monitor.recommendation(),
                    "should_compress": monitor.should_compress(),
                    "should_handoff": monitor.should_handoff(),
                    "should_stop": monitor.should_stop(),
                    "trend": to_json(&monitor.get_trend(5))?,
                }))
            }
        }
    }
}

/// Operation types accepted at EMERGENCY
const RELIEF_OPERATIONS: &[&str] = &["compress", "status"];

pub struct Controller {
    orchestrator: Arc<Mutex<Orchestrator>>,
    handlers: RwLock<HashMap<String, Arc<dyn OperationHandler>>>,
    cache: Mutex<LruCache<Value>>,
    pending: Mutex<BTreeMap<String, Vec<(u64, Operation)>>>,
    pool: rayon::ThreadPool,
    submitted: AtomicU64,
    completed: AtomicUsize,
    checkpoint: AtomicBool,
    checkpoint_every: usize,
    batch_threshold: usize,
}

impl Controller {
    pub fn new(config: &Config, orchestrator: Orchestrator) -> Result<Self, ControllerError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_pool_size)
            .thread_name(|i| format!("headroom-worker-{i}"))
            .build()?;

        let orchestrator = Arc::new(Mutex::new(orchestrator));
        let mut handlers: HashMap<String, Arc<dyn OperationHandler>> = HashMap::new();
        for (name, kind) in [
            ("compress", Builtin::Compress),
            ("expand", Builtin::Expand),
            ("score", Builtin::Score),
            ("status", Builtin::Status),
        ] {
            handlers.insert(
                name.to_string(),
                Arc::new(BuiltinHandler {
                    kind,
                    orchestrator: Arc::clone(&orchestrator),
                }),
            );
        }

        Ok(Self {
            orchestrator,
            handlers: RwLock::new(handlers),
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            pending: Mutex::new(BTreeMap::new()),
            pool,
            submitted: AtomicU64::new(0),
            completed: AtomicUsize::new(0),
            checkpoint: AtomicBool::new(false),
            checkpoint_every: config.checkpoint_every,
            batch_threshold: config.batch_threshold,
        })
    }

    /// Register or replace the handler for `op_type`
    pub fn register(&self, op_type: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(op_type.into(), handler);
    }

    pub fn orchestrator(&self) -> MutexGuard<'_, Orchestrator> {
        lock(&self.orchestrator)
    }

    pub fn tier(&self) -> Tier {
        self.orchestrator().monitor().current_tier()
    }

    /// Execute `ops`, serving repeats of cacheable operations from the cache.
    ///
    /// A single uncached operation runs inline; several run on the worker
    /// pool. Results come back in submission order.
    pub fn batch_execute(&self, ops: Vec<Operation>) -> BatchResult {
        let tier = self.tier();
        let evicted = self.apply_pressure(tier);

        let mut results: Vec<OperationResult> = Vec::with_capacity(ops.len());
        let mut misses: Vec<(usize, Operation, Option<String>)> = Vec::new();
        {
            let mut cache = lock(&self.cache);
            for (index, op) in ops.into_iter().enumerate() {
                if !self.is_cacheable(&op.op_type) {
                    misses.push((index, op, None));
                    continue;
                }
                let key = op.cache_key();
                match cache.get(&key) {
                    Some(value) => results.push(OperationResult {
                        index,
                        op_type: op.op_type,
                        cached: true,
                        value: Some(value),
                        error: None,
                    }),
                    None => misses.push((index, op, Some(key))),
                }
            }
        }
        let cache_hits = results.len();
        let cache_misses = misses.len();

        let run = |(index, op, key): (usize, Operation, Option<String>)| {
            let outcome = self.run_one(&op, tier);
            (index, op.op_type, key, outcome)
        };
        let executed: Vec<(usize, String, Option<String>, Result<Value, OperationError>)> =
            if misses.len() <= 1 {
                misses.into_iter().map(run).collect()
            } else {
                self.pool.install(|| misses.into_par_iter().map(run).collect())
            };

        {
            let mut cache = lock(&self.cache);
            for (index, op_type, key, outcome) in executed {
                let result = match outcome {
                    Ok(value) => {
                        if let Some(key) = key {
                            cache.put(key, value.clone());
                        }
                        OperationResult {
                            index,
                            op_type,
                            cached: false,
                            value: Some(value),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(op = %op_type, error = %e, "operation failed");
                        OperationResult {
                            index,
                            op_type,
                            cached: false,
                            value: None,
                            error: Some(e),
                        }
                    }
                };
                results.push(result);
            }
        }
        results.sort_by_key(|r| r.index);

        let checkpoint_needed = self.record_completed(results.len());
        debug!(
            ops = results.len(),
            cache_hits, cache_misses, checkpoint_needed, "batch executed"
        );

        BatchResult {
            results,
            cache_hits,
            cache_misses,
            checkpoint_needed,
            tier,
            evicted,
        }
    }

    /// Unknown operation types are never cached; they only ever fail
    fn is_cacheable(&self, op_type: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(op_type).is_some_and(|h| h.cacheable())
    }

    fn run_one(&self, op: &Operation, tier: Tier) -> Result<Value, OperationError> {
        if tier == Tier::Emergency && !RELIEF_OPERATIONS.contains(&op.op_type.as_str()) {
            return Err(OperationError::Rejected {
                op_type: op.op_type.clone(),
                tier,
            });
        }
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            handlers.get(&op.op_type).cloned()
        };
        match handler {
            Some(handler) => handler.execute(&op.params),
            None => Err(OperationError::UnknownOperation(op.op_type.clone())),
        }
    }

    fn apply_pressure(&self, tier: Tier) -> usize {
        let mut cache = lock(&self.cache);
        let evicted = if tier >= Tier::Critical {
            cache.clear()
        } else if tier >= Tier::Urgent {
            let half = cache.len() / 2;
            cache.evict_lru(half)
        } else {
            0
        };
        if evicted > 0 {
            info!(tier = %tier, evicted, "evicted cache entries under pressure");
        }
        evicted
    }

    /// Count `n` completed operations, setting the checkpoint flag whenever
    /// a multiple of the cadence is crossed
    fn record_completed(&self, n: usize) -> bool {
        if n == 0 {
            return self.checkpoint_pending();
        }
        let before = self.completed.fetch_add(n, Ordering::SeqCst);
        let after = before + n;
        if after / self.checkpoint_every > before / self.checkpoint_every {
            self.checkpoint.store(true, Ordering::SeqCst);
        }
        self.checkpoint_pending()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn checkpoint_pending(&self) -> bool {
        self.checkpoint.load(Ordering::SeqCst)
    }

    /// Consume the checkpoint signal, returning whether it was set
    pub fn take_checkpoint(&self) -> bool {
        self.checkpoint.swap(false, Ordering::SeqCst)
    }

    /// Queue `op`; runs its type's queue once it reaches the batch threshold
    pub fn submit(&self, op: Operation) -> Option<BatchResult> {
        let seq = self.submitted.fetch_add(1, Ordering::SeqCst);
        let ready = {
            let mut pending = lock(&self.pending);
            let queue = pending.entry(op.op_type.clone()).or_default();
            queue.push((seq, op));
            if queue.len() >= self.batch_threshold {
                let op_type = queue[0].1.op_type.clone();
                pending.remove(&op_type)
            } else {
                None
            }
        };
        ready.map(|queue| self.batch_execute(queue.into_iter().map(|(_, op)| op).collect()))
    }

    /// Run every queued operation in submission order
    pub fn flush(&self) -> BatchResult {
        let mut queued: Vec<(u64, Operation)> = {
            let mut pending = lock(&self.pending);
            std::mem::take(&mut *pending).into_values().flatten().collect()
        };
        queued.sort_by_key(|(seq, _)| *seq);
        self.batch_execute(queued.into_iter().map(|(_, op)| op).collect())
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).values().map(Vec::len).sum()
    }

    /// Cache keys from least to most recently used
    pub fn cache_entries(&self) -> Vec<String> {
        lock(&self.cache).keys()
    }

    pub fn clear_cache(&self) -> usize {
        lock(&self.cache).clear()
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.cache).stats()
    }

    /// Free headroom: drop cached results and force a compression pass
    pub fn relieve_pressure(&self, content: &str) -> ProcessResult {
        let cleared = self.clear_cache();
        let result = self.orchestrator().process(content, true, None);
        info!(cleared, status = %result.status, "pressure relief pass");
        result
    }
}
