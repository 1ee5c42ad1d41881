//! State synchronization.
//!
//! [`StateSynchronizer`] owns the derived world state as a nested JSON object.
//! Deltas keyed by dot paths are applied all-or-nothing: the candidate state
//! is validated before it replaces the current one, and a rejected delta
//! leaves no trace except the failure counters and a recent-error record.
//!
//! Periodic snapshots, optional file persistence through a [`Codec`], and an
//! external [`SessionBackend`] mirror round out the component.

pub mod backend;
pub mod path;
pub mod validator;

pub use backend::{InMemorySession, SessionBackend};
pub use path::{delete_path, get_path, has_path, set_path};
pub use validator::{StateValidator, ValidationRule, ValueKind};

use crate::codec::{Codec, IdentityCodec};
use crate::error::{StateError, StateResult};
use crate::handler::StateDelta;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_PERSISTENCE_BASE: &str = "minecraft_state";
const STATS_RECENT_ERRORS: usize = 10;

/// How concurrent writers to the same key are reconciled.
///
/// Only [`ConflictResolution::LatestWins`] is implemented; the other
/// strategies fall back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// The most recent write replaces the previous value.
    #[default]
    LatestWins,
    /// Merge object values.
    Merge,
    /// Application-defined resolution.
    Custom,
}

/// Configuration for the state synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Record every committed change.
    pub enable_history: bool,
    /// Capacity of the change history.
    pub max_history_size: usize,
    /// Take periodic snapshots while running.
    pub enable_snapshots: bool,
    /// Interval between periodic snapshots.
    pub snapshot_interval: Duration,
    /// Number of snapshots retained.
    pub max_snapshots: usize,
    /// Save state on stop and load it on start.
    pub enable_persistence: bool,
    /// Base path of the persistence file; `_state.json` is appended.
    pub persistence_path: Option<PathBuf>,
    /// Conflict resolution strategy.
    pub conflict_resolution: ConflictResolution,
    /// Capacity of the recent-errors list.
    pub max_recent_errors: usize,
    /// Interval between recent-error cleanups.
    pub cleanup_interval: Duration,
    /// Recent errors older than this are removed by cleanup.
    pub error_retention: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enable_history: true,
            max_history_size: 1000,
            enable_snapshots: true,
            snapshot_interval: Duration::from_secs(300),
            max_snapshots: 24,
            enable_persistence: false,
            persistence_path: None,
            conflict_resolution: ConflictResolution::LatestWins,
            max_recent_errors: 100,
            cleanup_interval: Duration::from_secs(3600),
            error_retention: Duration::from_secs(86_400),
        }
    }
}

impl SyncConfig {
    /// Returns the persistence file, or `None` when persistence is disabled.
    pub fn persistence_file(&self) -> Option<PathBuf> {
        if !self.enable_persistence {
            return None;
        }
        let base = self
            .persistence_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSISTENCE_BASE));
        Some(PathBuf::from(format!("{}_state.json", base.display())))
    }
}

/// One committed change to a state key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Dot path of the key.
    pub key: String,
    /// Value before the change, `Null` when absent.
    pub old_value: Value,
    /// Value after the change, `Null` for a deletion.
    pub new_value: Value,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Event that produced the delta.
    pub event_id: Option<String>,
    /// Origin of the delta.
    pub source: String,
}

/// A full copy of the state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Unique snapshot id.
    pub snapshot_id: String,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// The state.
    pub state: Map<String, Value>,
    /// Number of history entries when the snapshot was taken.
    pub event_count: usize,
}

impl StateSnapshot {
    /// Creates a snapshot of the given state taken now.
    pub fn new(state: Map<String, Value>, event_count: usize) -> Self {
        Self {
            snapshot_id: format!("snapshot_{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            state,
            event_count,
        }
    }
}

/// A rejected delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    /// When the delta was rejected.
    pub timestamp: DateTime<Utc>,
    /// Why it was rejected.
    pub error: String,
    /// Event that produced the delta.
    pub event_id: Option<String>,
}

/// Commit counters, persisted alongside the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCounters {
    /// Changed keys across all commits.
    pub total_changes: u64,
    /// Accepted deltas.
    pub successful_syncs: u64,
    /// Rejected deltas.
    pub failed_syncs: u64,
    /// Serialized size of the state in bytes.
    pub state_size: usize,
    /// Time of the last periodic snapshot.
    pub last_snapshot_time: Option<DateTime<Utc>>,
}

/// Synchronizer statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    /// Number of top-level keys in the state.
    pub current_state_size: usize,
    /// Entries in the change history.
    pub history_size: usize,
    /// Retained snapshots.
    pub snapshots_count: usize,
    /// Commit counters.
    pub counters: SyncCounters,
    /// Time of the last commit or restore.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// The most recent errors.
    pub recent_errors: Vec<SyncErrorRecord>,
    /// Number of custom validation rules.
    pub validation_rules: usize,
    /// Number of required keys.
    pub required_keys: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    snapshot: StateSnapshot,
    #[serde(default)]
    stats: SyncCounters,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    history: VecDeque<StateChange>,
    snapshots: VecDeque<StateSnapshot>,
    recent_errors: VecDeque<SyncErrorRecord>,
    counters: SyncCounters,
    top_level_keys: usize,
    last_sync_time: Option<DateTime<Utc>>,
}

/// Applies validated state deltas.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{StateDelta, StateSynchronizer, SyncConfig};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let sync = StateSynchronizer::new(SyncConfig::default());
///
/// let mut delta = StateDelta::new();
/// delta.insert("minecraft.spawned".to_string(), json!(true));
/// delta.insert("minecraft.bot.health".to_string(), json!(20));
/// assert!(sync.apply_delta(&delta, Some("evt-1"), "event").await);
///
/// let mut bad = StateDelta::new();
/// bad.insert("minecraft.bot.health".to_string(), json!(99));
/// assert!(!sync.apply_delta(&bad, Some("evt-2"), "event").await);
///
/// assert_eq!(sync.get("minecraft.bot.health").await, Some(json!(20)));
/// # });
/// ```
pub struct StateSynchronizer {
    config: SyncConfig,
    validator: StateValidator,
    backend: Option<Arc<dyn SessionBackend>>,
    codec: Arc<dyn Codec>,
    state: tokio::sync::Mutex<Map<String, Value>>,
    books: Mutex<Bookkeeping>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    conflict_warned: AtomicBool,
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer")
            .field("config", &self.config)
            .field("validator", &self.validator)
            .field("has_backend", &self.backend.is_some())
            .field("codec", &self.codec.name())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StateSynchronizer {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl StateSynchronizer {
    /// Creates a synchronizer with the bot-state validator and no backend.
    pub fn new(config: SyncConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    /// Returns a builder.
    pub fn builder() -> SyncBuilder {
        SyncBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the validator.
    pub fn validator(&self) -> &StateValidator {
        &self.validator
    }

    /// Applies a delta atomically.
    ///
    /// Keys map to their new values; a `null` value deletes the key. The
    /// delta is diffed against the current state, applied to a copy, and the
    /// copy is validated. Returns `false` and leaves the state unchanged when
    /// validation fails. A delta that changes nothing is accepted.
    pub async fn apply_delta(&self, delta: &StateDelta, event_id: Option<&str>, source: &str) -> bool {
        self.warn_unsupported_resolution();

        let mut state = self.state.lock().await;
        let timestamp = Utc::now();

        let changes: Vec<StateChange> = delta
            .iter()
            .filter_map(|(key, value)| {
                let old_value = get_path(&state, key).cloned().unwrap_or(Value::Null);
                (old_value != *value).then(|| StateChange {
                    key: key.clone(),
                    old_value,
                    new_value: value.clone(),
                    timestamp,
                    event_id: event_id.map(str::to_string),
                    source: source.to_string(),
                })
            })
            .collect();

        if changes.is_empty() {
            return true;
        }

        let mut candidate = state.clone();
        for change in &changes {
            if change.new_value.is_null() {
                delete_path(&mut candidate, &change.key);
            } else {
                set_path(&mut candidate, &change.key, change.new_value.clone());
            }
        }

        if let Err(errors) = self.validator.validate(&candidate) {
            let failure = StateError::validation_failed(errors);
            error!(
                event_id = ?event_id,
                error = %failure,
                "State validation failed after applying delta"
            );
            let mut books = self.books.lock();
            books.counters.failed_syncs += 1;
            self.record_error(&mut books, failure.to_string(), event_id);
            return false;
        }

        let state_size = serde_json::to_vec(&candidate).map_or(0, |bytes| bytes.len());
        let top_level_keys = candidate.len();
        *state = candidate;

        {
            let mut books = self.books.lock();
            books.counters.total_changes += changes.len() as u64;
            books.counters.successful_syncs += 1;
            books.counters.state_size = state_size;
            books.top_level_keys = top_level_keys;
            books.last_sync_time = Some(timestamp);
            if self.config.enable_history {
                for change in &changes {
                    if books.history.len() >= self.config.max_history_size {
                        books.history.pop_front();
                    }
                    books.history.push_back(change.clone());
                }
            }
        }

        if let Some(backend) = &self.backend {
            if let Err(e) = backend.apply(delta).await {
                error!(event_id = ?event_id, error = %e, "Failed to sync with session backend");
            }
        }

        debug!(
            changes = changes.len(),
            event_id = ?event_id,
            source = %source,
            "Applied state delta"
        );
        true
    }

    /// Returns a snapshot of the current state without retaining it.
    pub async fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock().await;
        let event_count = self.books.lock().history.len();
        StateSnapshot::new(state.clone(), event_count)
    }

    /// Takes a snapshot and retains it, evicting the oldest beyond capacity.
    pub async fn take_snapshot(&self) -> StateSnapshot {
        let snapshot = self.snapshot().await;
        let mut books = self.books.lock();
        if books.snapshots.len() >= self.config.max_snapshots {
            books.snapshots.pop_front();
        }
        books.snapshots.push_back(snapshot.clone());
        books.counters.last_snapshot_time = Some(snapshot.timestamp);
        debug!(
            snapshot_id = %snapshot.snapshot_id,
            state_size = snapshot.state.len(),
            "Created state snapshot"
        );
        snapshot
    }

    /// Replaces the state with a snapshot's state if it validates.
    pub async fn restore_from_snapshot(&self, snapshot: &StateSnapshot) -> bool {
        let mut state = self.state.lock().await;
        if let Err(errors) = self.validator.validate(&snapshot.state) {
            error!(
                snapshot_id = %snapshot.snapshot_id,
                error = %StateError::validation_failed(errors),
                "Cannot restore from invalid snapshot"
            );
            return false;
        }

        *state = snapshot.state.clone();
        let mut books = self.books.lock();
        books.counters.state_size = serde_json::to_vec(&*state).map_or(0, |bytes| bytes.len());
        books.top_level_keys = state.len();
        books.last_sync_time = Some(snapshot.timestamp);
        info!(
            snapshot_id = %snapshot.snapshot_id,
            timestamp = %snapshot.timestamp,
            "Restored state from snapshot"
        );
        true
    }

    /// Writes the current state and counters to the persistence file.
    ///
    /// Does nothing when persistence is disabled.
    pub async fn persist(&self) -> StateResult<()> {
        let Some(file) = self.config.persistence_file() else {
            return Ok(());
        };
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = self.snapshot().await;
        let stats = self.books.lock().counters.clone();
        let persisted = PersistedState { snapshot, stats };
        let json = serde_json::to_vec_pretty(&persisted)?;
        let bytes = self.codec.compress(&json)?;
        tokio::fs::write(&file, bytes).await?;

        info!(path = %file.display(), codec = self.codec.name(), "Persisted state to disk");
        Ok(())
    }

    /// Loads state from the persistence file through the validated restore path.
    ///
    /// Returns `Ok(false)` when persistence is disabled, no file exists, or
    /// the persisted state fails validation.
    pub async fn load_persisted(&self) -> StateResult<bool> {
        let Some(file) = self.config.persistence_file() else {
            return Ok(false);
        };
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %file.display(), "No persisted state found");
                return Ok(false);
            }
            Err(e) => return Err(StateError::from(e)),
        };

        let json = self.codec.decompress(&bytes)?;
        let persisted: PersistedState = serde_json::from_slice(&json)?;
        let restored = self.restore_from_snapshot(&persisted.snapshot).await;
        if restored {
            info!(snapshot_id = %persisted.snapshot.snapshot_id, "Loaded persisted state");
        } else {
            error!(path = %file.display(), "Failed to restore persisted state");
        }

        let mut books = self.books.lock();
        let state_size = books.counters.state_size;
        books.counters = SyncCounters {
            state_size,
            ..persisted.stats
        };
        Ok(restored)
    }

    /// Replaces the state with the session backend's state if it validates.
    ///
    /// Returns `Ok(false)` when no backend is configured.
    pub async fn load_from_backend(&self) -> StateResult<bool> {
        let Some(backend) = &self.backend else {
            return Ok(false);
        };
        let state = backend.read().await?;
        let event_count = self.books.lock().history.len();
        Ok(self
            .restore_from_snapshot(&StateSnapshot::new(state, event_count))
            .await)
    }

    /// Removes recent errors older than the retention period.
    pub fn cleanup_errors(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.error_retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - retention;
        let mut books = self.books.lock();
        let before = books.recent_errors.len();
        books.recent_errors.retain(|record| record.timestamp > cutoff);
        let removed = before - books.recent_errors.len();
        debug!(
            removed,
            remaining_errors = books.recent_errors.len(),
            "Performed periodic cleanup"
        );
        removed
    }

    /// Returns a copy of the current state.
    pub async fn current_state(&self) -> Map<String, Value> {
        self.state.lock().await.clone()
    }

    /// Returns the value at a dot path.
    pub async fn get(&self, path: &str) -> Option<Value> {
        let state = self.state.lock().await;
        get_path(&state, path).cloned()
    }

    /// Returns up to `limit` of the most recent changes, oldest first.
    pub fn history(&self, limit: usize) -> Vec<StateChange> {
        let books = self.books.lock();
        let skip = books.history.len().saturating_sub(limit);
        books.history.iter().skip(skip).cloned().collect()
    }

    /// Returns the retained snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.books.lock().snapshots.iter().cloned().collect()
    }

    /// Returns the recent-errors list, oldest first.
    pub fn recent_errors(&self) -> Vec<SyncErrorRecord> {
        self.books.lock().recent_errors.iter().cloned().collect()
    }

    /// Returns synchronizer statistics.
    pub fn stats(&self) -> SyncStats {
        let books = self.books.lock();
        let skip = books.recent_errors.len().saturating_sub(STATS_RECENT_ERRORS);
        SyncStats {
            current_state_size: books.top_level_keys,
            history_size: books.history.len(),
            snapshots_count: books.snapshots.len(),
            counters: books.counters.clone(),
            last_sync_time: books.last_sync_time,
            recent_errors: books.recent_errors.iter().skip(skip).cloned().collect(),
            validation_rules: self.validator.rule_count(),
            required_keys: self.validator.required_key_count(),
        }
    }

    /// Returns `true` while background tasks are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Loads persisted state and spawns the snapshot and cleanup tasks.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.config.enable_persistence {
            if let Err(e) = self.load_persisted().await {
                error!(error = %e, "Failed to load persisted state");
            }
        }

        let mut tasks = Vec::new();
        if self.config.enable_snapshots {
            let sync = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                while sync.running.load(Ordering::Acquire) {
                    tokio::time::sleep(sync.config.snapshot_interval).await;
                    sync.take_snapshot().await;
                }
            }));
        }

        let sync = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            while sync.running.load(Ordering::Acquire) {
                tokio::time::sleep(sync.config.cleanup_interval).await;
                sync.cleanup_errors();
            }
        }));

        self.tasks.lock().extend(tasks);
        info!(
            snapshots = self.config.enable_snapshots,
            persistence = self.config.enable_persistence,
            "State synchronizer started"
        );
    }

    /// Stops the background tasks and persists the state when enabled.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }

        if let Err(e) = self.persist().await {
            error!(error = %e, "Failed to persist state");
        }
        info!("State synchronizer stopped");
    }

    fn record_error(&self, books: &mut Bookkeeping, error: String, event_id: Option<&str>) {
        if books.recent_errors.len() >= self.config.max_recent_errors {
            books.recent_errors.pop_front();
        }
        books.recent_errors.push_back(SyncErrorRecord {
            timestamp: Utc::now(),
            error,
            event_id: event_id.map(str::to_string),
        });
    }

    fn warn_unsupported_resolution(&self) {
        if self.config.conflict_resolution != ConflictResolution::LatestWins
            && !self.conflict_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                strategy = ?self.config.conflict_resolution,
                "Conflict resolution strategy not implemented, using latest wins"
            );
        }
    }
}

/// Builder for [`StateSynchronizer`].
pub struct SyncBuilder {
    config: SyncConfig,
    validator: StateValidator,
    backend: Option<Arc<dyn SessionBackend>>,
    codec: Arc<dyn Codec>,
}

impl Default for SyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBuilder {
    /// Creates a builder with the default config and the bot-state validator.
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            validator: StateValidator::minecraft_defaults(),
            backend: None,
            codec: Arc::new(IdentityCodec),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the validator.
    pub fn with_validator(mut self, validator: StateValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Mirrors committed deltas to a session backend.
    pub fn with_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the codec used for persistence.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Builds the synchronizer.
    pub fn build(self) -> StateSynchronizer {
        StateSynchronizer {
            config: self.config,
            validator: self.validator,
            backend: self.backend,
            codec: self.codec,
            state: tokio::sync::Mutex::new(Map::new()),
            books: Mutex::new(Bookkeeping::default()),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            conflict_warned: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(pairs: &[(&str, Value)]) -> StateDelta {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    async fn spawned() -> StateSynchronizer {
        let sync = StateSynchronizer::default();
        assert!(
            sync.apply_delta(&delta(&[("minecraft.spawned", json!(true))]), None, "test")
                .await
        );
        sync
    }

    #[tokio::test]
    async fn test_rejected_delta_leaves_state_untouched() {
        let sync = spawned().await;
        let healthy = delta(&[
            ("minecraft.bot.health", json!(20)),
            ("minecraft.bot.food", json!(18)),
        ]);
        assert!(sync.apply_delta(&healthy, Some("e1"), "event").await);
        let before = sync.current_state().await;

        let invalid = delta(&[
            ("minecraft.bot.health", json!(25)),
            ("minecraft.bot.food", json!(10)),
        ]);
        assert!(!sync.apply_delta(&invalid, Some("e2"), "event").await);

        assert_eq!(sync.current_state().await, before);
        let stats = sync.stats();
        assert_eq!(stats.counters.failed_syncs, 1);
        assert_eq!(stats.counters.successful_syncs, 2);
        assert_eq!(stats.counters.total_changes, 3);
        assert_eq!(stats.recent_errors.len(), 1);
        assert_eq!(stats.recent_errors[0].event_id.as_deref(), Some("e2"));
        assert!(stats.recent_errors[0]
            .error
            .starts_with("State validation failed: "));
        assert!(stats.recent_errors[0].error.contains("Health must be between 0 and 20"));
    }

    #[tokio::test]
    async fn test_unchanged_delta_is_accepted_without_history() {
        let sync = spawned().await;
        let history_before = sync.history(100).len();
        assert!(
            sync.apply_delta(&delta(&[("minecraft.spawned", json!(true))]), None, "test")
                .await
        );
        assert_eq!(sync.history(100).len(), history_before);
        assert_eq!(sync.stats().counters.successful_syncs, 1);
    }

    #[tokio::test]
    async fn test_null_deletes_nested_key() {
        let sync = spawned().await;
        let add = delta(&[("minecraft.chat.last_message", json!("hi"))]);
        assert!(sync.apply_delta(&add, None, "event").await);
        let remove = delta(&[("minecraft.chat.last_message", Value::Null)]);
        assert!(sync.apply_delta(&remove, None, "event").await);

        assert_eq!(sync.get("minecraft.chat.last_message").await, None);
        assert_eq!(sync.get("minecraft.chat").await, Some(json!({})));

        let history = sync.history(1);
        assert_eq!(history[0].old_value, json!("hi"));
        assert_eq!(history[0].new_value, Value::Null);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = SyncConfig {
            max_history_size: 3,
            ..SyncConfig::default()
        };
        let sync = StateSynchronizer::new(config);
        for tick in 0..5 {
            let d = delta(&[("minecraft.spawned", json!(true)), ("world.tick", json!(tick))]);
            assert!(sync.apply_delta(&d, None, "event").await);
        }
        let history = sync.history(10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].new_value, json!(4));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let sync = spawned().await;
        let d = delta(&[
            ("minecraft.bot.position.x", json!(1.5)),
            ("minecraft.bot.position.y", json!(64)),
        ]);
        assert!(sync.apply_delta(&d, None, "event").await);
        let snapshot = sync.take_snapshot().await;
        assert_eq!(sync.snapshots().len(), 1);

        let d = delta(&[("minecraft.bot.position.x", json!(100))]);
        assert!(sync.apply_delta(&d, None, "event").await);
        assert!(sync.restore_from_snapshot(&snapshot).await);
        assert_eq!(sync.current_state().await, snapshot.state);
        assert_eq!(sync.stats().counters.last_snapshot_time, Some(snapshot.timestamp));
    }

    #[tokio::test]
    async fn test_restore_rejects_invalid_snapshot() {
        let sync = spawned().await;
        let before = sync.current_state().await;
        let invalid = StateSnapshot::new(Map::new(), 0);
        assert!(!sync.restore_from_snapshot(&invalid).await);
        assert_eq!(sync.current_state().await, before);
    }

    #[tokio::test]
    async fn test_snapshot_retention() {
        let config = SyncConfig {
            max_snapshots: 2,
            ..SyncConfig::default()
        };
        let sync = StateSynchronizer::new(config);
        let first = sync.take_snapshot().await;
        sync.take_snapshot().await;
        sync.take_snapshot().await;
        let snapshots = sync.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.snapshot_id != first.snapshot_id));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            enable_persistence: true,
            persistence_path: Some(dir.path().join("nested").join("bot")),
            ..SyncConfig::default()
        };

        let sync = StateSynchronizer::new(config.clone());
        let d = delta(&[("minecraft.spawned", json!(true)), ("minecraft.bot.food", json!(12))]);
        assert!(sync.apply_delta(&d, Some("e1"), "event").await);
        sync.persist().await.unwrap();
        assert!(dir.path().join("nested").join("bot_state.json").exists());

        let restored = StateSynchronizer::new(config);
        assert!(restored.load_persisted().await.unwrap());
        assert_eq!(restored.current_state().await, sync.current_state().await);
        assert_eq!(restored.stats().counters.successful_syncs, 1);
        assert_eq!(restored.stats().counters.total_changes, 2);
    }

    #[tokio::test]
    async fn test_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            enable_persistence: true,
            persistence_path: Some(dir.path().join("missing")),
            ..SyncConfig::default()
        };
        let sync = StateSynchronizer::new(config);
        assert!(!sync.load_persisted().await.unwrap());

        let disabled = StateSynchronizer::default();
        assert!(!disabled.load_persisted().await.unwrap());
        disabled.persist().await.unwrap();
    }

    #[test]
    fn test_persistence_file_default_base() {
        let config = SyncConfig {
            enable_persistence: true,
            ..SyncConfig::default()
        };
        assert_eq!(
            config.persistence_file(),
            Some(PathBuf::from("minecraft_state_state.json"))
        );
        assert_eq!(SyncConfig::default().persistence_file(), None);
    }

    #[tokio::test]
    async fn test_backend_receives_committed_deltas() {
        let backend = Arc::new(InMemorySession::new());
        let sync = StateSynchronizer::builder()
            .with_backend(backend.clone())
            .build();

        let d = delta(&[("minecraft.spawned", json!(true))]);
        assert!(sync.apply_delta(&d, None, "event").await);
        let rejected = delta(&[("minecraft.spawned", json!("no"))]);
        assert!(!sync.apply_delta(&rejected, None, "event").await);

        assert_eq!(backend.applied_count(), 1);
        assert_eq!(
            Value::Object(backend.state()),
            json!({"minecraft": {"spawned": true}})
        );
    }

    #[tokio::test]
    async fn test_load_from_backend() {
        let seeded = json!({"minecraft": {"spawned": true, "bot": {"health": 7}}});
        let backend = Arc::new(InMemorySession::with_state(
            seeded.as_object().cloned().unwrap(),
        ));
        let sync = StateSynchronizer::builder().with_backend(backend).build();
        assert!(sync.load_from_backend().await.unwrap());
        assert_eq!(sync.get("minecraft.bot.health").await, Some(json!(7)));

        assert!(!StateSynchronizer::default().load_from_backend().await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_errors() {
        let sync = StateSynchronizer::default();
        let d = delta(&[("minecraft.bot.health", json!(5))]);
        assert!(!sync.apply_delta(&d, None, "event").await);
        assert_eq!(sync.cleanup_errors(), 0);
        assert_eq!(sync.recent_errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_snapshots() {
        let sync = Arc::new(StateSynchronizer::default());
        sync.start().await;
        assert!(sync.is_running());

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(sync.snapshots().len(), 1);

        sync.stop().await;
        assert!(!sync.is_running());
    }
}
