//! Pressure monitor: classifies budget usage into tiers and tracks the trend

use crate::config::{Config, ConfigError};
use crate::segment::segment_ids;
use crate::types::Tier;
use chrono::{DateTime, Utc};
use headroom_telemetry::{content_hash, estimate_units, LogEntry, Persistence, RecordKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshots considered when projecting time-to-EMERGENCY for `should_compress`
const LOOKAHEAD_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("no usage or content supplied and no previous snapshot exists")]
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Session-scoped budget, mutated only by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub capacity: u64,
    pub reserved_headroom: u64,
    pub current_tier: Tier,
}

impl BudgetState {
    pub fn effective_capacity(&self) -> u64 {
        self.capacity.saturating_sub(self.reserved_headroom)
    }
}

/// What a check measures
#[derive(Debug, Clone, Copy)]
pub enum UsageInput<'a> {
    /// Usage already expressed in budget units
    Units(u64),
    /// Raw content, converted at the configured chars-per-unit ratio
    Content(&'a str),
    /// Re-evaluate the most recent snapshot's usage
    Previous,
}

/// Immutable record of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub total_size: u64,
    pub usage_ratio: f64,
    pub tier: Tier,
    pub segment_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_chars: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// Passed to tier callbacks when the tier changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierChange {
    pub from: Tier,
    pub to: Tier,
    pub usage_ratio: f64,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackFailure {
    pub tier: Tier,
    pub index: usize,
    pub message: String,
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub snapshot: Snapshot,
    pub previous_tier: Tier,
    pub tier_changed: bool,
    pub callbacks_fired: usize,
    pub callback_failures: Vec<CallbackFailure>,
    /// False when the log collaborator rejected the snapshot record
    pub persisted: bool,
    pub recommendation: String,
}

impl Reading {
    pub fn tier(&self) -> Tier {
        self.snapshot.tier
    }

    pub fn usage_ratio(&self) -> f64 {
        self.snapshot.usage_ratio
    }
}

/// Usage trend over recent snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trend", rename_all = "snake_case")]
pub enum Trend {
    /// Fewer than two snapshots in the window
    InsufficientData { available: usize },
    /// Flat or falling: EMERGENCY is never reached at this rate
    NonIncreasing { ratio_delta: f64, snapshots: usize },
    Rising {
        ratio_delta: f64,
        ratio_per_minute: f64,
        minutes_to_emergency: f64,
        snapshots: usize,
    },
}

impl Trend {
    /// Projected minutes until EMERGENCY; `None` when unknown or never
    pub fn minutes_to_emergency(&self) -> Option<f64> {
        match self {
            Trend::Rising {
                minutes_to_emergency,
                ..
            } => Some(*minutes_to_emergency),
            _ => None,
        }
    }
}

/// Handle identifying a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle {
    pub tier: Tier,
    pub index: usize,
}

pub type TierCallback = Box<dyn FnMut(&TierChange) -> Result<(), CallbackError> + Send>;

pub struct PressureMonitor {
    thresholds: [f64; 4],
    chars_per_unit: f64,
    segment_size: usize,
    history_limit: usize,
    lookahead_minutes: f64,
    budget: BudgetState,
    history: VecDeque<Snapshot>,
    next_sequence: u64,
    callbacks: [Vec<TierCallback>; 5],
    log: Option<Arc<dyn Persistence>>,
}

impl std::fmt::Debug for PressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PressureMonitor")
            .field("thresholds", &self.thresholds)
            .field("budget", &self.budget)
            .field("snapshots", &self.history.len())
            .field(
                "callbacks",
                &self.callbacks.iter().map(Vec::len).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PressureMonitor {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds,
            chars_per_unit: config.chars_per_unit,
            segment_size: config.segment_size,
            history_limit: config.history_limit,
            lookahead_minutes: config.compress_lookahead_minutes,
            budget: BudgetState {
                capacity: config.capacity,
                reserved_headroom: config.reserved_headroom,
                current_tier: Tier::Safe,
            },
            history: VecDeque::new(),
            next_sequence: 0,
            callbacks: Default::default(),
            log: None,
        })
    }

    /// Send snapshot and tier-transition records to `log`
    pub fn with_log(mut self, log: Arc<dyn Persistence>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn budget(&self) -> &BudgetState {
        &self.budget
    }

    pub fn current_tier(&self) -> Tier {
        self.budget.current_tier
    }

    pub fn history(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.back()
    }

    pub fn recommendation(&self) -> &'static str {
        self.budget.current_tier.recommendation()
    }

    pub fn classify(&self, ratio: f64) -> Tier {
        Tier::from_ratio(ratio, &self.thresholds)
    }

    /// Register `callback` to run whenever the tier changes to `tier`.
    ///
    /// Callbacks for one tier run in registration order.
    pub fn register_callback<F>(&mut self, tier: Tier, callback: F) -> CallbackHandle
    where
        F: FnMut(&TierChange) -> Result<(), CallbackError> + Send + 'static,
    {
        let slot = &mut self.callbacks[tier.index()];
        slot.push(Box::new(callback));
        CallbackHandle {
            tier,
            index: slot.len() - 1,
        }
    }

    /// Restore history from previously logged snapshots.
    ///
    /// Callbacks do not fire and nothing is logged; the recorded tier becomes
    /// the tier of the last snapshot.
    pub fn replay<I>(&mut self, snapshots: I)
    where
        I: IntoIterator<Item = Snapshot>,
    {
        for snapshot in snapshots {
            self.next_sequence = self.next_sequence.max(snapshot.sequence + 1);
            self.budget.current_tier = snapshot.tier;
            self.history.push_back(snapshot);
            if self.history.len() > self.history_limit {
                self.history.pop_front();
            }
        }
    }

    pub fn check(&mut self, input: UsageInput<'_>) -> Result<Reading, MonitorError> {
        self.check_at(input, Utc::now())
    }

    /// Measure usage at `timestamp`, record a snapshot and fire tier callbacks
    pub fn check_at(
        &mut self,
        input: UsageInput<'_>,
        timestamp: DateTime<Utc>,
    ) -> Result<Reading, MonitorError> {
        let (total_size, segment_ids, hash, chars) = match input {
            UsageInput::Units(units) => (units, Vec::new(), None, None),
            UsageInput::Content(content) => (
                estimate_units(content, self.chars_per_unit),
                segment_ids(content, self.segment_size),
                Some(content_hash(content.as_bytes())),
                Some(content.chars().count()),
            ),
            UsageInput::Previous => {
                let last = self.history.back().ok_or(MonitorError::NoData)?;
                (
                    last.total_size,
                    last.segment_ids.clone(),
                    last.content_hash.clone(),
                    last.content_chars,
                )
            }
        };

        let capacity = self.budget.effective_capacity().max(1);
        let usage_ratio = total_size as f64 / capacity as f64;
        let tier = self.classify(usage_ratio);

        let snapshot = Snapshot {
            sequence: self.next_sequence,
            total_size,
            usage_ratio,
            tier,
            segment_ids,
            content_hash: hash,
            content_chars: chars,
            timestamp,
        };
        self.next_sequence += 1;

        self.history.push_back(snapshot.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        let previous_tier = self.budget.current_tier;
        let tier_changed = tier != previous_tier;
        let mut callbacks_fired = 0;
        let mut callback_failures = Vec::new();

        if tier_changed {
            let change = TierChange {
                from: previous_tier,
                to: tier,
                usage_ratio,
                sequence: snapshot.sequence,
            };
            info!(from = %previous_tier, to = %tier, ratio = usage_ratio, "tier changed");

            for (index, callback) in self.callbacks[tier.index()].iter_mut().enumerate() {
                callbacks_fired += 1;
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(&change)))
                    .unwrap_or_else(|_| Err(CallbackError::new("callback panicked")));
                if let Err(e) = outcome {
                    warn!(tier = %tier, index, error = %e, "tier callback failed");
                    callback_failures.push(CallbackFailure {
                        tier,
                        index,
                        message: e.to_string(),
                    });
                }
            }

            self.budget.current_tier = tier;
        }

        let mut persisted = self.log_record(RecordKind::Snapshot, &snapshot, timestamp);
        if tier_changed {
            let transition = TierChange {
                from: previous_tier,
                to: tier,
                usage_ratio,
                sequence: snapshot.sequence,
            };
            persisted &= self.log_record(RecordKind::TierTransition, &transition, timestamp);
        }

        debug!(
            sequence = snapshot.sequence,
            size = total_size,
            ratio = usage_ratio,
            tier = %tier,
            "pressure check"
        );

        Ok(Reading {
            snapshot,
            previous_tier,
            tier_changed,
            callbacks_fired,
            callback_failures,
            persisted,
            recommendation: tier.recommendation().to_string(),
        })
    }

    fn log_record<T: Serialize>(
        &self,
        kind: RecordKind,
        record: &T,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(log) = &self.log else {
            return true;
        };

        let payload = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to serialize monitor record");
                return false;
            }
        };

        match log.append(&LogEntry::new(kind, payload).at(timestamp)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to append monitor record");
                false
            }
        }
    }

    /// Ratio change over the last `window` snapshots, extrapolated to EMERGENCY
    pub fn get_trend(&self, window: usize) -> Trend {
        let take = window.min(self.history.len());
        if take < 2 {
            return Trend::InsufficientData {
                available: self.history.len(),
            };
        }

        let recent: Vec<&Snapshot> = self.history.iter().skip(self.history.len() - take).collect();
        let first = recent[0];
        let last = recent[take - 1];
        let ratio_delta = last.usage_ratio - first.usage_ratio;

        if ratio_delta <= 0.0 {
            return Trend::NonIncreasing {
                ratio_delta,
                snapshots: take,
            };
        }

        // Clamp to one second so back-to-back checks don't divide by zero
        let elapsed_minutes = ((last.timestamp - first.timestamp).num_milliseconds() as f64
            / 60_000.0)
            .max(1.0 / 60.0);
        let ratio_per_minute = ratio_delta / elapsed_minutes;
        let remaining = (self.thresholds[3] - last.usage_ratio).max(0.0);

        Trend::Rising {
            ratio_delta,
            ratio_per_minute,
            minutes_to_emergency: remaining / ratio_per_minute,
            snapshots: take,
        }
    }

    /// URGENT or worse, or PLAN with EMERGENCY projected inside the lookahead
    pub fn should_compress(&self) -> bool {
        match self.budget.current_tier {
            Tier::Safe => false,
            Tier::Plan => self
                .get_trend(LOOKAHEAD_WINDOW)
                .minutes_to_emergency()
                .is_some_and(|m| m <= self.lookahead_minutes),
            _ => true,
        }
    }

    pub fn should_handoff(&self) -> bool {
        self.budget.current_tier >= Tier::Critical
    }

    pub fn should_stop(&self) -> bool {
        self.budget.current_tier == Tier::Emergency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use headroom_telemetry::MemoryStore;
    use std::sync::Mutex;

    fn monitor() -> PressureMonitor {
        PressureMonitor::new(&Config::new()).unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_scenario_safe_usage() {
        let mut monitor = monitor();
        let reading = monitor.check(UsageInput::Units(50_000)).unwrap();
        assert_eq!(reading.tier(), Tier::Safe);
        assert!((reading.usage_ratio() - 0.25).abs() < 1e-12);
        assert!(!monitor.should_compress());
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_scenario_emergency_usage() {
        let mut monitor = monitor();
        let reading = monitor.check(UsageInput::Units(190_000)).unwrap();
        assert_eq!(reading.tier(), Tier::Emergency);
        assert!(monitor.should_compress());
        assert!(monitor.should_handoff());
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_content_converted_with_fixed_ratio() {
        let mut monitor = monitor();
        let content = "x".repeat(400_000);
        let reading = monitor.check(UsageInput::Content(&content)).unwrap();
        assert_eq!(reading.snapshot.total_size, 100_000);
        assert_eq!(reading.tier(), Tier::Safe);
        assert_eq!(reading.snapshot.content_chars, Some(400_000));
        assert_eq!(reading.snapshot.segment_ids.len(), 1);
    }

    #[test]
    fn test_no_data_without_history() {
        let mut monitor = monitor();
        assert_eq!(
            monitor.check(UsageInput::Previous).unwrap_err(),
            MonitorError::NoData
        );
        assert!(monitor.latest().is_none());
    }

    #[test]
    fn test_previous_reuses_last_snapshot() {
        let mut monitor = monitor();
        monitor.check(UsageInput::Units(160_000)).unwrap();
        let reading = monitor.check(UsageInput::Previous).unwrap();
        assert_eq!(reading.snapshot.total_size, 160_000);
        assert_eq!(reading.snapshot.sequence, 1);
        assert!(!reading.tier_changed);
    }

    #[test]
    fn test_reserved_headroom_shrinks_capacity() {
        let mut config = Config::new();
        config.reserved_headroom = 100_000;
        let mut monitor = PressureMonitor::new(&config).unwrap();
        let reading = monitor.check(UsageInput::Units(50_000)).unwrap();
        assert!((reading.usage_ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = Config::new();
        config.thresholds = [0.9, 0.8, 0.7, 0.6];
        assert!(PressureMonitor::new(&config).is_err());
    }

    #[test]
    fn test_callbacks_fire_in_registration_order_on_change() {
        let mut monitor = monitor();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let order = Arc::clone(&order);
            monitor.register_callback(Tier::Urgent, move |change| {
                order.lock().unwrap().push((label, change.from, change.to));
                Ok(())
            });
        }
        let other = Arc::new(Mutex::new(0));
        {
            let other = Arc::clone(&other);
            monitor.register_callback(Tier::Critical, move |_| {
                *other.lock().unwrap() += 1;
                Ok(())
            });
        }

        let reading = monitor.check(UsageInput::Units(160_000)).unwrap();
        assert!(reading.tier_changed);
        assert_eq!(reading.callbacks_fired, 2);
        assert_eq!(
            *order.lock().unwrap(),
            vec![
                ("first", Tier::Safe, Tier::Urgent),
                ("second", Tier::Safe, Tier::Urgent)
            ]
        );
        assert_eq!(*other.lock().unwrap(), 0);

        // Same tier again: nothing fires
        let reading = monitor.check(UsageInput::Units(161_000)).unwrap();
        assert!(!reading.tier_changed);
        assert_eq!(reading.callbacks_fired, 0);
        assert_eq!(order.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failing_callbacks_do_not_break_monitor() {
        let mut monitor = monitor();
        let reached = Arc::new(Mutex::new(false));

        monitor.register_callback(Tier::Plan, |_| Err(CallbackError::new("boom")));
        monitor.register_callback(Tier::Plan, |_| panic!("callback bug"));
        {
            let reached = Arc::clone(&reached);
            monitor.register_callback(Tier::Plan, move |_| {
                *reached.lock().unwrap() = true;
                Ok(())
            });
        }

        let reading = monitor.check(UsageInput::Units(130_000)).unwrap();
        assert_eq!(reading.tier(), Tier::Plan);
        assert_eq!(reading.callbacks_fired, 3);
        assert_eq!(reading.callback_failures.len(), 2);
        assert_eq!(reading.callback_failures[0].message, "boom");
        assert_eq!(reading.callback_failures[1].index, 1);
        assert!(*reached.lock().unwrap());
        assert_eq!(monitor.current_tier(), Tier::Plan);

        // Still usable afterwards
        let reading = monitor.check(UsageInput::Units(10_000)).unwrap();
        assert_eq!(reading.tier(), Tier::Safe);
    }

    #[test]
    fn test_snapshots_logged_and_ordered() {
        let store = Arc::new(MemoryStore::new());
        let mut monitor = PressureMonitor::new(&Config::new())
            .unwrap()
            .with_log(store.clone());

        monitor.check(UsageInput::Units(10_000)).unwrap();
        monitor.check(UsageInput::Units(170_000)).unwrap();
        monitor.check(UsageInput::Units(175_000)).unwrap();

        let snapshots = store.entries_of(RecordKind::Snapshot);
        assert_eq!(snapshots.len(), 3);
        let sequences: Vec<u64> = snapshots
            .iter()
            .map(|e| e.payload["sequence"].as_u64().unwrap())
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);

        let transitions = store.entries_of(RecordKind::TierTransition);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].payload["to"], "CRITICAL");

        let history: Vec<u64> = monitor.history().map(|s| s.sequence).collect();
        assert_eq!(history, vec![0, 1, 2]);
    }

    #[test]
    fn test_log_failure_degrades_to_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        store.fail_appends(true);
        let mut monitor = PressureMonitor::new(&Config::new())
            .unwrap()
            .with_log(store.clone());

        let reading = monitor.check(UsageInput::Units(10_000)).unwrap();
        assert!(!reading.persisted);
        assert_eq!(monitor.history().count(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut config = Config::new();
        config.history_limit = 3;
        let mut monitor = PressureMonitor::new(&config).unwrap();
        for units in 0..5 {
            monitor.check(UsageInput::Units(units * 1000)).unwrap();
        }
        let sequences: Vec<u64> = monitor.history().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_replay_restores_history_without_callbacks() {
        let mut first = monitor();
        let t0 = base_time();
        first.check_at(UsageInput::Units(100_000), t0).unwrap();
        first
            .check_at(UsageInput::Units(160_000), t0 + Duration::minutes(2))
            .unwrap();
        let saved: Vec<Snapshot> = first.history().cloned().collect();

        let mut second = monitor();
        let fired = Arc::new(Mutex::new(0));
        {
            let fired = Arc::clone(&fired);
            second.register_callback(Tier::Urgent, move |_| {
                *fired.lock().unwrap() += 1;
                Ok(())
            });
        }
        second.replay(saved);

        assert_eq!(second.current_tier(), Tier::Urgent);
        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(second.get_trend(5), first.get_trend(5));
        let reading = second.check(UsageInput::Previous).unwrap();
        assert_eq!(reading.snapshot.sequence, 2);
        assert!(!reading.tier_changed);
    }

    #[test]
    fn test_trend_insufficient_data() {
        let mut monitor = monitor();
        assert_eq!(
            monitor.get_trend(5),
            Trend::InsufficientData { available: 0 }
        );
        monitor.check(UsageInput::Units(1000)).unwrap();
        assert_eq!(
            monitor.get_trend(5),
            Trend::InsufficientData { available: 1 }
        );
        monitor.check(UsageInput::Units(2000)).unwrap();
        assert!(matches!(
            monitor.get_trend(1),
            Trend::InsufficientData { .. }
        ));
    }

    #[test]
    fn test_trend_non_increasing() {
        let mut monitor = monitor();
        let t0 = base_time();
        monitor.check_at(UsageInput::Units(100_000), t0).unwrap();
        monitor
            .check_at(UsageInput::Units(90_000), t0 + Duration::minutes(5))
            .unwrap();
        let trend = monitor.get_trend(10);
        assert!(matches!(trend, Trend::NonIncreasing { snapshots: 2, .. }));
        assert_eq!(trend.minutes_to_emergency(), None);

        monitor
            .check_at(UsageInput::Units(90_000), t0 + Duration::minutes(6))
            .unwrap();
        assert!(matches!(monitor.get_trend(2), Trend::NonIncreasing { .. }));
    }

    #[test]
    fn test_trend_extrapolates_minutes_to_emergency() {
        let mut monitor = monitor();
        let t0 = base_time();
        // 0.50 -> 0.60 over 10 minutes: 0.01 per minute, 0.35 left to 0.95
        monitor.check_at(UsageInput::Units(100_000), t0).unwrap();
        monitor
            .check_at(UsageInput::Units(110_000), t0 + Duration::minutes(5))
            .unwrap();
        monitor
            .check_at(UsageInput::Units(120_000), t0 + Duration::minutes(10))
            .unwrap();

        match monitor.get_trend(3) {
            Trend::Rising {
                ratio_per_minute,
                minutes_to_emergency,
                snapshots,
                ..
            } => {
                assert_eq!(snapshots, 3);
                assert!((ratio_per_minute - 0.01).abs() < 1e-9);
                assert!((minutes_to_emergency - 35.0).abs() < 1e-6);
            }
            other => panic!("expected rising trend, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_compresses_early_when_emergency_is_near() {
        let mut monitor = monitor();
        let t0 = base_time();
        monitor.check_at(UsageInput::Units(100_000), t0).unwrap();
        monitor
            .check_at(UsageInput::Units(140_000), t0 + Duration::minutes(1))
            .unwrap();
        assert_eq!(monitor.current_tier(), Tier::Plan);
        // 0.2 per minute, 0.25 left: ~1.25 minutes away
        assert!(monitor.should_compress());

        let mut slow = self::monitor();
        slow.check_at(UsageInput::Units(139_000), t0).unwrap();
        slow.check_at(UsageInput::Units(140_000), t0 + Duration::hours(1))
            .unwrap();
        assert_eq!(slow.current_tier(), Tier::Plan);
        assert!(!slow.should_compress());
    }
}
