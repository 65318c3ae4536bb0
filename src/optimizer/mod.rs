//! # Parameter Optimizer
//! Offline closed loop over the niche parameter vector: learn how parameter
//! choices map to observed pipeline performance, propose a better vector by
//! local search around the current one, and swap it in copy-on-write when
//! confidence is high. A cycle never blocks the request path.
//!
//! Rollback protocol: each cycle first compares current observed performance
//! with the last applied adjustment's pre-adjustment baseline; a drop beyond
//! the degradation threshold reverts the parameters. Three consecutive
//! rollbacks freeze the optimizer and raise a critical event.

pub mod history;
pub mod model;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::errors::AnalyzerError;
use crate::eventlog::{quality_report, EventLog, LogKind, LogLevel};
use crate::niche::{Niche, NicheResolver};

pub use history::{AdjustmentHistory, AdjustmentRecord, AdjustmentStatus};
pub use model::{FeatureScaler, PerformanceModel, TrainingGates, TrainingReport};

/// Integer-valued tunables that must stay whole after perturbation.
const INTEGER_FIELDS: [&str; 3] = ["min_words", "max_words", "volume_floor"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Niche whose parameter vector this optimizer tunes.
    #[serde(default)]
    pub niche: Niche,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
    #[serde(default)]
    pub gates: TrainingGates,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_degradation_threshold")]
    pub degradation_threshold: f64,
    #[serde(default = "default_max_rollbacks")]
    pub max_rollbacks: usize,
    /// Observed performance at or above this skips the cycle outright.
    #[serde(default = "default_good_enough")]
    pub good_enough: f64,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// Local-search probes per cycle.
    #[serde(default = "default_candidates")]
    pub candidates: usize,
    /// Relative perturbation radius for the local search.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,
}

fn default_window_days() -> i64 {
    30
}
fn default_min_rows() -> usize {
    30
}
fn default_confidence_floor() -> f64 {
    0.7
}
fn default_degradation_threshold() -> f64 {
    0.1
}
fn default_max_rollbacks() -> usize {
    3
}
fn default_good_enough() -> f64 {
    0.85
}
fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("config/niches")
}
fn default_candidates() -> usize {
    24
}
fn default_search_radius() -> f64 {
    0.05
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            niche: Niche::Generic,
            window_days: default_window_days(),
            min_rows: default_min_rows(),
            gates: TrainingGates::default(),
            confidence_floor: default_confidence_floor(),
            degradation_threshold: default_degradation_threshold(),
            max_rollbacks: default_max_rollbacks(),
            good_enough: default_good_enough(),
            model_dir: default_model_dir(),
            snapshot_dir: default_snapshot_dir(),
            candidates: default_candidates(),
            search_radius: default_search_radius(),
        }
    }
}

/// How one optimization cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Applied,
    SkippedNotNeeded,
    SkippedLowConfidence,
    InsufficientData,
    TrainingFailed,
    RolledBack,
    Frozen,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub status: CycleStatus,
    pub delta: f64,
    pub confidence: f64,
    pub tracing_id: String,
}

pub struct ParameterOptimizer {
    cfg: OptimizerConfig,
    resolver: NicheResolver,
    eventlog: Arc<EventLog>,
    history: AdjustmentHistory,
    frozen: AtomicBool,
    model: Mutex<Option<PerformanceModel>>,
}

impl ParameterOptimizer {
    /// Build the optimizer, loading the adjustment history and any persisted
    /// model artifacts.
    pub fn new(cfg: OptimizerConfig, resolver: NicheResolver, eventlog: Arc<EventLog>) -> Self {
        let history = AdjustmentHistory::load(cfg.model_dir.join("adjustment_history.json"));
        let frozen = history.consecutive_rollbacks() >= cfg.max_rollbacks;
        let model = match PerformanceModel::load(&cfg.model_dir) {
            Ok(m) => m,
            Err(e) => {
                warn!(target: "optimizer", error = %e, "persisted model unreadable; starting untrained");
                None
            }
        };
        Self {
            cfg,
            resolver,
            eventlog,
            history,
            frozen: AtomicBool::new(frozen),
            model: Mutex::new(model),
        }
    }

    pub fn history(&self) -> &AdjustmentHistory {
        &self.history
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Record one performance observation for the active parameter vector.
    /// These events are the optimizer's training data.
    pub fn record_observation(&self, performance: f64) -> Result<(), AnalyzerError> {
        let params = self.resolver.config(self.cfg.niche).vector();
        let mut payload = serde_json::Map::new();
        payload.insert("parameters".into(), serde_json::to_value(&params).unwrap_or_default());
        payload.insert("performance".into(), serde_json::json!(performance));
        self.eventlog.record(
            LogKind::Performance,
            LogLevel::Info,
            "parameter_observation",
            payload,
            None,
            None,
            None,
            None,
        )
    }

    /// Run one full optimization cycle.
    pub fn run_cycle(&self) -> CycleOutcome {
        let now = Utc::now();
        let tracing_id = self.eventlog.tracing_id("optimizer_cycle");
        metrics::counter!("optimizer_cycles_total").increment(1);

        if self.is_frozen() {
            return self.outcome(CycleStatus::Frozen, 0.0, 0.0, tracing_id);
        }

        let observed = self.observed_performance(now);

        // Rollback check precedes everything else.
        if let Some(outcome) = self.maybe_rollback(observed, now, &tracing_id) {
            return outcome;
        }

        let observed = observed.unwrap_or(0.0);
        if observed >= self.cfg.good_enough {
            let current = self.resolver.config(self.cfg.niche).vector();
            self.push_record(
                current.clone(),
                current,
                observed,
                observed,
                1.0,
                AdjustmentStatus::SkippedNotNeeded,
                &tracing_id,
            );
            return self.outcome(CycleStatus::SkippedNotNeeded, 0.0, 1.0, tracing_id);
        }

        // Training data over the window.
        let current_cfg = self.resolver.config(self.cfg.niche);
        let current_vec = current_cfg.vector();
        let keys: Vec<String> = current_vec.keys().cloned().collect();

        let rows = self.load_training(now, &keys);
        if rows.len() < self.cfg.min_rows {
            info!(target: "optimizer", rows = rows.len(), needed = self.cfg.min_rows, "insufficient training data");
            return self.outcome(CycleStatus::InsufficientData, 0.0, 0.0, tracing_id);
        }

        let (features, targets): (Vec<Vec<f64>>, Vec<f64>) = rows.into_iter().unzip();
        let trained = match PerformanceModel::train(&features, &targets, self.cfg.gates) {
            Ok((model, report)) => {
                self.persist_model(&model);
                let mut guard = self.model.lock().expect("model lock poisoned");
                *guard = Some(model);
                report
            }
            Err(e) => {
                error!(target: "optimizer", error = %e, "training failed");
                let _ = self.eventlog.record(
                    LogKind::Error,
                    LogLevel::Error,
                    "optimizer_cycle",
                    serde_json::Map::new(),
                    Some("training_failed".to_string()),
                    None,
                    Some(e.to_string()),
                    Some(&tracing_id),
                );
                return self.outcome(CycleStatus::TrainingFailed, 0.0, 0.0, tracing_id);
            }
        };

        // Local search around the current vector.
        let guard = self.model.lock().expect("model lock poisoned");
        let model = guard.as_ref().expect("model present after training");
        let (proposal, predicted) = match self.local_search(model, &current_vec, &keys) {
            Ok(found) => found,
            Err(e) => {
                error!(target: "optimizer", error = %e, "proposal search failed");
                return self.outcome(CycleStatus::Failed, 0.0, 0.0, tracing_id);
            }
        };
        drop(guard);

        let confidence = self.history.confidence();
        let delta = predicted - observed;

        if confidence < self.cfg.confidence_floor {
            info!(target: "optimizer", confidence, floor = self.cfg.confidence_floor, "proposal skipped on confidence");
            self.push_record(
                current_vec,
                proposal,
                observed,
                predicted,
                confidence,
                AdjustmentStatus::SkippedLowConfidence,
                &tracing_id,
            );
            return self.outcome(CycleStatus::SkippedLowConfidence, delta, confidence, tracing_id);
        }

        if predicted <= observed {
            self.push_record(
                current_vec.clone(),
                proposal,
                observed,
                predicted,
                confidence,
                AdjustmentStatus::SkippedNotNeeded,
                &tracing_id,
            );
            return self.outcome(CycleStatus::SkippedNotNeeded, delta, confidence, tracing_id);
        }

        // Apply: copy-on-write swap of the niche snapshot.
        let new_cfg = match current_cfg.with_vector(&proposal) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(target: "optimizer", error = %e, "proposal rejected by validation");
                self.push_record(
                    current_vec,
                    proposal,
                    observed,
                    predicted,
                    confidence,
                    AdjustmentStatus::Failed,
                    &tracing_id,
                );
                return self.outcome(CycleStatus::Failed, delta, confidence, tracing_id);
            }
        };
        if let Err(e) = self.resolver.swap(new_cfg) {
            error!(target: "optimizer", error = %e, "swap failed");
            return self.outcome(CycleStatus::Failed, delta, confidence, tracing_id);
        }

        if let Err(e) = self.resolver.save_snapshots(&self.cfg.snapshot_dir) {
            warn!(target: "optimizer", error = %e, "snapshot export failed");
        }

        self.push_record(
            current_vec,
            proposal,
            observed,
            predicted,
            confidence,
            AdjustmentStatus::Applied,
            &tracing_id,
        );
        info!(
            target: "optimizer",
            delta,
            confidence,
            r2 = trained.r2,
            "parameter adjustment applied"
        );
        self.outcome(CycleStatus::Applied, delta, confidence, tracing_id)
    }

    /// Mean of explicit performance observations in the window; falls back
    /// to the approval rate when none were recorded.
    fn observed_performance(&self, now: DateTime<Utc>) -> Option<f64> {
        let from = now - ChronoDuration::days(self.cfg.window_days);
        let perf_events = self
            .eventlog
            .read_range(from, now, Some(LogKind::Performance), None)
            .unwrap_or_default();

        let explicit: Vec<f64> = perf_events
            .iter()
            .filter_map(|e| e.payload.get("performance").and_then(|v| v.as_f64()))
            .collect();
        if !explicit.is_empty() {
            return Some(explicit.iter().sum::<f64>() / explicit.len() as f64);
        }

        let all = self.eventlog.read_range(from, now, None, None).unwrap_or_default();
        quality_report(&all).approval_rate
    }

    /// `(features, performance)` rows from performance events that carried a
    /// parameter snapshot. Features align with `keys`; rows missing a key
    /// are dropped.
    fn load_training(&self, now: DateTime<Utc>, keys: &[String]) -> Vec<(Vec<f64>, f64)> {
        let from = now - ChronoDuration::days(self.cfg.window_days);
        let events = self
            .eventlog
            .read_range(from, now, Some(LogKind::Performance), None)
            .unwrap_or_default();

        let mut rows = Vec::new();
        for e in events {
            let Some(perf) = e.payload.get("performance").and_then(|v| v.as_f64()) else {
                continue;
            };
            let Some(params) = e.payload.get("parameters").and_then(|v| v.as_object()) else {
                continue;
            };
            let mut row = Vec::with_capacity(keys.len());
            let mut complete = true;
            for key in keys {
                match params.get(key).and_then(|v| v.as_f64()) {
                    Some(v) => row.push(v),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                rows.push((row, perf));
            }
        }
        rows
    }

    /// Gradient-free local search: random multiplicative perturbations of
    /// the current vector, scored by the model; best predicted wins.
    fn local_search(
        &self,
        model: &PerformanceModel,
        current: &BTreeMap<String, f64>,
        keys: &[String],
    ) -> Result<(BTreeMap<String, f64>, f64), AnalyzerError> {
        let current_row: Vec<f64> = keys.iter().map(|k| current[k]).collect();
        let mut best_vec = current.clone();
        let mut best_score = model.predict(&current_row)?;

        for _ in 0..self.cfg.candidates {
            let mut candidate = BTreeMap::new();
            for key in keys {
                let factor = 1.0 + (rand::random::<f64>() - 0.5) * 2.0 * self.cfg.search_radius;
                let mut value = current[key] * factor;
                if INTEGER_FIELDS.contains(&key.as_str()) {
                    value = value.round().max(1.0);
                }
                candidate.insert(key.clone(), value);
            }
            let row: Vec<f64> = keys.iter().map(|k| candidate[k]).collect();
            let score = model.predict(&row)?;
            if score > best_score {
                best_score = score;
                best_vec = candidate;
            }
        }
        Ok((best_vec, best_score))
    }

    /// Revert to the pre-adjustment vector when observed performance
    /// degraded past the threshold since the last applied adjustment.
    fn maybe_rollback(
        &self,
        observed: Option<f64>,
        _now: DateTime<Utc>,
        tracing_id: &str,
    ) -> Option<CycleOutcome> {
        let last = self.history.last()?;
        if last.status != AdjustmentStatus::Applied {
            return None;
        }
        let observed = observed?;
        let drop = last.previous_performance - observed;
        if drop <= self.cfg.degradation_threshold {
            return None;
        }

        warn!(
            target: "optimizer",
            baseline = last.previous_performance,
            observed,
            drop,
            "performance degraded; rolling back"
        );

        let current_cfg = self.resolver.config(self.cfg.niche);
        match current_cfg.with_vector(&last.previous_params) {
            Ok(restored) => {
                if let Err(e) = self.resolver.swap(restored) {
                    error!(target: "optimizer", error = %e, "rollback swap failed");
                    return Some(self.outcome(CycleStatus::Failed, 0.0, 0.0, tracing_id.to_string()));
                }
            }
            Err(e) => {
                error!(target: "optimizer", error = %e, "rollback vector invalid");
                return Some(self.outcome(CycleStatus::Failed, 0.0, 0.0, tracing_id.to_string()));
            }
        }

        self.push_record(
            last.new_params.clone(),
            last.previous_params.clone(),
            last.previous_performance,
            observed,
            last.confidence,
            AdjustmentStatus::RolledBack,
            tracing_id,
        );
        metrics::counter!("optimizer_rollbacks_total").increment(1);

        if self.history.consecutive_rollbacks() >= self.cfg.max_rollbacks {
            self.frozen.store(true, Ordering::SeqCst);
            error!(target: "optimizer", max = self.cfg.max_rollbacks, "rollback limit reached; parameters frozen");
            let _ = self.eventlog.record(
                LogKind::Error,
                LogLevel::Critical,
                "optimizer_cycle",
                serde_json::Map::new(),
                Some("frozen".to_string()),
                None,
                Some("consecutive rollback limit reached".to_string()),
                Some(tracing_id),
            );
        }

        Some(self.outcome(
            CycleStatus::RolledBack,
            observed - last.previous_performance,
            last.confidence,
            tracing_id.to_string(),
        ))
    }

    fn persist_model(&self, model: &PerformanceModel) {
        // Exponential backoff, three attempts; a final failure is logged and
        // does not fail the cycle.
        for attempt in 0..3u32 {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(100 << (attempt - 1)));
            }
            match model.save(&self.cfg.model_dir) {
                Ok(()) => return,
                Err(e) if attempt == 2 => {
                    error!(target: "optimizer", error = %e, "model persistence failed after retries");
                }
                Err(_) => {}
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_record(
        &self,
        previous_params: BTreeMap<String, f64>,
        new_params: BTreeMap<String, f64>,
        previous_performance: f64,
        new_performance: f64,
        confidence: f64,
        status: AdjustmentStatus,
        tracing_id: &str,
    ) {
        let record = AdjustmentRecord {
            at: Utc::now(),
            previous_params,
            new_params,
            previous_performance,
            new_performance,
            delta: new_performance - previous_performance,
            confidence,
            status,
            tracing_id: tracing_id.to_string(),
        };
        if let Err(e) = self.history.push(record) {
            warn!(target: "optimizer", error = %e, "adjustment history persistence failed");
        }
    }

    fn outcome(&self, status: CycleStatus, delta: f64, confidence: f64, tracing_id: String) -> CycleOutcome {
        let mut payload = serde_json::Map::new();
        payload.insert("status".into(), serde_json::json!(status));
        payload.insert("delta".into(), serde_json::json!(delta));
        payload.insert("confidence".into(), serde_json::json!(confidence));
        let _ = self.eventlog.record(
            LogKind::Processing,
            LogLevel::Info,
            "optimizer_cycle",
            payload,
            Some(serde_json::to_value(status).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()),
            None,
            None,
            Some(&tracing_id),
        );
        CycleOutcome {
            status,
            delta,
            confidence,
            tracing_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLogConfig;

    fn setup(dir: &std::path::Path) -> (ParameterOptimizer, Arc<EventLog>, NicheResolver) {
        let eventlog = Arc::new(
            EventLog::new(EventLogConfig {
                dir: dir.join("logs"),
                ..Default::default()
            })
            .unwrap(),
        );
        let resolver = NicheResolver::new();
        let optimizer = ParameterOptimizer::new(
            OptimizerConfig {
                model_dir: dir.join("models"),
                snapshot_dir: dir.join("config/niches"),
                ..Default::default()
            },
            resolver.clone(),
            eventlog.clone(),
        );
        (optimizer, eventlog, resolver)
    }

    #[test]
    fn empty_log_is_insufficient_data() {
        let tmp = tempfile::tempdir().unwrap();
        let (optimizer, _, _) = setup(tmp.path());
        let out = optimizer.run_cycle();
        assert_eq!(out.status, CycleStatus::InsufficientData);
        assert!(optimizer.history().is_empty());
    }

    #[test]
    fn good_enough_performance_skips_without_training() {
        let tmp = tempfile::tempdir().unwrap();
        let (optimizer, _, _) = setup(tmp.path());
        optimizer.record_observation(0.9).unwrap();
        let out = optimizer.run_cycle();
        assert_eq!(out.status, CycleStatus::SkippedNotNeeded);
        assert_eq!(
            optimizer.history().last().unwrap().status,
            AdjustmentStatus::SkippedNotNeeded
        );
    }
}
