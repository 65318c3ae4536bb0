//! # Adjustment History
//! Every optimizer decision is recorded here: what the parameters were,
//! what they became, how performance moved, and with what confidence. The
//! list is persisted as JSON and reloaded on startup; the recent success
//! rate of applied adjustments feeds the next cycle's confidence estimate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

use crate::errors::AnalyzerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Applied,
    SkippedNotNeeded,
    SkippedLowConfidence,
    RolledBack,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub at: DateTime<Utc>,
    pub previous_params: BTreeMap<String, f64>,
    pub new_params: BTreeMap<String, f64>,
    pub previous_performance: f64,
    pub new_performance: f64,
    pub delta: f64,
    pub confidence: f64,
    pub status: AdjustmentStatus,
    pub tracing_id: String,
}

/// Confidence window: the last N applications.
const CONFIDENCE_WINDOW: usize = 10;
/// Below this many applications the estimate defaults to 0.5.
const CONFIDENCE_MIN_SAMPLES: usize = 5;

/// Persisted, append-mostly record list with derived statistics.
pub struct AdjustmentHistory {
    path: PathBuf,
    records: Mutex<Vec<AdjustmentRecord>>,
}

impl AdjustmentHistory {
    /// Load from `path` if present; a missing or unreadable file starts an
    /// empty history (unreadable is logged).
    pub fn load(path: PathBuf) -> Self {
        let records = match fs::read_to_string(&path) {
            Ok(body) => match serde_json::from_str(&body) {
                Ok(list) => list,
                Err(e) => {
                    warn!(target: "optimizer", file = %path.display(), error = %e, "history unreadable; starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Append and persist. Persistence failure keeps the in-memory record.
    pub fn push(&self, record: AdjustmentRecord) -> Result<(), AnalyzerError> {
        let snapshot = {
            let mut guard = self.records.lock().expect("history lock poisoned");
            guard.push(record);
            guard.clone()
        };
        self.persist(&snapshot)
    }

    pub fn last(&self) -> Option<AdjustmentRecord> {
        self.records.lock().expect("history lock poisoned").last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<AdjustmentRecord> {
        self.records.lock().expect("history lock poisoned").clone()
    }

    /// Consecutive rolled-back applications: each rollback reverts one
    /// application, so the count walks Applied/RolledBack pairs from the
    /// tail and stops at the first application that survived.
    pub fn consecutive_rollbacks(&self) -> usize {
        let guard = self.records.lock().expect("history lock poisoned");
        let mut applications = guard
            .iter()
            .rev()
            .filter(|r| matches!(r.status, AdjustmentStatus::Applied | AdjustmentStatus::RolledBack));

        let mut count = 0;
        while let Some(r) = applications.next() {
            if r.status == AdjustmentStatus::RolledBack {
                count += 1;
                applications.next(); // the application this rollback reverted
            } else {
                break;
            }
        }
        count
    }

    /// `0.5 + 0.5·success_rate` over the last ten applications; `0.5` with
    /// fewer than five. An application succeeded when it was applied and
    /// moved performance up.
    pub fn confidence(&self) -> f64 {
        let guard = self.records.lock().expect("history lock poisoned");
        let applications: Vec<&AdjustmentRecord> = guard
            .iter()
            .rev()
            .filter(|r| matches!(r.status, AdjustmentStatus::Applied | AdjustmentStatus::RolledBack))
            .take(CONFIDENCE_WINDOW)
            .collect();

        if applications.len() < CONFIDENCE_MIN_SAMPLES {
            return 0.5;
        }
        let successes = applications
            .iter()
            .filter(|r| r.status == AdjustmentStatus::Applied && r.delta > 0.0)
            .count() as f64;
        (0.5 + 0.5 * successes / applications.len() as f64).min(1.0)
    }

    fn persist(&self, records: &[AdjustmentRecord]) -> Result<(), AnalyzerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AnalyzerError::Persistence(format!("create {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_vec_pretty(records)
            .map_err(|e| AnalyzerError::Persistence(format!("serialize history: {e}")))?;
        fs::write(&self.path, body)
            .map_err(|e| AnalyzerError::Persistence(format!("write {}: {e}", self.path.display())))
    }
}
