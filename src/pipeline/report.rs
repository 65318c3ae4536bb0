//! # Pipeline Report
//! Aggregate view of one batch run: band distributions, trend counts,
//! per-stage timing, and the outcome split. Everything except the elapsed
//! fields is deterministic for identical input and configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keyword::{EnrichedKeyword, TrendDirection};
use crate::niche::Niche;
use crate::validate::{ValidationResult, ValidationStatus};

use super::Strategy;

/// Instrumentation captured for one stage of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub stage: String,
    pub elapsed_ms: f64,
    pub input_size: usize,
    pub output_size: usize,
    pub error_count: usize,
}

/// Terminal state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub tracing_id: String,
    pub pipeline_version: String,
    pub strategy: Strategy,
    pub niche: Niche,
    pub status: BatchStatus,
    pub total_candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub pending: usize,
    pub composite_bands: BTreeMap<String, usize>,
    pub complexity_bands: BTreeMap<String, usize>,
    pub competitiveness_bands: BTreeMap<String, usize>,
    pub trending: usize,
    pub emerging: usize,
    pub stages: Vec<StageMetrics>,
    pub active_modules: Vec<String>,
}

impl PipelineReport {
    /// Build the aggregate view from the enriched batch and its validation
    /// results.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        tracing_id: String,
        strategy: Strategy,
        niche: Niche,
        status: BatchStatus,
        total_candidates: usize,
        enriched: &[EnrichedKeyword],
        results: &[ValidationResult],
        stages: Vec<StageMetrics>,
    ) -> Self {
        let mut composite_bands = BTreeMap::new();
        let mut complexity_bands = BTreeMap::new();
        let mut competitiveness_bands = BTreeMap::new();
        let mut trending = 0usize;
        let mut emerging = 0usize;

        for e in enriched {
            *composite_bands.entry(band_key(&e.composite_band)).or_default() += 1;
            *complexity_bands.entry(band_key(&e.complexity_band)).or_default() += 1;
            *competitiveness_bands.entry(band_key(&e.competitiveness_band)).or_default() += 1;
            match e.trend_direction {
                TrendDirection::Rising => trending += 1,
                TrendDirection::Emerging => emerging += 1,
                _ => {}
            }
        }

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        let mut pending = 0usize;
        for r in results {
            match r.status {
                ValidationStatus::Approved => accepted += 1,
                ValidationStatus::Pending => pending += 1,
                _ => rejected += 1,
            }
        }

        Self {
            tracing_id,
            pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
            strategy,
            niche,
            status,
            total_candidates,
            accepted,
            rejected,
            pending,
            composite_bands,
            complexity_bands,
            competitiveness_bands,
            trending,
            emerging,
            stages,
            active_modules: vec![
                "significance".to_string(),
                "complexity".to_string(),
                "competitive".to_string(),
                "trend".to_string(),
                "composite".to_string(),
                "validation".to_string(),
            ],
        }
    }
}

fn band_key<T: Serialize>(band: &T) -> String {
    serde_json::to_value(band)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
