//! # Trend Analyzer
//! Fits a direction, pattern, and one-period forecast over a keyword's
//! time series of market samples.
//!
//! The analyzer itself is pure over an ordered snapshot; series storage is
//! keyed per keyword and guarded by a per-series lock so concurrent writers
//! never block readers of other keywords. Seasonality uses a split-half
//! Pearson correlation, a deliberately simple heuristic rather than a
//! spectral decomposition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::errors::AnalyzerError;
use crate::keyword::{clamp01, TrendDirection};

/// One market observation for one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSample {
    pub at: DateTime<Utc>,
    pub volume: u64,
    pub cpc: f64,
    pub competition: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serp_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impressions: Option<u64>,
}

impl TrendSample {
    pub fn new(at: DateTime<Utc>, volume: u64, cpc: f64, competition: f64) -> Self {
        Self {
            at,
            volume,
            cpc,
            competition,
            serp_rank: None,
            clicks: None,
            impressions: None,
        }
    }
}

/// Next-period forecast; absent for short series, which is an expected
/// outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub volume: f64,
    pub cpc: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub confidence: f64,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub score: f64,
    pub pattern: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<TrendForecast>,
}

impl TrendAnalysis {
    /// Neutral analysis for series too short to fit anything.
    fn insufficient() -> Self {
        Self {
            direction: TrendDirection::Stable,
            score: 0.5,
            pattern: "insufficient_data".to_string(),
            confidence: 0.0,
            forecast: None,
        }
    }
}

/// Classification thresholds on the first-to-last volume growth rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendThresholds {
    pub emerging: f64,
    pub significant_growth: f64,
    pub significant_decline: f64,
    pub stability_band: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            emerging: 0.5,
            significant_growth: 0.2,
            significant_decline: -0.15,
            stability_band: 0.05,
        }
    }
}

/// Blend weights for the trend score components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendWeights {
    pub volume: f64,
    pub cpc: f64,
    pub competition: f64,
    pub seasonality: f64,
}

impl Default for TrendWeights {
    fn default() -> Self {
        Self {
            volume: 0.4,
            cpc: 0.2,
            competition: 0.2,
            seasonality: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default)]
    pub thresholds: TrendThresholds,
    #[serde(default)]
    pub weights: TrendWeights,
}

/// Minimum samples before the seasonality test applies.
const SEASONALITY_MIN_SAMPLES: usize = 12;
/// Split-half correlation above this is declared seasonal.
const SEASONALITY_CORRELATION: f64 = 0.7;
/// Samples needed for a forecast.
const FORECAST_MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    cfg: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(cfg: TrendConfig) -> Self {
        Self { cfg }
    }

    /// Analyze an ordered snapshot using the current wall clock for the
    /// recency factor.
    pub fn analyze(&self, samples: &[TrendSample]) -> TrendAnalysis {
        self.analyze_at(samples, Utc::now())
    }

    /// Deterministic variant: `now` anchors the recency factor.
    pub fn analyze_at(&self, samples: &[TrendSample], now: DateTime<Utc>) -> TrendAnalysis {
        if samples.len() < 2 {
            return TrendAnalysis::insufficient();
        }

        let seasonal = self.is_seasonal(samples);
        let direction = self.direction(samples, seasonal);
        let score = self.score(samples, seasonal);
        let confidence = self.confidence(samples, now);
        let forecast = self.forecast(samples);
        let pattern = self.pattern(samples, seasonal);

        TrendAnalysis {
            direction,
            score,
            pattern,
            confidence,
            forecast,
        }
    }

    /// Growth of `v` from first to last sample; zero-volume starts divide by
    /// one so the factor stays finite.
    fn volume_growth(samples: &[TrendSample]) -> f64 {
        let first = samples.first().map(|s| s.volume).unwrap_or(0) as f64;
        let last = samples.last().map(|s| s.volume).unwrap_or(0) as f64;
        (last - first) / first.max(1.0)
    }

    fn cpc_growth(samples: &[TrendSample]) -> f64 {
        let first = samples.first().map(|s| s.cpc).unwrap_or(0.0);
        let last = samples.last().map(|s| s.cpc).unwrap_or(0.0);
        if first <= 0.0 {
            return 0.0;
        }
        (last - first) / first
    }

    fn competition_change(samples: &[TrendSample]) -> f64 {
        let first = samples.first().map(|s| s.competition).unwrap_or(0.0);
        let last = samples.last().map(|s| s.competition).unwrap_or(0.0);
        last - first
    }

    /// Priority ladder: seasonal → emerging → rising → declining → stable →
    /// falling.
    fn direction(&self, samples: &[TrendSample], seasonal: bool) -> TrendDirection {
        if seasonal {
            return TrendDirection::Seasonal;
        }
        let t = self.cfg.thresholds;
        let growth = Self::volume_growth(samples);
        if growth >= t.emerging {
            TrendDirection::Emerging
        } else if growth >= t.significant_growth {
            TrendDirection::Rising
        } else if growth <= t.significant_decline {
            TrendDirection::Declining
        } else if growth.abs() <= t.stability_band {
            TrendDirection::Stable
        } else {
            TrendDirection::Falling
        }
    }

    /// Split the ordered series into two contiguous halves and correlate
    /// their volumes. Requires at least 12 samples.
    fn is_seasonal(&self, samples: &[TrendSample]) -> bool {
        if samples.len() < SEASONALITY_MIN_SAMPLES {
            return false;
        }
        let half = samples.len() / 2;
        let a: Vec<f64> = samples[..half].iter().map(|s| s.volume as f64).collect();
        let b: Vec<f64> = samples[half..half * 2].iter().map(|s| s.volume as f64).collect();
        pearson(&a, &b).map(|c| c > SEASONALITY_CORRELATION).unwrap_or(false)
    }

    fn score(&self, samples: &[TrendSample], seasonal: bool) -> f64 {
        let w = self.cfg.weights;
        let volume_component = clamp01(0.5 + Self::volume_growth(samples));
        let cpc_component = clamp01(0.5 + Self::cpc_growth(samples) * 0.3);
        let competition_component = clamp01(0.5 - Self::competition_change(samples) * 0.5);
        let seasonality_component = if seasonal { 0.7 } else { 0.5 };

        let sum = w.volume + w.cpc + w.competition + w.seasonality;
        if sum <= 0.0 {
            return 0.5;
        }
        clamp01(
            (w.volume * volume_component
                + w.cpc * cpc_component
                + w.competition * competition_component
                + w.seasonality * seasonality_component)
                / sum,
        )
    }

    /// `0.4·min(1, n/30) + 0.4·consistency + 0.2·recency`.
    fn confidence(&self, samples: &[TrendSample], now: DateTime<Utc>) -> f64 {
        let quantity = (samples.len() as f64 / 30.0).min(1.0);

        let volumes: Vec<f64> = samples.iter().map(|s| s.volume as f64).collect();
        let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let consistency = if mean > 0.0 {
            clamp01(1.0 - std_dev(&volumes) / mean)
        } else {
            0.0
        };

        let days_since_last = samples
            .last()
            .map(|s| (now - s.at).num_seconds() as f64 / 86_400.0)
            .unwrap_or(f64::MAX);
        let recency = (1.0 - days_since_last / 30.0).max(0.0);

        clamp01(0.4 * quantity + 0.4 * consistency + 0.2 * recency)
    }

    /// Moving average over the last three samples; the confidence interval
    /// half-width is their standard deviation.
    fn forecast(&self, samples: &[TrendSample]) -> Option<TrendForecast> {
        if samples.len() < FORECAST_MIN_SAMPLES {
            return None;
        }
        let tail = &samples[samples.len() - FORECAST_MIN_SAMPLES..];
        let volumes: Vec<f64> = tail.iter().map(|s| s.volume as f64).collect();
        let cpcs: Vec<f64> = tail.iter().map(|s| s.cpc).collect();

        let volume = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let cpc = cpcs.iter().sum::<f64>() / cpcs.len() as f64;
        let half_width = std_dev(&volumes);

        Some(TrendForecast {
            volume,
            cpc,
            ci_low: (volume - half_width).max(0.0),
            ci_high: volume + half_width,
            confidence: 0.7,
            method: "moving_average_3".to_string(),
        })
    }

    fn pattern(&self, samples: &[TrendSample], seasonal: bool) -> String {
        if seasonal {
            return "seasonal".to_string();
        }
        let volumes: Vec<f64> = samples.iter().map(|s| s.volume as f64).collect();
        let deltas: Vec<f64> = volumes.windows(2).map(|w| w[1] - w[0]).collect();
        let max_volume = volumes.iter().cloned().fold(0.0f64, f64::max);

        if deltas.iter().all(|d| *d > 0.0) {
            "consistent_growth".to_string()
        } else if deltas.iter().all(|d| *d < 0.0) {
            "consistent_decline".to_string()
        } else if deltas.iter().all(|d| d.abs() < max_volume * 0.1) {
            "stable".to_string()
        } else {
            "volatile".to_string()
        }
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Pearson correlation; `None` when either side has zero variance.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Per-keyword series store. Each series has its own lock; readers snapshot
/// before analysis so writers never block an in-flight analysis.
#[derive(Clone, Default)]
pub struct SeriesStore {
    inner: Arc<RwLock<HashMap<String, Arc<Mutex<Vec<TrendSample>>>>>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, keeping the series ordered by `at`. Duplicate
    /// timestamps are rejected.
    pub fn record(&self, keyword: &str, sample: TrendSample) -> Result<(), AnalyzerError> {
        let series = self.series_handle(keyword);
        let mut guard = series.lock().expect("series lock poisoned");

        match guard.binary_search_by_key(&sample.at, |s| s.at) {
            Ok(_) => Err(AnalyzerError::Input(format!(
                "duplicate sample at {} for `{keyword}`",
                sample.at
            ))),
            Err(pos) => {
                guard.insert(pos, sample);
                Ok(())
            }
        }
    }

    /// Ordered snapshot of one series (empty if unknown).
    pub fn snapshot(&self, keyword: &str) -> Vec<TrendSample> {
        let map = self.inner.read().expect("series map lock poisoned");
        map.get(keyword)
            .map(|s| s.lock().expect("series lock poisoned").clone())
            .unwrap_or_default()
    }

    /// Keywords whose volume growth inside the trailing window clears the
    /// emerging threshold, with their growth factor.
    pub fn emerging_in_window(
        &self,
        window_days: i64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Vec<(String, f64)> {
        let cutoff = now - Duration::days(window_days);
        let keys: Vec<String> = {
            let map = self.inner.read().expect("series map lock poisoned");
            map.keys().cloned().collect()
        };

        let mut out = Vec::new();
        for key in keys {
            let recent: Vec<TrendSample> = self
                .snapshot(&key)
                .into_iter()
                .filter(|s| s.at >= cutoff)
                .collect();
            if recent.len() < 2 {
                continue;
            }
            let growth = TrendAnalyzer::volume_growth(&recent);
            if growth >= threshold {
                out.push((key, growth));
            }
        }
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    fn series_handle(&self, keyword: &str) -> Arc<Mutex<Vec<TrendSample>>> {
        {
            let map = self.inner.read().expect("series map lock poisoned");
            if let Some(s) = map.get(keyword) {
                return s.clone();
            }
        }
        let mut map = self.inner.write().expect("series map lock poisoned");
        map.entry(keyword.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}
