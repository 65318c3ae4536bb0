//! # Keyword Data Model
//! Input candidates and the enriched wrapper the pipeline builds around them.
//!
//! A [`Keyword`] is immutable once constructed; every stage writes its derived
//! signals into the surrounding [`EnrichedKeyword`], never back into the input
//! record. All scalar scores live in `[0.0, 1.0]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search intent attached to a candidate by the upstream collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Informational,
    Transactional,
    Navigational,
    Investigative,
}

/// Candidate search term with its market signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    /// Monthly search volume (non-negative).
    pub volume: u64,
    /// Cost-per-click in account currency (non-negative).
    pub cpc: f64,
    /// Competition index in `[0, 1]`.
    pub competition: f64,
    pub intent: Intent,
}

impl Keyword {
    pub fn new(term: impl Into<String>, volume: u64, cpc: f64, competition: f64, intent: Intent) -> Self {
        Self {
            term: term.into(),
            volume,
            cpc,
            competition,
            intent,
        }
    }

    /// Validate the raw input record.
    ///
    /// Returns the human-readable problem so the caller can log a precise
    /// rejection; the candidate is skipped, the batch continues.
    pub fn validate(&self) -> Result<(), String> {
        if self.term.trim().is_empty() {
            return Err("empty term".to_string());
        }
        if !self.cpc.is_finite() || self.cpc < 0.0 {
            return Err(format!("cpc out of range: {}", self.cpc));
        }
        if !self.competition.is_finite() || !(0.0..=1.0).contains(&self.competition) {
            return Err(format!("competition out of range: {}", self.competition));
        }
        Ok(())
    }
}

/// Band classification shared by the complexity and competitiveness signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalBand {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Direction of the fitted trend over a candidate's time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    #[default]
    Stable,
    Seasonal,
    Emerging,
    Declining,
}

/// Overall quality classification of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    #[default]
    Poor,
    Regular,
    Good,
    VeryGood,
    Excellent,
}

/// Keyword plus everything the pipeline derived for it.
///
/// `weights_applied` uses a `BTreeMap` so serialized reports are byte-stable
/// across runs with identical input and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedKeyword {
    pub keyword: Keyword,
    pub significance: f64,
    pub complexity: f64,
    pub complexity_band: SignalBand,
    pub competitive: f64,
    pub competitiveness_band: SignalBand,
    pub trend: f64,
    pub trend_direction: TrendDirection,
    pub composite: f64,
    pub composite_band: QualityBand,
    pub weights_applied: BTreeMap<String, f64>,
    pub confidence: f64,
}

impl EnrichedKeyword {
    /// Wrap an input candidate with neutral (zeroed) derived signals.
    pub fn new(keyword: Keyword) -> Self {
        Self {
            keyword,
            significance: 0.0,
            complexity: 0.0,
            complexity_band: SignalBand::default(),
            competitive: 0.0,
            competitiveness_band: SignalBand::default(),
            trend: 0.0,
            trend_direction: TrendDirection::default(),
            composite: 0.0,
            composite_band: QualityBand::default(),
            weights_applied: BTreeMap::new(),
            confidence: 0.0,
        }
    }

    pub fn term(&self) -> &str {
        &self.keyword.term
    }
}

/// Clamp to [0.0, 1.0].
pub fn clamp01(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_validation_catches_bad_market_signals() {
        let ok = Keyword::new("best gaming laptop", 100, 1.2, 0.4, Intent::Transactional);
        assert!(ok.validate().is_ok());

        let empty = Keyword::new("   ", 100, 1.2, 0.4, Intent::Informational);
        assert!(empty.validate().is_err());

        let bad_comp = Keyword::new("x", 100, 1.2, 1.4, Intent::Informational);
        assert!(bad_comp.validate().unwrap_err().contains("competition"));

        let bad_cpc = Keyword::new("x", 100, -0.5, 0.4, Intent::Informational);
        assert!(bad_cpc.validate().unwrap_err().contains("cpc"));
    }

    #[test]
    fn serialized_enums_use_snake_case() {
        let v = serde_json::to_value(TrendDirection::Emerging).unwrap();
        assert_eq!(v, serde_json::json!("emerging"));
        let v = serde_json::to_value(QualityBand::VeryGood).unwrap();
        assert_eq!(v, serde_json::json!("very_good"));
        let v = serde_json::to_value(SignalBand::VeryHigh).unwrap();
        assert_eq!(v, serde_json::json!("very_high"));
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp01(-0.3), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(0.42), 0.42);
    }
}
