//! # Composite Scorer
//! Blends the per-dimension signals into one quality score per candidate.
//!
//! Weights come from the active niche snapshot and are renormalized to sum
//! to 1 before blending, never after. Confidence reflects how much the
//! component scores agree with each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::AnalyzerError;
use crate::keyword::{clamp01, QualityBand};
use crate::niche::NicheConfig;
use crate::normalize;

/// Words that make a keyword less specific regardless of niche.
const GENERIC_WORDS: &[&str] = &[
    "coisa", "item", "produto", "servico", "informacao", "dados",
    "thing", "stuff", "product", "service", "information", "data",
];

/// Component scores feeding the blend, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeInputs {
    pub complexity: f64,
    pub specificity: f64,
    pub competitive: f64,
    pub trend: f64,
}

impl CompositeInputs {
    fn components(&self) -> [f64; 4] {
        [self.complexity, self.specificity, self.competitive, self.trend]
    }
}

/// Quality band cut-offs, highest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub excellent: f64,
    pub very_good: f64,
    pub good: f64,
    pub regular: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.85,
            very_good: 0.75,
            good: 0.65,
            regular: 0.50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub band: QualityBand,
    /// Agreement of the components: `1 − stdev/mean`, clamped to `[0.1, 1]`;
    /// `0.5` when the mean is zero.
    pub confidence: f64,
    /// The normalized weights actually used, keyed by component name.
    pub weights_applied: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    thresholds: QualityThresholds,
}

impl CompositeScorer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn score(&self, inputs: &CompositeInputs, cfg: &NicheConfig) -> Result<CompositeScore, AnalyzerError> {
        let w = cfg.weights.normalized()?;

        let score = clamp01(
            w.complexity * inputs.complexity
                + w.specificity * inputs.specificity
                + w.competitive * inputs.competitive
                + w.trend * inputs.trend,
        );

        let mut weights_applied = BTreeMap::new();
        weights_applied.insert("complexity".to_string(), w.complexity);
        weights_applied.insert("specificity".to_string(), w.specificity);
        weights_applied.insert("competitive".to_string(), w.competitive);
        weights_applied.insert("trend".to_string(), w.trend);

        Ok(CompositeScore {
            score,
            band: self.band(score),
            confidence: confidence(&inputs.components()),
            weights_applied,
        })
    }

    fn band(&self, score: f64) -> QualityBand {
        let t = self.thresholds;
        if score >= t.excellent {
            QualityBand::Excellent
        } else if score >= t.very_good {
            QualityBand::VeryGood
        } else if score >= t.good {
            QualityBand::Good
        } else if score >= t.regular {
            QualityBand::Regular
        } else {
            QualityBand::Poor
        }
    }
}

fn confidence(components: &[f64]) -> f64 {
    let n = components.len() as f64;
    let mean = components.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.5;
    }
    let var = components.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (1.0 - var.sqrt() / mean).clamp(0.1, 1.0)
}

/// Specificity of a keyword for a niche.
///
/// With a positive vocabulary: hits among the keyword's words, saturating at
/// three. Without one (generic niche): count of long words instead. Generic
/// filler words subtract 0.2 each.
pub fn specificity(term: &str, cfg: &NicheConfig) -> f64 {
    let folded = normalize::fold_word(term);
    let words: Vec<&str> = folded.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let base = if cfg.positive_terms.is_empty() {
        let long = words.iter().filter(|w| w.chars().count() > 6).count() as f64;
        (long / 3.0).min(1.0)
    } else {
        let hits = words
            .iter()
            .filter(|w| cfg.positive_terms.iter().any(|t| t == *w))
            .count() as f64;
        (hits / 3.0).min(1.0)
    };

    let generic_hits = words.iter().filter(|w| GENERIC_WORDS.contains(w)).count() as f64;
    (base - 0.2 * generic_hits).max(0.0)
}
