//! # Complexity Analyzer
//! Semantic-complexity estimate built from four sub-signals: semantic
//! density, technical-term ratio, normalized mean token length, and
//! vocabulary variety. The composite is a weighted sum classified into a
//! band. Pure, no I/O; metadata captures the normalized text and the
//! configuration snapshot so an analysis can be reproduced exactly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::keyword::{clamp01, SignalBand};
use crate::normalize::{self, NormalizerOptions};
use crate::significance::Locale;

/// Punctuation stripped before counting significant characters.
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Mean-token-length saturation point.
const MEAN_LENGTH_CAP: f64 = 15.0;

/// Band thresholds; score `< low` is Low, `< medium` Medium, `< high` High,
/// else VeryHigh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplexityThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.6,
            high: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplexityConfig {
    #[serde(default)]
    pub thresholds: ComplexityThresholds,
    #[serde(default)]
    pub locale: Locale,
}

/// The four sub-signals, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub semantic_density: f64,
    pub technical_ratio: f64,
    pub mean_length: f64,
    /// Same value as `semantic_density` today; kept separate so the two can
    /// diverge without changing the output shape.
    pub vocabulary_variety: f64,
}

/// Reproducibility metadata attached to every analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityMetadata {
    pub normalized_text: String,
    pub thresholds: ComplexityThresholds,
    pub locale: Locale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub factors: ComplexityFactors,
    pub score: f64,
    pub band: SignalBand,
    pub significant_chars: usize,
    pub metadata: ComplexityMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    cfg: ComplexityConfig,
}

impl ComplexityAnalyzer {
    pub fn new(cfg: ComplexityConfig) -> Self {
        Self { cfg }
    }

    pub fn analyze(&self, text: &str) -> ComplexityAnalysis {
        let opts = NormalizerOptions {
            strip_punctuation: Some(PUNCTUATION.to_string()),
            ..Default::default()
        };
        let normalized = normalize::normalize(text, &opts);
        let tokens = normalize::tokenize(&normalized);

        let factors = self.factors(&tokens);
        let score = self.score(&factors);
        let band = self.band(score);
        let significant_chars = normalized.chars().filter(|c| !c.is_whitespace()).count();

        ComplexityAnalysis {
            factors,
            score,
            band,
            significant_chars,
            metadata: ComplexityMetadata {
                normalized_text: normalized,
                thresholds: self.cfg.thresholds,
                locale: self.cfg.locale,
            },
        }
    }

    fn factors(&self, tokens: &[String]) -> ComplexityFactors {
        if tokens.is_empty() {
            return ComplexityFactors {
                semantic_density: 0.0,
                technical_ratio: 0.0,
                mean_length: 0.0,
                vocabulary_variety: 0.0,
            };
        }

        let total = tokens.len() as f64;
        let unique = tokens.iter().collect::<HashSet<_>>().len() as f64;
        let density = clamp01(unique / total);

        let vocab = self.cfg.locale.vocabulary();
        let technical = tokens.iter().filter(|t| vocab.complex.contains(t.as_str())).count() as f64;

        let mean_len: f64 = tokens.iter().map(|t| t.chars().count() as f64).sum::<f64>() / total;

        ComplexityFactors {
            semantic_density: density,
            technical_ratio: clamp01(technical / total),
            mean_length: clamp01(mean_len / MEAN_LENGTH_CAP),
            vocabulary_variety: density,
        }
    }

    /// Weighted sum: density 0.3, technical 0.3, length 0.2, variety 0.2.
    fn score(&self, f: &ComplexityFactors) -> f64 {
        clamp01(
            f.semantic_density * 0.3
                + f.technical_ratio * 0.3
                + f.mean_length * 0.2
                + f.vocabulary_variety * 0.2,
        )
    }

    fn band(&self, score: f64) -> SignalBand {
        let t = self.cfg.thresholds;
        if score < t.low {
            SignalBand::Low
        } else if score < t.medium {
            SignalBand::Medium
        } else if score < t.high {
            SignalBand::High
        } else {
            SignalBand::VeryHigh
        }
    }
}
