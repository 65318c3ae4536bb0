//! # Validator
//! Multi-criterion gate deciding whether an enriched candidate is accepted.
//!
//! Five weighted criteria are evaluated; failed critical criteria subtract
//! half their weight, failed high-severity ones 0.3 of it. The normalized
//! result maps to approved (≥ 0.7), pending (≥ 0.5), or rejected. Every
//! criterion keeps its actual/expected values and a human-readable message
//! for audit.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::composite;
use crate::keyword::{clamp01, EnrichedKeyword};
use crate::niche::{Niche, NicheConfig};
use crate::normalize;
use crate::significance::SignificanceAnalyzer;

/// Outcome of one criterion or of the whole validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Approved,
    Rejected,
    Pending,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCriterion {
    pub name: String,
    pub status: ValidationStatus,
    pub actual: serde_json::Value,
    pub expected: serde_json::Value,
    pub severity: Severity,
    pub weight: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub keyword: String,
    pub status: ValidationStatus,
    pub score: f64,
    pub criteria: Vec<ValidationCriterion>,
    pub niche_applied: Niche,
    /// Wall-clock seconds spent validating this candidate.
    pub elapsed: f64,
    pub tracing_id: String,
}

/// Penalties applied to failed criteria by severity.
const CRITICAL_PENALTY: f64 = 0.5;
const HIGH_PENALTY: f64 = 0.3;

/// Aggregation cut-offs and basic-format limits, all configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_approve_cutoff")]
    pub approve_cutoff: f64,
    #[serde(default = "default_pending_cutoff")]
    pub pending_cutoff: f64,
    /// Confidence floor for the lowest-weight criterion.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_special_chars")]
    pub max_special_chars: usize,
    #[serde(default = "default_min_unique_ratio")]
    pub min_unique_ratio: f64,
}

fn default_approve_cutoff() -> f64 {
    0.7
}
fn default_pending_cutoff() -> f64 {
    0.5
}
fn default_min_confidence() -> f64 {
    0.5
}
fn default_max_special_chars() -> usize {
    5
}
fn default_min_unique_ratio() -> f64 {
    0.8
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            approve_cutoff: default_approve_cutoff(),
            pending_cutoff: default_pending_cutoff(),
            min_confidence: default_min_confidence(),
            max_special_chars: default_max_special_chars(),
            min_unique_ratio: default_min_unique_ratio(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    analyzer: SignificanceAnalyzer,
    cfg: ValidatorConfig,
}

impl Validator {
    pub fn new(analyzer: SignificanceAnalyzer) -> Self {
        Self {
            analyzer,
            cfg: ValidatorConfig::default(),
        }
    }

    pub fn with_config(analyzer: SignificanceAnalyzer, cfg: ValidatorConfig) -> Self {
        Self { analyzer, cfg }
    }

    pub fn validate(
        &self,
        enriched: &EnrichedKeyword,
        cfg: &NicheConfig,
        tracing_id: &str,
    ) -> ValidationResult {
        let started = Instant::now();
        let term = enriched.term();

        let specificity = composite::specificity(term, cfg);
        let similarity = self.similarity(term, cfg);

        let criteria = vec![
            criterion(
                "composite_score",
                enriched.composite,
                cfg.acceptance_threshold,
                Severity::Critical,
                0.30,
            ),
            criterion(
                "specificity",
                specificity,
                cfg.specificity_threshold,
                Severity::High,
                0.25,
            ),
            criterion(
                "semantic_similarity",
                similarity,
                cfg.similarity_threshold,
                Severity::High,
                0.20,
            ),
            self.basic_format(term, cfg),
            criterion(
                "score_confidence",
                enriched.confidence,
                self.cfg.min_confidence,
                Severity::Low,
                0.10,
            ),
        ];

        let (status, score) = aggregate(&criteria, self.cfg.approve_cutoff, self.cfg.pending_cutoff);

        ValidationResult {
            keyword: term.to_string(),
            status,
            score,
            criteria,
            niche_applied: cfg.niche,
            elapsed: started.elapsed().as_secs_f64(),
            tracing_id: tracing_id.to_string(),
        }
    }

    /// Heuristic token-overlap similarity against the niche vocabulary
    /// (or the locale intent vocabulary for the generic niche), blended with
    /// the best fuzzy token affinity. Always in `[0, 1]`.
    pub fn similarity(&self, term: &str, cfg: &NicheConfig) -> f64 {
        let analysis = self.analyzer.analyze(term);
        if analysis.significant_tokens.is_empty() {
            return 0.0;
        }

        let intent_fallback: Vec<String>;
        let vocab: &[String] = if cfg.positive_terms.is_empty() {
            intent_fallback = self
                .analyzer
                .locale()
                .vocabulary()
                .intent
                .iter()
                .cloned()
                .collect();
            &intent_fallback
        } else {
            &cfg.positive_terms
        };

        let tokens = &analysis.significant_tokens;
        let hits = tokens.iter().filter(|t| vocab.iter().any(|v| v == *t)).count() as f64;
        let overlap = hits / tokens.len() as f64;

        let best_affinity = tokens
            .iter()
            .flat_map(|t| vocab.iter().map(move |v| strsim::jaro_winkler(t, v)))
            .fold(0.0f64, f64::max);

        clamp01(0.7 * overlap + 0.3 * best_affinity)
    }

    /// Word count within the niche bounds, few special characters, mostly
    /// unique tokens, and none of the niche's disallowed phrases.
    fn basic_format(&self, term: &str, cfg: &NicheConfig) -> ValidationCriterion {
        let folded = normalize::fold_word(term);
        let tokens = normalize::tokenize(&folded);
        let word_count = tokens.len();

        let special_chars = term
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();

        let unique_ratio = if tokens.is_empty() {
            0.0
        } else {
            let unique = tokens.iter().collect::<std::collections::HashSet<_>>().len();
            unique as f64 / tokens.len() as f64
        };

        let negative_hit = cfg.negative_terms.iter().find(|t| folded.contains(t.as_str()));

        let max_special = self.cfg.max_special_chars;
        let min_unique = self.cfg.min_unique_ratio;
        let word_count_ok = (cfg.min_words..=cfg.max_words).contains(&word_count);
        let ok = word_count_ok
            && special_chars <= max_special
            && unique_ratio >= min_unique
            && negative_hit.is_none();

        let message = if ok {
            format!("format ok: {word_count} words, {special_chars} special chars")
        } else if let Some(neg) = negative_hit {
            format!("disallowed phrase `{neg}` present")
        } else if !word_count_ok {
            format!(
                "word count {word_count} outside [{}, {}]",
                cfg.min_words, cfg.max_words
            )
        } else if special_chars > max_special {
            format!("{special_chars} special characters exceed the limit of {max_special}")
        } else {
            format!("unique-token ratio {unique_ratio:.2} below {min_unique:.2}")
        };

        ValidationCriterion {
            name: "basic_format".to_string(),
            status: if ok { ValidationStatus::Approved } else { ValidationStatus::Rejected },
            actual: serde_json::json!({
                "word_count": word_count,
                "special_chars": special_chars,
                "unique_ratio": unique_ratio,
            }),
            expected: serde_json::json!({
                "word_count": [cfg.min_words, cfg.max_words],
                "max_special_chars": max_special,
                "min_unique_ratio": min_unique,
            }),
            severity: Severity::Medium,
            weight: 0.15,
            message,
        }
    }
}

/// Threshold criterion: approved when `actual >= expected`.
fn criterion(name: &str, actual: f64, expected: f64, severity: Severity, weight: f64) -> ValidationCriterion {
    let passed = actual >= expected;
    let message = if passed {
        format!("{name} {actual:.3} meets the {expected:.2} threshold")
    } else {
        format!(
            "{name} {actual:.3} below the {expected:.2} threshold (gap {:.3})",
            expected - actual
        )
    };
    ValidationCriterion {
        name: name.to_string(),
        status: if passed { ValidationStatus::Approved } else { ValidationStatus::Rejected },
        actual: serde_json::json!(actual),
        expected: serde_json::json!(expected),
        severity,
        weight,
        message,
    }
}

/// Weighted pass ratio with penalties for failed critical/high criteria.
fn aggregate(
    criteria: &[ValidationCriterion],
    approve_cutoff: f64,
    pending_cutoff: f64,
) -> (ValidationStatus, f64) {
    let mut total_weight = 0.0;
    let mut weighted = 0.0;

    for c in criteria {
        total_weight += c.weight;
        match c.status {
            ValidationStatus::Approved => weighted += c.weight,
            ValidationStatus::Rejected => match c.severity {
                Severity::Critical => weighted -= c.weight * CRITICAL_PENALTY,
                Severity::High => weighted -= c.weight * HIGH_PENALTY,
                _ => {}
            },
            ValidationStatus::Pending | ValidationStatus::Error => {}
        }
    }

    if total_weight <= 0.0 {
        return (ValidationStatus::Error, 0.0);
    }

    let score = clamp01(weighted / total_weight);
    let status = if score >= approve_cutoff {
        ValidationStatus::Approved
    } else if score >= pending_cutoff {
        ValidationStatus::Pending
    } else {
        ValidationStatus::Rejected
    };
    (status, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::{EnrichedKeyword, Intent, Keyword};
    use crate::niche::Niche;
    use crate::significance::{Locale, SignificanceConfig};

    fn enriched(term: &str, composite: f64, confidence: f64) -> EnrichedKeyword {
        let mut e = EnrichedKeyword::new(Keyword::new(term, 500, 1.0, 0.4, Intent::Informational));
        e.composite = composite;
        e.confidence = confidence;
        e
    }

    fn validator_en() -> Validator {
        Validator::new(SignificanceAnalyzer::new(SignificanceConfig {
            locale: Locale::En,
            ..Default::default()
        }))
    }

    #[test]
    fn strong_candidate_is_approved() {
        let cfg = NicheConfig::defaults(Niche::Technology);
        let e = enriched("how to configure automatic backup on windows 11", 0.72, 0.73);
        let r = validator_en().validate(&e, &cfg, "trace-1");
        assert_eq!(r.status, ValidationStatus::Approved);
        assert!(r.score >= 0.7);
        assert_eq!(r.criteria.len(), 5);
        assert_eq!(r.niche_applied, Niche::Technology);
    }

    #[test]
    fn weak_candidate_is_rejected_on_composite() {
        let cfg = NicheConfig::defaults(Niche::Generic);
        let e = enriched("x", 0.28, 0.18);
        let r = validator_en().validate(&e, &cfg, "trace-2");
        assert_eq!(r.status, ValidationStatus::Rejected);

        let c = r.criteria.iter().find(|c| c.name == "composite_score").unwrap();
        assert_eq!(c.status, ValidationStatus::Rejected);
        assert!(c.message.contains("gap"));
    }

    #[test]
    fn statuses_partition_every_batch() {
        let cfg = NicheConfig::defaults(Niche::Generic);
        let v = validator_en();
        for (composite, conf) in [(0.9, 0.9), (0.6, 0.6), (0.1, 0.1)] {
            let r = v.validate(&enriched("some generic keyword phrase", composite, conf), &cfg, "t");
            assert!(matches!(
                r.status,
                ValidationStatus::Approved | ValidationStatus::Pending | ValidationStatus::Rejected
            ));
        }
    }

    #[test]
    fn word_count_bounds_fail_basic_format() {
        let cfg = NicheConfig::defaults(Niche::Generic); // 3..=8 words
        let v = validator_en();
        let r = v.validate(&enriched("two words", 0.9, 0.9), &cfg, "t");
        let basic = r.criteria.iter().find(|c| c.name == "basic_format").unwrap();
        assert_eq!(basic.status, ValidationStatus::Rejected);
        assert!(basic.message.contains("word count"));
    }

    #[test]
    fn repeated_tokens_fail_uniqueness() {
        let cfg = NicheConfig::defaults(Niche::Generic);
        let v = validator_en();
        let r = v.validate(&enriched("cheap cheap cheap cheap flights", 0.9, 0.9), &cfg, "t");
        let basic = r.criteria.iter().find(|c| c.name == "basic_format").unwrap();
        assert_eq!(basic.status, ValidationStatus::Rejected);
    }

    #[test]
    fn negative_phrases_fail_basic_format() {
        let cfg = NicheConfig::defaults(Niche::Technology);
        let v = validator_en();
        let r = v.validate(&enriched("windows activation crack download free", 0.9, 0.9), &cfg, "t");
        let basic = r.criteria.iter().find(|c| c.name == "basic_format").unwrap();
        assert_eq!(basic.status, ValidationStatus::Rejected);
        assert!(basic.message.contains("crack"));
    }

    #[test]
    fn similarity_is_monotone_with_vocabulary_overlap() {
        let cfg = NicheConfig::defaults(Niche::Technology);
        let v = validator_en();
        let aligned = v.similarity("tutorial software backup configuration", &cfg);
        let unrelated = v.similarity("banana bread morning recipe", &cfg);
        assert!(aligned > unrelated);
        assert!((0.0..=1.0).contains(&aligned));
        assert!((0.0..=1.0).contains(&unrelated));
    }

    #[test]
    fn aggregation_penalizes_failed_criticals() {
        let all_pass = vec![
            criterion("a", 1.0, 0.5, Severity::Critical, 0.5),
            criterion("b", 1.0, 0.5, Severity::Low, 0.5),
        ];
        let (status, score) = aggregate(&all_pass, 0.7, 0.5);
        assert_eq!(status, ValidationStatus::Approved);
        assert!((score - 1.0).abs() < 1e-9);

        let critical_fail = vec![
            criterion("a", 0.1, 0.5, Severity::Critical, 0.5),
            criterion("b", 1.0, 0.5, Severity::Low, 0.5),
        ];
        let (status, score) = aggregate(&critical_fail, 0.7, 0.5);
        // (0.5 - 0.25) / 1.0 = 0.25 → rejected.
        assert_eq!(status, ValidationStatus::Rejected);
        assert!((score - 0.25).abs() < 1e-9);
    }
}
