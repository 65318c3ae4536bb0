//! # Significance Analyzer
//! Lexical filtering and intent-aware scoring of candidate terms.
//!
//! - Tokenizes normalized text into word runs.
//! - Drops stopwords, short tokens, pure numerics, and mixed non-letter
//!   tokens, recording the reason for each rejection.
//! - Scores the survivors by presence of "intent" terms (how/best/guide...).
//!
//! Vocabularies are language-tagged and loaded from static JSON at startup;
//! Portuguese is the default locale. Pure functions, no I/O.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::keyword::clamp01;
use crate::normalize::{self, NormalizerOptions};

/// Vocabulary bundle for one locale. Entries are canonicalized (lowercased,
/// diacritics folded) at load so lookups match normalized tokens.
#[derive(Debug, Deserialize)]
pub struct Vocabulary {
    pub stopwords: HashSet<String>,
    pub intent: HashSet<String>,
    pub complex: HashSet<String>,
}

impl Vocabulary {
    fn canonicalized(mut self) -> Self {
        let fold = |set: HashSet<String>| set.iter().map(|w| normalize::fold_word(w)).collect();
        self.stopwords = fold(self.stopwords);
        self.intent = fold(self.intent);
        self.complex = fold(self.complex);
        self
    }
}

static VOCAB_PT: Lazy<Vocabulary> = Lazy::new(|| {
    serde_json::from_str::<Vocabulary>(include_str!("../vocab/pt.json"))
        .expect("valid pt vocabulary")
        .canonicalized()
});

static VOCAB_EN: Lazy<Vocabulary> = Lazy::new(|| {
    serde_json::from_str::<Vocabulary>(include_str!("../vocab/en.json"))
        .expect("valid en vocabulary")
        .canonicalized()
});

/// Supported vocabulary locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Pt,
    En,
}

impl Locale {
    pub fn vocabulary(self) -> &'static Vocabulary {
        match self {
            Locale::Pt => &VOCAB_PT,
            Locale::En => &VOCAB_EN,
        }
    }
}

/// Why a token was dropped. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooShort,
    Stopword,
    Numeric,
    NonAlpha,
}

/// Result of a significance analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceAnalysis {
    pub significant_tokens: Vec<String>,
    pub total_tokens: usize,
    pub unique_tokens: usize,
    pub unique_significant_tokens: usize,
    /// Significance score in `[0, 1]`; `0.0` on empty input.
    pub score: f64,
    pub rejected_tokens: Vec<(String, RejectReason)>,
}

/// Configuration for the analyzer. `min_chars` defaults to 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default)]
    pub locale: Locale,
}

fn default_min_chars() -> usize {
    3
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            locale: Locale::default(),
        }
    }
}

/// Stateless significance analyzer over a locale vocabulary.
#[derive(Debug, Clone, Default)]
pub struct SignificanceAnalyzer {
    cfg: SignificanceConfig,
}

impl SignificanceAnalyzer {
    pub fn new(cfg: SignificanceConfig) -> Self {
        Self { cfg }
    }

    pub fn locale(&self) -> Locale {
        self.cfg.locale
    }

    /// Analyze raw text. Never fails; empty or all-rejected input yields a
    /// zero score and empty token lists.
    pub fn analyze(&self, text: &str) -> SignificanceAnalysis {
        let normalized = normalize::normalize(text, &NormalizerOptions::default());
        let tokens = normalize::tokenize(&normalized);
        let vocab = self.cfg.locale.vocabulary();

        let mut significant = Vec::new();
        let mut rejected = Vec::new();

        for tok in &tokens {
            match self.reject_reason(tok, vocab) {
                Some(reason) => rejected.push((tok.clone(), reason)),
                None => significant.push(tok.clone()),
            }
        }

        let unique_tokens = tokens.iter().collect::<HashSet<_>>().len();
        let unique_significant = significant.iter().collect::<HashSet<_>>().len();
        let score = self.score(&significant, vocab);

        SignificanceAnalysis {
            significant_tokens: significant,
            total_tokens: tokens.len(),
            unique_tokens,
            unique_significant_tokens: unique_significant,
            score,
            rejected_tokens: rejected,
        }
    }

    /// Rejection rules, applied in order; first match wins.
    fn reject_reason(&self, token: &str, vocab: &Vocabulary) -> Option<RejectReason> {
        if token.chars().count() < self.cfg.min_chars {
            return Some(RejectReason::TooShort);
        }
        if vocab.stopwords.contains(token) {
            return Some(RejectReason::Stopword);
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            return Some(RejectReason::Numeric);
        }
        if token.chars().any(|c| !c.is_alphabetic()) {
            return Some(RejectReason::NonAlpha);
        }
        None
    }

    /// `0.7·[any significant] + 0.3·(intent hits / significant)`, clamped.
    fn score(&self, significant: &[String], vocab: &Vocabulary) -> f64 {
        if significant.is_empty() {
            return 0.0;
        }
        let n = significant.len() as f64;
        let intent_hits = significant.iter().filter(|t| vocab.intent.contains(t.as_str())).count() as f64;
        clamp01(0.7 * (n / n.max(1.0)) + 0.3 * (intent_hits / n.max(1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SignificanceAnalyzer {
        SignificanceAnalyzer::new(SignificanceConfig::default())
    }

    #[test]
    fn empty_input_scores_zero() {
        let a = analyzer().analyze("");
        assert_eq!(a.score, 0.0);
        assert_eq!(a.total_tokens, 0);
        assert!(a.significant_tokens.is_empty());
    }

    #[test]
    fn stopwords_and_shorts_are_rejected_in_order() {
        // "como" is an intent word, not a stopword; "de" is both short and a
        // stopword and must be tagged too_short (rule order).
        let a = analyzer().analyze("como fazer backup de fotos");
        assert!(a.significant_tokens.contains(&"backup".to_string()));
        assert!(a
            .rejected_tokens
            .iter()
            .any(|(t, r)| t == "de" && *r == RejectReason::TooShort));
    }

    #[test]
    fn numerics_are_rejected() {
        let a = analyzer().analyze("melhor notebook 2024");
        assert!(a
            .rejected_tokens
            .iter()
            .any(|(t, r)| t == "2024" && *r == RejectReason::Numeric));
    }

    #[test]
    fn single_stopword_scores_zero() {
        let a = analyzer().analyze("para");
        assert_eq!(a.score, 0.0);
    }

    #[test]
    fn intent_terms_raise_the_score() {
        let plain = analyzer().analyze("notebook gamer barato");
        let with_intent = analyzer().analyze("qual melhor notebook gamer");
        assert!(with_intent.score > plain.score - 1e-9);
        assert!(with_intent.score <= 1.0);
    }

    #[test]
    fn english_locale_swaps_vocabulary() {
        let en = SignificanceAnalyzer::new(SignificanceConfig {
            locale: Locale::En,
            ..Default::default()
        });
        let a = en.analyze("how to configure automatic backup");
        // "how" is short (< 3 is false: 3 chars) and an intent word in en.
        assert!(a.significant_tokens.contains(&"how".to_string()));
        assert!(a.score > 0.7);
    }

    #[test]
    fn score_always_in_unit_interval() {
        for text in ["", "a", "qual melhor guia review dicas", "1 2 3 4 5"] {
            let s = analyzer().analyze(text).score;
            assert!((0.0..=1.0).contains(&s), "{text} -> {s}");
        }
    }
}
