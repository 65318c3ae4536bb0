//! # Text Normalizer
//! Canonicalization applied before any lexical analysis: trim, collapse
//! whitespace, optional lowercasing, diacritic folding, and punctuation
//! stripping. Pure and idempotent; identical input always yields identical
//! output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Unicode-friendly word tokenizer, compiled once.
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("tokenizer regex"));

/// Options controlling [`normalize`]. The defaults match what the analyzers
/// expect: lowercase, fold diacritics, keep punctuation (the analyzers strip
/// what they need themselves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerOptions {
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_true")]
    pub strip_diacritics: bool,
    /// Punctuation characters replaced by spaces before whitespace collapse.
    #[serde(default)]
    pub strip_punctuation: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_diacritics: true,
            strip_punctuation: None,
        }
    }
}

/// Canonicalize `input` according to `opts`.
///
/// Order: punctuation strip → case fold → diacritic fold → whitespace
/// collapse. Each step is idempotent, so the whole transform is.
pub fn normalize(input: &str, opts: &NormalizerOptions) -> String {
    let mut out = input.trim().to_string();

    if let Some(punct) = &opts.strip_punctuation {
        out = out
            .chars()
            .map(|c| if punct.contains(c) { ' ' } else { c })
            .collect();
    }

    if opts.lowercase {
        out = out.to_lowercase();
    }

    if opts.strip_diacritics {
        out = out.chars().map(fold_diacritic).collect();
    }

    // Collapse runs of whitespace into single spaces.
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract maximal runs of word characters from already-normalized text.
pub fn tokenize(input: &str) -> Vec<String> {
    WORD_RE
        .find_iter(input)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lowercase and diacritic-fold a single word. Used to canonicalize
/// vocabulary entries so lookups match normalized tokens.
pub fn fold_word(word: &str) -> String {
    word.to_lowercase().chars().map(fold_diacritic).collect()
}

/// Fold Latin diacritics to their base letter. Covers the Portuguese and
/// general Western European range the vocabularies use.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ç' => 'C',
        'Ñ' => 'N',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        let opts = NormalizerOptions::default();
        assert_eq!(normalize("  Como   Fazer\tBackup  ", &opts), "como fazer backup");
    }

    #[test]
    fn folds_diacritics() {
        let opts = NormalizerOptions::default();
        assert_eq!(normalize("configuração automática", &opts), "configuracao automatica");
    }

    #[test]
    fn keeps_diacritics_when_disabled() {
        let opts = NormalizerOptions {
            strip_diacritics: false,
            ..Default::default()
        };
        assert_eq!(normalize("ação", &opts), "ação");
    }

    #[test]
    fn strips_configured_punctuation() {
        let opts = NormalizerOptions {
            strip_punctuation: Some("!?.,".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize("best laptop 2024!?", &opts), "best laptop 2024");
    }

    #[test]
    fn normalization_is_idempotent() {
        let opts = NormalizerOptions {
            strip_punctuation: Some("!?.,;:".to_string()),
            ..Default::default()
        };
        let once = normalize("  Qual é o MELHOR Notebook?!  ", &opts);
        let twice = normalize(&once, &opts);
        assert_eq!(once, twice);
    }

    #[test]
    fn tokenizer_extracts_word_runs() {
        let toks = tokenize("best price gaming notebook 2024");
        assert_eq!(toks, vec!["best", "price", "gaming", "notebook", "2024"]);
    }
}
