//! # Niche Resolver
//! Detects the market niche of a keyword and hands out the parameter bundle
//! that governs thresholds and weights for that niche.
//!
//! Snapshots are copy-on-write: readers hold an `Arc<NicheConfig>` that stays
//! valid for their whole run; accepted adjustments install a fresh snapshot
//! behind the shared handle. Rejected adjustments are logged and ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::errors::AnalyzerError;
use crate::normalize;

/// Weight-sum tolerance after normalization.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Minimum normalized match score for a niche to win detection.
const DETECTION_FLOOR: f64 = 0.2;

/// Score bias granted to a caller-supplied niche hint.
const HINT_BIAS: f64 = 0.3;

/// Supported market niches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Niche {
    Ecommerce,
    Health,
    Technology,
    Education,
    Finance,
    #[default]
    Generic,
}

impl Niche {
    pub const ALL: [Niche; 6] = [
        Niche::Ecommerce,
        Niche::Health,
        Niche::Technology,
        Niche::Education,
        Niche::Finance,
        Niche::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Niche::Ecommerce => "ecommerce",
            Niche::Health => "health",
            Niche::Technology => "technology",
            Niche::Education => "education",
            Niche::Finance => "finance",
            Niche::Generic => "generic",
        }
    }
}

impl fmt::Display for Niche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Niche {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecommerce" | "e-commerce" => Ok(Niche::Ecommerce),
            "health" => Ok(Niche::Health),
            "technology" | "tech" => Ok(Niche::Technology),
            "education" => Ok(Niche::Education),
            "finance" => Ok(Niche::Finance),
            "generic" => Ok(Niche::Generic),
            other => Err(AnalyzerError::Config(format!("unknown niche `{other}`"))),
        }
    }
}

/// Composite-score weights. Stored unnormalized; callers blend with
/// [`CompositeWeights::normalized`], which preserves rank order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub complexity: f64,
    pub specificity: f64,
    pub competitive: f64,
    pub trend: f64,
}

impl CompositeWeights {
    pub fn sum(&self) -> f64 {
        self.complexity + self.specificity + self.competitive + self.trend
    }

    /// Renormalize to sum 1. Fails if any weight is negative or the sum is
    /// not positive.
    pub fn normalized(&self) -> Result<CompositeWeights, AnalyzerError> {
        let parts = [self.complexity, self.specificity, self.competitive, self.trend];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalyzerError::Config("composite weights must be non-negative".into()));
        }
        let sum = self.sum();
        if sum <= 0.0 {
            return Err(AnalyzerError::Config("composite weights sum to zero".into()));
        }
        Ok(CompositeWeights {
            complexity: self.complexity / sum,
            specificity: self.specificity / sum,
            competitive: self.competitive / sum,
            trend: self.trend / sum,
        })
    }
}

/// Band cut-offs for the competitive score: `< low` Low, `< medium` Medium,
/// `< high` High, else VeryHigh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBands {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

/// Normalization caps and blend weights for the market signals.
///
/// Caps are calibrated for long-tail inventories (volumes in the hundreds to
/// low thousands), tighter than broad-market caps would be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    pub volume_cap: u64,
    pub cpc_cap: f64,
    pub competition_cap: f64,
    pub w_volume: f64,
    pub w_cpc: f64,
    pub w_competition: f64,
    pub bands: MarketBands,
}

/// Viability bounds for raw market signals; part of the tunable surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBounds {
    pub volume_floor: u64,
    pub cpc_min: f64,
    pub cpc_max: f64,
    pub competition_max: f64,
}

/// Full parameter bundle for one niche.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicheConfig {
    pub niche: Niche,
    pub min_words: usize,
    pub max_words: usize,
    pub specificity_threshold: f64,
    pub similarity_threshold: f64,
    pub weights: CompositeWeights,
    pub acceptance_threshold: f64,
    pub market: MarketProfile,
    pub bounds: MarketBounds,
    pub positive_terms: Vec<String>,
    pub negative_terms: Vec<String>,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl NicheConfig {
    /// Built-in defaults per niche.
    pub fn defaults(niche: Niche) -> Self {
        match niche {
            Niche::Ecommerce => Self {
                niche,
                min_words: 3,
                max_words: 8,
                specificity_threshold: 0.6,
                similarity_threshold: 0.7,
                weights: CompositeWeights { complexity: 0.25, specificity: 0.30, competitive: 0.30, trend: 0.15 },
                acceptance_threshold: 0.65,
                market: MarketProfile {
                    volume_cap: 20_000,
                    cpc_cap: 8.0,
                    competition_cap: 0.9,
                    w_volume: 0.5,
                    w_cpc: 0.3,
                    w_competition: 0.2,
                    bands: MarketBands { low: 0.4, medium: 0.7, high: 0.85 },
                },
                bounds: MarketBounds { volume_floor: 50, cpc_min: 0.5, cpc_max: 8.0, competition_max: 0.8 },
                positive_terms: terms(&[
                    "preço", "barato", "promoção", "desconto", "oferta", "comprar", "vender",
                    "frete", "entrega", "garantia", "devolução", "pagamento",
                    "price", "cheap", "deal", "discount", "offer", "buy", "sale", "shipping",
                ]),
                negative_terms: terms(&["gratuito", "free", "sem custo", "não pago"]),
                timeout_secs: 30,
                cache_ttl_secs: 3600,
            },
            Niche::Health => Self {
                niche,
                min_words: 4,
                max_words: 10,
                specificity_threshold: 0.75,
                similarity_threshold: 0.8,
                weights: CompositeWeights { complexity: 0.35, specificity: 0.30, competitive: 0.20, trend: 0.15 },
                acceptance_threshold: 0.75,
                market: MarketProfile {
                    volume_cap: 8_000,
                    cpc_cap: 15.0,
                    competition_cap: 0.8,
                    w_volume: 0.3,
                    w_cpc: 0.4,
                    w_competition: 0.3,
                    bands: MarketBands { low: 0.3, medium: 0.6, high: 0.8 },
                },
                bounds: MarketBounds { volume_floor: 30, cpc_min: 1.0, cpc_max: 15.0, competition_max: 0.7 },
                positive_terms: terms(&[
                    "sintomas", "tratamento", "medicamento", "consulta", "exame", "diagnóstico",
                    "prevenção", "cura", "alívio", "especialista", "clínica", "hospital", "médico",
                    "terapia", "symptoms", "treatment", "medicine", "doctor", "therapy", "clinic",
                ]),
                negative_terms: terms(&["milagre", "cura definitiva", "100% eficaz"]),
                timeout_secs: 45,
                cache_ttl_secs: 5400,
            },
            Niche::Technology => Self {
                niche,
                min_words: 3,
                max_words: 9,
                specificity_threshold: 0.7,
                similarity_threshold: 0.75,
                weights: CompositeWeights { complexity: 0.30, specificity: 0.25, competitive: 0.25, trend: 0.20 },
                acceptance_threshold: 0.70,
                market: MarketProfile {
                    volume_cap: 5_000,
                    cpc_cap: 6.0,
                    competition_cap: 1.0,
                    w_volume: 0.4,
                    w_cpc: 0.3,
                    w_competition: 0.3,
                    bands: MarketBands { low: 0.35, medium: 0.65, high: 0.85 },
                },
                bounds: MarketBounds { volume_floor: 40, cpc_min: 0.8, cpc_max: 12.0, competition_max: 0.75 },
                positive_terms: terms(&[
                    "tutorial", "como fazer", "passo a passo", "dica", "truque", "otimização",
                    "configuração", "resolução", "problema", "solução", "software", "hardware",
                    "programação", "desenvolvimento", "configure", "configuration", "setup",
                    "install", "backup", "windows", "linux", "app",
                ]),
                negative_terms: terms(&["hack", "crack", "pirata", "ilegal"]),
                timeout_secs: 35,
                cache_ttl_secs: 4800,
            },
            Niche::Education => Self {
                niche,
                min_words: 4,
                max_words: 10,
                specificity_threshold: 0.8,
                similarity_threshold: 0.8,
                weights: CompositeWeights { complexity: 0.25, specificity: 0.35, competitive: 0.25, trend: 0.15 },
                acceptance_threshold: 0.75,
                market: MarketProfile {
                    volume_cap: 10_000,
                    cpc_cap: 10.0,
                    competition_cap: 0.7,
                    w_volume: 0.4,
                    w_cpc: 0.2,
                    w_competition: 0.4,
                    bands: MarketBands { low: 0.3, medium: 0.6, high: 0.8 },
                },
                bounds: MarketBounds { volume_floor: 25, cpc_min: 0.6, cpc_max: 10.0, competition_max: 0.7 },
                positive_terms: terms(&[
                    "curso", "aprendizado", "estudo", "material", "exercício", "prática",
                    "revisão", "preparação", "técnica", "método", "professor", "aula",
                    "conteúdo", "certificação", "course", "learning", "study", "exam", "teacher",
                ]),
                negative_terms: terms(&["diploma falso", "certificado falso"]),
                timeout_secs: 40,
                cache_ttl_secs: 7200,
            },
            Niche::Finance => Self {
                niche,
                min_words: 4,
                max_words: 9,
                specificity_threshold: 0.75,
                similarity_threshold: 0.8,
                weights: CompositeWeights { complexity: 0.30, specificity: 0.25, competitive: 0.30, trend: 0.15 },
                acceptance_threshold: 0.75,
                market: MarketProfile {
                    volume_cap: 6_000,
                    cpc_cap: 20.0,
                    competition_cap: 0.9,
                    w_volume: 0.3,
                    w_cpc: 0.5,
                    w_competition: 0.2,
                    bands: MarketBands { low: 0.25, medium: 0.55, high: 0.8 },
                },
                bounds: MarketBounds { volume_floor: 35, cpc_min: 1.2, cpc_max: 20.0, competition_max: 0.75 },
                positive_terms: terms(&[
                    "investimento", "economia", "poupança", "rendimento", "risco", "retorno",
                    "planejamento", "orçamento", "dívida", "crédito", "ações", "fundos",
                    "seguros", "aposentadoria", "investment", "savings", "credit", "loan", "budget",
                ]),
                negative_terms: terms(&["get rich quick", "fique rico rápido", "garantia 100%"]),
                timeout_secs: 50,
                cache_ttl_secs: 9000,
            },
            Niche::Generic => Self {
                niche,
                min_words: 3,
                max_words: 8,
                specificity_threshold: 0.65,
                similarity_threshold: 0.7,
                weights: CompositeWeights { complexity: 0.30, specificity: 0.25, competitive: 0.25, trend: 0.20 },
                acceptance_threshold: 0.70,
                market: MarketProfile {
                    volume_cap: 10_000,
                    cpc_cap: 10.0,
                    competition_cap: 1.0,
                    w_volume: 0.4,
                    w_cpc: 0.3,
                    w_competition: 0.3,
                    bands: MarketBands { low: 0.3, medium: 0.6, high: 0.8 },
                },
                bounds: MarketBounds { volume_floor: 50, cpc_min: 0.5, cpc_max: 10.0, competition_max: 0.8 },
                positive_terms: Vec::new(),
                negative_terms: Vec::new(),
                timeout_secs: 30,
                cache_ttl_secs: 3600,
            },
        }
    }

    /// Validate the whole bundle. Used at load time (fatal) and before any
    /// snapshot swap.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.min_words == 0 || self.max_words < self.min_words {
            return Err(AnalyzerError::Config(format!(
                "word count bounds invalid: [{}, {}]",
                self.min_words, self.max_words
            )));
        }
        for (name, v) in [
            ("specificity_threshold", self.specificity_threshold),
            ("similarity_threshold", self.similarity_threshold),
            ("acceptance_threshold", self.acceptance_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AnalyzerError::Config(format!("{name} outside [0,1]: {v}")));
            }
        }
        let norm = self.weights.normalized()?;
        debug_assert!((norm.sum() - 1.0).abs() <= WEIGHT_EPSILON);
        if self.market.cpc_cap <= 0.0 || self.market.competition_cap <= 0.0 || self.market.volume_cap == 0 {
            return Err(AnalyzerError::Config("market caps must be positive".into()));
        }
        Ok(())
    }
}

impl NicheConfig {
    /// The tunable subset as a flat vector, keyed by field name. Key order
    /// is stable (BTreeMap), which the optimizer relies on for its feature
    /// matrix.
    pub fn vector(&self) -> BTreeMap<String, f64> {
        let mut v = BTreeMap::new();
        v.insert("acceptance_threshold".to_string(), self.acceptance_threshold);
        v.insert("competition_max".to_string(), self.bounds.competition_max);
        v.insert("cpc_max".to_string(), self.bounds.cpc_max);
        v.insert("cpc_min".to_string(), self.bounds.cpc_min);
        v.insert("max_words".to_string(), self.max_words as f64);
        v.insert("min_words".to_string(), self.min_words as f64);
        v.insert("similarity_threshold".to_string(), self.similarity_threshold);
        v.insert("specificity_threshold".to_string(), self.specificity_threshold);
        v.insert("volume_floor".to_string(), self.bounds.volume_floor as f64);
        v.insert("w_competitive".to_string(), self.weights.competitive);
        v.insert("w_complexity".to_string(), self.weights.complexity);
        v.insert("w_specificity".to_string(), self.weights.specificity);
        v.insert("w_trend".to_string(), self.weights.trend);
        v
    }

    /// Build a new bundle with the vector applied. Strict: any invalid field
    /// fails the whole application, unlike [`NicheResolver::adjust`].
    pub fn with_vector(&self, vector: &BTreeMap<String, f64>) -> Result<NicheConfig, AnalyzerError> {
        let mut next = self.clone();
        for (key, value) in vector {
            apply_field(&mut next, key, *value)?;
        }
        next.validate()?;
        Ok(next)
    }
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| normalize::fold_word(t)).collect()
}

/// Thread-safe handle over the per-niche snapshots. Cloning shares state.
#[derive(Clone)]
pub struct NicheResolver {
    inner: Arc<RwLock<HashMap<Niche, Arc<NicheConfig>>>>,
}

impl Default for NicheResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NicheResolver {
    /// Resolver with built-in defaults for every niche.
    pub fn new() -> Self {
        let map = Niche::ALL
            .iter()
            .map(|n| (*n, Arc::new(NicheConfig::defaults(*n))))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Resolver seeded with overrides (e.g. from the config file). Each
    /// override is validated; an invalid one is a load-time error.
    pub fn with_overrides(overrides: Vec<NicheConfig>) -> Result<Self, AnalyzerError> {
        let resolver = Self::new();
        {
            let mut map = resolver.inner.write().expect("niche map lock poisoned");
            for cfg in overrides {
                cfg.validate()?;
                map.insert(cfg.niche, Arc::new(cfg));
            }
        }
        Ok(resolver)
    }

    /// Detect the niche of `term`: count positive-term hits per niche,
    /// normalize by token count, bias the caller's hint by +0.3, and require
    /// the winner to clear the detection floor; otherwise `Generic`.
    pub fn detect(&self, term: &str, hint: Option<Niche>) -> Niche {
        let folded = normalize::fold_word(term);
        let token_count = folded.split_whitespace().count().max(1) as f64;

        let map = self.inner.read().expect("niche map lock poisoned");
        let mut best = (Niche::Generic, 0.0f64);

        for niche in Niche::ALL {
            if niche == Niche::Generic {
                continue;
            }
            let Some(cfg) = map.get(&niche) else { continue };
            let hits = cfg
                .positive_terms
                .iter()
                .filter(|t| folded.contains(t.as_str()))
                .count() as f64;
            let mut score = hits / token_count;
            if hint == Some(niche) {
                score += HINT_BIAS;
            }
            if score > best.1 {
                best = (niche, score);
            }
        }

        if best.1 >= DETECTION_FLOOR {
            best.0
        } else {
            Niche::Generic
        }
    }

    /// Immutable snapshot for a niche.
    pub fn config(&self, niche: Niche) -> Arc<NicheConfig> {
        let map = self.inner.read().expect("niche map lock poisoned");
        map.get(&niche)
            .cloned()
            .unwrap_or_else(|| Arc::new(NicheConfig::defaults(niche)))
    }

    /// Detect and fetch in one step.
    pub fn resolve(&self, term: &str, hint: Option<Niche>) -> (Niche, Arc<NicheConfig>) {
        let niche = self.detect(term, hint);
        (niche, self.config(niche))
    }

    /// Apply numeric field overrides for a niche. Invalid fields are logged
    /// and ignored; valid ones produce a fresh snapshot. Returns the
    /// snapshot now active.
    pub fn adjust(&self, niche: Niche, changes: &BTreeMap<String, f64>) -> Arc<NicheConfig> {
        let current = self.config(niche);
        let mut next = (*current).clone();
        let mut touched = false;

        for (key, value) in changes {
            match apply_field(&mut next, key, *value) {
                Ok(()) => touched = true,
                Err(e) => {
                    warn!(target: "niche", niche = %niche, field = %key, value, error = %e, "adjustment rejected");
                }
            }
        }

        if !touched {
            return current;
        }

        match next.validate() {
            Ok(()) => {
                let snapshot = Arc::new(next);
                let mut map = self.inner.write().expect("niche map lock poisoned");
                map.insert(niche, snapshot.clone());
                info!(target: "niche", niche = %niche, changed = changes.len(), "niche snapshot replaced");
                snapshot
            }
            Err(e) => {
                warn!(target: "niche", niche = %niche, error = %e, "adjusted bundle failed validation; keeping previous snapshot");
                current
            }
        }
    }

    /// Install a fully-formed snapshot (optimizer swap path). Returns the
    /// previous snapshot so the caller can roll back.
    pub fn swap(&self, cfg: NicheConfig) -> Result<Arc<NicheConfig>, AnalyzerError> {
        cfg.validate()?;
        let niche = cfg.niche;
        let mut map = self.inner.write().expect("niche map lock poisoned");
        let previous = map
            .insert(niche, Arc::new(cfg))
            .unwrap_or_else(|| Arc::new(NicheConfig::defaults(niche)));
        Ok(previous)
    }

    /// Write one JSON snapshot per niche under `dir`.
    pub fn save_snapshots(&self, dir: &Path) -> Result<(), AnalyzerError> {
        fs::create_dir_all(dir)
            .map_err(|e| AnalyzerError::Persistence(format!("create {}: {e}", dir.display())))?;
        let map = self.inner.read().expect("niche map lock poisoned");
        for (niche, cfg) in map.iter() {
            let path = dir.join(format!("{niche}.json"));
            let body = serde_json::to_vec_pretty(cfg.as_ref())
                .map_err(|e| AnalyzerError::Persistence(format!("serialize {niche}: {e}")))?;
            fs::write(&path, body)
                .map_err(|e| AnalyzerError::Persistence(format!("write {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Map a tunable field name onto the config, validating ranges per field.
fn apply_field(cfg: &mut NicheConfig, key: &str, value: f64) -> Result<(), AnalyzerError> {
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);
    match key {
        "min_words" => {
            if value < 1.0 || value.fract() != 0.0 {
                return Err(AnalyzerError::Config("min_words must be a positive integer".into()));
            }
            cfg.min_words = value as usize;
        }
        "max_words" => {
            if value < 1.0 || value.fract() != 0.0 {
                return Err(AnalyzerError::Config("max_words must be a positive integer".into()));
            }
            cfg.max_words = value as usize;
        }
        "specificity_threshold" if in_unit(value) => cfg.specificity_threshold = value,
        "similarity_threshold" if in_unit(value) => cfg.similarity_threshold = value,
        "acceptance_threshold" if in_unit(value) => cfg.acceptance_threshold = value,
        "w_complexity" if value >= 0.0 => cfg.weights.complexity = value,
        "w_specificity" if value >= 0.0 => cfg.weights.specificity = value,
        "w_competitive" if value >= 0.0 => cfg.weights.competitive = value,
        "w_trend" if value >= 0.0 => cfg.weights.trend = value,
        "volume_floor" if value >= 0.0 => cfg.bounds.volume_floor = value as u64,
        "cpc_min" if value >= 0.0 => cfg.bounds.cpc_min = value,
        "cpc_max" if value >= 0.0 => cfg.bounds.cpc_max = value,
        "competition_max" if in_unit(value) => cfg.bounds.competition_max = value,
        "timeout_secs" if value >= 1.0 => cfg.timeout_secs = value as u64,
        "cache_ttl_secs" if value >= 0.0 => cfg.cache_ttl_secs = value as u64,
        known @ ("specificity_threshold" | "similarity_threshold" | "acceptance_threshold"
        | "w_complexity" | "w_specificity" | "w_competitive" | "w_trend" | "volume_floor"
        | "cpc_min" | "cpc_max" | "competition_max" | "timeout_secs" | "cache_ttl_secs") => {
            return Err(AnalyzerError::Config(format!("{known} out of range: {value}")));
        }
        unknown => {
            return Err(AnalyzerError::Config(format!("unknown tunable field `{unknown}`")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_normalize_and_preserve_rank_order() {
        let w = CompositeWeights { complexity: 3.0, specificity: 1.0, competitive: 2.0, trend: 0.5 };
        let n = w.normalized().unwrap();
        assert!((n.sum() - 1.0).abs() <= WEIGHT_EPSILON);
        assert!(n.complexity > n.competitive);
        assert!(n.competitive > n.specificity);
        assert!(n.specificity > n.trend);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let w = CompositeWeights { complexity: -0.1, specificity: 0.5, competitive: 0.4, trend: 0.2 };
        assert!(w.normalized().is_err());
    }

    #[test]
    fn detection_picks_ecommerce_without_hint() {
        let r = NicheResolver::new();
        assert_eq!(r.detect("best price gaming notebook 2024", None), Niche::Ecommerce);
    }

    #[test]
    fn detection_falls_back_to_generic() {
        let r = NicheResolver::new();
        assert_eq!(r.detect("zebra umbrella cloud", None), Niche::Generic);
    }

    #[test]
    fn hint_bias_selects_the_hinted_niche() {
        let r = NicheResolver::new();
        let n = r.detect("how to configure automatic backup on windows 11", Some(Niche::Technology));
        assert_eq!(n, Niche::Technology);
    }

    #[test]
    fn config_roundtrips_through_serde() {
        let cfg = NicheConfig::defaults(Niche::Finance);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: NicheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn adjust_applies_valid_and_ignores_invalid_fields() {
        let r = NicheResolver::new();
        let before = r.config(Niche::Generic);

        let mut changes = BTreeMap::new();
        changes.insert("acceptance_threshold".to_string(), 0.72);
        changes.insert("similarity_threshold".to_string(), 7.0); // out of range
        changes.insert("made_up_field".to_string(), 1.0); // unknown

        let after = r.adjust(Niche::Generic, &changes);
        assert!((after.acceptance_threshold - 0.72).abs() < 1e-12);
        assert_eq!(after.similarity_threshold, before.similarity_threshold);
    }

    #[test]
    fn in_flight_readers_keep_their_snapshot() {
        let r = NicheResolver::new();
        let held = r.config(Niche::Technology);

        let mut changes = BTreeMap::new();
        changes.insert("acceptance_threshold".to_string(), 0.9);
        let _ = r.adjust(Niche::Technology, &changes);

        assert!((held.acceptance_threshold - 0.70).abs() < 1e-12);
        assert!((r.config(Niche::Technology).acceptance_threshold - 0.9).abs() < 1e-12);
    }

    #[test]
    fn swap_returns_previous_snapshot() {
        let r = NicheResolver::new();
        let mut cfg = NicheConfig::defaults(Niche::Generic);
        cfg.acceptance_threshold = 0.8;
        let prev = r.swap(cfg).unwrap();
        assert!((prev.acceptance_threshold - 0.70).abs() < 1e-12);
        assert!((r.config(Niche::Generic).acceptance_threshold - 0.8).abs() < 1e-12);
    }
}
