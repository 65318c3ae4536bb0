//! # Top-Level Configuration
//! One file configures the whole engine: `pipeline`, `niches`, `logger`,
//! `optimizer`, and `validator` sections. TOML and JSON are both accepted.
//!
//! Resolution order: `$LONGTAIL_CONFIG_PATH`, then `config/longtail.toml`,
//! then `config/longtail.json`, else built-in defaults. Missing keys fall
//! back to documented defaults; unknown top-level keys are warnings, never
//! errors.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::eventlog::EventLogConfig;
use crate::niche::NicheConfig;
use crate::optimizer::OptimizerConfig;
use crate::pipeline::PipelineConfig;
use crate::validate::ValidatorConfig;

pub const ENV_CONFIG_PATH: &str = "LONGTAIL_CONFIG_PATH";
const DEFAULT_TOML_PATH: &str = "config/longtail.toml";
const DEFAULT_JSON_PATH: &str = "config/longtail.json";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Full per-niche bundles overriding the built-in defaults.
    #[serde(default)]
    pub niches: Vec<NicheConfig>,
    #[serde(default)]
    pub logger: EventLogConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    /// Anything else in the file; reported as warnings.
    #[serde(flatten)]
    pub unknown: HashMap<String, serde_json::Value>,
}

impl AnalyzerConfig {
    /// Load from an explicit path. Format is chosen by extension, falling
    /// back to trying both.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)?;
        cfg.warn_unknown(path);
        Ok(cfg)
    }

    /// Load using the env override and the default path chain.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON_PATH);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    /// Niche overrides are fatal at load time when invalid.
    pub fn validate(&self) -> Result<()> {
        for niche in &self.niches {
            niche
                .validate()
                .with_context(|| format!("niche override `{}`", niche.niche))?;
        }
        Ok(())
    }

    fn warn_unknown(&self, path: &Path) {
        for key in self.unknown.keys() {
            warn!(target: "config", file = %path.display(), key = %key, "unknown configuration key ignored");
        }
    }
}

fn parse_config(content: &str, hint_ext: &str) -> Result<AnalyzerConfig> {
    let try_toml = hint_ext == "toml" || !content.trim_start().starts_with('{');
    if try_toml {
        if let Ok(cfg) = toml::from_str::<AnalyzerConfig>(content) {
            return Ok(cfg);
        }
    }
    if let Ok(cfg) = serde_json::from_str::<AnalyzerConfig>(content) {
        return Ok(cfg);
    }
    if !try_toml {
        if let Ok(cfg) = toml::from_str::<AnalyzerConfig>(content) {
            return Ok(cfg);
        }
    }
    Err(anyhow!("unsupported or malformed configuration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::niche::Niche;

    #[test]
    fn defaults_when_sections_missing() {
        let cfg = parse_config("{}", "json").unwrap();
        assert_eq!(cfg.pipeline.batch_timeout_secs, 300);
        assert_eq!(cfg.logger.retention_days, 30);
        assert_eq!(cfg.optimizer.window_days, 30);
        assert!((cfg.validator.approve_cutoff - 0.7).abs() < 1e-12);
        assert!(cfg.niches.is_empty());
    }

    #[test]
    fn toml_sections_are_parsed() {
        let cfg = parse_config(
            r#"
[pipeline]
strategy = "parallel"
batch_timeout_secs = 120

[logger]
dir = "custom-logs"
retention_days = 7

[optimizer]
window_days = 14
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.pipeline.batch_timeout_secs, 120);
        assert_eq!(cfg.logger.dir, PathBuf::from("custom-logs"));
        assert_eq!(cfg.logger.retention_days, 7);
        assert_eq!(cfg.optimizer.window_days, 14);
    }

    #[test]
    fn unknown_keys_survive_into_the_unknown_map() {
        let cfg = parse_config(r#"{"pipelnie": {"workers": 2}}"#, "json").unwrap();
        assert!(cfg.unknown.contains_key("pipelnie"));
    }

    #[test]
    fn invalid_niche_override_fails_validation() {
        let mut bad = NicheConfig::defaults(Niche::Generic);
        bad.min_words = 9;
        bad.max_words = 2;
        let cfg = AnalyzerConfig {
            niches: vec![bad],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_path_takes_priority() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        fs::write(&path, r#"{"pipeline": {"workers": 3}}"#).unwrap();

        std::env::set_var(ENV_CONFIG_PATH, path.display().to_string());
        let cfg = AnalyzerConfig::load_default().unwrap();
        std::env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(cfg.pipeline.workers, 3);
    }
}
