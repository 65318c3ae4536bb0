// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod competitive;
pub mod complexity;
pub mod composite;
pub mod config;
pub mod errors;
pub mod eventlog;
pub mod keyword;
pub mod logging;
pub mod metrics;
pub mod niche;
pub mod normalize;
pub mod optimizer;
pub mod pipeline;
pub mod significance;
pub mod sources;
pub mod trend;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::errors::{AnalyzerError, StageOutcome};
pub use crate::keyword::{EnrichedKeyword, Intent, Keyword, QualityBand, SignalBand, TrendDirection};
pub use crate::niche::{Niche, NicheConfig, NicheResolver};
pub use crate::pipeline::{
    BatchOutcome, CancelToken, Orchestrator, PipelineReport, ProcessOptions, Strategy,
};
pub use crate::validate::{ValidationResult, ValidationStatus};

use std::path::Path;
use std::sync::Arc;

use crate::config::AnalyzerConfig;
use crate::eventlog::EventLog;
use crate::optimizer::ParameterOptimizer;
use crate::trend::SeriesStore;

/// Assemble the full application state from a loaded configuration.
///
/// Shared pieces (niche snapshots, series store, event log) are wired once
/// here; the orchestrator and optimizer hold handles to the same instances.
pub fn build_state(cfg: AnalyzerConfig) -> anyhow::Result<AppState> {
    cfg.validate()?;

    let resolver = if cfg.niches.is_empty() {
        NicheResolver::new()
    } else {
        NicheResolver::with_overrides(cfg.niches.clone())?
    };
    let eventlog = Arc::new(EventLog::new(cfg.logger.clone())?);
    let series = SeriesStore::new();

    let orchestrator = Arc::new(
        Orchestrator::new(
            cfg.pipeline.clone(),
            resolver.clone(),
            series,
            eventlog.clone(),
        )
        .with_validator_config(cfg.validator),
    );
    let optimizer = Arc::new(ParameterOptimizer::new(
        cfg.optimizer.clone(),
        resolver,
        eventlog.clone(),
    ));

    let experiments_dir = cfg
        .optimizer
        .model_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("experiments");

    Ok(AppState {
        orchestrator,
        optimizer,
        eventlog,
        experiments_dir,
    })
}

/// Build the default router from the default configuration chain. Used by
/// the binary and by end-to-end tests.
pub fn app() -> anyhow::Result<axum::Router> {
    let cfg = AnalyzerConfig::load_default()?;
    let state = build_state(cfg)?;
    Ok(create_router(state))
}
