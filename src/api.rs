//! # HTTP API Layer
//! Thin operational shell around the core pipeline: batch processing,
//! optimizer trigger, monitoring views, and collaborator surfaces. The
//! heavy lifting stays in the library; handlers translate and delegate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::errors::AnalyzerError;
use crate::eventlog::{
    quality_report, trend_report, EventLog, LogKind, LogLevel, QualityReport, TrendReport,
};
use crate::keyword::{EnrichedKeyword, Keyword};
use crate::niche::Niche;
use crate::optimizer::{CycleOutcome, ParameterOptimizer};
use crate::pipeline::{BatchOutcome, Orchestrator, ProcessOptions, Strategy};
use crate::significance::Locale;
use crate::validate::ValidationResult;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub optimizer: Arc<ParameterOptimizer>,
    pub eventlog: Arc<EventLog>,
    pub experiments_dir: PathBuf,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process", post(process_batch))
        .route("/optimize", post(optimize))
        .route("/experiments", post(create_experiment))
        .route("/monitoring/dashboard", get(monitoring_dashboard))
        .route("/cache/stats", get(cache_stats))
        .route("/feedback", post(feedback))
        .route("/audit/report", get(audit_report))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- /health ----

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    components: HashMap<&'static str, &'static str>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let mut components = HashMap::new();
    components.insert("pipeline", "ok");
    components.insert(
        "eventlog",
        if state.eventlog.dir().exists() { "ok" } else { "degraded" },
    );
    components.insert(
        "optimizer",
        if state.optimizer.is_frozen() { "frozen" } else { "ok" },
    );
    Json(HealthResp {
        status: "ok",
        components,
    })
}

// ---- /process ----

#[derive(Deserialize)]
struct ProcessReq {
    keywords: Vec<Keyword>,
    #[serde(default)]
    niche: Option<Niche>,
    #[serde(default)]
    locale: Option<Locale>,
    #[serde(default)]
    strategy: Option<Strategy>,
    #[serde(default)]
    emit_report: bool,
}

#[derive(Serialize)]
struct ProcessResp {
    accepted: Vec<EnrichedKeyword>,
    results: Vec<ValidationResult>,
    report: serde_json::Value,
}

async fn process_batch(
    State(state): State<AppState>,
    Json(body): Json<ProcessReq>,
) -> Result<Json<ProcessResp>, AnalyzerError> {
    let orchestrator = state.orchestrator.clone();
    let options = ProcessOptions {
        niche: body.niche,
        locale: body.locale,
        strategy: body.strategy,
        emit_report: body.emit_report,
        ..Default::default()
    };
    let outcome: BatchOutcome =
        tokio::task::spawn_blocking(move || orchestrator.process(body.keywords, options))
            .await
            .map_err(|e| AnalyzerError::stage("process", e.to_string()))??;

    Ok(Json(ProcessResp {
        accepted: outcome.accepted,
        results: outcome.results,
        report: serde_json::to_value(&outcome.report).unwrap_or_default(),
    }))
}

// ---- /optimize ----

async fn optimize(State(state): State<AppState>) -> Result<Json<CycleOutcome>, AnalyzerError> {
    let optimizer = state.optimizer.clone();
    let outcome = tokio::task::spawn_blocking(move || optimizer.run_cycle())
        .await
        .map_err(|e| AnalyzerError::Optimizer(e.to_string()))?;
    Ok(Json(outcome))
}

// ---- /experiments ----

#[derive(Debug, Deserialize, Serialize)]
struct ExperimentReq {
    configuration_a: serde_json::Value,
    configuration_b: serde_json::Value,
    sample_size: u64,
    duration_days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentRecord {
    id: String,
    created_at: chrono::DateTime<Utc>,
    spec: serde_json::Value,
    status: String,
}

#[derive(Serialize)]
struct ExperimentResp {
    id: String,
    status: String,
}

/// The A/B runner itself is an external collaborator; this endpoint only
/// registers the experiment spec for it to pick up.
async fn create_experiment(
    State(state): State<AppState>,
    Json(body): Json<ExperimentReq>,
) -> Result<Json<ExperimentResp>, AnalyzerError> {
    let id = state.eventlog.tracing_id("experiment");
    let record = ExperimentRecord {
        id: id.clone(),
        created_at: Utc::now(),
        spec: serde_json::to_value(&body).unwrap_or_default(),
        status: "created".to_string(),
    };

    let index_path = state.experiments_dir.join("index.json");
    std::fs::create_dir_all(&state.experiments_dir)
        .map_err(|e| AnalyzerError::Persistence(format!("create experiments dir: {e}")))?;
    let mut records: Vec<ExperimentRecord> = std::fs::read_to_string(&index_path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    records.push(record);
    let body_out = serde_json::to_vec_pretty(&records)
        .map_err(|e| AnalyzerError::Persistence(format!("serialize experiments: {e}")))?;
    std::fs::write(&index_path, body_out)
        .map_err(|e| AnalyzerError::Persistence(format!("write experiments index: {e}")))?;

    Ok(Json(ExperimentResp {
        id,
        status: "created".to_string(),
    }))
}

// ---- /monitoring/dashboard ----

#[derive(Serialize)]
struct DashboardResp {
    window_minutes: i64,
    quality: QualityReport,
    /// Keywords whose tracked series grew past the emerging threshold in the
    /// last 30 days, with their growth factors.
    emerging_keywords: Vec<(String, f64)>,
    worker_active_depth: usize,
}

async fn monitoring_dashboard(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<DashboardResp>, AnalyzerError> {
    let window_minutes: i64 = q
        .get("window_minutes")
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let now = Utc::now();
    let entries = state.eventlog.read_range(
        now - ChronoDuration::minutes(window_minutes),
        now,
        None,
        None,
    )?;
    Ok(Json(DashboardResp {
        window_minutes,
        quality: quality_report(&entries),
        emerging_keywords: state.orchestrator.series().emerging_in_window(30, 0.5, now),
        worker_active_depth: state.orchestrator.active_depth(),
    }))
}

// ---- /cache/stats ----

#[derive(Serialize)]
struct CacheStatsResp {
    niche_ttl_secs: HashMap<String, u64>,
    worker_active_depth: usize,
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResp> {
    let mut niche_ttl_secs = HashMap::new();
    for niche in Niche::ALL {
        let cfg = state.orchestrator.resolver().config(niche);
        niche_ttl_secs.insert(niche.to_string(), cfg.cache_ttl_secs);
    }
    Json(CacheStatsResp {
        niche_ttl_secs,
        worker_active_depth: state.orchestrator.active_depth(),
    })
}

// ---- /feedback ----

#[derive(Deserialize)]
struct FeedbackReq {
    keyword: String,
    #[serde(default)]
    performance: Option<f64>,
    #[serde(default)]
    helpful: Option<bool>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Serialize)]
struct FeedbackResp {
    status: &'static str,
}

/// Feedback intake for the learning loop: stored as a performance
/// observation the optimizer reads on its next cycle.
async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackReq>,
) -> Result<Json<FeedbackResp>, AnalyzerError> {
    let performance = body
        .performance
        .or(body.helpful.map(|h| if h { 1.0 } else { 0.0 }));

    let mut payload = serde_json::Map::new();
    if let Some(p) = performance {
        payload.insert("performance".into(), serde_json::json!(p));
    }
    if let Some(c) = &body.comment {
        payload.insert("comment".into(), serde_json::json!(c));
    }
    state.eventlog.record(
        LogKind::Performance,
        LogLevel::Info,
        &body.keyword,
        payload,
        Some("feedback".to_string()),
        None,
        None,
        None,
    )?;
    Ok(Json(FeedbackResp { status: "recorded" }))
}

// ---- /audit/report ----

#[derive(Serialize)]
struct AuditResp {
    hours: i64,
    quality: QualityReport,
    trend: TrendReport,
}

async fn audit_report(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<AuditResp>, AnalyzerError> {
    let hours: i64 = q.get("hours").and_then(|v| v.parse().ok()).unwrap_or(24);
    let now = Utc::now();
    let entries = state
        .eventlog
        .read_range(now - ChronoDuration::hours(hours), now, None, None)?;
    Ok(Json(AuditResp {
        hours,
        quality: quality_report(&entries),
        trend: trend_report(&entries, now),
    }))
}
