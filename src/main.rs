//! # Long-Tail Keyword Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server around the scoring pipeline, or runs a single
//! optimizer cycle when invoked as `longtail-keyword-analyzer optimize`.
//!
//! ## Endpoints
//! - `GET /health` — component status map
//! - `POST /process` — run a keyword batch through the pipeline
//! - `POST /optimize` — trigger one parameter-optimizer cycle
//! - `POST /experiments` — register an A/B experiment for the external runner
//! - `GET /monitoring/dashboard` — windowed quality metrics
//! - `GET /cache/stats`, `POST /feedback`, `GET /audit/report` — collaborator surfaces
//! - `GET /metrics` — Prometheus exposition
//!
//! ## Exit codes
//! `0` success · `1` configuration error · `2` insufficient data ·
//! `3` unrecoverable internal error

use std::time::Duration;

use longtail_keyword_analyzer::config::AnalyzerConfig;
use longtail_keyword_analyzer::metrics::Metrics;
use longtail_keyword_analyzer::optimizer::CycleStatus;
use longtail_keyword_analyzer::{build_state, create_router, logging};

#[tokio::main]
async fn main() {
    logging::init();
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cfg = match AnalyzerConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return 1;
        }
    };
    let pipeline_cfg = cfg.pipeline.clone();
    let logger_cfg = cfg.logger.clone();

    let state = match build_state(cfg) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return 1;
        }
    };

    // `optimize` subcommand: one cycle, exit code mirrors the outcome.
    if std::env::args().nth(1).as_deref() == Some("optimize") {
        let optimizer = state.optimizer.clone();
        let outcome = tokio::task::spawn_blocking(move || optimizer.run_cycle())
            .await
            .expect("optimizer task join");
        println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());
        return match outcome.status {
            CycleStatus::InsufficientData => 2,
            CycleStatus::TrainingFailed | CycleStatus::Failed => 3,
            _ => 0,
        };
    }

    let metrics = Metrics::init(pipeline_cfg.workers, pipeline_cfg.batch_timeout_secs);

    // Scheduled optimizer cycles (0 disables).
    let optimize_interval: u64 = std::env::var("LONGTAIL_OPTIMIZE_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);
    if optimize_interval > 0 {
        let optimizer = state.optimizer.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(optimize_interval));
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let optimizer = optimizer.clone();
                let outcome = tokio::task::spawn_blocking(move || optimizer.run_cycle()).await;
                match outcome {
                    Ok(out) => tracing::info!(target: "optimizer", status = ?out.status, "scheduled cycle finished"),
                    Err(e) => tracing::error!(target: "optimizer", error = %e, "scheduled cycle panicked"),
                }
            }
        });
    }

    // Daily event-log retention cleanup.
    {
        let eventlog = state.eventlog.clone();
        let retention = logger_cfg.retention_days;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 3600));
            loop {
                ticker.tick().await;
                let removed = eventlog.cleanup(chrono::Utc::now());
                if removed > 0 {
                    tracing::info!(target: "eventlog", removed, retention_days = retention, "retention cleanup");
                }
            }
        });
    }

    let app = create_router(state).merge(metrics.router());

    let bind = std::env::var("LONGTAIL_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("bind {bind}: {e}");
            return 3;
        }
    };
    tracing::info!(%bind, "listening");

    match axum::serve(listener, app).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("server error: {e}");
            3
        }
    }
}
