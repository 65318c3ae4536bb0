//! # Error Taxonomy
//! Machine-readable error kinds shared across the pipeline, plus the
//! per-stage outcome type the orchestrator pattern-matches on.
//!
//! Policy: analyzers never raise into the orchestrator; they return a
//! degraded result with an error marker. Only the composite and validation
//! stages may fail a whole batch, because downstream correctness cannot be
//! preserved past them. No raw backtraces cross the API boundary; every
//! error carries a stable `code` and a human message.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use thiserror::Error;

/// All error kinds the engine reports.
#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    /// Malformed candidate (empty term, out-of-range market signal).
    /// Locally rejected; the batch continues.
    #[error("invalid input: {0}")]
    Input(String),

    /// Invalid configuration. Fatal at load time, warn-and-ignore at
    /// adjustment time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A stage computation failed for one candidate; the candidate passes
    /// through with a degraded signal.
    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },

    /// Batch or stage deadline exceeded; partial results are returned.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Log write or model (de)serialization failure after retries.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Model training or prediction failed; parameters stay unchanged.
    #[error("optimizer failure: {0}")]
    Optimizer(String),
}

impl AnalyzerError {
    /// Stable machine-readable code for the API boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AnalyzerError::Input(_) => "input_error",
            AnalyzerError::Config(_) => "config_error",
            AnalyzerError::Stage { .. } => "stage_error",
            AnalyzerError::Timeout(_) => "timeout_error",
            AnalyzerError::Persistence(_) => "persistence_error",
            AnalyzerError::Optimizer(_) => "optimizer_error",
        }
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        AnalyzerError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// JSON body returned for errors at the HTTP boundary.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AnalyzerError::Input(_) => StatusCode::BAD_REQUEST,
            AnalyzerError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalyzerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Result of running one stage over one candidate or one batch.
///
/// `Degraded` carries a usable value plus the error that made it partial;
/// the orchestrator logs it and keeps going. `Fatal` aborts the batch.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Success(T),
    Degraded(T, AnalyzerError),
    Fatal(AnalyzerError),
}

impl<T> StageOutcome<T> {
    /// The carried value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            StageOutcome::Success(v) | StageOutcome::Degraded(v, _) => Some(v),
            StageOutcome::Fatal(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AnalyzerError> {
        match self {
            StageOutcome::Success(_) => None,
            StageOutcome::Degraded(_, e) | StageOutcome::Fatal(e) => Some(e),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal(_))
    }
}
