//! # Pipeline Orchestrator
//! Sequences the analyzer stages over a batch: niche resolution once, then
//! significance → complexity → competitive → trend → composite → validation.
//!
//! Three strategies: cascade (serial stages over the whole batch), parallel
//! (the four input-only signal stages fan out over a bounded worker pool,
//! then composite and validation join), and adaptive (picks by batch size).
//! Output order always follows input order.
//!
//! Analyzer stages never abort the batch; a failed candidate passes through
//! degraded. Composite and validation are the only stages allowed to fail
//! the whole run, since nothing downstream of them could be trusted.

pub mod report;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::competitive::CompetitiveScorer;
use crate::complexity::{ComplexityAnalyzer, ComplexityConfig};
use crate::composite::{self, CompositeInputs, CompositeScorer};
use crate::errors::{AnalyzerError, StageOutcome};
use crate::eventlog::{EventLog, LogKind, LogLevel};
use crate::keyword::{EnrichedKeyword, Keyword};
use crate::niche::{Niche, NicheConfig, NicheResolver};
use crate::significance::{Locale, SignificanceAnalyzer, SignificanceConfig};
use crate::trend::{SeriesStore, TrendAnalyzer, TrendConfig};
use crate::validate::{
    Severity, ValidationCriterion, ValidationResult, ValidationStatus, Validator, ValidatorConfig,
};

pub use report::{BatchStatus, PipelineReport, StageMetrics};
pub use worker::WorkerPool;

/// Stage names in execution order, used for progress reporting.
const STAGES: [&str; 8] = [
    "input",
    "niche",
    "significance",
    "complexity",
    "competitive",
    "trend",
    "composite",
    "validation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Cascade,
    Parallel,
    Adaptive,
}

/// Cooperative cancellation flag checked at stage boundaries.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Invoked with `(stage_name, current_step, total_steps)` after each stage.
/// Must not block; the pipeline calls it inline.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProcessOptions {
    pub niche: Option<Niche>,
    pub locale: Option<Locale>,
    pub strategy: Option<Strategy>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelToken>,
    /// Also write a performance record for the batch report.
    pub emit_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub strategy: Strategy,
    /// Batches below this size run cascade under the adaptive strategy.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    /// Worker threads; `0` sizes to the host.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    #[serde(default)]
    pub locale: Locale,
}

fn default_parallel_threshold() -> usize {
    32
}

fn default_batch_timeout() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            parallel_threshold: default_parallel_threshold(),
            workers: 0,
            batch_timeout_secs: default_batch_timeout(),
            locale: Locale::default(),
        }
    }
}

/// Everything a batch run returns.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub accepted: Vec<EnrichedKeyword>,
    pub results: Vec<ValidationResult>,
    pub report: PipelineReport,
}

pub struct Orchestrator {
    cfg: PipelineConfig,
    resolver: NicheResolver,
    series: SeriesStore,
    eventlog: Arc<EventLog>,
    pool: WorkerPool,
    competitive: CompetitiveScorer,
    composite: CompositeScorer,
    trend: TrendAnalyzer,
    validator_cfg: ValidatorConfig,
}

impl Orchestrator {
    pub fn new(
        cfg: PipelineConfig,
        resolver: NicheResolver,
        series: SeriesStore,
        eventlog: Arc<EventLog>,
    ) -> Self {
        let pool = if cfg.workers == 0 {
            WorkerPool::default_for_host()
        } else {
            WorkerPool::new(cfg.workers, cfg.workers * 4)
        };
        Self {
            cfg,
            resolver,
            series,
            eventlog,
            pool,
            competitive: CompetitiveScorer::new(),
            composite: CompositeScorer::default(),
            trend: TrendAnalyzer::new(TrendConfig::default()),
            validator_cfg: ValidatorConfig::default(),
        }
    }

    /// Override the validator's aggregation cut-offs (builder style).
    pub fn with_validator_config(mut self, cfg: ValidatorConfig) -> Self {
        self.validator_cfg = cfg;
        self
    }

    pub fn resolver(&self) -> &NicheResolver {
        &self.resolver
    }

    pub fn series(&self) -> &SeriesStore {
        &self.series
    }

    /// Items currently in flight on the worker pool; callers use this to
    /// throttle submission.
    pub fn active_depth(&self) -> usize {
        self.pool.active_depth()
    }

    /// Run one batch. Returns the accepted candidates, every validation
    /// result (in input order), and the aggregate report.
    pub fn process(
        &self,
        keywords: Vec<Keyword>,
        options: ProcessOptions,
    ) -> Result<BatchOutcome, AnalyzerError> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.cfg.batch_timeout_secs);
        let total_input = keywords.len();

        let tracing_id = self
            .eventlog
            .tracing_id(keywords.first().map(|k| k.term.as_str()).unwrap_or("batch"));

        let mut run = Run {
            orchestrator: self,
            options: &options,
            tracing_id: tracing_id.clone(),
            deadline,
            stages: Vec::new(),
            step: 0,
        };

        // Stage: input validation. Malformed candidates are rejected locally
        // and the batch continues without them.
        let stage_start = Instant::now();
        let mut enriched: Vec<EnrichedKeyword> = Vec::with_capacity(keywords.len());
        let mut results: Vec<ValidationResult> = Vec::new();
        let mut input_errors = 0usize;
        for kw in keywords {
            match kw.validate() {
                Ok(()) => enriched.push(EnrichedKeyword::new(kw)),
                Err(reason) => {
                    input_errors += 1;
                    warn!(target: "pipeline", keyword = %kw.term, %reason, "candidate rejected at input");
                    let _ = self.eventlog.record(
                        LogKind::Rejection,
                        LogLevel::Warn,
                        &kw.term,
                        serde_json::Map::new(),
                        Some("invalid_input".to_string()),
                        None,
                        Some(reason.clone()),
                        Some(&tracing_id),
                    );
                    results.push(input_rejection(&kw.term, reason, &tracing_id));
                }
            }
        }
        run.finish_stage("input", stage_start, total_input, enriched.len(), input_errors);

        if let Some(partial) = run.cancelled_outcome(&enriched, &results, Niche::Generic, total_input) {
            return Ok(partial);
        }

        // Stage: niche resolution, once per batch. The niche's own analysis
        // timeout tightens the batch deadline when it is stricter.
        let stage_start = Instant::now();
        let niche = self.detect_batch_niche(&enriched, options.niche);
        let niche_cfg = self.resolver.config(niche);
        let niche_deadline = started + Duration::from_secs(niche_cfg.timeout_secs.max(1));
        if niche_deadline < run.deadline {
            run.deadline = niche_deadline;
        }
        run.finish_stage("niche", stage_start, enriched.len(), enriched.len(), 0);

        let locale = options.locale.unwrap_or(self.cfg.locale);
        let significance = SignificanceAnalyzer::new(SignificanceConfig {
            locale,
            ..Default::default()
        });
        let complexity = ComplexityAnalyzer::new(ComplexityConfig {
            locale,
            ..Default::default()
        });

        let strategy = self.effective_strategy(options.strategy, enriched.len());

        // Analyzer stages: independent signals, per strategy.
        match strategy {
            Strategy::Parallel => {
                let stage_start = Instant::now();
                let input_size = enriched.len();
                let cfg = niche_cfg.clone();
                let sig = &significance;
                let cx = &complexity;
                let pairs: Vec<(EnrichedKeyword, usize)> =
                    self.pool.map_ordered(enriched, |_, mut e| {
                        let errors = self.apply_signals(&mut e, sig, cx, &cfg);
                        (e, errors)
                    });
                let error_count = pairs.iter().map(|(_, n)| *n).sum();
                enriched = pairs.into_iter().map(|(e, _)| e).collect();
                run.finish_stage("independent_signals", stage_start, input_size, enriched.len(), error_count);
                for name in ["significance", "complexity", "competitive", "trend"] {
                    run.progress(name);
                }
            }
            Strategy::Cascade | Strategy::Adaptive => {
                for stage in ["significance", "complexity", "competitive", "trend"] {
                    let stage_start = Instant::now();
                    let input_size = enriched.len();
                    let mut error_count = 0usize;
                    for e in enriched.iter_mut() {
                        let outcome = match stage {
                            "significance" => self.stage_significance(e, &significance),
                            "complexity" => self.stage_complexity(e, &complexity),
                            "competitive" => self.stage_competitive(e, &niche_cfg),
                            _ => self.stage_trend(e),
                        };
                        error_count += self.settle(e, stage, outcome);
                    }
                    run.finish_stage(stage, stage_start, input_size, enriched.len(), error_count);

                    if let Some(partial) =
                        run.cancelled_outcome(&enriched, &results, niche, total_input)
                    {
                        return Ok(partial);
                    }
                }
            }
        }

        if let Some(partial) = run.cancelled_outcome(&enriched, &results, niche, total_input) {
            return Ok(partial);
        }

        // Stage: composite. A failure here is fatal for the batch.
        let stage_start = Instant::now();
        for e in enriched.iter_mut() {
            let inputs = CompositeInputs {
                complexity: e.complexity,
                specificity: composite::specificity(e.term(), &niche_cfg),
                competitive: e.competitive,
                trend: e.trend,
            };
            match self.composite.score(&inputs, &niche_cfg) {
                Ok(out) => {
                    e.composite = out.score;
                    e.composite_band = out.band;
                    e.confidence = out.confidence;
                    e.weights_applied = out.weights_applied;
                }
                Err(err) => {
                    let _ = self.eventlog.record(
                        LogKind::Error,
                        LogLevel::Error,
                        e.term(),
                        serde_json::Map::new(),
                        Some("composite_failed".to_string()),
                        None,
                        Some(err.to_string()),
                        Some(&tracing_id),
                    );
                    return Err(AnalyzerError::stage("composite", err.to_string()));
                }
            }
        }
        run.finish_stage("composite", stage_start, enriched.len(), enriched.len(), 0);

        if let Some(partial) = run.cancelled_outcome(&enriched, &results, niche, total_input) {
            return Ok(partial);
        }

        // Stage: validation.
        let stage_start = Instant::now();
        let validator = Validator::with_config(significance.clone(), self.validator_cfg);
        let mut accepted = Vec::new();
        for e in enriched.iter() {
            let result = validator.validate(e, &niche_cfg, &tracing_id);
            self.log_validation(&result);
            if result.status == ValidationStatus::Approved {
                accepted.push(e.clone());
            }
            results.push(result);
        }
        run.finish_stage("validation", stage_start, enriched.len(), accepted.len(), 0);

        let stages = run.stages;
        let report = PipelineReport::build(
            tracing_id.clone(),
            strategy,
            niche,
            BatchStatus::Completed,
            total_input,
            &enriched,
            &results,
            stages,
        );

        metrics::counter!("pipeline_batches_total").increment(1);
        metrics::counter!("pipeline_accepted_total").increment(report.accepted as u64);
        metrics::counter!("pipeline_rejected_total").increment(report.rejected as u64);

        let mut payload = serde_json::Map::new();
        payload.insert("total".into(), serde_json::json!(report.total_candidates));
        payload.insert("accepted".into(), serde_json::json!(report.accepted));
        payload.insert("strategy".into(), serde_json::json!(strategy));
        let _ = self.eventlog.record(
            LogKind::Processing,
            LogLevel::Info,
            "batch",
            payload,
            Some("completed".to_string()),
            Some(started.elapsed().as_secs_f64()),
            None,
            Some(&tracing_id),
        );
        if options.emit_report {
            let mut payload = serde_json::Map::new();
            payload.insert("report".into(), serde_json::to_value(&report).unwrap_or_default());
            let _ = self.eventlog.record(
                LogKind::Performance,
                LogLevel::Info,
                "batch",
                payload,
                None,
                Some(started.elapsed().as_secs_f64()),
                None,
                Some(&tracing_id),
            );
        }

        info!(
            target: "pipeline",
            tracing_id = %tracing_id,
            niche = %niche,
            total = report.total_candidates,
            accepted = report.accepted,
            "batch completed"
        );

        Ok(BatchOutcome {
            accepted,
            results,
            report,
        })
    }

    /// Per-candidate niche votes, majority wins; ties resolve in declared
    /// niche order so reruns are deterministic.
    fn detect_batch_niche(&self, batch: &[EnrichedKeyword], hint: Option<Niche>) -> Niche {
        if batch.is_empty() {
            return hint.unwrap_or(Niche::Generic);
        }
        let mut votes: HashMap<Niche, usize> = HashMap::new();
        for e in batch {
            *votes.entry(self.resolver.detect(e.term(), hint)).or_default() += 1;
        }
        Niche::ALL
            .iter()
            .copied()
            .max_by_key(|n| votes.get(n).copied().unwrap_or(0))
            .unwrap_or(Niche::Generic)
    }

    fn effective_strategy(&self, requested: Option<Strategy>, batch_size: usize) -> Strategy {
        match requested.unwrap_or(self.cfg.strategy) {
            Strategy::Adaptive => {
                if batch_size < self.cfg.parallel_threshold {
                    Strategy::Cascade
                } else {
                    Strategy::Parallel
                }
            }
            other => other,
        }
    }

    /// All four independent signals for one candidate; returns the number of
    /// degraded stages. Used by the parallel path.
    fn apply_signals(
        &self,
        e: &mut EnrichedKeyword,
        significance: &SignificanceAnalyzer,
        complexity: &ComplexityAnalyzer,
        cfg: &NicheConfig,
    ) -> usize {
        let mut errors = 0usize;
        let outcomes = [
            ("significance", self.stage_significance(e, significance)),
            ("complexity", self.stage_complexity(e, complexity)),
            ("competitive", self.stage_competitive(e, cfg)),
            ("trend", self.stage_trend(e)),
        ];
        for (stage, outcome) in outcomes {
            errors += self.settle(e, stage, outcome);
        }
        errors
    }

    fn stage_significance(
        &self,
        e: &mut EnrichedKeyword,
        analyzer: &SignificanceAnalyzer,
    ) -> StageOutcome<()> {
        let analysis = analyzer.analyze(e.term());
        if !analysis.score.is_finite() {
            e.significance = 0.0;
            return StageOutcome::Degraded((), AnalyzerError::stage("significance", "non-finite score"));
        }
        e.significance = analysis.score;
        StageOutcome::Success(())
    }

    fn stage_complexity(
        &self,
        e: &mut EnrichedKeyword,
        analyzer: &ComplexityAnalyzer,
    ) -> StageOutcome<()> {
        let analysis = analyzer.analyze(e.term());
        if !analysis.score.is_finite() {
            e.complexity = 0.0;
            return StageOutcome::Degraded((), AnalyzerError::stage("complexity", "non-finite score"));
        }
        e.complexity = analysis.score;
        e.complexity_band = analysis.band;
        StageOutcome::Success(())
    }

    fn stage_competitive(&self, e: &mut EnrichedKeyword, cfg: &NicheConfig) -> StageOutcome<()> {
        let score = self.competitive.score(&e.keyword, cfg);
        if !score.score.is_finite() {
            e.competitive = 0.0;
            return StageOutcome::Degraded((), AnalyzerError::stage("competitive", "non-finite score"));
        }
        e.competitive = score.score;
        e.competitiveness_band = score.band;
        StageOutcome::Success(())
    }

    fn stage_trend(&self, e: &mut EnrichedKeyword) -> StageOutcome<()> {
        let samples = self.series.snapshot(e.term());
        let analysis = self.trend.analyze(&samples);
        e.trend = analysis.score;
        e.trend_direction = analysis.direction;
        StageOutcome::Success(())
    }

    /// Fold one stage outcome into the candidate, logging degradations.
    fn settle(&self, e: &EnrichedKeyword, stage: &str, outcome: StageOutcome<()>) -> usize {
        match outcome {
            StageOutcome::Success(()) => 0,
            StageOutcome::Degraded((), err) => {
                metrics::counter!("pipeline_stage_errors_total", "stage" => stage.to_string()).increment(1);
                let _ = self.eventlog.record(
                    LogKind::Error,
                    LogLevel::Error,
                    e.term(),
                    serde_json::Map::new(),
                    Some("degraded".to_string()),
                    None,
                    Some(err.to_string()),
                    None,
                );
                1
            }
            // Fatal outcomes from analyzer stages are downgraded by policy:
            // only composite/validation abort the batch.
            StageOutcome::Fatal(err) => {
                warn!(target: "pipeline", stage, error = %err, "analyzer stage reported fatal; continuing degraded");
                1
            }
        }
    }

    fn log_validation(&self, result: &ValidationResult) {
        let kind = match result.status {
            ValidationStatus::Approved => LogKind::Acceptance,
            ValidationStatus::Pending => LogKind::Validation,
            _ => LogKind::Rejection,
        };
        let mut payload = serde_json::Map::new();
        payload.insert("score".into(), serde_json::json!(result.score));
        payload.insert("niche".into(), serde_json::json!(result.niche_applied));
        let failing: Vec<&str> = result
            .criteria
            .iter()
            .filter(|c| c.status != ValidationStatus::Approved)
            .map(|c| c.name.as_str())
            .collect();
        if !failing.is_empty() {
            payload.insert("failed_criteria".into(), serde_json::json!(failing));
        }
        let _ = self.eventlog.record(
            kind,
            LogLevel::Info,
            &result.keyword,
            payload,
            Some(format!("{:?}", result.status).to_lowercase()),
            Some(result.elapsed),
            None,
            Some(&result.tracing_id),
        );
    }
}

/// Book-keeping for one run: stage metrics, progress, cancellation.
struct Run<'a> {
    orchestrator: &'a Orchestrator,
    options: &'a ProcessOptions,
    tracing_id: String,
    deadline: Instant,
    stages: Vec<StageMetrics>,
    step: usize,
}

impl Run<'_> {
    fn finish_stage(
        &mut self,
        name: &str,
        started: Instant,
        input_size: usize,
        output_size: usize,
        error_count: usize,
    ) {
        self.stages.push(StageMetrics {
            stage: name.to_string(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            input_size,
            output_size,
            error_count,
        });
        if STAGES.contains(&name) {
            self.progress(name);
        }
    }

    fn progress(&mut self, name: &str) {
        self.step = (self.step + 1).min(STAGES.len());
        if let Some(cb) = &self.options.progress {
            cb(name, self.step, STAGES.len());
        }
    }

    /// Partial outcome when the token tripped or the deadline passed.
    fn cancelled_outcome(
        &mut self,
        enriched: &[EnrichedKeyword],
        results: &[ValidationResult],
        niche: Niche,
        total_input: usize,
    ) -> Option<BatchOutcome> {
        let token_tripped = self
            .options
            .cancel
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false);
        let timed_out = Instant::now() >= self.deadline;
        if !token_tripped && !timed_out {
            return None;
        }

        let reason = if timed_out { "timeout" } else { "cancelled" };
        warn!(target: "pipeline", tracing_id = %self.tracing_id, reason, "batch stopped early");
        let _ = self.orchestrator.eventlog.record(
            LogKind::Processing,
            LogLevel::Warn,
            "batch",
            serde_json::Map::new(),
            Some("cancelled".to_string()),
            None,
            Some(reason.to_string()),
            Some(&self.tracing_id),
        );

        let report = PipelineReport::build(
            self.tracing_id.clone(),
            self.options.strategy.unwrap_or_default(),
            niche,
            BatchStatus::Cancelled,
            total_input,
            enriched,
            results,
            std::mem::take(&mut self.stages),
        );
        Some(BatchOutcome {
            accepted: Vec::new(),
            results: results.to_vec(),
            report,
        })
    }
}

/// Synthetic rejection for candidates that never entered the pipeline.
fn input_rejection(term: &str, reason: String, tracing_id: &str) -> ValidationResult {
    ValidationResult {
        keyword: term.to_string(),
        status: ValidationStatus::Rejected,
        score: 0.0,
        criteria: vec![ValidationCriterion {
            name: "basic_format".to_string(),
            status: ValidationStatus::Rejected,
            actual: serde_json::json!(term),
            expected: serde_json::json!("well-formed keyword"),
            severity: Severity::Critical,
            weight: 1.0,
            message: reason,
        }],
        niche_applied: Niche::Generic,
        elapsed: 0.0,
        tracing_id: tracing_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLogConfig;
    use crate::keyword::Intent;
    use std::sync::Mutex;

    fn orchestrator(dir: &std::path::Path) -> Orchestrator {
        let eventlog = Arc::new(
            EventLog::new(EventLogConfig {
                dir: dir.to_path_buf(),
                ..Default::default()
            })
            .unwrap(),
        );
        Orchestrator::new(
            PipelineConfig {
                locale: Locale::En,
                ..Default::default()
            },
            NicheResolver::new(),
            SeriesStore::new(),
            eventlog,
        )
    }

    fn kw(term: &str, volume: u64, cpc: f64, competition: f64) -> Keyword {
        Keyword::new(term, volume, cpc, competition, Intent::Informational)
    }

    #[test]
    fn empty_batch_yields_empty_report() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let out = o.process(Vec::new(), ProcessOptions::default()).unwrap();
        assert!(out.accepted.is_empty());
        assert!(out.results.is_empty());
        assert_eq!(out.report.total_candidates, 0);
        assert_eq!(out.report.status, BatchStatus::Completed);
    }

    #[test]
    fn statuses_partition_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let batch = vec![
            kw("how to configure automatic backup on windows 11", 800, 2.8, 0.5),
            kw("x", 10, 0.01, 0.99),
            kw("", 1, 0.1, 0.5), // malformed, rejected at input
        ];
        let n = batch.len();
        let out = o.process(batch, ProcessOptions::default()).unwrap();
        assert_eq!(out.results.len(), n);
        assert_eq!(
            out.report.accepted + out.report.rejected + out.report.pending,
            n
        );
    }

    #[test]
    fn output_order_follows_input_order_in_parallel() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let batch: Vec<Keyword> = (0..40)
            .map(|i| kw(&format!("sample keyword number {i} for ordering"), 100 + i, 1.0, 0.5))
            .collect();
        let terms: Vec<String> = batch.iter().map(|k| k.term.clone()).collect();

        let out = o
            .process(
                batch,
                ProcessOptions {
                    strategy: Some(Strategy::Parallel),
                    ..Default::default()
                },
            )
            .unwrap();
        let result_terms: Vec<String> = out.results.iter().map(|r| r.keyword.clone()).collect();
        assert_eq!(result_terms, terms);
    }

    #[test]
    fn adaptive_picks_cascade_for_small_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        assert_eq!(o.effective_strategy(Some(Strategy::Adaptive), 3), Strategy::Cascade);
        assert_eq!(o.effective_strategy(Some(Strategy::Adaptive), 64), Strategy::Parallel);
    }

    #[test]
    fn progress_callback_reaches_the_final_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let seen: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let out = o
            .process(
                vec![kw("best price gaming notebook 2024", 1200, 2.5, 0.7)],
                ProcessOptions {
                    progress: Some(Arc::new(move |stage: &str, step, total| {
                        sink.lock().unwrap().push((stage.to_string(), step, total));
                    })),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(out.report.status, BatchStatus::Completed);

        let calls = seen.lock().unwrap();
        assert!(!calls.is_empty());
        let last = calls.last().unwrap();
        assert_eq!(last.0, "validation");
        assert_eq!(last.1, last.2);
    }

    #[test]
    fn cancelled_token_returns_partial_with_cancelled_status() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let token = CancelToken::new();
        token.cancel();
        let out = o
            .process(
                vec![kw("some keyword phrase here", 100, 1.0, 0.5)],
                ProcessOptions {
                    cancel: Some(token),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(out.report.status, BatchStatus::Cancelled);
        assert!(out.accepted.is_empty());
    }

    #[test]
    fn pipeline_runs_are_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path());
        let batch = || {
            vec![
                kw("how to configure automatic backup on windows 11", 800, 2.8, 0.5),
                kw("best price gaming notebook 2024", 1200, 2.5, 0.7),
            ]
        };
        let a = o.process(batch(), ProcessOptions::default()).unwrap();
        let b = o.process(batch(), ProcessOptions::default()).unwrap();
        assert_eq!(a.report.composite_bands, b.report.composite_bands);
        assert_eq!(a.report.accepted, b.report.accepted);
        for (x, y) in a.results.iter().zip(b.results.iter()) {
            assert_eq!(x.status, y.status);
            assert!((x.score - y.score).abs() < 1e-12);
        }
    }
}
