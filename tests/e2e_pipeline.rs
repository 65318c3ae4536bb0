// tests/e2e_pipeline.rs
//
// End-to-end batch runs through the orchestrator: rejection on weak market
// signals, acceptance in the technology niche, and ecommerce auto-detection.

use std::sync::Arc;

use longtail_keyword_analyzer::eventlog::{EventLog, EventLogConfig, LogKind};
use longtail_keyword_analyzer::keyword::{Intent, Keyword, SignalBand};
use longtail_keyword_analyzer::niche::Niche;
use longtail_keyword_analyzer::pipeline::{Orchestrator, PipelineConfig, ProcessOptions};
use longtail_keyword_analyzer::significance::Locale;
use longtail_keyword_analyzer::trend::SeriesStore;
use longtail_keyword_analyzer::validate::ValidationStatus;
use longtail_keyword_analyzer::NicheResolver;

fn orchestrator(dir: &std::path::Path) -> Orchestrator {
    let eventlog = Arc::new(
        EventLog::new(EventLogConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap(),
    );
    Orchestrator::new(
        PipelineConfig::default(),
        NicheResolver::new(),
        SeriesStore::new(),
        eventlog,
    )
}

#[test]
fn weak_candidate_is_rejected_on_composite_score() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    let out = o
        .process(
            vec![Keyword::new("x", 10, 0.01, 0.99, Intent::Informational)],
            ProcessOptions::default(),
        )
        .unwrap();

    assert!(out.accepted.is_empty());
    let result = &out.results[0];
    assert_eq!(result.status, ValidationStatus::Rejected);
    assert_eq!(result.niche_applied, Niche::Generic);

    let composite = result
        .criteria
        .iter()
        .find(|c| c.name == "composite_score")
        .unwrap();
    assert_eq!(composite.status, ValidationStatus::Rejected);
    assert!(composite.message.contains("gap"));
}

#[test]
fn technology_hint_accepts_a_strong_howto() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    let out = o
        .process(
            vec![Keyword::new(
                "how to configure automatic backup on windows 11",
                800,
                2.8,
                0.5,
                Intent::Informational,
            )],
            ProcessOptions {
                niche: Some(Niche::Technology),
                locale: Some(Locale::En),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(out.report.niche, Niche::Technology);
    assert_eq!(out.accepted.len(), 1);

    let e = &out.accepted[0];
    assert!(e.composite >= 0.7, "composite {}", e.composite);
    assert!(
        matches!(e.complexity_band, SignalBand::High | SignalBand::VeryHigh),
        "complexity band {:?}",
        e.complexity_band
    );
    assert_eq!(out.results[0].status, ValidationStatus::Approved);
}

#[test]
fn ecommerce_is_detected_without_a_hint() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    let out = o
        .process(
            vec![Keyword::new(
                "best price gaming notebook 2024",
                1200,
                2.5,
                0.7,
                Intent::Transactional,
            )],
            ProcessOptions {
                locale: Some(Locale::En),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(out.report.niche, Niche::Ecommerce);
    // The ecommerce acceptance threshold (0.65), not the generic 0.70, must
    // be the one the composite criterion was checked against.
    let composite = out.results[0]
        .criteria
        .iter()
        .find(|c| c.name == "composite_score")
        .unwrap();
    assert_eq!(composite.expected, serde_json::json!(0.65));
}

#[test]
fn batch_events_land_in_the_log() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    o.process(
        vec![
            Keyword::new("melhor notebook para estudo universitario", 400, 1.2, 0.4, Intent::Investigative),
            Keyword::new("x", 10, 0.01, 0.99, Intent::Informational),
        ],
        ProcessOptions::default(),
    )
    .unwrap();

    let eventlog = EventLog::new(EventLogConfig {
        dir: tmp.path().to_path_buf(),
        ..Default::default()
    })
    .unwrap();
    let now = chrono::Utc::now();
    let entries = eventlog
        .read_range(now - chrono::Duration::hours(1), now, None, None)
        .unwrap();

    assert!(entries.iter().any(|e| e.kind == LogKind::Processing));
    assert!(entries.iter().any(|e| e.kind == LogKind::Rejection));
    // Every event of this run carries a tracing id.
    assert!(entries.iter().all(|e| !e.tracing_id.is_empty()));
}

#[test]
fn trend_stage_reads_the_series_store() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    let term = "curso de fotografia digital avancada";
    let now = chrono::Utc::now();
    for (i, v) in [100u64, 140, 180, 220, 260, 300].iter().enumerate() {
        o.series()
            .record(
                term,
                longtail_keyword_analyzer::trend::TrendSample::new(
                    now - chrono::Duration::days(12 - 2 * i as i64),
                    *v,
                    1.0,
                    0.5,
                ),
            )
            .unwrap();
    }

    let out = o
        .process(
            vec![Keyword::new(term, 300, 1.0, 0.5, Intent::Informational)],
            ProcessOptions::default(),
        )
        .unwrap();

    let result_for_term = out
        .results
        .iter()
        .find(|r| r.keyword == term)
        .expect("result present");
    assert_eq!(result_for_term.keyword, term);
    assert_eq!(out.report.emerging, 1);
}
