// tests/invariants.rs
//
// Cross-cutting guarantees: every emitted scalar stays in [0, 1] under
// randomized input, resolved weights always sum to one, and identical runs
// produce identical reports once the wall-clock fields are masked.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use longtail_keyword_analyzer::eventlog::{EventLog, EventLogConfig};
use longtail_keyword_analyzer::keyword::{Intent, Keyword};
use longtail_keyword_analyzer::niche::{Niche, NicheConfig};
use longtail_keyword_analyzer::pipeline::{Orchestrator, PipelineConfig, ProcessOptions};
use longtail_keyword_analyzer::trend::SeriesStore;
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

fn random_keyword(rng: &mut StdRng) -> Keyword {
    let words = [
        "como", "melhor", "curso", "notebook", "barato", "tratamento", "investimento",
        "tutorial", "backup", "preco", "avancado", "digital", "2024", "x", "de",
    ];
    let n = rng.random_range(1..=7);
    let term: Vec<&str> = (0..n).map(|_| words[rng.random_range(0..words.len())]).collect();
    let intent = match rng.random_range(0..4) {
        0 => Intent::Informational,
        1 => Intent::Transactional,
        2 => Intent::Navigational,
        _ => Intent::Investigative,
    };
    Keyword::new(
        term.join(" "),
        rng.random_range(0..100_000),
        rng.random_range(0.0..60.0),
        rng.random_range(0.0..=1.0),
        intent,
    )
}

#[test]
fn every_emitted_scalar_stays_in_the_unit_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());
    let mut rng = StdRng::seed_from_u64(7);

    let batch: Vec<Keyword> = (0..50).map(|_| random_keyword(&mut rng)).collect();
    let out = o.process(batch, ProcessOptions::default()).unwrap();

    for e in out.results.iter() {
        assert!((0.0..=1.0).contains(&e.score), "{}: {}", e.keyword, e.score);
    }
    for e in out.accepted.iter() {
        for (name, v) in [
            ("significance", e.significance),
            ("complexity", e.complexity),
            ("competitive", e.competitive),
            ("trend", e.trend),
            ("composite", e.composite),
            ("confidence", e.confidence),
        ] {
            assert!((0.0..=1.0).contains(&v), "{name} out of range: {v}");
        }
    }
}

#[test]
fn resolved_weights_sum_to_one_for_every_niche() {
    for niche in Niche::ALL {
        let w = NicheConfig::defaults(niche).weights.normalized().unwrap();
        assert!(
            (w.sum() - 1.0).abs() <= 1e-6,
            "{niche}: weights sum {}",
            w.sum()
        );
        assert!(w.complexity >= 0.0 && w.specificity >= 0.0 && w.competitive >= 0.0 && w.trend >= 0.0);
    }
}

#[test]
fn statuses_always_partition_the_input() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());
    let mut rng = StdRng::seed_from_u64(11);

    for batch_size in [0usize, 1, 9, 33] {
        let batch: Vec<Keyword> = (0..batch_size).map(|_| random_keyword(&mut rng)).collect();
        let out = o.process(batch, ProcessOptions::default()).unwrap();
        assert_eq!(
            out.report.accepted + out.report.rejected + out.report.pending,
            batch_size,
            "batch of {batch_size}"
        );
    }
}

#[test]
fn identical_runs_produce_identical_reports_modulo_clock_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let o = orchestrator(tmp.path());

    let batch = || {
        vec![
            Keyword::new("best price gaming notebook 2024", 1200, 2.5, 0.7, Intent::Transactional),
            Keyword::new("como montar plano de estudos para concurso", 700, 0.9, 0.3, Intent::Informational),
            Keyword::new("x", 10, 0.01, 0.99, Intent::Informational),
        ]
    };

    let mask = |report: &longtail_keyword_analyzer::PipelineReport| {
        let mut v = serde_json::to_value(report).unwrap();
        v["tracing_id"] = serde_json::json!("");
        for stage in v["stages"].as_array_mut().unwrap() {
            stage["elapsed_ms"] = serde_json::json!(0);
        }
        serde_json::to_string(&v).unwrap()
    };

    let a = o.process(batch(), ProcessOptions::default()).unwrap();
    let b = o.process(batch(), ProcessOptions::default()).unwrap();
    assert_eq!(mask(&a.report), mask(&b.report));
}
