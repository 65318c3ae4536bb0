//! # Collaborator Seams
//! The engine does not fetch candidates or write export files itself; those
//! live in surrounding services. These traits are the contract they plug
//! into, with in-memory implementations for tests.

use crate::errors::AnalyzerError;
use crate::keyword::{EnrichedKeyword, Keyword};

/// Upstream supplier of raw candidates (suggest APIs, planner exports...).
pub trait SourceCollector: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch up to `limit` candidates for a seed query.
    fn collect(&self, seed: &str, limit: usize) -> Result<Vec<Keyword>, AnalyzerError>;
}

/// Downstream consumer of accepted candidates (CSV/JSON/XLSX writers...).
pub trait Exporter: Send + Sync {
    /// Short format tag, e.g. `csv`.
    fn format(&self) -> &str;

    fn export(&self, accepted: &[EnrichedKeyword]) -> Result<(), AnalyzerError>;
}

/// Canned collector for tests and demos.
pub struct StaticCollector {
    pub name: String,
    pub candidates: Vec<Keyword>,
}

impl SourceCollector for StaticCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, _seed: &str, limit: usize) -> Result<Vec<Keyword>, AnalyzerError> {
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

/// Captures exported batches for assertions.
#[derive(Default)]
pub struct MemoryExporter {
    pub batches: std::sync::Mutex<Vec<Vec<EnrichedKeyword>>>,
}

impl Exporter for MemoryExporter {
    fn format(&self) -> &str {
        "memory"
    }

    fn export(&self, accepted: &[EnrichedKeyword]) -> Result<(), AnalyzerError> {
        self.batches
            .lock()
            .expect("exporter lock poisoned")
            .push(accepted.to_vec());
        Ok(())
    }
}
