use catalog::{CatalogConfig, Metric};
use index::{ann::AnnConfig, IndexCandidate};
use serde::Serialize;

/// A retrieved metric with its similarity to the query.
///
/// Hits produced by the text fallback carry `score == 0.0`: they are matches,
/// but there is no similarity to report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricHit {
    pub metric: Metric,
    pub score: f32,
}

impl MetricHit {
    pub fn fallback(metric: Metric) -> Self {
        Self { metric, score: 0.0 }
    }
}

/// Everything needed to open a [`crate::MetricRetriever`].
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Source-of-truth store. Failing to open it is fatal.
    pub catalog: CatalogConfig,
    /// Index backends probed in order at startup. Failing to open all of them
    /// leaves the index UNAVAILABLE.
    pub index: Vec<IndexCandidate>,
}

impl RetrieverConfig {
    pub fn new(catalog: CatalogConfig) -> Self {
        Self {
            catalog,
            index: vec![IndexCandidate::Hnsw(AnnConfig::default())],
        }
    }

    /// In-memory catalog with the default HNSW index. Useful for tests.
    pub fn in_memory(dimension: usize) -> Self {
        Self::new(CatalogConfig::in_memory(dimension))
    }

    pub fn with_index(mut self, candidates: Vec<IndexCandidate>) -> Self {
        self.index = candidates;
        self
    }
}
