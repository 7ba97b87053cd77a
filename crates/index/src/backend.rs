use crate::ann::{AnnConfig, HnswIndex};
use crate::{IndexError, IndexHit, MetricId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A similarity-search structure mirroring catalog metric embeddings.
///
/// Implementations may be native (in-process), external (a vector database)
/// or absent. Callers treat every error as "index unavailable".
pub trait VectorIndex: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    /// Fixed embedding dimension.
    fn dimension(&self) -> usize;
    /// Whether entries survive a process restart. Ephemeral indexes are
    /// rebuilt from the catalog on startup.
    fn is_durable(&self) -> bool;
    /// Insert or replace the entry for `metric_id`.
    fn upsert(&self, metric_id: MetricId, embedding: &[f32]) -> Result<(), IndexError>;
    /// Remove the entry for `metric_id`; removing a missing id is not an error.
    fn remove(&self, metric_id: MetricId) -> Result<(), IndexError>;
    /// Hits with similarity >= `threshold`, best first, ties by lowest id.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexError>;
    /// Number of indexed entries.
    fn len(&self) -> Result<usize, IndexError>;
    /// Every indexed metric id, ascending.
    fn ids(&self) -> Result<Vec<MetricId>, IndexError>;
}

/// Connection settings for the external qdrant backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// gRPC endpoint, e.g. `http://localhost:6334`.
    pub url: String,
    /// Collection holding one point per metric id.
    pub collection: String,
    pub api_key: Option<String>,
    /// Request timeout, also bounds the startup probe.
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "metrics".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}

/// One way of bringing up the index, tried in order by [`probe`].
#[derive(Clone, Debug)]
pub enum IndexCandidate {
    /// In-process HNSW graph with exact re-scoring.
    Hnsw(AnnConfig),
    /// External qdrant collection. Needs the `qdrant` feature.
    Qdrant(QdrantConfig),
    /// Explicitly no acceleration.
    Disabled,
}

impl IndexCandidate {
    pub fn name(&self) -> &'static str {
        match self {
            IndexCandidate::Hnsw(_) => "hnsw",
            IndexCandidate::Qdrant(_) => "qdrant",
            IndexCandidate::Disabled => "none",
        }
    }

    /// Initialize this candidate for vectors of `dimension`.
    pub fn open(&self, dimension: usize) -> Result<Box<dyn VectorIndex>, IndexError> {
        match self {
            IndexCandidate::Hnsw(cfg) => Ok(Box::new(HnswIndex::new(dimension, *cfg))),
            IndexCandidate::Qdrant(cfg) => {
                #[cfg(feature = "qdrant")]
                {
                    Ok(Box::new(crate::qdrant::QdrantIndex::connect(cfg, dimension)?))
                }
                #[cfg(not(feature = "qdrant"))]
                {
                    let _ = cfg;
                    Err(IndexError::Unavailable(
                        "qdrant backend disabled at compile time".into(),
                    ))
                }
            }
            IndexCandidate::Disabled => Ok(Box::new(DisabledIndex::new(dimension))),
        }
    }
}

/// Try each candidate in order; the first that initializes wins.
///
/// `Disabled` stops the search and yields `None`, as does exhausting the list.
pub fn probe(candidates: &[IndexCandidate], dimension: usize) -> Option<Box<dyn VectorIndex>> {
    for candidate in candidates {
        if matches!(candidate, IndexCandidate::Disabled) {
            info!("embedding index disabled by configuration");
            return None;
        }
        match candidate.open(dimension) {
            Ok(index) => {
                info!(backend = index.name(), dimension, "embedding index available");
                return Some(index);
            }
            Err(err) => {
                debug!(backend = candidate.name(), error = %err, "index candidate failed");
            }
        }
    }
    warn!(
        tried = candidates.len(),
        "no embedding index backend could be initialized; using text fallback"
    );
    None
}

/// The "no acceleration" backend. Every call reports unavailability.
pub struct DisabledIndex {
    dimension: usize,
}

impl DisabledIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn unavailable<T>(&self) -> Result<T, IndexError> {
        Err(IndexError::Unavailable("embedding index disabled".into()))
    }
}

impl VectorIndex for DisabledIndex {
    fn name(&self) -> &'static str {
        "none"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn upsert(&self, _metric_id: MetricId, _embedding: &[f32]) -> Result<(), IndexError> {
        self.unavailable()
    }

    fn remove(&self, _metric_id: MetricId) -> Result<(), IndexError> {
        self.unavailable()
    }

    fn search(
        &self,
        _query: &[f32],
        _top_k: usize,
        _threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.unavailable()
    }

    fn len(&self) -> Result<usize, IndexError> {
        self.unavailable()
    }

    fn ids(&self) -> Result<Vec<MetricId>, IndexError> {
        self.unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_takes_first_success() {
        let index = probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 4).unwrap();
        assert_eq!(index.name(), "hnsw");
        assert_eq!(index.dimension(), 4);
    }

    #[cfg(not(feature = "qdrant"))]
    #[test]
    fn probe_skips_backends_that_fail_to_load() {
        let candidates = [
            IndexCandidate::Qdrant(QdrantConfig::default()),
            IndexCandidate::Hnsw(AnnConfig::default()),
        ];
        let index = probe(&candidates, 4).unwrap();
        assert_eq!(index.name(), "hnsw");
    }

    #[cfg(not(feature = "qdrant"))]
    #[test]
    fn probe_exhaustion_is_unavailable() {
        assert!(probe(&[IndexCandidate::Qdrant(QdrantConfig::default())], 4).is_none());
        assert!(probe(&[], 4).is_none());
    }

    #[test]
    fn disabled_candidate_stops_probing() {
        let candidates = [
            IndexCandidate::Disabled,
            IndexCandidate::Hnsw(AnnConfig::default()),
        ];
        assert!(probe(&candidates, 4).is_none());
    }

    #[test]
    fn disabled_index_reports_unavailable() {
        let index = DisabledIndex::new(2);
        assert!(matches!(
            index.search(&[1.0, 0.0], 1, 0.0),
            Err(IndexError::Unavailable(_))
        ));
        assert!(index.upsert(1, &[1.0, 0.0]).is_err());
        assert!(!index.is_durable());
    }
}
