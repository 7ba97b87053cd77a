//! # Metric Index
//!
//! A best-effort similarity index over catalog metric embeddings.
//!
//! The catalog store is the source of truth; this crate only mirrors the
//! `(metric_id, embedding)` pairs so that nearest-neighbor queries do not need
//! a full scan of the store. Whether acceleration exists at all is decided
//! once, at startup, by probing an ordered list of [`IndexCandidate`]s:
//!
//! - [`IndexCandidate::Hnsw`]: an in-process HNSW graph ([`ann`]).
//! - [`IndexCandidate::Qdrant`]: an external qdrant collection (`qdrant` feature).
//! - [`IndexCandidate::Disabled`]: no acceleration.
//!
//! The first candidate that initializes wins. If none does, the
//! [`EmbeddingIndex`] is [`IndexState::Unavailable`] and callers must use
//! their text fallback.
//!
//! ## State machine
//!
//! `Available -> Unavailable` happens when probing fails, or later when the
//! backend fails at runtime. There is no transition back within a process
//! lifetime.
//!
//! ## Example Usage
//!
//! ```
//! use index::{ann::AnnConfig, EmbeddingIndex, IndexCandidate, IndexState};
//!
//! let index = EmbeddingIndex::probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 2);
//! assert_eq!(index.state(), IndexState::Available);
//!
//! index.upsert(1, &[1.0, 0.0]);
//! index.upsert(2, &[0.0, 1.0]);
//! let hits = index.search(&[1.0, 0.1], 5, 0.7).unwrap();
//! assert_eq!(hits[0].metric_id, 1);
//! ```

pub mod ann;
mod backend;
#[cfg(feature = "qdrant")]
mod qdrant;
pub mod similarity;

pub use backend::{probe, DisabledIndex, IndexCandidate, QdrantConfig, VectorIndex};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantIndex;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::warn;

/// Metric ids are the catalog's integer identifiers.
pub type MetricId = u64;

/// A single nearest-neighbor result. `score` is cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub metric_id: MetricId,
    pub score: f32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("embedding index unavailable: {0}")]
    Unavailable(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("index backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexState {
    Available,
    Unavailable,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexState::Available => f.write_str("AVAILABLE"),
            IndexState::Unavailable => f.write_str("UNAVAILABLE"),
        }
    }
}

/// The engine-facing index: an optional backend plus a one-way availability
/// flag.
///
/// Writes never fail from the caller's point of view; a failing backend is
/// logged and the index downgrades itself to unavailable. Searches report
/// unavailability as an error so callers can fall back.
pub struct EmbeddingIndex {
    backend: Option<Box<dyn VectorIndex>>,
    available: AtomicBool,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Probe `candidates` in order and keep the first one that initializes.
    pub fn probe(candidates: &[IndexCandidate], dimension: usize) -> Self {
        match backend::probe(candidates, dimension) {
            Some(backend) => Self::from_backend(backend),
            None => Self::unavailable(dimension),
        }
    }

    /// Wrap an already-initialized backend.
    pub fn from_backend(backend: Box<dyn VectorIndex>) -> Self {
        let dimension = backend.dimension();
        Self {
            backend: Some(backend),
            available: AtomicBool::new(true),
            dimension,
        }
    }

    pub fn unavailable(dimension: usize) -> Self {
        Self {
            backend: None,
            available: AtomicBool::new(false),
            dimension,
        }
    }

    pub fn state(&self) -> IndexState {
        if self.backend.is_some() && self.available.load(Ordering::Acquire) {
            IndexState::Available
        } else {
            IndexState::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        self.state() == IndexState::Available
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the active backend, if any.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend
            .as_deref()
            .filter(|_| self.is_available())
            .map(|b| b.name())
    }

    /// Permanently switch to the text fallback for this process.
    pub fn force_unavailable(&self, reason: &str) {
        if self.available.swap(false, Ordering::AcqRel) {
            warn!(reason, "embedding index downgraded to UNAVAILABLE");
        }
    }

    /// True when the active backend does not persist entries and must be
    /// refilled from the catalog after startup.
    pub fn needs_rebuild(&self) -> bool {
        self.active().map(|b| !b.is_durable()).unwrap_or(false)
    }

    /// Load every `(metric_id, embedding)` pair. Stops and downgrades on the
    /// first backend failure.
    pub fn rebuild<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (MetricId, Vec<f32>)>,
    {
        let mut loaded = 0;
        for (metric_id, embedding) in entries {
            if !self.upsert(metric_id, &embedding) {
                break;
            }
            loaded += 1;
        }
        loaded
    }

    /// Make a durable backend match the catalog's `(metric_id, embedding)`
    /// pairs: ids the catalog no longer has are removed and every pair is
    /// re-upserted. Returns `(removed, loaded)`, or `None` when the backend
    /// failed part way and the index downgraded.
    pub fn reconcile(&self, entries: Vec<(MetricId, Vec<f32>)>) -> Option<(usize, usize)> {
        let backend = self.active()?;
        let indexed = match backend.ids() {
            Ok(ids) => ids,
            Err(err) => {
                self.downgrade(backend.name(), "ids", &err);
                return None;
            }
        };

        let live: BTreeSet<MetricId> = entries.iter().map(|(id, _)| *id).collect();
        let mut removed = 0;
        for metric_id in indexed.into_iter().filter(|id| !live.contains(id)) {
            if !self.remove(metric_id) {
                return None;
            }
            removed += 1;
        }

        let total = entries.len();
        let loaded = self.rebuild(entries);
        (loaded == total).then_some((removed, loaded))
    }

    /// Mirror a catalog embedding. Returns false when the index is (or just
    /// became) unavailable.
    pub fn upsert(&self, metric_id: MetricId, embedding: &[f32]) -> bool {
        let Some(backend) = self.active() else {
            return false;
        };
        match backend.upsert(metric_id, embedding) {
            Ok(()) => true,
            Err(err) => {
                self.downgrade(backend.name(), "upsert", &err);
                false
            }
        }
    }

    /// Drop a metric from the mirror. Returns false when the index is (or just
    /// became) unavailable.
    pub fn remove(&self, metric_id: MetricId) -> bool {
        let Some(backend) = self.active() else {
            return false;
        };
        match backend.remove(metric_id) {
            Ok(()) => true,
            Err(err) => {
                self.downgrade(backend.name(), "remove", &err);
                false
            }
        }
    }

    /// Nearest neighbors by cosine similarity, best first, ties by lowest id.
    ///
    /// A query of the wrong dimension is rejected without touching the
    /// backend or the availability state.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        let backend = self
            .active()
            .ok_or_else(|| IndexError::Unavailable("no active backend".into()))?;
        backend.search(query, top_k, threshold).map_err(|err| {
            self.downgrade(backend.name(), "search", &err);
            IndexError::Unavailable(err.to_string())
        })
    }

    /// Number of mirrored entries, if the index is available.
    pub fn len(&self) -> Option<usize> {
        self.active().and_then(|b| b.len().ok())
    }

    fn active(&self) -> Option<&dyn VectorIndex> {
        self.backend.as_deref().filter(|_| self.is_available())
    }

    fn downgrade(&self, backend: &str, op: &str, err: &IndexError) {
        warn!(backend, op, error = %err, "embedding index operation failed");
        self.force_unavailable(op);
    }
}

#[cfg(test)]
mod tests {
    use super::ann::AnnConfig;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Backend that starts failing after a number of successful calls.
    struct Flaky {
        budget: AtomicUsize,
    }

    impl Flaky {
        fn failing_after(n: usize) -> Self {
            Self {
                budget: AtomicUsize::new(n),
            }
        }

        fn tick(&self) -> Result<(), IndexError> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(IndexError::Backend("simulated failure".into()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl VectorIndex for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn is_durable(&self) -> bool {
            true
        }
        fn upsert(&self, _: MetricId, _: &[f32]) -> Result<(), IndexError> {
            self.tick()
        }
        fn remove(&self, _: MetricId) -> Result<(), IndexError> {
            self.tick()
        }
        fn search(&self, _: &[f32], _: usize, _: f32) -> Result<Vec<IndexHit>, IndexError> {
            self.tick().map(|_| Vec::new())
        }
        fn len(&self) -> Result<usize, IndexError> {
            Ok(0)
        }
        fn ids(&self) -> Result<Vec<MetricId>, IndexError> {
            self.tick().map(|_| Vec::new())
        }
    }

    #[test]
    fn probing_failure_is_unavailable() {
        let index = EmbeddingIndex::probe(&[IndexCandidate::Disabled], 3);
        assert_eq!(index.state(), IndexState::Unavailable);
        assert!(!index.upsert(1, &[1.0, 0.0, 0.0]));
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1, 0.0),
            Err(IndexError::Unavailable(_))
        ));
        assert_eq!(index.backend_name(), None);
    }

    #[test]
    fn hnsw_probe_is_available_and_needs_rebuild() {
        let index = EmbeddingIndex::probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 2);
        assert!(index.is_available());
        assert!(index.needs_rebuild());
        assert_eq!(index.backend_name(), Some("hnsw"));

        let loaded = index.rebuild(vec![(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])]);
        assert_eq!(loaded, 2);
        assert_eq!(index.len(), Some(2));
    }

    #[test]
    fn runtime_failure_downgrades_permanently() {
        let index = EmbeddingIndex::from_backend(Box::new(Flaky::failing_after(1)));
        assert!(index.upsert(1, &[1.0, 0.0]));
        assert!(!index.needs_rebuild());

        assert!(index.search(&[1.0, 0.0], 1, 0.0).is_err());
        assert_eq!(index.state(), IndexState::Unavailable);

        // No way back.
        assert!(!index.upsert(2, &[0.0, 1.0]));
        assert_eq!(index.state(), IndexState::Unavailable);
    }

    #[test]
    fn reconcile_drops_unknown_ids_and_backfills() {
        let index = EmbeddingIndex::probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 2);
        index.upsert(1, &[1.0, 0.0]);
        index.upsert(9, &[0.0, 1.0]);

        let outcome = index.reconcile(vec![(1, vec![1.0, 0.0]), (2, vec![0.6, 0.8])]);
        assert_eq!(outcome, Some((1, 2)));
        assert_eq!(index.len(), Some(2));
        let hits = index.search(&[0.0, 1.0], 5, 0.99).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn reconcile_failure_downgrades() {
        let index = EmbeddingIndex::from_backend(Box::new(Flaky::failing_after(0)));
        assert_eq!(index.reconcile(vec![(1, vec![1.0, 0.0])]), None);
        assert_eq!(index.state(), IndexState::Unavailable);
    }

    #[test]
    fn wrong_query_dimension_does_not_downgrade() {
        let index = EmbeddingIndex::probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 2);
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1, 0.0),
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert!(index.is_available());
    }

    #[test]
    fn force_unavailable_is_idempotent() {
        let index = EmbeddingIndex::probe(&[IndexCandidate::Hnsw(AnnConfig::default())], 2);
        index.force_unavailable("test");
        index.force_unavailable("test");
        assert_eq!(index.state(), IndexState::Unavailable);
        assert_eq!(index.len(), None);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let index = Arc::new(EmbeddingIndex::probe(
            &[IndexCandidate::Hnsw(AnnConfig::default())],
            2,
        ));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..50u64 {
                        index.upsert(t * 100 + i + 1, &[1.0, i as f32]);
                        let _ = index.search(&[1.0, 0.0], 3, 0.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(index.len(), Some(200));
    }

    #[test]
    fn state_display() {
        assert_eq!(IndexState::Available.to_string(), "AVAILABLE");
        assert_eq!(IndexState::Unavailable.to_string(), "UNAVAILABLE");
    }
}
