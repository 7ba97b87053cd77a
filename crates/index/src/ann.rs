//! Approximate Nearest Neighbor (ANN) search using the HNSW algorithm.
//!
//! [`HnswIndex`] keeps the authoritative vectors in a map keyed by metric id
//! and builds a Hierarchical Navigable Small World graph over them lazily, on
//! the first search after a write. Graph candidates are always re-scored with
//! exact cosine similarity, so reported scores never depend on the graph's
//! approximation, only recall does.
//!
//! ## Trade-offs
//!
//! - **Small catalogs** (below `min_vectors_for_ann`) use an exact linear scan
//!   and never build a graph.
//! - **Writes** only mark the graph dirty; the rebuild cost is paid by the next
//!   search, once per batch of writes.
//! - **Recall** is bounded by `ef_search` and `oversample`; raise them when a
//!   catalog grows into the tens of thousands.
//!
//! The index is ephemeral: it is rebuilt from the catalog when the engine
//! starts.

use crate::backend::VectorIndex;
use crate::similarity::{cosine_similarity, rank_hits};
use crate::{IndexError, IndexHit, MetricId};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Configuration for HNSW graph construction and search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    /// Default: 50
    pub ef_search: usize,
    /// Whether to use the graph at all. When false every search is a linear scan.
    /// Default: true
    pub enabled: bool,
    /// Minimum number of vectors before the graph is used.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
    /// Graph candidates fetched per requested result before exact re-scoring.
    /// Default: 4
    pub oversample: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            enabled: true,
            min_vectors_for_ann: 1000,
            oversample: 4,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample;
        self
    }

    /// Check if the graph should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

// hnsw_rs needs a handful of points before its layer estimate is meaningful.
const MIN_GRAPH_POINTS: usize = 10;

struct Graph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Graph origin id -> metric id, fixed at build time.
    slots: Vec<MetricId>,
}

#[derive(Default)]
struct Inner {
    vectors: BTreeMap<MetricId, Vec<f32>>,
    graph: Option<Graph>,
    dirty: bool,
}

/// In-process HNSW index with exact re-scoring.
pub struct HnswIndex {
    config: AnnConfig,
    dimension: usize,
    inner: RwLock<Inner>,
}

impl HnswIndex {
    /// Create a new empty index.
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &AnnConfig {
        &self.config
    }

    /// True when the graph exists and reflects every write.
    pub fn is_built(&self) -> bool {
        self.read()
            .map(|inner| inner.graph.is_some() && !inner.dirty)
            .unwrap_or(false)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, IndexError> {
        self.inner
            .read()
            .map_err(|_| IndexError::Backend("hnsw index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, IndexError> {
        self.inner
            .write()
            .map_err(|_| IndexError::Backend("hnsw index lock poisoned".into()))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn build_graph(&self, vectors: &BTreeMap<MetricId, Vec<f32>>) -> Option<Graph> {
        let nb_elem = vectors.len();
        if nb_elem < MIN_GRAPH_POINTS {
            return None;
        }
        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistCosine {},
        );

        let slots: Vec<MetricId> = vectors.keys().copied().collect();
        let data_for_insertion: Vec<(&Vec<f32>, usize)> =
            vectors.values().enumerate().map(|(idx, v)| (v, idx)).collect();
        hnsw.parallel_insert(&data_for_insertion);

        debug!(points = nb_elem, layers = nb_layer, "hnsw graph rebuilt");
        Some(Graph { hnsw, slots })
    }

    fn rebuild_if_needed(&self) -> Result<(), IndexError> {
        {
            let inner = self.read()?;
            if !inner.dirty || !self.config.should_use_ann(inner.vectors.len()) {
                return Ok(());
            }
        }
        let mut inner = self.write()?;
        // Another searcher may have rebuilt while we waited.
        if inner.dirty {
            inner.graph = self.build_graph(&inner.vectors);
            inner.dirty = false;
        }
        Ok(())
    }

    fn linear_scan(inner: &Inner, query: &[f32]) -> Vec<IndexHit> {
        inner
            .vectors
            .iter()
            .map(|(&metric_id, v)| IndexHit {
                metric_id,
                score: cosine_similarity(query, v),
            })
            .collect()
    }

    fn graph_candidates(
        &self,
        inner: &Inner,
        graph: &Graph,
        query: &[f32],
        k: usize,
    ) -> Vec<IndexHit> {
        let fetch = k.saturating_mul(self.config.oversample.max(1));
        let ef = self.config.ef_search.max(fetch);
        graph
            .hnsw
            .search(query, fetch, ef)
            .into_iter()
            .filter_map(|neighbour| graph.slots.get(neighbour.get_origin_id()))
            .filter_map(|metric_id| {
                inner.vectors.get(metric_id).map(|v| IndexHit {
                    metric_id: *metric_id,
                    score: cosine_similarity(query, v),
                })
            })
            .collect()
    }
}

impl VectorIndex for HnswIndex {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn upsert(&self, metric_id: MetricId, embedding: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(embedding)?;
        let mut inner = self.write()?;
        inner.vectors.insert(metric_id, embedding.to_vec());
        inner.dirty = true;
        Ok(())
    }

    fn remove(&self, metric_id: MetricId) -> Result<(), IndexError> {
        let mut inner = self.write()?;
        if inner.vectors.remove(&metric_id).is_some() {
            inner.dirty = true;
        }
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.check_dimension(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.rebuild_if_needed()?;

        let inner = self.read()?;
        let hits = match &inner.graph {
            Some(graph) if !inner.dirty && self.config.should_use_ann(inner.vectors.len()) => {
                self.graph_candidates(&inner, graph, query, top_k)
            }
            _ => Self::linear_scan(&inner, query),
        };
        Ok(rank_hits(hits, top_k, threshold))
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.read()?.vectors.len())
    }

    fn ids(&self) -> Result<Vec<MetricId>, IndexError> {
        Ok(self.read()?.vectors.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    #[test]
    fn test_ann_config_defaults() {
        let config = AnnConfig::default();
        assert_eq!(config.m, 16);
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.ef_search, 50);
        assert!(config.enabled);
        assert_eq!(config.min_vectors_for_ann, 1000);
        assert_eq!(config.oversample, 4);
    }

    #[test]
    fn test_should_use_ann() {
        let config = AnnConfig::default();
        assert!(config.should_use_ann(1000));
        assert!(!config.should_use_ann(999));
        assert!(!AnnConfig::default().with_enabled(false).should_use_ann(10_000));
    }

    #[test]
    fn linear_scan_ranks_and_thresholds() {
        let index = HnswIndex::new(3, AnnConfig::default());
        index.upsert(1, &[1.0, 0.0, 0.0]).unwrap();
        index.upsert(2, &[0.0, 1.0, 0.0]).unwrap();
        index.upsert(3, &[0.9, 0.1, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 5, 0.5).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.metric_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(!index.is_built());
    }

    #[test]
    fn upsert_replaces_and_remove_forgets() {
        let index = HnswIndex::new(2, AnnConfig::default());
        index.upsert(7, &[1.0, 0.0]).unwrap();
        index.upsert(7, &[0.0, 1.0]).unwrap();
        assert_eq!(index.len().unwrap(), 1);

        let hits = index.search(&[0.0, 1.0], 1, 0.9).unwrap();
        assert_eq!(hits[0].metric_id, 7);

        index.remove(7).unwrap();
        index.remove(7).unwrap();
        assert!(index.search(&[0.0, 1.0], 1, 0.0).unwrap().is_empty());
    }

    #[test]
    fn dimension_is_enforced() {
        let index = HnswIndex::new(3, AnnConfig::default());
        assert!(matches!(
            index.upsert(1, &[1.0, 0.0]),
            Err(IndexError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(
            index.search(&[1.0], 1, 0.0),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn graph_is_built_lazily_and_rescored_exactly() {
        let index = HnswIndex::new(8, AnnConfig::default().with_min_vectors_for_ann(1));
        for i in 0..32u64 {
            let mut v = axis(8, i as usize);
            v[(i as usize + 1) % 8] = 0.1 * (i as f32 / 32.0);
            index.upsert(i + 1, &v).unwrap();
        }
        assert!(!index.is_built());

        let query = axis(8, 0);
        let hits = index.search(&query, 3, 0.0).unwrap();
        assert!(index.is_built());
        assert!(!hits.is_empty());
        for hit in &hits {
            let inner = index.read().unwrap();
            let exact = cosine_similarity(&query, &inner.vectors[&hit.metric_id]);
            assert!((hit.score - exact).abs() < 1e-6);
        }
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        index.upsert(100, &query).unwrap();
        assert!(!index.is_built());
        let hits = index.search(&query, 1, 0.99).unwrap();
        assert!(index.is_built());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn zero_top_k_returns_nothing() {
        let index = HnswIndex::new(2, AnnConfig::default());
        index.upsert(1, &[1.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 0, 0.0).unwrap().is_empty());
    }
}
