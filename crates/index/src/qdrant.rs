//! External vector store backend on a qdrant collection.
//!
//! One point per metric, keyed by the numeric metric id, cosine distance.
//! The client is async; calls are driven on an owned current-thread runtime
//! so the [`VectorIndex`] surface stays blocking.

use crate::backend::{QdrantConfig, VectorIndex};
use crate::similarity::rank_hits;
use crate::{IndexError, IndexHit, MetricId};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, PointStruct,
    PointId, PointsIdsList, QueryPointsBuilder, ScrollPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

const SCROLL_BATCH: u32 = 256;

pub struct QdrantIndex {
    client: Qdrant,
    runtime: Runtime,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Connect and make sure the collection exists. Any failure here means the
    /// candidate is unusable and probing moves on.
    pub fn connect(config: &QdrantConfig, dimension: usize) -> Result<Self, IndexError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| IndexError::Unavailable(format!("tokio runtime: {e}")))?;

        let mut builder = Qdrant::from_url(&config.url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs));
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::Unavailable(format!("qdrant client: {e}")))?;

        let index = Self {
            client,
            runtime,
            collection: config.collection.clone(),
            dimension,
        };
        index.ensure_collection()?;
        Ok(index)
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn ensure_collection(&self) -> Result<(), IndexError> {
        let exists = self
            .block_on(self.client.collection_exists(&self.collection))
            .map_err(|e| IndexError::Unavailable(format!("qdrant unreachable: {e}")))?;
        if exists {
            return Ok(());
        }
        self.block_on(self.client.create_collection(
            CreateCollectionBuilder::new(&self.collection).vectors_config(
                VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
            ),
        ))
        .map_err(|e| IndexError::Unavailable(format!("create collection: {e}")))?;
        info!(
            collection = %self.collection,
            dimension = self.dimension,
            "created qdrant collection"
        );
        Ok(())
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
}

fn backend_err(e: qdrant_client::QdrantError) -> IndexError {
    IndexError::Backend(e.to_string())
}

impl VectorIndex for QdrantIndex {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn upsert(&self, metric_id: MetricId, embedding: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(embedding)?;
        let point = PointStruct::new(metric_id, embedding.to_vec(), Payload::new());
        self.block_on(
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true)),
        )
        .map_err(backend_err)?;
        Ok(())
    }

    fn remove(&self, metric_id: MetricId) -> Result<(), IndexError> {
        self.block_on(
            self.client.delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![metric_id.into()],
                    })
                    .wait(true),
            ),
        )
        .map_err(backend_err)?;
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
        let response = self
            .block_on(
                self.client.query(
                    QueryPointsBuilder::new(&self.collection)
                        .query(query.to_vec())
                        .limit(top_k as u64)
                        .score_threshold(threshold),
                ),
            )
            .map_err(backend_err)?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| match point.id?.point_id_options? {
                PointIdOptions::Num(metric_id) => Some(IndexHit {
                    metric_id,
                    score: point.score,
                }),
                PointIdOptions::Uuid(_) => None,
            })
            .collect();
        // qdrant breaks ties arbitrarily; re-rank for a stable order.
        Ok(rank_hits(hits, top_k, threshold))
    }

    fn len(&self) -> Result<usize, IndexError> {
        let response = self
            .block_on(
                self.client
                    .count(CountPointsBuilder::new(&self.collection).exact(true)),
            )
            .map_err(backend_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn ids(&self) -> Result<Vec<MetricId>, IndexError> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_BATCH)
                .with_payload(false)
                .with_vectors(false);
            if let Some(offset_id) = offset.take() {
                builder = builder.offset(offset_id);
            }
            let response = self
                .block_on(self.client.scroll(builder))
                .map_err(backend_err)?;

            ids.extend(response.result.into_iter().filter_map(|point| {
                match point.id?.point_id_options? {
                    PointIdOptions::Num(metric_id) => Some(metric_id),
                    PointIdOptions::Uuid(_) => None,
                }
            }));
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
