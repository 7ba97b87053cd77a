use std::sync::{Arc, Mutex, MutexGuard};

use catalog::{
    validate_embedding, CatalogBackend, CatalogError, LabelId, Metric, MetricId, MetricKey,
    NewMetric, TemplateId,
};
use index::{EmbeddingIndex, IndexError, IndexState};
use tracing::{debug, info, warn};

use crate::embed::Embedder;
use crate::text::TextMatcher;
use crate::types::{MetricHit, RetrieverConfig};


/// Retrieval facade: the catalog as source of truth, the embedding index as a
/// best-effort accelerator, and the text matcher as the always-available
/// fallback.
///
/// Catalog failures propagate to the caller. Index failures never do: they
/// are logged, the index downgrades itself, and reads fall back to text.
pub struct MetricRetriever {
    catalog: Box<dyn CatalogBackend>,
    index: EmbeddingIndex,
    embedder: Option<Arc<dyn Embedder>>,
    text: TextMatcher,
    // Serializes catalog write + mirror update pairs.
    write_lock: Mutex<()>,
}

impl MetricRetriever {
    /// Wire an opened catalog to a probed index.
    ///
    /// An ephemeral index is refilled from the catalog's stored embeddings; a
    /// durable one is reconciled with them, dropping ids the catalog no
    /// longer has and backfilling the rest.
    pub fn new(
        catalog: Box<dyn CatalogBackend>,
        index: EmbeddingIndex,
    ) -> Result<Self, CatalogError> {
        if index.dimension() != catalog.dimension() {
            return Err(CatalogError::Configuration(format!(
                "index dimension {} does not match catalog dimension {}",
                index.dimension(),
                catalog.dimension()
            )));
        }

        if index.is_available() {
            let entries = catalog.embeddings()?;
            let total = entries.len();
            if index.needs_rebuild() {
                let loaded = index.rebuild(entries);
                if loaded == total {
                    info!(loaded, "rebuilt embedding index from catalog");
                } else {
                    warn!(loaded, total, "embedding index rebuild stopped early");
                }
            } else {
                match index.reconcile(entries) {
                    Some((removed, loaded)) => {
                        info!(removed, loaded, "reconciled embedding index with catalog")
                    }
                    None => warn!(total, "embedding index reconcile failed"),
                }
            }
        }

        info!(
            dimension = catalog.dimension(),
            index = %index.state(),
            backend = index.backend_name().unwrap_or("none"),
            "metric retriever ready"
        );

        Ok(Self {
            catalog,
            index,
            embedder: None,
            text: TextMatcher,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the catalog (fatal on failure) and probe the index (never fatal).
    pub fn open(config: &RetrieverConfig) -> Result<Self, CatalogError> {
        let catalog = config.catalog.build()?;
        let index = EmbeddingIndex::probe(&config.index, catalog.dimension());
        Self::new(catalog, index)
    }

    /// Inject the embedding model used by [`MetricRetriever::retrieve`].
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        if embedder.dimension() != self.dimension() {
            warn!(
                embedder = embedder.dimension(),
                catalog = self.dimension(),
                "embedder dimension differs from catalog; retrieve will use text search"
            );
        }
        self.embedder = Some(embedder);
        self
    }

    pub fn dimension(&self) -> usize {
        self.catalog.dimension()
    }

    pub fn index_state(&self) -> IndexState {
        self.index.state()
    }

    /// Switch this process to the text fallback for good.
    pub fn force_index_unavailable(&self, reason: &str) {
        self.index.force_unavailable(reason);
    }

    // ---- reads ----

    /// Nearest metrics to `query_embedding`.
    ///
    /// When the index cannot answer there is no text to fall back on, so the
    /// result is empty. Use [`Self::similarity_search_with_text`] when the
    /// original text is known.
    pub fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MetricHit>, CatalogError> {
        validate_embedding(query_embedding, self.dimension())?;
        match self.index_search(query_embedding, top_k, threshold)? {
            Some(hits) => Ok(hits),
            None => {
                warn!(
                    "embedding index cannot answer and no query text was given; \
                     returning no metrics"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Like [`Self::similarity_search`], falling back to a text search on
    /// `query_text` when the index cannot answer. Fallback hits score 0.
    pub fn similarity_search_with_text(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MetricHit>, CatalogError> {
        validate_embedding(query_embedding, self.dimension())?;
        match self.index_search(query_embedding, top_k, threshold)? {
            Some(hits) => Ok(hits),
            None => self.text_fallback(query_text, top_k),
        }
    }

    /// Embed `query_text` with the injected model and search; text search when
    /// there is no usable model.
    pub fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MetricHit>, CatalogError> {
        let Some(embedder) = self.embedder.as_deref() else {
            return self.text_fallback(query_text, top_k);
        };
        if embedder.dimension() != self.dimension() {
            return self.text_fallback(query_text, top_k);
        }
        match embedder.embed(query_text) {
            Ok(embedding) if embedding.len() == self.dimension() => {
                self.similarity_search_with_text(&embedding, query_text, top_k, threshold)
            }
            Ok(embedding) => {
                warn!(
                    got = embedding.len(),
                    "embedder returned wrong dimension; using text search"
                );
                self.text_fallback(query_text, top_k)
            }
            Err(err) => {
                warn!(error = %err, "query embedding failed; using text search");
                self.text_fallback(query_text, top_k)
            }
        }
    }

    /// Case-insensitive substring search over name and description. Never
    /// touches the embedding index.
    pub fn search_by_text(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<Metric>, CatalogError> {
        let metrics = self.catalog.list_metrics()?;
        Ok(self.text.rank(metrics, query_text, top_k))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Metric>, CatalogError> {
        self.catalog.get_metric(&MetricKey::Name(name.to_string()))
    }

    pub fn get_metric(&self, key: impl Into<MetricKey>) -> Result<Option<Metric>, CatalogError> {
        self.catalog.get_metric(&key.into())
    }

    pub fn list_all(&self) -> Result<Vec<Metric>, CatalogError> {
        self.catalog.list_metrics()
    }

    // ---- writes ----

    pub fn upsert_metric(&self, metric: &NewMetric) -> Result<MetricId, CatalogError> {
        let _guard = self.lock_writes()?;
        let id = self.catalog.upsert_metric(metric)?;
        match &metric.embedding {
            Some(embedding) => {
                self.index.upsert(id, embedding);
            }
            // The catalog row no longer has an embedding; keep the mirror in step.
            None => {
                self.index.remove(id);
            }
        }
        debug!(metric_id = id, name = %metric.name, "metric upserted");
        Ok(id)
    }

    pub fn add_label(
        &self,
        metric_id: MetricId,
        label_name: &str,
        example_values: Option<&str>,
    ) -> Result<LabelId, CatalogError> {
        let _guard = self.lock_writes()?;
        self.catalog.add_label(metric_id, label_name, example_values)
    }

    pub fn add_template(
        &self,
        metric_id: MetricId,
        template: &str,
        template_type: Option<&str>,
        description: Option<&str>,
    ) -> Result<TemplateId, CatalogError> {
        let _guard = self.lock_writes()?;
        self.catalog
            .add_template(metric_id, template, template_type, description)
    }

    /// Remove a metric and everything it owns. The index entry is dropped
    /// first; if that fails the catalog delete still happens.
    pub fn delete_metric(&self, metric_id: MetricId) -> Result<bool, CatalogError> {
        let _guard = self.lock_writes()?;
        // A failing remove is logged and downgrades the index; it never blocks
        // the catalog cascade.
        self.index.remove(metric_id);
        let existed = self.catalog.delete_metric(metric_id)?;
        debug!(metric_id, existed, "metric deleted");
        Ok(existed)
    }

    /// Release the catalog and index handles.
    pub fn close(self) -> Result<(), CatalogError> {
        self.catalog.flush()?;
        info!("metric retriever closed");
        Ok(())
    }

    // ---- internals ----

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, CatalogError> {
        self.write_lock
            .lock()
            .map_err(|_| CatalogError::Storage("retriever write lock poisoned".into()))
    }

    /// `Ok(None)` means the index could not answer and the caller should fall
    /// back. Catalog errors while hydrating hits propagate.
    ///
    /// Hits whose metric is gone from the catalog are evicted and do not count
    /// toward `top_k`; the fetch size doubles until `top_k` live hits are found
    /// or the index has nothing more above `threshold`.
    fn index_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Option<Vec<MetricHit>>, CatalogError> {
        if top_k == 0 {
            return Ok(Some(Vec::new()));
        }
        let mut fetch = top_k;
        loop {
            let hits = match self.index.search(query_embedding, fetch, threshold) {
                Ok(hits) => hits,
                Err(IndexError::DimensionMismatch { expected, got }) => {
                    return Err(CatalogError::DimensionMismatch { expected, got });
                }
                Err(err) => {
                    debug!(error = %err, "embedding index search unavailable");
                    return Ok(None);
                }
            };
            let exhausted = hits.len() < fetch;

            let mut out = Vec::with_capacity(top_k.min(hits.len()));
            for hit in hits {
                if out.len() == top_k {
                    break;
                }
                match self.catalog.get_metric(&MetricKey::Id(hit.metric_id))? {
                    Some(metric) => out.push(MetricHit {
                        metric,
                        score: hit.score,
                    }),
                    None => {
                        debug!(metric_id = hit.metric_id, "evicting stale index entry");
                        self.index.remove(hit.metric_id);
                    }
                }
            }

            if out.len() == top_k || exhausted {
                return Ok(Some(out));
            }
            fetch = fetch.saturating_mul(2);
        }
    }

    fn text_fallback(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<MetricHit>, CatalogError> {
        Ok(self
            .search_by_text(query_text, top_k)?
            .into_iter()
            .map(MetricHit::fallback)
            .collect())
    }
}
