//! # Metric Catalog
//!
//! Durable storage for the metric knowledge that grounds PromQL generation:
//! metrics (name, description, example query, optional embedding), the labels
//! they are partitioned by, and the query templates attached to them.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: every store implements [`CatalogBackend`]. Out of
//!   the box there is an in-memory backend (tests, ephemeral use) and a redb
//!   backend for persistent, transactional on-disk storage (enabled via the
//!   `backend-redb` feature, on by default).
//! - **Natural keys**: a metric is keyed by its unique name; labels are unique
//!   per `(metric_id, label_name)`; templates are appended without dedup.
//! - **Cascading deletes**: removing a metric removes the labels and templates
//!   it owns inside the same transaction.
//! - **Fixed dimension**: the embedding dimension is chosen when a store is
//!   created and every stored embedding must match it.
//!
//! ## Example Usage
//!
//! ```
//! use catalog::{CatalogConfig, NewMetric};
//!
//! let store = CatalogConfig::in_memory(3).build().unwrap();
//! let id = store
//!     .upsert_metric(&NewMetric::new("up").with_description("target is up"))
//!     .unwrap();
//! store.add_label(id, "job", Some("node, api")).unwrap();
//!
//! let metric = store.get_metric(&"up".into()).unwrap().unwrap();
//! assert_eq!(metric.labels.len(), 1);
//! ```

mod backend;
mod types;

pub use backend::{BackendConfig, CatalogBackend, InMemoryBackend};
#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use types::{
    Label, LabelId, Metric, MetricId, MetricKey, NewMetric, Template, TemplateId,
    DEFAULT_TEMPLATE_TYPE,
};

use thiserror::Error;

/// Errors raised by catalog operations.
///
/// Not-found lookups on read paths are reported as `Ok(None)`; the
/// [`CatalogError::NotFound`] variant is only used when a write references a
/// metric that does not exist.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("{0} not found")]
    NotFound(MetricKey),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("row codec error: {0}")]
    Codec(String),
}

impl CatalogError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }

    /// True for failures of the backing store itself (the write did not happen).
    pub fn is_storage(&self) -> bool {
        matches!(self, CatalogError::Storage(_) | CatalogError::Codec(_))
    }

    /// True for errors caused by invalid caller input or store configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CatalogError::Configuration(_) | CatalogError::DimensionMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Codec(e.to_string())
    }
}

/// Config for opening a catalog store.
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    /// Storage backend (in-memory or redb).
    pub backend: BackendConfig,
    /// Embedding dimension D, fixed for the lifetime of the store file.
    pub dimension: usize,
}

impl CatalogConfig {
    pub fn new(backend: BackendConfig, dimension: usize) -> Self {
        Self { backend, dimension }
    }

    pub fn in_memory(dimension: usize) -> Self {
        Self::new(BackendConfig::InMemory, dimension)
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Open the configured backend. Failure here is fatal for the engine.
    pub fn build(&self) -> Result<Box<dyn CatalogBackend>, CatalogError> {
        if self.dimension == 0 {
            return Err(CatalogError::Configuration(
                "embedding dimension must be >= 1".into(),
            ));
        }
        self.backend.build(self.dimension)
    }
}

/// Checks shared by every backend before a metric write touches storage.
pub(crate) fn validate_metric(metric: &NewMetric, dimension: usize) -> Result<(), CatalogError> {
    require_non_empty("metric name", &metric.name)?;
    if let Some(embedding) = &metric.embedding {
        validate_embedding(embedding, dimension)?;
    }
    Ok(())
}

/// Rejects vectors of the wrong length or with non-finite components.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), CatalogError> {
    if embedding.len() != dimension {
        return Err(CatalogError::DimensionMismatch {
            expected: dimension,
            got: embedding.len(),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(CatalogError::Configuration(
            "embedding contains non-finite values".into(),
        ));
    }
    Ok(())
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::Configuration(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
