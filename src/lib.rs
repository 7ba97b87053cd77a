//! Workspace umbrella crate for promrag, the metric retrieval engine behind
//! natural-language PromQL generation.
//!
//! This crate re-exports the catalog, index and matcher crates, loads the YAML
//! configuration and wires everything together once at startup:
//!
//! ```
//! use std::sync::Arc;
//! use promrag::{bootstrap, sample, RagConfig, StubEmbedder};
//!
//! let mut config = RagConfig::default();
//! config.store.dimension = 32;
//!
//! let embedder = Arc::new(StubEmbedder::new(config.store.dimension));
//! let retriever = bootstrap(&config, Some(embedder.clone())).unwrap();
//! sample::seed_sample_catalog(&retriever, embedder.as_ref()).unwrap();
//!
//! let names: Vec<_> = retriever
//!     .search_by_text("bytes", config.search.top_k)
//!     .unwrap()
//!     .into_iter()
//!     .map(|m| m.name)
//!     .collect();
//! assert_eq!(names, ["disk_io_bytes_total", "memory_usage_bytes"]);
//! ```

pub mod config;
pub mod sample;

pub use catalog::{
    BackendConfig, CatalogBackend, CatalogConfig, CatalogError, Label, LabelId, Metric, MetricId,
    MetricKey, NewMetric, Template, TemplateId, DEFAULT_TEMPLATE_TYPE,
};
pub use config::{ConfigLoadError, RagConfig};
pub use index::{ann::AnnConfig, EmbeddingIndex, IndexCandidate, IndexState, QdrantConfig};
pub use matcher::{
    EmbedError, Embedder, MetricHit, MetricRetriever, RetrieverConfig, StubEmbedder, TextMatcher,
};

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Top-level error for startup and the helpers in this crate.
#[derive(Debug, Error)]
pub enum PromragError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// Open the catalog, probe the index and inject the embedder.
///
/// A catalog that cannot be opened is fatal. An index that cannot be brought
/// up is not: the retriever starts with the text fallback only.
pub fn bootstrap(
    config: &RagConfig,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<MetricRetriever, PromragError> {
    let retriever = MetricRetriever::open(&config.retriever_config()?)?;
    info!(
        backend = %config.store.backend,
        dimension = config.store.dimension,
        index = %retriever.index_state(),
        "promrag bootstrapped"
    );
    Ok(match embedder {
        Some(embedder) => retriever.with_embedder(embedder),
        None => retriever,
    })
}

/// Install the global `tracing` subscriber. `RUST_LOG`, when set, wins over
/// the configured level. Calling this twice is a no-op.
pub fn init_logging(logging: &config::LoggingYamlConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
