//! # Metric Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` is the query side of the engine. It sits on top of the metric
//! catalog (`catalog`) and the embedding index (`index`) and answers the
//! question "which metrics is this request about?" for a PromQL prompt
//! builder.
//!
//! Lookups try the embedding index first. When the index is unavailable, or a
//! query against it fails, the [`TextMatcher`] answers instead with a
//! case-insensitive substring search over metric names and descriptions.
//! Index problems are never surfaced to callers; catalog problems always are.
//!
//! ## Core Types
//!
//! - [`MetricRetriever`]: the facade. Reads, writes with index mirroring, and
//!   the `retrieve` entry point that embeds a natural-language query.
//! - [`RetrieverConfig`]: catalog config plus ordered index candidates.
//! - [`MetricHit`]: hydrated metric plus similarity score (0 for text hits).
//! - [`Embedder`]: boundary to the embedding model; [`StubEmbedder`] is a
//!   deterministic stand-in.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use catalog::NewMetric;
//! use matcher::{Embedder, MetricRetriever, RetrieverConfig, StubEmbedder};
//!
//! let embedder = Arc::new(StubEmbedder::new(16));
//! let retriever = MetricRetriever::open(&RetrieverConfig::in_memory(16))
//!     .unwrap()
//!     .with_embedder(embedder.clone());
//!
//! let text = "memory_usage_bytes";
//! let id = retriever
//!     .upsert_metric(
//!         &NewMetric::new(text)
//!             .with_description("Memory usage in bytes")
//!             .with_embedding(embedder.embed(text).unwrap()),
//!     )
//!     .unwrap();
//! retriever.add_label(id, "instance", Some("host-1, host-2")).unwrap();
//!
//! // Embedding search first...
//! let hits = retriever.retrieve(text, 5, 0.7).unwrap();
//! assert_eq!(hits[0].metric.name, "memory_usage_bytes");
//!
//! // ...and substring search whenever the index cannot answer.
//! let hits = retriever.search_by_text("MEMORY", 5).unwrap();
//! assert_eq!(hits[0].labels.len(), 1);
//! ```

pub mod embed;
pub mod engine;
pub mod text;
pub mod types;

pub use crate::embed::{EmbedError, Embedder, StubEmbedder};
pub use crate::engine::MetricRetriever;
pub use crate::text::TextMatcher;
pub use crate::types::{MetricHit, RetrieverConfig};
