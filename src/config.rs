//! YAML configuration for the retrieval engine.
//!
//! One file describes the catalog store, the embedding-index candidates to
//! probe, search defaults and logging. It is read once at startup and turned
//! into a [`RetrieverConfig`]; nothing re-reads it later.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! store:
//!   backend: "redb"          # "redb" | "in_memory"
//!   path: "promrag.redb"
//!   dimension: 512
//!
//! index:
//!   candidates: ["qdrant", "hnsw"]   # probed in order; "none" disables
//!   hnsw:
//!     m: 16
//!     ef_construction: 200
//!     ef_search: 50
//!     min_vectors_for_ann: 1000
//!     oversample: 4
//!   qdrant:
//!     url: "http://localhost:6334"
//!     collection: "metrics"
//!     timeout_secs: 5
//!
//! search:
//!   top_k: 5
//!   threshold: 0.7
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```

use std::env;
use std::fs;
use std::path::Path;

use catalog::{BackendConfig, CatalogConfig};
use index::ann::AnnConfig;
use index::{IndexCandidate, QdrantConfig};
use matcher::RetrieverConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides `store.path` and selects the redb backend.
pub const ENV_STORE_PATH: &str = "PROMRAG_STORE_PATH";
/// Overrides `logging.level`.
pub const ENV_LOG_LEVEL: &str = "PROMRAG_LOG_LEVEL";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RagConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub search: SearchYamlConfig,

    #[serde(default)]
    pub logging: LoggingYamlConfig,
}

impl RagConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: RagConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.store.validate()?;
        self.index.validate()?;
        self.search.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Apply `PROMRAG_*` environment overrides, then re-validate.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|p| !p.trim().is_empty()) {
            self.store.backend = "redb".to_string();
            self.store.path = Some(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }
        self.validate()
    }

    /// Translate into the matcher crate's startup config.
    pub fn retriever_config(&self) -> Result<RetrieverConfig, ConfigLoadError> {
        let backend = match self.store.backend.as_str() {
            "in_memory" => BackendConfig::in_memory(),
            "redb" => BackendConfig::redb(
                self.store
                    .path
                    .clone()
                    .ok_or_else(|| ConfigLoadError::MissingField("store.path".into()))?,
            ),
            other => {
                return Err(ConfigLoadError::Validation(format!(
                    "unknown store.backend '{other}'"
                )))
            }
        };
        let catalog = CatalogConfig::new(backend, self.store.dimension);
        Ok(RetrieverConfig::new(catalog).with_index(self.index.candidates()))
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            store: StoreYamlConfig::default(),
            index: IndexYamlConfig::default(),
            search: SearchYamlConfig::default(),
            logging: LoggingYamlConfig::default(),
        }
    }
}

/// Catalog store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: {valid_backends:?}"
            )));
        }
        if self.backend == "redb" && self.path.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigLoadError::Validation(
                "store.path is required when backend is 'redb'".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(ConfigLoadError::Validation(
                "store.dimension must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            path: None,
            dimension: default_dimension(),
        }
    }
}

/// Embedding index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    /// Backends probed in order. First to initialize wins.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    #[serde(default)]
    pub hnsw: AnnConfig,

    #[serde(default)]
    pub qdrant: QdrantConfig,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid = ["hnsw", "qdrant", "none"];
        if let Some(bad) = self.candidates.iter().find(|c| !valid.contains(&c.as_str())) {
            return Err(ConfigLoadError::Validation(format!(
                "index.candidates: unknown backend '{bad}', expected one of: {valid:?}"
            )));
        }
        if self.hnsw.m == 0 || self.hnsw.ef_construction == 0 || self.hnsw.ef_search == 0 {
            return Err(ConfigLoadError::Validation(
                "index.hnsw: m, ef_construction and ef_search must be >= 1".to_string(),
            ));
        }
        if self.hnsw.oversample == 0 {
            return Err(ConfigLoadError::Validation(
                "index.hnsw.oversample must be >= 1".to_string(),
            ));
        }
        if self.candidates.iter().any(|c| c == "qdrant")
            && self.qdrant.collection.trim().is_empty()
        {
            return Err(ConfigLoadError::Validation(
                "index.qdrant.collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn candidates(&self) -> Vec<IndexCandidate> {
        self.candidates
            .iter()
            .filter_map(|name| match name.as_str() {
                "hnsw" => Some(IndexCandidate::Hnsw(self.hnsw)),
                "qdrant" => Some(IndexCandidate::Qdrant(self.qdrant.clone())),
                "none" => Some(IndexCandidate::Disabled),
                _ => None,
            })
            .collect()
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            hnsw: AnnConfig::default(),
            qdrant: QdrantConfig::default(),
        }
    }
}

/// Search defaults used when a caller does not pass its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchYamlConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl SearchYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.top_k == 0 {
            return Err(ConfigLoadError::Validation(
                "search.top_k must be >= 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ConfigLoadError::Validation(
                "search.threshold must be within [-1.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchYamlConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingYamlConfig {
    /// `tracing` filter directive, e.g. `info` or `promrag=debug,index=trace`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Helper functions for serde defaults
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_dimension() -> usize {
    512
}
fn default_candidates() -> Vec<String> {
    vec!["hnsw".to_string()]
}
fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.7
}
fn default_log_level() -> String {
    "info".to_string()
}
