use crate::types::MetricRow;
use crate::{
    require_non_empty, validate_metric, CatalogError, Label, LabelId, Metric, MetricId,
    MetricKey, NewMetric, Template, TemplateId, DEFAULT_TEMPLATE_TYPE,
};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// Storage contract for the metric catalog.
///
/// Every mutating call is one transaction: either all of its rows become
/// visible or none do, and a failure leaves previously committed state intact.
pub trait CatalogBackend: Send + Sync {
    /// Embedding dimension the store was created with.
    fn dimension(&self) -> usize;

    /// Insert or replace a metric by its unique name and return its id.
    fn upsert_metric(&self, metric: &NewMetric) -> Result<MetricId, CatalogError>;

    /// Insert or replace the label `(metric_id, label_name)`.
    fn add_label(
        &self,
        metric_id: MetricId,
        label_name: &str,
        example_values: Option<&str>,
    ) -> Result<LabelId, CatalogError>;

    /// Append a template to a metric. Identical templates are not deduplicated.
    fn add_template(
        &self,
        metric_id: MetricId,
        template: &str,
        template_type: Option<&str>,
        description: Option<&str>,
    ) -> Result<TemplateId, CatalogError>;

    /// Fetch one metric hydrated with its labels and templates.
    fn get_metric(&self, key: &MetricKey) -> Result<Option<Metric>, CatalogError>;

    /// All metrics ordered by name, each hydrated.
    fn list_metrics(&self) -> Result<Vec<Metric>, CatalogError>;

    /// Delete a metric with its labels and templates. Returns whether it existed.
    fn delete_metric(&self, metric_id: MetricId) -> Result<bool, CatalogError>;

    /// `(id, embedding)` for every metric that stores one, ordered by id.
    fn embeddings(&self) -> Result<Vec<(MetricId, Vec<f32>)>, CatalogError>;

    /// Flush buffered writes, if the backend buffers any.
    fn flush(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}

/// Configuration for selecting and building a catalog backend.
///
/// # Example
/// ```
/// use catalog::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (durable)
/// let config = BackendConfig::redb("/data/promrag.redb");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Persist to a redb database file at `path`.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// Keep everything in process memory. Contents vanish on drop.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend for a store of embedding dimension `dimension`.
    pub fn build(&self, dimension: usize) -> Result<Box<dyn CatalogBackend>, CatalogError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new(dimension))),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path, dimension)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(CatalogError::Configuration(
                        "redb backend disabled at compile time".into(),
                    ))
                }
            }
        }
    }
}

#[derive(Default)]
struct State {
    metrics: BTreeMap<MetricId, MetricRow>,
    names: BTreeMap<String, MetricId>,
    labels: BTreeMap<(MetricId, String), Label>,
    templates: BTreeMap<(MetricId, TemplateId), Template>,
    last_metric_id: MetricId,
    last_label_id: LabelId,
    last_template_id: TemplateId,
}

impl State {
    fn hydrate(&self, row: &MetricRow) -> Metric {
        let labels = self
            .labels
            .range((row.id, String::new())..(row.id + 1, String::new()))
            .map(|(_, label)| label.clone())
            .collect();
        let templates = self
            .templates
            .range((row.id, 0_u64)..(row.id + 1, 0_u64))
            .map(|(_, template)| template.clone())
            .collect();
        row.clone().hydrate(labels, templates)
    }

    fn require_metric(&self, metric_id: MetricId) -> Result<(), CatalogError> {
        if self.metrics.contains_key(&metric_id) {
            Ok(())
        } else {
            Err(CatalogError::NotFound(MetricKey::Id(metric_id)))
        }
    }
}

/// An in-memory backend using a `RwLock` around ordered maps.
///
/// Each call validates before mutating while holding the write lock, which
/// gives the same all-or-nothing visibility as a storage transaction.
pub struct InMemoryBackend {
    dimension: usize,
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, CatalogError> {
        self.state
            .read()
            .map_err(|_| CatalogError::storage("poisoned lock"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, CatalogError> {
        self.state
            .write()
            .map_err(|_| CatalogError::storage("poisoned lock"))
    }
}

impl CatalogBackend for InMemoryBackend {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert_metric(&self, metric: &NewMetric) -> Result<MetricId, CatalogError> {
        validate_metric(metric, self.dimension)?;
        let mut state = self.write()?;

        let id = match state.names.get(&metric.name) {
            Some(&existing) => existing,
            None => {
                state.last_metric_id += 1;
                let id = state.last_metric_id;
                state.names.insert(metric.name.clone(), id);
                id
            }
        };
        state.metrics.insert(
            id,
            MetricRow {
                id,
                name: metric.name.clone(),
                description: metric.description.clone(),
                example_query: metric.example_query.clone(),
                embedding: metric.embedding.clone(),
            },
        );
        debug!(metric_id = id, name = %metric.name, "upserted metric");
        Ok(id)
    }

    fn add_label(
        &self,
        metric_id: MetricId,
        label_name: &str,
        example_values: Option<&str>,
    ) -> Result<LabelId, CatalogError> {
        require_non_empty("label name", label_name)?;
        let mut state = self.write()?;
        state.require_metric(metric_id)?;

        let key = (metric_id, label_name.to_string());
        let id = match state.labels.get(&key) {
            Some(existing) => existing.id,
            None => {
                state.last_label_id += 1;
                state.last_label_id
            }
        };
        state.labels.insert(
            key,
            Label {
                id,
                metric_id,
                label_name: label_name.to_string(),
                example_values: example_values.map(str::to_string),
            },
        );
        Ok(id)
    }

    fn add_template(
        &self,
        metric_id: MetricId,
        template: &str,
        template_type: Option<&str>,
        description: Option<&str>,
    ) -> Result<TemplateId, CatalogError> {
        require_non_empty("template", template)?;
        let mut state = self.write()?;
        state.require_metric(metric_id)?;

        state.last_template_id += 1;
        let id = state.last_template_id;
        state.templates.insert(
            (metric_id, id),
            Template {
                id,
                metric_id,
                template: template.to_string(),
                template_type: template_type.unwrap_or(DEFAULT_TEMPLATE_TYPE).to_string(),
                description: description.map(str::to_string),
            },
        );
        Ok(id)
    }

    fn get_metric(&self, key: &MetricKey) -> Result<Option<Metric>, CatalogError> {
        let state = self.read()?;
        let id = match key {
            MetricKey::Id(id) => Some(*id),
            MetricKey::Name(name) => state.names.get(name).copied(),
        };
        Ok(id
            .and_then(|id| state.metrics.get(&id))
            .map(|row| state.hydrate(row)))
    }

    fn list_metrics(&self) -> Result<Vec<Metric>, CatalogError> {
        let state = self.read()?;
        Ok(state
            .names
            .values()
            .filter_map(|id| state.metrics.get(id))
            .map(|row| state.hydrate(row))
            .collect())
    }

    fn delete_metric(&self, metric_id: MetricId) -> Result<bool, CatalogError> {
        let mut state = self.write()?;
        let Some(row) = state.metrics.remove(&metric_id) else {
            return Ok(false);
        };
        state.names.remove(&row.name);
        state.templates.retain(|(owner, _), _| *owner != metric_id);
        state.labels.retain(|(owner, _), _| *owner != metric_id);
        info!(metric_id, name = %row.name, "deleted metric");
        Ok(true)
    }

    fn embeddings(&self) -> Result<Vec<(MetricId, Vec<f32>)>, CatalogError> {
        let state = self.read()?;
        Ok(state
            .metrics
            .values()
            .filter_map(|row| row.embedding.clone().map(|e| (row.id, e)))
            .collect())
    }
}

/// The Redb backend implementation.
///
/// Redb is a pure Rust ACID embedded database and the durable default.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
