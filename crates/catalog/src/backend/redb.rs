//! Redb (Rust embedded database) backend for the metric catalog.
//!
//! Every mutating call runs inside one redb write transaction that is
//! committed on success and aborted on any error, so a failed multi-row write
//! (for example a cascade delete) leaves the previously committed state intact.
//!
//! # Tables
//! - `metrics`: `u64 -> json(MetricRow)`
//! - `metric_names`: `&str -> u64`, the unique natural key
//! - `metric_labels`: `(metric_id, label_name) -> json(Label)`
//! - `metric_templates`: `(metric_id, template_id) -> json(Template)`
//! - `sequences`: `&str -> u64`, last id handed out per entity
//! - `catalog_meta`: `&str -> u64`, store-level settings (embedding dimension)

use crate::types::MetricRow;
use crate::{
    require_non_empty, validate_metric, CatalogBackend, CatalogError, Label, LabelId, Metric,
    MetricId, MetricKey, NewMetric, Template, TemplateId, DEFAULT_TEMPLATE_TYPE,
};
use ::redb::{
    Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

const METRICS: TableDefinition<u64, &[u8]> = TableDefinition::new("metrics");
const METRIC_NAMES: TableDefinition<&str, u64> = TableDefinition::new("metric_names");
const LABELS: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("metric_labels");
const TEMPLATES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("metric_templates");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const META: TableDefinition<&str, u64> = TableDefinition::new("catalog_meta");

const SEQ_METRIC: &str = "metric";
const SEQ_LABEL: &str = "label";
const SEQ_TEMPLATE: &str = "template";
const META_DIMENSION: &str = "embedding_dimension";

/// Persistent catalog backed by a single redb file.
///
/// The `Arc<Database>` handle is the store's one connection to its file; it is
/// released when the backend is dropped. Redb serializes write transactions,
/// so concurrent writers resolve as last-writer-wins on the natural keys.
pub struct RedbBackend {
    db: Arc<Database>,
    dimension: usize,
}

impl RedbBackend {
    /// Open or create a catalog file at `path` for embeddings of `dimension`.
    ///
    /// A new file records `dimension`; an existing file must have been created
    /// with the same dimension or a configuration error is returned.
    ///
    /// ```no_run
    /// use catalog::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/catalog.redb", 512).unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(CatalogError::storage)?;
        let backend = Self {
            db: Arc::new(db),
            dimension,
        };

        let stored = backend.write(|txn| {
            // Opening a table inside a write transaction creates it.
            txn.open_table(METRICS).map_err(CatalogError::storage)?;
            txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
            txn.open_table(LABELS).map_err(CatalogError::storage)?;
            txn.open_table(TEMPLATES).map_err(CatalogError::storage)?;
            txn.open_table(SEQUENCES).map_err(CatalogError::storage)?;

            let mut meta = txn.open_table(META).map_err(CatalogError::storage)?;
            let existing = meta
                .get(META_DIMENSION)
                .map_err(CatalogError::storage)?
                .map(|v| v.value());
            match existing {
                Some(stored) => Ok(stored),
                None => {
                    meta.insert(META_DIMENSION, dimension as u64)
                        .map_err(CatalogError::storage)?;
                    Ok(dimension as u64)
                }
            }
        })?;

        if stored != dimension as u64 {
            return Err(CatalogError::Configuration(format!(
                "catalog at {} was created with embedding dimension {stored}, \
                 reopened with {dimension}",
                path.display()
            )));
        }

        info!(path = %path.display(), dimension, "opened redb catalog");
        Ok(backend)
    }

    /// Run `f` in a write transaction, committing on success and aborting on error.
    fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let txn = self.db.begin_write().map_err(|e| {
            error!(error = %e, "catalog transaction could not start");
            CatalogError::storage(e)
        })?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(|e| {
                    error!(error = %e, "catalog commit failed");
                    CatalogError::storage(e)
                })?;
                Ok(value)
            }
            Err(err) => {
                if err.is_storage() {
                    error!(error = %err, "catalog transaction failed, rolling back");
                }
                if let Err(abort_err) = txn.abort() {
                    error!(error = %abort_err, "catalog abort failed");
                }
                Err(err)
            }
        }
    }

    fn read(&self) -> Result<ReadTransaction, CatalogError> {
        self.db.begin_read().map_err(CatalogError::storage)
    }
}

fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, CatalogError> {
    let mut table = txn.open_table(SEQUENCES).map_err(CatalogError::storage)?;
    let last = table
        .get(sequence)
        .map_err(CatalogError::storage)?
        .map(|v| v.value())
        .unwrap_or(0);
    let next = last + 1;
    table.insert(sequence, next).map_err(CatalogError::storage)?;
    Ok(next)
}

fn require_metric(txn: &WriteTransaction, metric_id: MetricId) -> Result<(), CatalogError> {
    let metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
    if metrics
        .get(metric_id)
        .map_err(CatalogError::storage)?
        .is_none()
    {
        return Err(CatalogError::NotFound(MetricKey::Id(metric_id)));
    }
    Ok(())
}

/// Load `metric_id`'s row and its owned rows from any readable tables.
fn load_metric(
    metrics: &impl ReadableTable<u64, &'static [u8]>,
    labels: &impl ReadableTable<(u64, &'static str), &'static [u8]>,
    templates: &impl ReadableTable<(u64, u64), &'static [u8]>,
    metric_id: MetricId,
) -> Result<Option<Metric>, CatalogError> {
    let Some(raw) = metrics.get(metric_id).map_err(CatalogError::storage)? else {
        return Ok(None);
    };
    let row: MetricRow = serde_json::from_slice(raw.value())?;

    let mut owned_labels = Vec::new();
    for item in labels
        .range((metric_id, "")..(metric_id + 1, ""))
        .map_err(CatalogError::storage)?
    {
        let (_, value) = item.map_err(CatalogError::storage)?;
        owned_labels.push(serde_json::from_slice::<Label>(value.value())?);
    }

    let mut owned_templates = Vec::new();
    for item in templates
        .range((metric_id, 0_u64)..(metric_id + 1, 0_u64))
        .map_err(CatalogError::storage)?
    {
        let (_, value) = item.map_err(CatalogError::storage)?;
        owned_templates.push(serde_json::from_slice::<Template>(value.value())?);
    }

    Ok(Some(row.hydrate(owned_labels, owned_templates)))
}

impl CatalogBackend for RedbBackend {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert_metric(&self, metric: &NewMetric) -> Result<MetricId, CatalogError> {
        validate_metric(metric, self.dimension)?;
        let id = self.write(|txn| {
            let existing = {
                let names = txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
                let found = names
                    .get(metric.name.as_str())
                    .map_err(CatalogError::storage)?
                    .map(|v| v.value());
                found
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = next_id(txn, SEQ_METRIC)?;
                    let mut names = txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
                    names
                        .insert(metric.name.as_str(), id)
                        .map_err(CatalogError::storage)?;
                    id
                }
            };

            let row = MetricRow {
                id,
                name: metric.name.clone(),
                description: metric.description.clone(),
                example_query: metric.example_query.clone(),
                embedding: metric.embedding.clone(),
            };
            let encoded = serde_json::to_vec(&row)?;
            let mut metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
            metrics
                .insert(id, encoded.as_slice())
                .map_err(CatalogError::storage)?;
            Ok(id)
        })?;
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
        self.write(|txn| {
            require_metric(txn, metric_id)?;

            let existing = {
                let labels = txn.open_table(LABELS).map_err(CatalogError::storage)?;
                let found = match labels
                    .get((metric_id, label_name))
                    .map_err(CatalogError::storage)?
                {
                    Some(raw) => Some(serde_json::from_slice::<Label>(raw.value())?.id),
                    None => None,
                };
                found
            };
            let id = match existing {
                Some(id) => id,
                None => next_id(txn, SEQ_LABEL)?,
            };

            let label = Label {
                id,
                metric_id,
                label_name: label_name.to_string(),
                example_values: example_values.map(str::to_string),
            };
            let encoded = serde_json::to_vec(&label)?;
            let mut labels = txn.open_table(LABELS).map_err(CatalogError::storage)?;
            labels
                .insert((metric_id, label_name), encoded.as_slice())
                .map_err(CatalogError::storage)?;
            Ok(id)
        })
    }

    fn add_template(
        &self,
        metric_id: MetricId,
        template: &str,
        template_type: Option<&str>,
        description: Option<&str>,
    ) -> Result<TemplateId, CatalogError> {
        require_non_empty("template", template)?;
        self.write(|txn| {
            require_metric(txn, metric_id)?;
            let id = next_id(txn, SEQ_TEMPLATE)?;
            let row = Template {
                id,
                metric_id,
                template: template.to_string(),
                template_type: template_type.unwrap_or(DEFAULT_TEMPLATE_TYPE).to_string(),
                description: description.map(str::to_string),
            };
            let encoded = serde_json::to_vec(&row)?;
            let mut templates = txn.open_table(TEMPLATES).map_err(CatalogError::storage)?;
            templates
                .insert((metric_id, id), encoded.as_slice())
                .map_err(CatalogError::storage)?;
            Ok(id)
        })
    }

    fn get_metric(&self, key: &MetricKey) -> Result<Option<Metric>, CatalogError> {
        let txn = self.read()?;
        let id = match key {
            MetricKey::Id(id) => *id,
            MetricKey::Name(name) => {
                let names = txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
                match names
                    .get(name.as_str())
                    .map_err(CatalogError::storage)?
                {
                    Some(id) => id.value(),
                    None => return Ok(None),
                }
            }
        };

        let metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
        let labels = txn.open_table(LABELS).map_err(CatalogError::storage)?;
        let templates = txn.open_table(TEMPLATES).map_err(CatalogError::storage)?;
        load_metric(&metrics, &labels, &templates, id)
    }

    fn list_metrics(&self) -> Result<Vec<Metric>, CatalogError> {
        let txn = self.read()?;
        let names = txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
        let metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
        let labels = txn.open_table(LABELS).map_err(CatalogError::storage)?;
        let templates = txn.open_table(TEMPLATES).map_err(CatalogError::storage)?;

        let mut out = Vec::new();
        for item in names.iter().map_err(CatalogError::storage)? {
            let (_, id) = item.map_err(CatalogError::storage)?;
            if let Some(metric) = load_metric(&metrics, &labels, &templates, id.value())? {
                out.push(metric);
            }
        }
        Ok(out)
    }

    fn delete_metric(&self, metric_id: MetricId) -> Result<bool, CatalogError> {
        let deleted = self.write(|txn| {
            let row: MetricRow = {
                let metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
                let raw = metrics.get(metric_id).map_err(CatalogError::storage)?;
                match raw {
                    Some(raw) => serde_json::from_slice(raw.value())?,
                    None => return Ok(None),
                }
            };

            {
                let mut templates = txn.open_table(TEMPLATES).map_err(CatalogError::storage)?;
                let mut keys = Vec::new();
                for item in templates
                    .range((metric_id, 0_u64)..(metric_id + 1, 0_u64))
                    .map_err(CatalogError::storage)?
                {
                    let (key, _) = item.map_err(CatalogError::storage)?;
                    keys.push(key.value().1);
                }
                for template_id in keys {
                    templates
                        .remove((metric_id, template_id))
                        .map_err(CatalogError::storage)?;
                }
            }

            {
                let mut labels = txn.open_table(LABELS).map_err(CatalogError::storage)?;
                let mut keys = Vec::new();
                for item in labels
                    .range((metric_id, "")..(metric_id + 1, ""))
                    .map_err(CatalogError::storage)?
                {
                    let (key, _) = item.map_err(CatalogError::storage)?;
                    keys.push(key.value().1.to_string());
                }
                for label_name in &keys {
                    labels
                        .remove((metric_id, label_name.as_str()))
                        .map_err(CatalogError::storage)?;
                }
            }

            let mut names = txn.open_table(METRIC_NAMES).map_err(CatalogError::storage)?;
            names
                .remove(row.name.as_str())
                .map_err(CatalogError::storage)?;
            let mut metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
            metrics.remove(metric_id).map_err(CatalogError::storage)?;
            Ok(Some(row.name))
        })?;

        match deleted {
            Some(name) => {
                info!(metric_id, %name, "deleted metric");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn embeddings(&self) -> Result<Vec<(MetricId, Vec<f32>)>, CatalogError> {
        let txn = self.read()?;
        let metrics = txn.open_table(METRICS).map_err(CatalogError::storage)?;
        let mut out = Vec::new();
        for item in metrics.iter().map_err(CatalogError::storage)? {
            let (_, raw) = item.map_err(CatalogError::storage)?;
            let row: MetricRow = serde_json::from_slice(raw.value())?;
            if let Some(embedding) = row.embedding {
                out.push((row.id, embedding));
            }
        }
        Ok(out)
    }
}
