use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a metric row.
pub type MetricId = u64;
/// Store-assigned identifier of a label row.
pub type LabelId = u64;
/// Store-assigned identifier of a template row.
pub type TemplateId = u64;

/// Template type used when the caller does not name one.
pub const DEFAULT_TEMPLATE_TYPE: &str = "promql";

/// Input for [`crate::CatalogBackend::upsert_metric`].
///
/// `name` is the natural key: writing an existing name replaces the
/// description, example query and embedding of that row and keeps its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetric {
    pub name: String,
    pub description: Option<String>,
    pub example_query: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl NewMetric {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: None,
            example_query: None,
            embedding: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_example_query<S: Into<String>>(mut self, example_query: S) -> Self {
        self.example_query = Some(example_query.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A metric hydrated with the labels and templates it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    pub name: String,
    pub description: Option<String>,
    pub example_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Ordered by label name.
    pub labels: Vec<Label>,
    /// Ordered by insertion.
    pub templates: Vec<Template>,
}

/// A dimension along which a metric's series are partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub metric_id: MetricId,
    pub label_name: String,
    pub example_values: Option<String>,
}

/// A parameterized query associated with a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub metric_id: MetricId,
    pub template: String,
    pub template_type: String,
    pub description: Option<String>,
}

/// Lookup key accepted by [`crate::CatalogBackend::get_metric`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKey {
    Id(MetricId),
    Name(String),
}

impl From<MetricId> for MetricKey {
    fn from(id: MetricId) -> Self {
        MetricKey::Id(id)
    }
}

impl From<&str> for MetricKey {
    fn from(name: &str) -> Self {
        MetricKey::Name(name.to_string())
    }
}

impl From<String> for MetricKey {
    fn from(name: String) -> Self {
        MetricKey::Name(name)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Id(id) => write!(f, "metric id {id}"),
            MetricKey::Name(name) => write!(f, "metric '{name}'"),
        }
    }
}

/// Row layout of a metric as persisted, without the owned rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MetricRow {
    pub id: MetricId,
    pub name: String,
    pub description: Option<String>,
    pub example_query: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl MetricRow {
    pub(crate) fn hydrate(self, labels: Vec<Label>, templates: Vec<Template>) -> Metric {
        Metric {
            id: self.id,
            name: self.name,
            description: self.description,
            example_query: self.example_query,
            embedding: self.embedding,
            labels,
            templates,
        }
    }
}
