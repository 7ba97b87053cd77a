//! Reference catalog used by demos, the `seed` command and tests.

use catalog::{MetricId, NewMetric};
use matcher::{Embedder, MetricRetriever};
use tracing::info;

use crate::PromragError;

pub struct SampleMetric {
    pub name: &'static str,
    pub description: &'static str,
    pub example_query: &'static str,
    pub labels: [(&'static str, &'static str); 2],
    pub templates: [&'static str; 2],
}

pub const SAMPLE_METRICS: [SampleMetric; 3] = [
    SampleMetric {
        name: "cpu_usage_percent",
        description: "CPU usage percentage across all cores",
        example_query: r#"cpu_usage_percent{instance="server1"}"#,
        labels: [
            ("instance", "server1, server2, web-01"),
            ("cpu_core", "0, 1, 2, 3"),
        ],
        templates: [
            r#"sum(rate(cpu_usage_percent{instance="{instance}"}[5m]))"#,
            r#"avg_over_time(cpu_usage_percent{instance="{instance}"}[1h])"#,
        ],
    },
    SampleMetric {
        name: "memory_usage_bytes",
        description: "Memory usage in bytes",
        example_query: r#"memory_usage_bytes{instance="server1"}"#,
        labels: [
            ("instance", "server1, server2, db-01"),
            ("memory_type", "used, free, cached"),
        ],
        templates: [
            r#"memory_usage_bytes{instance="{instance}", memory_type="used"}"#,
            r#"sum(memory_usage_bytes{memory_type="used"}) by (instance)"#,
        ],
    },
    SampleMetric {
        name: "disk_io_bytes_total",
        description: "Total disk I/O operations in bytes",
        example_query: r#"disk_io_bytes_total{device="/dev/sda"}"#,
        labels: [
            ("device", "/dev/sda, /dev/nvme0n1"),
            ("direction", "read, write"),
        ],
        templates: [
            r#"rate(disk_io_bytes_total{device="{device}"}[5m])"#,
            r#"sum(rate(disk_io_bytes_total[5m])) by (device)"#,
        ],
    },
];

/// Ingest [`SAMPLE_METRICS`], embedding each metric's name.
///
/// Safe to run more than once: metrics and labels are upserted, and templates
/// are only added to metrics that did not exist yet.
pub fn seed_sample_catalog(
    retriever: &MetricRetriever,
    embedder: &dyn Embedder,
) -> Result<Vec<MetricId>, PromragError> {
    let mut ids = Vec::with_capacity(SAMPLE_METRICS.len());
    for sample in &SAMPLE_METRICS {
        let existed = retriever.get_by_name(sample.name)?.is_some();
        let embedding = embedder.embed(sample.name)?;
        let id = retriever.upsert_metric(
            &NewMetric::new(sample.name)
                .with_description(sample.description)
                .with_example_query(sample.example_query)
                .with_embedding(embedding),
        )?;

        for (label, examples) in sample.labels {
            retriever.add_label(id, label, Some(examples))?;
        }
        if !existed {
            let description = format!("Template for {}", sample.name);
            for template in sample.templates {
                retriever.add_template(id, template, None, Some(&description))?;
            }
        }
        ids.push(id);
    }
    info!(metrics = ids.len(), "sample catalog seeded");
    Ok(ids)
}
