//! End-to-end catalog scenarios through the public facade.

use std::sync::Arc;

use promrag::{
    bootstrap, sample, CatalogError, Embedder, IndexState, MetricRetriever, NewMetric, RagConfig,
    RetrieverConfig, StubEmbedder,
};

const DIM: usize = 8;

fn ingest_reference(r: &MetricRetriever) -> Result<[u64; 3], CatalogError> {
    let cpu = r.upsert_metric(
        &NewMetric::new("cpu_usage_percent").with_description("CPU usage percentage"),
    )?;
    let mem = r.upsert_metric(
        &NewMetric::new("memory_usage_bytes").with_description("Memory usage in bytes"),
    )?;
    let disk = r.upsert_metric(
        &NewMetric::new("disk_io_bytes_total").with_description("Total disk I/O"),
    )?;

    r.add_label(cpu, "instance", Some("server1, server2"))?;
    r.add_template(cpu, r#"avg(cpu_usage_percent{instance="{instance}"})"#, None, None)?;
    r.add_label(mem, "instance", Some("server1"))?;
    r.add_template(mem, "sum(memory_usage_bytes) by (instance)", None, None)?;
    r.add_label(disk, "device", Some("/dev/sda"))?;
    r.add_template(disk, "rate(disk_io_bytes_total[5m])", None, None)?;
    Ok([cpu, mem, disk])
}

#[test]
fn reference_scenario() -> Result<(), CatalogError> {
    let r = MetricRetriever::open(&RetrieverConfig::in_memory(DIM))?;
    let [cpu, _, _] = ingest_reference(&r)?;

    let all = r.list_all()?;
    let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        ["cpu_usage_percent", "disk_io_bytes_total", "memory_usage_bytes"]
    );
    for metric in &all {
        assert_eq!(metric.labels.len(), 1, "{}", metric.name);
        assert_eq!(metric.templates.len(), 1, "{}", metric.name);
        assert_eq!(metric.templates[0].template_type, "promql");
    }

    let hits = r.search_by_text("memory", 5)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "memory_usage_bytes");

    assert!(r.delete_metric(cpu)?);
    let remaining: Vec<_> = r.list_all()?.into_iter().map(|m| m.name).collect();
    assert_eq!(remaining, ["disk_io_bytes_total", "memory_usage_bytes"]);
    assert!(r.get_metric(cpu)?.is_none());
    Ok(())
}

#[test]
fn upsert_is_idempotent() -> Result<(), CatalogError> {
    let r = MetricRetriever::open(&RetrieverConfig::in_memory(DIM))?;
    let metric = NewMetric::new("up").with_description("target is up");
    let first = r.upsert_metric(&metric)?;
    let second = r.upsert_metric(&metric)?;
    assert_eq!(first, second);
    assert_eq!(r.list_all()?.len(), 1);
    Ok(())
}

#[test]
fn label_and_template_semantics() -> Result<(), CatalogError> {
    let r = MetricRetriever::open(&RetrieverConfig::in_memory(DIM))?;
    let id = r.upsert_metric(&NewMetric::new("http_requests_total"))?;

    let l1 = r.add_label(id, "code", Some("200"))?;
    let l2 = r.add_label(id, "code", Some("200, 404, 500"))?;
    assert_eq!(l1, l2);

    let t1 = r.add_template(id, "sum(rate(http_requests_total[5m]))", None, None)?;
    let t2 = r.add_template(id, "sum(rate(http_requests_total[5m]))", None, None)?;
    assert_ne!(t1, t2);

    let metric = r.get_by_name("http_requests_total")?.unwrap();
    assert_eq!(metric.labels.len(), 1);
    assert_eq!(metric.labels[0].example_values.as_deref(), Some("200, 404, 500"));
    assert_eq!(metric.templates.len(), 2);
    Ok(())
}

#[test]
fn text_search_is_case_insensitive() -> Result<(), CatalogError> {
    let r = MetricRetriever::open(&RetrieverConfig::in_memory(DIM))?;
    r.upsert_metric(&NewMetric::new("CPU_Usage_Percent"))?;
    let hits = r.search_by_text("cpu", 5)?;
    assert_eq!(hits[0].name, "CPU_Usage_Percent");
    assert!(r.search_by_text("network", 5)?.is_empty());
    Ok(())
}

#[test]
fn bootstrap_seed_and_retrieve() {
    let mut config = RagConfig::default();
    config.store.dimension = 64;
    let embedder = Arc::new(StubEmbedder::new(64));
    let r = bootstrap(&config, Some(embedder.clone())).unwrap();
    assert_eq!(r.index_state(), IndexState::Available);

    let ids = sample::seed_sample_catalog(&r, embedder.as_ref()).unwrap();
    assert_eq!(ids.len(), 3);

    // Reseeding does not duplicate templates.
    let again = sample::seed_sample_catalog(&r, embedder.as_ref()).unwrap();
    assert_eq!(ids, again);
    for metric in r.list_all().unwrap() {
        assert_eq!(metric.labels.len(), 2);
        assert_eq!(metric.templates.len(), 2);
    }

    let hits = r.retrieve("disk_io_bytes_total", 1, 0.9).unwrap();
    assert_eq!(hits[0].metric.name, "disk_io_bytes_total");
    assert!(hits[0].score > 0.99);

    let embedding = embedder.embed("memory_usage_bytes").unwrap();
    let hits = r.similarity_search(&embedding, 3, 0.99).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metric.name, "memory_usage_bytes");
}

#[test]
fn forced_unavailable_still_answers() {
    let mut config = RagConfig::default();
    config.store.dimension = 16;
    let embedder = Arc::new(StubEmbedder::new(16));
    let r = bootstrap(&config, Some(embedder.clone())).unwrap();
    sample::seed_sample_catalog(&r, embedder.as_ref()).unwrap();

    r.force_index_unavailable("maintenance");
    assert_eq!(r.index_state(), IndexState::Unavailable);

    let query = embedder.embed("cpu_usage_percent").unwrap();
    assert!(r.similarity_search(&query, 5, 0.7).unwrap().is_empty());

    let hits = r.retrieve("usage", 5, 0.7).unwrap();
    let names: Vec<_> = hits.iter().map(|h| h.metric.name.as_str()).collect();
    assert_eq!(names, ["cpu_usage_percent", "memory_usage_bytes"]);
    assert!(hits.iter().all(|h| h.score == 0.0));
}
