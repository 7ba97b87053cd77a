//! Durable catalog behaviour across process restarts (simulated by reopening).

use std::sync::Arc;

use promrag::{
    bootstrap, sample, CatalogConfig, CatalogError, Embedder, IndexState, RagConfig, StubEmbedder,
};
use tempfile::tempdir;

fn redb_config(path: &std::path::Path, dimension: usize) -> RagConfig {
    let mut config = RagConfig::default();
    config.store.backend = "redb".to_string();
    config.store.path = Some(path.to_string_lossy().into_owned());
    config.store.dimension = dimension;
    config
}

#[test]
fn reopen_preserves_rows_and_rebuilds_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.redb");
    let config = redb_config(&path, 32);
    let embedder = Arc::new(StubEmbedder::new(32));

    let ids = {
        let r = bootstrap(&config, Some(embedder.clone())).unwrap();
        let ids = sample::seed_sample_catalog(&r, embedder.as_ref()).unwrap();
        r.close().unwrap();
        ids
    };

    let r = bootstrap(&config, Some(embedder.clone())).unwrap();
    assert_eq!(r.index_state(), IndexState::Available);

    let all = r.list_all().unwrap();
    assert_eq!(all.len(), 3);
    let cpu = r.get_by_name("cpu_usage_percent").unwrap().unwrap();
    assert_eq!(cpu.id, ids[0]);
    assert_eq!(cpu.labels.len(), 2);
    assert_eq!(cpu.templates.len(), 2);
    assert_eq!(cpu.embedding.as_ref().map(Vec::len), Some(32));

    // The HNSW mirror is ephemeral; it must have been refilled on open.
    let query = embedder.embed("cpu_usage_percent").unwrap();
    let hits = r.similarity_search(&query, 1, 0.99).unwrap();
    assert_eq!(hits[0].metric.id, ids[0]);
}

#[test]
fn ids_are_not_reused_after_delete() {
    let dir = tempdir().unwrap();
    let config = redb_config(&dir.path().join("ids.redb"), 4);

    let first = {
        let r = bootstrap(&config, None).unwrap();
        let id = r
            .upsert_metric(&promrag::NewMetric::new("a_total"))
            .unwrap();
        assert!(r.delete_metric(id).unwrap());
        r.close().unwrap();
        id
    };

    let r = bootstrap(&config, None).unwrap();
    let second = r
        .upsert_metric(&promrag::NewMetric::new("a_total"))
        .unwrap();
    assert!(second > first);
}

#[test]
fn reopening_with_other_dimension_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dim.redb");

    bootstrap(&redb_config(&path, 16), None)
        .unwrap()
        .close()
        .unwrap();

    let err = match bootstrap(&redb_config(&path, 24), None) {
        Ok(_) => panic!("dimension change must fail"),
        Err(err) => err,
    };
    match err {
        promrag::PromragError::Catalog(e) => assert!(e.is_configuration(), "{e}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn catalog_config_opens_redb_directly() -> Result<(), CatalogError> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("direct.redb");
    let store = CatalogConfig::new(
        promrag::BackendConfig::redb(path.to_string_lossy()),
        3,
    )
    .build()?;
    assert_eq!(store.dimension(), 3);
    assert!(store.list_metrics()?.is_empty());
    Ok(())
}
