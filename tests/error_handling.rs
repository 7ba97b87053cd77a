use promrag::{
    CatalogError, IndexCandidate, IndexState, MetricKey, MetricRetriever, NewMetric,
    RetrieverConfig,
};

fn retriever(dim: usize) -> MetricRetriever {
    MetricRetriever::open(&RetrieverConfig::in_memory(dim)).unwrap()
}

#[test]
fn empty_metric_name_is_a_configuration_error() {
    let r = retriever(2);
    let err = r.upsert_metric(&NewMetric::new("   ")).unwrap_err();
    assert!(err.is_configuration());
    assert!(r.list_all().unwrap().is_empty());
}

#[test]
fn wrong_embedding_length_is_rejected_before_writing() {
    let r = retriever(3);
    let err = r
        .upsert_metric(&NewMetric::new("up").with_embedding(vec![1.0, 0.0]))
        .unwrap_err();
    assert_eq!(err, CatalogError::DimensionMismatch { expected: 3, got: 2 });
    assert!(r.get_by_name("up").unwrap().is_none());
}

#[test]
fn non_finite_embedding_is_rejected() {
    let r = retriever(2);
    let err = r
        .upsert_metric(&NewMetric::new("up").with_embedding(vec![f32::INFINITY, 0.0]))
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn label_on_missing_metric_is_not_found() {
    let r = retriever(2);
    let err = r.add_label(42, "job", None).unwrap_err();
    assert_eq!(err, CatalogError::NotFound(MetricKey::Id(42)));

    let err = r.add_template(42, "up", None, None).unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[test]
fn blank_label_and_template_are_rejected() {
    let r = retriever(2);
    let id = r.upsert_metric(&NewMetric::new("up")).unwrap();
    assert!(r.add_label(id, "", None).unwrap_err().is_configuration());
    assert!(r.add_template(id, "  ", None, None).unwrap_err().is_configuration());
    let metric = r.get_metric(id).unwrap().unwrap();
    assert!(metric.labels.is_empty());
    assert!(metric.templates.is_empty());
}

#[test]
fn missing_lookups_are_none_not_errors() {
    let r = retriever(2);
    assert!(r.get_by_name("nope").unwrap().is_none());
    assert!(r.get_metric(7).unwrap().is_none());
    assert!(!r.delete_metric(7).unwrap());
}

#[test]
fn zero_dimension_cannot_start() {
    assert!(matches!(
        MetricRetriever::open(&RetrieverConfig::in_memory(0)),
        Err(CatalogError::Configuration(_))
    ));
}

#[test]
fn unloadable_index_is_not_fatal() {
    let config = RetrieverConfig::in_memory(2).with_index(vec![IndexCandidate::Disabled]);
    let r = MetricRetriever::open(&config).unwrap();
    assert_eq!(r.index_state(), IndexState::Unavailable);

    let id = r
        .upsert_metric(&NewMetric::new("up").with_embedding(vec![1.0, 0.0]))
        .unwrap();
    assert!(r
        .similarity_search_with_text(&[1.0, 0.0], "UP", 3, 0.5)
        .unwrap()
        .iter()
        .any(|h| h.metric.id == id && h.score == 0.0));
}
