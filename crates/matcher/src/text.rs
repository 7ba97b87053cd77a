use catalog::Metric;

/// Substring matcher used whenever embedding search cannot answer.
///
/// Matching is case-insensitive over `name` and `description`. Metrics whose
/// name contains the query rank before description-only matches; within each
/// tier the input order is kept, so callers pass the catalog listing (sorted
/// by name) to get a stable result.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMatcher;

impl TextMatcher {
    pub fn rank(&self, metrics: Vec<Metric>, query: &str, top_k: usize) -> Vec<Metric> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut by_name = Vec::new();
        let mut by_description = Vec::new();
        for metric in metrics {
            if metric.name.to_lowercase().contains(&needle) {
                by_name.push(metric);
            } else if metric
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
            {
                by_description.push(metric);
            }
        }

        by_name
            .into_iter()
            .chain(by_description)
            .take(top_k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(id: u64, name: &str, description: Option<&str>) -> Metric {
        Metric {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            example_query: None,
            embedding: None,
            labels: Vec::new(),
            templates: Vec::new(),
        }
    }

    fn catalog() -> Vec<Metric> {
        vec![
            metric(1, "CPU_Usage_Percent", Some("CPU usage percentage")),
            metric(2, "disk_io_bytes_total", Some("Total disk I/O")),
            metric(3, "memory_usage_bytes", Some("Memory usage in bytes")),
            metric(4, "node_load1", Some("1m load average, see cpu count")),
        ]
    }

    fn names(metrics: &[Metric]) -> Vec<&str> {
        metrics.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn case_insensitive_name_match() {
        let hits = TextMatcher.rank(catalog(), "cpu", 5);
        assert_eq!(names(&hits), vec!["CPU_Usage_Percent", "node_load1"]);
    }

    #[test]
    fn name_hits_rank_above_description_hits() {
        let hits = TextMatcher.rank(catalog(), "bytes", 5);
        assert_eq!(names(&hits), vec!["disk_io_bytes_total", "memory_usage_bytes"]);

        let hits = TextMatcher.rank(catalog(), "usage", 5);
        assert_eq!(names(&hits), vec!["CPU_Usage_Percent", "memory_usage_bytes"]);

        let hits = TextMatcher.rank(catalog(), "i/o", 5);
        assert_eq!(names(&hits), vec!["disk_io_bytes_total"]);
    }

    #[test]
    fn truncates_to_top_k() {
        let hits = TextMatcher.rank(catalog(), "_", 2);
        assert_eq!(names(&hits), vec!["CPU_Usage_Percent", "disk_io_bytes_total"]);
    }

    #[test]
    fn no_match_and_blank_query_are_empty() {
        assert!(TextMatcher.rank(catalog(), "network", 5).is_empty());
        assert!(TextMatcher.rank(catalog(), "   ", 5).is_empty());
        assert!(TextMatcher.rank(catalog(), "cpu", 0).is_empty());
    }

    #[test]
    fn query_is_trimmed() {
        let hits = TextMatcher.rank(catalog(), "  memory ", 5);
        assert_eq!(names(&hits), vec!["memory_usage_bytes"]);
    }
}
