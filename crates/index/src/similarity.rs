use crate::IndexHit;
use std::cmp::Ordering;

/// Cosine similarity, computed as `1 - cosine_distance`.
///
/// Accumulates in f64 so near-equal scores still order deterministically.
/// Zero-norm inputs have similarity 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Calculate cosine distance (1 - cosine similarity). Lower is closer.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Keep hits scoring at least `threshold`, best first, ties broken by the
/// lowest metric id, truncated to `top_k`.
pub fn rank_hits(mut hits: Vec<IndexHit>, top_k: usize, threshold: f32) -> Vec<IndexHit> {
    hits.retain(|hit| hit.score >= threshold);
    hits.sort_unstable_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.metric_id.cmp(&b.metric_id))
    });
    hits.truncate(top_k);
    hits
}
