//! Boundary to the embedding model.
//!
//! The model itself lives outside this engine; the retriever only needs a
//! text -> vector function of a fixed dimension.

use fxhash::hash64;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("embedding model returned {got} values, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Deterministic embedder for tests, demos and offline runs.
///
/// Each vector is derived from a hash of the lowercased text and then
/// L2-normalised, so equal texts always embed identically. It carries no
/// semantic meaning: only identical texts are similar.
#[derive(Debug, Clone, Copy)]
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let h = hash64(text.trim().to_lowercase().as_bytes());
        let mut v: Vec<f32> = (0..self.dimension)
            .map(|idx| {
                let mixed = h.rotate_left((idx % 64) as u32)
                    ^ (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                ((mixed >> 11) as f32 * 1.0e-9).sin()
            })
            .collect();
        l2_normalize_in_place(&mut v);
        Ok(v)
    }
}

pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_deterministic_and_normalised() {
        let embedder = StubEmbedder::new(64);
        let a = embedder.embed("cpu usage").unwrap();
        let b = embedder.embed("  CPU usage ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm={norm}");
    }

    #[test]
    fn different_text_differs() {
        let embedder = StubEmbedder::new(32);
        assert_ne!(
            embedder.embed("memory").unwrap(),
            embedder.embed("disk").unwrap()
        );
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0; 4];
        l2_normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }
}
