//! Embedding support
//!
//! Embedding generation is an external collaborator: callers hand the store
//! pre-computed vectors, or the service is configured with an [`Embedder`]
//! implementation that wraps whatever provider produces them. The core only
//! stores vectors (little-endian f32 blobs), conforms their dimensions, and
//! computes cosine similarity during vector search.
//!
//! A vector's presence never changes scoring; it only makes vector search
//! available for that item.

use crate::memory::MemoryKind;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Every stored vector is padded or truncated to this many dimensions
pub const MAX_EMBEDDING_DIMENSIONS: usize = 768;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding provider error
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider unreachable or not configured
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Input the provider cannot embed (empty, oversized, ...)
    #[error("Invalid embedding input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDER SEAM
// ============================================================================

/// External embedding provider: `embed(text, kind) -> vector`
///
/// Vectors for the same kind must share a fixed dimension no larger than
/// [`MAX_EMBEDDING_DIMENSIONS`]; the store conforms whatever comes back.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str, kind: MemoryKind) -> Result<Vec<f32>, EmbeddingError>;
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A stored embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector, conformed to [`MAX_EMBEDDING_DIMENSIONS`]
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create an embedding, padding or truncating to the storage dimension
    pub fn new(vector: Vec<f32>) -> Self {
        let vector = conform_dimensions(vector);
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Cosine similarity with another embedding
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Convert to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Create from stored bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Pad with zeros or truncate so the vector has exactly
/// [`MAX_EMBEDDING_DIMENSIONS`] entries
pub fn conform_dimensions(mut vector: Vec<f32>) -> Vec<f32> {
    vector.resize(MAX_EMBEDDING_DIMENSIONS, 0.0);
    vector
}

/// Cosine similarity of two vectors; 0.0 when either has zero magnitude or
/// the lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conform_pads_and_truncates() {
        let short = conform_dimensions(vec![1.0, 2.0]);
        assert_eq!(short.len(), MAX_EMBEDDING_DIMENSIONS);
        assert_eq!(short[0], 1.0);
        assert_eq!(short[2], 0.0);

        let long = conform_dimensions(vec![1.0; MAX_EMBEDDING_DIMENSIONS + 100]);
        assert_eq!(long.len(), MAX_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn bytes_roundtrip() {
        let embedding = Embedding::new(vec![0.25, -1.5, 3.75]);
        let bytes = embedding.to_bytes();
        assert_eq!(bytes.len(), MAX_EMBEDDING_DIMENSIONS * 4);

        let restored = Embedding::from_bytes(&bytes).unwrap();
        assert_eq!(restored, embedding);

        // Truncated byte strings are rejected
        assert!(Embedding::from_bytes(&bytes[..6]).is_none());
    }

    #[test]
    fn cosine_basics() {
        let a = [1.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        let d = [-1.0, 0.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn zero_padding_preserves_similarity() {
        // Conforming both sides pads with zeros, which leaves cosine intact
        let a = Embedding::new(vec![0.6, 0.8]);
        let b = Embedding::new(vec![0.6, 0.8]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }
}
