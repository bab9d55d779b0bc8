// Embedding index: nearest-neighbor search over chunk vectors
//
// The retriever only depends on the `EmbeddingIndex` trait. Backends:
// - InMemoryIndex: brute-force cosine similarity, insertion-order ties
// - QdrantIndex: Qdrant collection, ties follow the server's order

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::Result;

/// Unit of retrievable text, produced at ingestion and read-only afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub source_path: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Row number for chunks cut from tabular sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

/// A chunk paired with its relevance for one query (higher = more relevant)
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

impl Candidate {
    pub fn source_path(&self) -> &str {
        &self.chunk.source_path
    }
}

/// Search capability consumed by the retriever
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Up to `n` candidates, highest relevance first.
    ///
    /// Equal scores must come back in a stable, documented order.
    async fn search(&self, query: &[f32], n: usize) -> Result<Vec<Candidate>>;

    /// Total number of chunks available for search
    async fn corpus_size(&self) -> Result<usize>;
}

/// Cosine similarity; zero vectors and non-finite input score 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_nan() {
        return 0.0;
    }
    similarity
}

pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;
