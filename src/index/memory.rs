//! In-process embedding index
//!
//! Scores every chunk against the query vector. Results are sorted by
//! descending score with a stable sort, so equal scores keep the order in
//! which chunks were inserted.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::index::{cosine_similarity, Candidate, DocumentChunk, EmbeddingIndex};

/// Brute-force cosine index over chunks held in memory
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    chunks: Vec<Arc<DocumentChunk>>,
    dimension: Option<usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. All vectors must share one dimension.
    pub fn insert(&mut self, chunk: DocumentChunk) -> Result<()> {
        match self.dimension {
            Some(dim) if dim != chunk.embedding.len() => {
                return Err(RagError::ConfigError(format!(
                    "Chunk {} has dimension {}, index expects {}",
                    chunk.chunk_id,
                    chunk.embedding.len(),
                    dim
                )));
            }
            None => self.dimension = Some(chunk.embedding.len()),
            _ => {}
        }
        self.chunks.push(Arc::new(chunk));
        Ok(())
    }

    pub fn extend(&mut self, chunks: impl IntoIterator<Item = DocumentChunk>) -> Result<()> {
        for chunk in chunks {
            self.insert(chunk)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct source paths, in first-insertion order
    pub fn source_paths(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut paths = Vec::new();
        for chunk in &self.chunks {
            if seen.insert(chunk.source_path.as_str()) {
                paths.push(chunk.source_path.clone());
            }
        }
        paths
    }
}

#[async_trait]
impl EmbeddingIndex for InMemoryIndex {
    async fn search(&self, query: &[f32], n: usize) -> Result<Vec<Candidate>> {
        if n == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dimension {
            if dim != query.len() {
                return Err(RagError::Embedding(format!(
                    "Query vector has dimension {}, index expects {}",
                    query.len(),
                    dim
                )));
            }
        }

        let mut scored: Vec<Candidate> = self
            .chunks
            .iter()
            .map(|chunk| Candidate {
                chunk: Arc::clone(chunk),
                score: cosine_similarity(query, &chunk.embedding),
            })
            .collect();

        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(n);
        Ok(scored)
    }

    async fn corpus_size(&self) -> Result<usize> {
        Ok(self.chunks.len())
    }
}
