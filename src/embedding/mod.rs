// Embedding collaborator: text → vector

pub mod ollama;

use async_trait::async_trait;

use crate::errors::Result;

/// Turns text into a vector. Failures surface as `RagError::Embedding`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub use ollama::OllamaEmbedder;
