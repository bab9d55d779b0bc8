//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rbac_rag::cancellation::CancellationToken;
use rbac_rag::embedding::Embedder;
use rbac_rag::generation::Generator;
use rbac_rag::index::{Candidate, DocumentChunk, EmbeddingIndex};
use rbac_rag::{RagError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embedder returning a constant vector, optionally slow or failing
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RagError::Embedding("model not loaded".to_string()));
        }
        Ok(vec![1.0, 0.0])
    }
}

/// Index returning a fixed ranking, truncated to the requested width
#[derive(Default)]
pub struct ScriptedIndex {
    pub ranked: Vec<Candidate>,
    pub widths: Mutex<Vec<usize>>,
    pub fail: bool,
    pub cancel_on_search: Option<CancellationToken>,
}

impl ScriptedIndex {
    pub fn new(ranked: Vec<Candidate>) -> Self {
        Self {
            ranked,
            ..Default::default()
        }
    }

    pub fn widths(&self) -> Vec<usize> {
        self.widths.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingIndex for ScriptedIndex {
    async fn search(&self, _query: &[f32], n: usize) -> Result<Vec<Candidate>> {
        self.widths.lock().unwrap().push(n);
        if let Some(token) = &self.cancel_on_search {
            token.cancel();
        }
        if self.fail {
            return Err(RagError::IndexUnavailable("connection refused".to_string()));
        }
        Ok(self.ranked.iter().take(n).cloned().collect())
    }

    async fn corpus_size(&self) -> Result<usize> {
        Ok(self.ranked.len())
    }
}

/// Generator echoing a fixed answer and recording the context it saw
#[derive(Default)]
pub struct RecordingGenerator {
    pub calls: AtomicUsize,
    pub contexts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<String> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, _query: &str, context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        if self.fail {
            return Err(RagError::Generation("model crashed".to_string()));
        }
        Ok("generated answer".to_string())
    }
}

/// Candidates for `paths` ranked in the given order with strictly
/// decreasing scores; chunk text is `text of <path>`.
pub fn ranked(paths: &[&str]) -> Vec<Candidate> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| candidate(path, i, 1.0 - i as f32 * 0.01))
        .collect()
}

pub fn candidate(path: &str, n: usize, score: f32) -> Candidate {
    candidate_with_text(path, n, score, &format!("text of {}", path))
}

pub fn candidate_with_text(path: &str, n: usize, score: f32, text: &str) -> Candidate {
    Candidate {
        chunk: Arc::new(DocumentChunk {
            chunk_id: format!("{}#{}", path, n),
            source_path: path.to_string(),
            text: text.to_string(),
            embedding: Vec::new(),
            row: None,
        }),
        score,
    }
}
