//! rbac-rag - Role-filtered retrieval-augmented question answering
//!
//! Answers questions over a private document corpus without letting any
//! chunk the asking role may not see reach the prompt context or the
//! cited sources.
//!
//! # Architecture
//!
//! - **policy**: closed role set, scope rules, immutable registry, filter
//! - **index**: embedding index trait with in-memory and Qdrant backends
//! - **rag**: role-filtered retriever, context composer, pipeline
//! - **embedding / generation**: Ollama-backed collaborators

pub mod errors;

// Re-export commonly used types
pub use errors::{RagError, Result};

pub mod policy;
pub mod index;
pub mod embedding;
pub mod generation;
pub mod rag;

pub mod cancellation;
pub mod retry;

// Application layer
pub mod cli;
pub mod config;
pub mod ingest;
