// Role-filtered RAG pipeline
//
// Components:
// - Retrieval: overfetch against the embedding index, authorize each
//   candidate, truncate to k, widen when authorized results run short
// - Context: render the authorized chunks and extract citations
// - Pipeline: role check, retrieval, composition, generation

pub mod retrieval;
pub mod context;
pub mod pipeline;
pub mod timeouts;

// Re-export key types
pub use context::{Citation, ComposedContext, ContextComposer, ContextConfig};
pub use pipeline::{Answer, RAGConfig, RAGPipeline};
pub use retrieval::{AuthorizedContext, RetrievalParams, RoleFilteredRetriever};
pub use timeouts::Timeouts;
