// End-to-end ask: role check -> retrieve -> compose -> generate
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::errors::{RagError, Result};
use crate::generation::{Generator, NO_ACCESSIBLE_CONTEXT};
use crate::policy::Role;
use crate::rag::context::{ComposedContext, ContextComposer, ContextConfig};
use crate::rag::retrieval::{AuthorizedContext, RetrievalParams, RoleFilteredRetriever};
use crate::rag::timeouts::{with_budget, Timeouts};

/// RAG pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RAGConfig {
    /// Overfetch / widening parameters
    #[serde(default)]
    pub retrieval: RetrievalParams,
    /// Context assembly configuration
    #[serde(default)]
    pub context: ContextConfig,
    /// Per-call time budgets
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Answer with the sources it was allowed to draw on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
    pub role: Role,
    /// Chunks placed in the generation context
    pub chunks_used: usize,
}

impl Answer {
    /// True when no authorized material was found for the question
    pub fn is_empty_context(&self) -> bool {
        self.chunks_used == 0
    }
}

/// Role-filtered question answering
pub struct RAGPipeline {
    retriever: RoleFilteredRetriever,
    composer: ContextComposer,
    generator: Arc<dyn Generator>,
    timeouts: Timeouts,
}

impl RAGPipeline {
    pub fn new(
        retriever: RoleFilteredRetriever,
        generator: Arc<dyn Generator>,
        config: &RAGConfig,
    ) -> Self {
        Self {
            retriever: retriever.with_timeouts(config.timeouts.clone()),
            composer: ContextComposer::with_config(config.context.clone()),
            generator,
            timeouts: config.timeouts.clone(),
        }
    }

    /// Answer `query` for the role named `role`.
    ///
    /// Unknown roles are rejected before any collaborator is called.
    pub async fn ask(&self, query: &str, role: &str, cancel: &CancellationToken) -> Result<Answer> {
        let role: Role = role.parse()?;
        let request_id = Uuid::new_v4();
        let span = info_span!("ask", %request_id, %role);
        self.ask_as(query, role, cancel).instrument(span).await
    }

    async fn ask_as(&self, query: &str, role: Role, cancel: &CancellationToken) -> Result<Answer> {
        let authorized = self.retrieve(query, role, cancel).await?;
        let composed = self.composer.compose(&authorized);

        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }
        if composed.truncated {
            warn!(
                max_context_chars = self.composer.config().max_context_chars,
                "top chunk exceeds the context budget, sending it truncated"
            );
        }

        // Only an empty authorized set means "nothing accessible"
        let context_text = if authorized.is_empty() {
            NO_ACCESSIBLE_CONTEXT
        } else {
            composed.text.as_str()
        };

        let answer = with_budget(
            "generation",
            self.timeouts.generation_ms,
            self.generator.generate(query, context_text),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, discarded_sources = composed.citations.len(), "generation failed");
            e
        })?;

        info!(sources = composed.citations.len(), chunks = composed.chunk_count, "answered");

        Ok(Answer {
            answer,
            sources: composed.source_paths(),
            role,
            chunks_used: composed.chunk_count,
        })
    }

    /// Retrieval and composition without generation
    pub async fn retrieve_context(
        &self,
        query: &str,
        role: Role,
        cancel: &CancellationToken,
    ) -> Result<ComposedContext> {
        let authorized = self.retrieve(query, role, cancel).await?;
        Ok(self.composer.compose(&authorized))
    }

    pub async fn retrieve(
        &self,
        query: &str,
        role: Role,
        cancel: &CancellationToken,
    ) -> Result<AuthorizedContext> {
        self.retriever.retrieve(query, role, cancel).await
    }

    pub fn retriever(&self) -> &RoleFilteredRetriever {
        &self.retriever
    }
}
