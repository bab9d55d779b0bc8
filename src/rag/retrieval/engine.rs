// Role-filtered retrieval: overfetch, authorize, truncate, widen
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cancellation::CancellationToken;
use crate::embedding::Embedder;
use crate::errors::{RagError, Result};
use crate::index::{Candidate, EmbeddingIndex};
use crate::policy::{AuthorizationFilter, PolicyRegistry, Role};
use crate::rag::timeouts::{with_budget, Timeouts};

/// Overfetch and widening parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    /// Final context size
    pub k: usize,
    /// First query requests `k * overfetch_multiplier` candidates
    pub overfetch_multiplier: usize,
    /// Widening never requests more than `k * widen_ceiling_multiplier`
    /// (or the corpus size, whichever is smaller)
    pub widen_ceiling_multiplier: usize,
    /// Width growth per widening round
    pub widen_growth_factor: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 5,
            overfetch_multiplier: 3,
            widen_ceiling_multiplier: 10,
            widen_growth_factor: 2,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(RagError::ConfigError("k must be at least 1".to_string()));
        }
        if self.overfetch_multiplier == 0 {
            return Err(RagError::ConfigError(
                "overfetch_multiplier must be at least 1".to_string(),
            ));
        }
        if self.widen_ceiling_multiplier < self.overfetch_multiplier {
            return Err(RagError::ConfigError(format!(
                "widen_ceiling_multiplier ({}) is below overfetch_multiplier ({})",
                self.widen_ceiling_multiplier, self.overfetch_multiplier
            )));
        }
        if self.widen_growth_factor < 2 {
            return Err(RagError::ConfigError(
                "widen_growth_factor must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Width of the first index query
    pub fn initial_width(&self) -> usize {
        self.k.saturating_mul(self.overfetch_multiplier)
    }

    /// Largest width widening may reach for a corpus of `corpus_size`
    pub fn ceiling(&self, corpus_size: usize) -> usize {
        self.k
            .saturating_mul(self.widen_ceiling_multiplier)
            .min(corpus_size)
    }

    /// Next width after `width`, capped at `ceiling`
    fn widen(&self, width: usize, ceiling: usize) -> usize {
        width.saturating_mul(self.widen_growth_factor).min(ceiling)
    }
}

/// Bookkeeping of one retrieval call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Index queries issued
    pub index_queries: usize,
    /// Width of the last index query
    pub final_width: usize,
    /// Candidates returned by the last index query
    pub candidates_fetched: usize,
    /// Candidates of the last query rejected by the authorization filter
    pub candidates_denied: usize,
}

/// Permission-filtered, size-bounded, relevance-ordered chunk set for one
/// request. Every candidate is authorized for `role` and there are never
/// more than `k` of them.
#[derive(Debug, Clone)]
pub struct AuthorizedContext {
    role: Role,
    k: usize,
    candidates: Vec<Candidate>,
    stats: RetrievalStats,
}

impl AuthorizedContext {
    fn empty(role: Role, k: usize) -> Self {
        Self {
            role,
            k,
            candidates: Vec::new(),
            stats: RetrievalStats::default(),
        }
    }

    /// Keep authorized candidates in index order, truncated to `k`
    pub fn from_candidates(
        filter: &AuthorizationFilter<'_>,
        role: Role,
        k: usize,
        candidates: Vec<Candidate>,
    ) -> Self {
        let fetched = candidates.len();
        let mut denied = 0;
        let mut kept = Vec::with_capacity(k.min(fetched));

        for candidate in candidates {
            if filter.is_authorized(role, candidate.source_path()) {
                if kept.len() < k {
                    kept.push(candidate);
                }
            } else {
                denied += 1;
            }
        }

        Self {
            role,
            k,
            candidates: kept,
            stats: RetrievalStats {
                index_queries: 0,
                final_width: 0,
                candidates_fetched: fetched,
                candidates_denied: denied,
            },
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.candidates.len() >= self.k
    }

    pub fn stats(&self) -> &RetrievalStats {
        &self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }
}

/// Composes index search with the authorization filter
pub struct RoleFilteredRetriever {
    registry: Arc<PolicyRegistry>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn EmbeddingIndex>,
    params: RetrievalParams,
    timeouts: Timeouts,
}

impl RoleFilteredRetriever {
    pub fn new(
        registry: Arc<PolicyRegistry>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn EmbeddingIndex>,
        params: RetrievalParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            registry,
            embedder,
            index,
            params,
            timeouts: Timeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Retrieve up to `k` authorized chunks for `query`.
    ///
    /// An empty result is a success meaning "nothing relevant is visible
    /// to this role". Collaborator failures and timeouts are errors.
    pub async fn retrieve(
        &self,
        query: &str,
        role: Role,
        cancel: &CancellationToken,
    ) -> Result<AuthorizedContext> {
        let k = self.params.k;

        if self.registry.scopes(role).is_empty() {
            debug!(%role, "role has no scope rules, skipping retrieval");
            return Ok(AuthorizedContext::empty(role, k));
        }

        check_cancelled(cancel)?;
        let query_vector = with_budget(
            "embedding",
            self.timeouts.embedding_ms,
            self.embedder.embed(query),
        )
        .await?;

        check_cancelled(cancel)?;
        let corpus_size = with_budget(
            "index size",
            self.timeouts.search_ms,
            self.index.corpus_size(),
        )
        .await?;

        let filter = AuthorizationFilter::new(&self.registry);
        let ceiling = self.params.ceiling(corpus_size);
        let mut width = self.params.initial_width();
        let mut index_queries = 0;

        loop {
            check_cancelled(cancel)?;
            let candidates = with_budget(
                "index search",
                self.timeouts.search_ms,
                self.index.search(&query_vector, width),
            )
            .await?;
            index_queries += 1;

            let fetched = candidates.len();
            let mut context = AuthorizedContext::from_candidates(&filter, role, k, candidates);
            context.stats.index_queries = index_queries;
            context.stats.final_width = width;

            debug!(
                %role,
                width,
                fetched,
                authorized = context.len(),
                denied = context.stats.candidates_denied,
                "filtered candidates"
            );

            // Stop when full, when the index has nothing beyond this width,
            // or when the ceiling is reached.
            let exhausted = fetched < width || width >= corpus_size;
            if context.is_full() || exhausted || width >= ceiling {
                info!(
                    %role,
                    authorized = context.len(),
                    k,
                    index_queries,
                    final_width = width,
                    "retrieval complete"
                );
                return Ok(context);
            }

            let next = self.params.widen(width, ceiling);
            debug!(%role, from = width, to = next, "widening search");
            width = next;
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RagError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocumentChunk;

    #[test]
    fn test_params_default() {
        let params = RetrievalParams::default();
        assert_eq!(params.k, 5);
        assert_eq!(params.initial_width(), 15);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let zero_k = RetrievalParams {
            k: 0,
            ..Default::default()
        };
        assert!(zero_k.validate().is_err());

        let low_ceiling = RetrievalParams {
            overfetch_multiplier: 5,
            widen_ceiling_multiplier: 4,
            ..Default::default()
        };
        assert!(low_ceiling.validate().is_err());

        let flat_growth = RetrievalParams {
            widen_growth_factor: 1,
            ..Default::default()
        };
        assert!(flat_growth.validate().is_err());
    }

    #[test]
    fn test_ceiling_bounded_by_corpus() {
        let params = RetrievalParams {
            k: 3,
            overfetch_multiplier: 3,
            widen_ceiling_multiplier: 10,
            widen_growth_factor: 2,
        };
        assert_eq!(params.ceiling(20), 20);
        assert_eq!(params.ceiling(1000), 30);
        assert_eq!(params.widen(9, 20), 18);
        assert_eq!(params.widen(18, 20), 20);
    }

    fn candidate(path: &str, score: f32) -> Candidate {
        Candidate {
            chunk: Arc::new(DocumentChunk {
                chunk_id: format!("{}#0", path),
                source_path: path.to_string(),
                text: String::new(),
                embedding: Vec::new(),
                row: None,
            }),
            score,
        }
    }

    #[test]
    fn test_from_candidates_filters_and_truncates() {
        let registry = PolicyRegistry::finsolve_default();
        let filter = AuthorizationFilter::new(&registry);
        let candidates = vec![
            candidate("engineering/a.md", 0.9),
            candidate("marketing/b.md", 0.8),
            candidate("marketing/c.md", 0.8),
            candidate("marketing/d.md", 0.7),
        ];

        let context = AuthorizedContext::from_candidates(&filter, Role::Marketing, 2, candidates);
        let paths: Vec<_> = context.iter().map(|c| c.source_path()).collect();
        assert_eq!(paths, vec!["marketing/b.md", "marketing/c.md"]);
        assert_eq!(context.stats().candidates_denied, 1);
        assert_eq!(context.stats().candidates_fetched, 4);
        assert!(context.is_full());
    }
}
