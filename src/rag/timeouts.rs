// Per-call time budgets for the external collaborators
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::{RagError, Result};

/// Time budget for each external call, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub embedding_ms: u64,
    pub search_ms: u64,
    pub generation_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding_ms: 10_000,
            search_ms: 5_000,
            generation_ms: 60_000,
        }
    }
}

/// Run `fut` within `budget_ms`; expiry becomes `RetrievalTimeout`
pub async fn with_budget<T, F>(stage: &str, budget_ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(budget_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::timeout(stage, budget_ms)),
    }
}
