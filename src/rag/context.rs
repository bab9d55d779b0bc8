// Context composition and citation extraction for authorized chunks
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::index::Candidate;
use crate::rag::retrieval::AuthorizedContext;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Character budget for the context text (0 = unbounded). Chunks that
    /// do not fit are skipped whole; only a lone top chunk larger than the
    /// budget is cut.
    pub max_context_chars: usize,
    /// Append the relevance score to each chunk header
    pub include_scores: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            include_scores: false,
        }
    }
}

/// A cited source document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Citation {
    pub source_path: String,
}

/// Context text plus the citations that back it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedContext {
    /// Chunks rendered with their provenance headers
    pub text: String,
    /// Distinct source paths in first-seen order
    pub citations: Vec<Citation>,
    /// Chunks included in `text`
    pub chunk_count: usize,
    /// Chunks dropped by the character budget
    pub chunks_dropped: usize,
    /// The only rendered chunk was cut at the budget
    pub truncated: bool,
}

impl ComposedContext {
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    pub fn source_paths(&self) -> Vec<String> {
        self.citations.iter().map(|c| c.source_path.clone()).collect()
    }
}

/// Pure transformation of an authorized context into prompt text
#[derive(Debug, Clone, Default)]
pub struct ContextComposer {
    config: ContextConfig,
}

impl ContextComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Render chunks in order and derive citations from exactly the
    /// chunks that were rendered.
    ///
    /// Chunks that do not fit the budget are skipped so that smaller,
    /// lower-ranked chunks can still be used. When not even one chunk fits
    /// whole, the top-ranked chunk is cut at the budget: a non-empty
    /// authorized context never composes to an empty one.
    pub fn compose(&self, context: &AuthorizedContext) -> ComposedContext {
        let budget = self.config.max_context_chars;
        let mut blocks: Vec<String> = Vec::with_capacity(context.len());
        let mut included: Vec<&Candidate> = Vec::with_capacity(context.len());
        let mut used_chars = 0;

        for candidate in context.iter() {
            let block = self.format_chunk(included.len() + 1, candidate);
            let separator = if blocks.is_empty() { 0 } else { 2 };
            let cost = block.len() + separator;

            if budget > 0 && used_chars + cost > budget {
                continue;
            }

            used_chars += cost;
            blocks.push(block);
            included.push(candidate);
        }

        let mut truncated = false;
        if included.is_empty() {
            if let Some(top) = context.iter().next() {
                let mut block = self.format_chunk(1, top);
                block.truncate(floor_char_boundary(&block, budget));
                blocks.push(block);
                included.push(top);
                truncated = true;
            }
        }

        let chunk_count = included.len();
        ComposedContext {
            text: blocks.join("\n\n"),
            citations: extract_citations(included),
            chunk_count,
            chunks_dropped: context.len() - chunk_count,
            truncated,
        }
    }

    fn format_chunk(&self, index: usize, candidate: &Candidate) -> String {
        let chunk = &candidate.chunk;
        let mut header = format!("[{}] Source: {}", index, chunk.source_path);
        if let Some(row) = chunk.row {
            header.push_str(&format!(" (Row: {})", row));
        }
        if self.config.include_scores {
            header.push_str(&format!(" (score: {:.2})", candidate.score));
        }
        format!("{}\n{}", header, chunk.text)
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

/// Largest char boundary of `text` not above `max`
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Distinct source paths in first-seen order
pub fn extract_citations<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();
    for candidate in candidates {
        if seen.insert(candidate.source_path()) {
            citations.push(Citation {
                source_path: candidate.source_path().to_string(),
            });
        }
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocumentChunk;
    use crate::policy::{AuthorizationFilter, PolicyRegistry, Role};
    use std::sync::Arc;

    fn finance_context(candidates: Vec<Candidate>) -> AuthorizedContext {
        let registry = PolicyRegistry::finsolve_default();
        let filter = AuthorizationFilter::new(&registry);
        AuthorizedContext::from_candidates(&filter, Role::Finance, 5, candidates)
    }

    fn budget(max_context_chars: usize) -> ContextComposer {
        ContextComposer::with_config(ContextConfig {
            max_context_chars,
            include_scores: false,
        })
    }

    fn candidate(path: &str, text: &str, row: Option<usize>) -> Candidate {
        Candidate {
            chunk: Arc::new(DocumentChunk {
                chunk_id: format!("{}#0", path),
                source_path: path.to_string(),
                text: text.to_string(),
                embedding: Vec::new(),
                row,
            }),
            score: 0.5,
        }
    }

    #[test]
    fn test_citations_dedup_first_seen_order() {
        let candidates = vec![
            candidate("b.md", "1", None),
            candidate("a.md", "2", None),
            candidate("b.md", "3", None),
            candidate("c.md", "4", None),
        ];
        let paths: Vec<_> = extract_citations(&candidates)
            .into_iter()
            .map(|c| c.source_path)
            .collect();
        assert_eq!(paths, vec!["b.md", "a.md", "c.md"]);
    }

    #[test]
    fn test_format_chunk_headers() {
        let composer = ContextComposer::with_config(ContextConfig {
            max_context_chars: 0,
            include_scores: true,
        });
        let block = composer.format_chunk(2, &candidate("hr/hr_data.csv", "name: A", Some(4)));
        assert_eq!(block, "[2] Source: hr/hr_data.csv (Row: 4) (score: 0.50)\nname: A");
    }

    #[test]
    fn test_citation_serializes_as_string() {
        let citation = Citation {
            source_path: "general/employee_handbook.md".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&citation).unwrap(),
            "\"general/employee_handbook.md\""
        );
    }

    #[test]
    fn test_oversized_chunk_skipped_for_smaller_ones() {
        let context = finance_context(vec![
            candidate("finance/big.md", &"x".repeat(500), None),
            candidate("finance/small.md", "quarterly revenue", None),
        ]);

        let composed = budget(100).compose(&context);
        assert_eq!(composed.chunk_count, 1);
        assert_eq!(composed.chunks_dropped, 1);
        assert!(!composed.truncated);
        assert_eq!(composed.source_paths(), vec!["finance/small.md"]);
        assert!(composed.text.starts_with("[1] Source: finance/small.md"));
    }

    #[test]
    fn test_lone_oversized_chunk_is_cut_not_dropped() {
        let context = finance_context(vec![candidate("finance/big.md", &"é".repeat(400), None)]);

        let composed = budget(101).compose(&context);
        assert!(!composed.is_empty());
        assert!(composed.truncated);
        assert!(composed.text.len() <= 101);
        assert!(composed.text.starts_with("[1] Source: finance/big.md"));
        assert_eq!(composed.source_paths(), vec!["finance/big.md"]);
    }

    #[test]
    fn test_empty_context_composes_empty() {
        let composed = budget(100).compose(&finance_context(Vec::new()));
        assert!(composed.is_empty());
        assert!(composed.text.is_empty());
        assert!(composed.citations.is_empty());
        assert!(!composed.truncated);
    }
}
