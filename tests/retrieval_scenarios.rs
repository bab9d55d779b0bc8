//! Integration tests for role-filtered retrieval and the ask pipeline
//!
//! Collaborators are scripted; no Ollama or Qdrant instance is needed.

mod common;

use common::{
    candidate, candidate_with_text, ranked, CountingEmbedder, RecordingGenerator, ScriptedIndex,
};
use rbac_rag::cancellation::CancellationToken;
use rbac_rag::generation::NO_ACCESSIBLE_CONTEXT;
use rbac_rag::policy::{PolicyRegistry, Role, RolePolicy, ScopeRule};
use rbac_rag::rag::{RAGConfig, RAGPipeline, RetrievalParams, RoleFilteredRetriever, Timeouts};
use rbac_rag::RagError;
use std::sync::Arc;
use std::time::Duration;

fn params(k: usize) -> RetrievalParams {
    RetrievalParams {
        k,
        overfetch_multiplier: 3,
        widen_ceiling_multiplier: 10,
        widen_growth_factor: 2,
    }
}

fn retriever(
    registry: PolicyRegistry,
    embedder: &Arc<CountingEmbedder>,
    index: &Arc<ScriptedIndex>,
    k: usize,
) -> RoleFilteredRetriever {
    RoleFilteredRetriever::new(
        Arc::new(registry),
        embedder.clone(),
        index.clone(),
        params(k),
    )
    .unwrap()
}

fn pipeline(
    embedder: &Arc<CountingEmbedder>,
    index: &Arc<ScriptedIndex>,
    generator: &Arc<RecordingGenerator>,
    k: usize,
) -> RAGPipeline {
    let retriever = retriever(PolicyRegistry::finsolve_default(), embedder, index, k);
    RAGPipeline::new(retriever, generator.clone(), &RAGConfig::default())
}

/// 2 marketing chunks among 8 engineering chunks, all near the top
fn mixed_department_corpus() -> Vec<&'static str> {
    vec![
        "engineering/arch.md",
        "engineering/api.md",
        "marketing/marketing_report_q1_2024.md",
        "engineering/ci.md",
        "engineering/infra.md",
        "engineering/security.md",
        "marketing/market_report_q4_2024.md",
        "engineering/testing.md",
        "engineering/onboarding.md",
        "engineering/roadmap.md",
    ]
}

#[tokio::test]
async fn test_marketing_sees_only_marketing_chunks() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);

    let context = retriever
        .retrieve("campaign results", Role::Marketing, &CancellationToken::new())
        .await
        .unwrap();

    let paths: Vec<_> = context.iter().map(|c| c.source_path()).collect();
    assert_eq!(
        paths,
        vec![
            "marketing/marketing_report_q1_2024.md",
            "marketing/market_report_q4_2024.md"
        ]
    );
    assert_eq!(index.widths()[0], 9);
}

#[tokio::test]
async fn test_executive_truncated_to_k() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let answer = pipeline
        .ask("anything", "executive", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer.chunks_used, 3);
    assert_eq!(
        answer.sources,
        vec![
            "engineering/arch.md",
            "engineering/api.md",
            "marketing/marketing_report_q1_2024.md"
        ]
    );
    // Full after the first query: no widening
    assert_eq!(index.widths(), vec![9]);
}

#[tokio::test]
async fn test_sparse_role_triggers_widening() {
    let mut paths: Vec<String> = (0..20).map(|i| format!("engineering/doc{}.md", i)).collect();
    paths[14] = "hr/hr_data.csv".to_string();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&refs)));
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);

    let context = retriever
        .retrieve("salary bands", Role::Hr, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(context.len(), 1);
    assert_eq!(context.candidates()[0].source_path(), "hr/hr_data.csv");
    assert_eq!(index.widths(), vec![9, 18, 20]);
    assert_eq!(context.stats().index_queries, 3);
    assert!(context.stats().final_width >= 15);
}

#[tokio::test]
async fn test_widening_stops_at_ceiling() {
    let mut paths: Vec<String> = (0..100).map(|i| format!("engineering/doc{}.md", i)).collect();
    paths[80] = "hr/hr_data.csv".to_string();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&refs)));
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);

    let context = retriever
        .retrieve("salary bands", Role::Hr, &CancellationToken::new())
        .await
        .unwrap();

    // Ceiling is 10 * k = 30, the hr chunk at rank 81 stays out of reach
    assert!(context.is_empty());
    assert_eq!(index.widths(), vec![9, 18, 30]);
}

#[tokio::test]
async fn test_unknown_role_rejected_before_embedding() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline
        .ask("anything", "guest", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::UnknownRole { ref role } if role == "guest"));
    assert_eq!(embedder.calls(), 0);
    assert!(index.widths().is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_empty_scope_is_successful_empty_result() {
    let registry = PolicyRegistry::new(
        vec![RolePolicy {
            role: Role::Executive,
            scopes: vec![ScopeRule::universal()],
        }],
        &[],
    )
    .unwrap();

    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let retriever = retriever(registry, &embedder, &index, 3);
    let pipeline = RAGPipeline::new(retriever, generator.clone(), &RAGConfig::default());

    let answer = pipeline
        .ask("campaign results", "marketing", &CancellationToken::new())
        .await
        .unwrap();

    assert!(answer.is_empty_context());
    assert!(answer.sources.is_empty());
    assert_eq!(generator.last_context().as_deref(), Some(NO_ACCESSIBLE_CONTEXT));
}

#[tokio::test]
async fn test_no_authorized_match_passes_marker_to_generator() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&[
        "engineering/a.md",
        "finance/b.md",
    ])));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 2);

    let answer = pipeline
        .ask("architecture", "employee", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer.chunks_used, 0);
    assert_eq!(generator.calls(), 1);
    assert_eq!(generator.last_context().as_deref(), Some(NO_ACCESSIBLE_CONTEXT));
}

#[tokio::test]
async fn test_generation_context_contains_only_authorized_paths() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&[
        "marketing/marketing_report_q1_2024.md",
        "finance/financial_summary.md",
        "marketing/marketing_report_2024.md",
        "hr/hr_data.csv",
        "general/employee_handbook.md",
    ])));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 5);

    let answer = pipeline
        .ask("expenses", "finance_team", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        answer.sources,
        vec![
            "finance/financial_summary.md",
            "marketing/marketing_report_2024.md",
            "general/employee_handbook.md"
        ]
    );
    let context = generator.last_context().unwrap();
    assert!(context.contains("[1] Source: finance/financial_summary.md"));
    assert!(!context.contains("hr/hr_data.csv"));
    assert!(!context.contains("marketing_report_q1_2024"));
}

#[tokio::test]
async fn test_equal_scores_keep_index_order() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(vec![
        candidate("finance/z.md", 0, 0.5),
        candidate("engineering/x.md", 1, 0.5),
        candidate("finance/a.md", 2, 0.5),
        candidate("finance/m.md", 3, 0.5),
    ]));
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);

    let context = retriever
        .retrieve("q", Role::Finance, &CancellationToken::new())
        .await
        .unwrap();

    let paths: Vec<_> = context.iter().map(|c| c.source_path()).collect();
    assert_eq!(paths, vec!["finance/z.md", "finance/a.md", "finance/m.md"]);
}

#[tokio::test]
async fn test_embedding_failure_aborts_before_search() {
    let embedder = Arc::new(CountingEmbedder {
        fail: true,
        ..Default::default()
    });
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline
        .ask("q", "marketing", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Embedding(_)));
    assert!(index.widths().is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_index_unavailable_is_not_empty_success() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex {
        ranked: ranked(&mixed_department_corpus()),
        fail: true,
        ..Default::default()
    });
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline
        .ask("q", "marketing", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::IndexUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_slow_embedding_times_out() {
    let embedder = Arc::new(CountingEmbedder {
        delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let config = RAGConfig {
        timeouts: Timeouts {
            embedding_ms: 20,
            ..Default::default()
        },
        ..Default::default()
    };
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);
    let pipeline = RAGPipeline::new(retriever, generator.clone(), &config);

    let err = pipeline
        .ask("q", "marketing", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::RetrievalTimeout { ref stage, .. } if stage == "embedding"));
    assert!(index.widths().is_empty());
}

#[tokio::test]
async fn test_generation_failure_surfaces() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator {
        fail: true,
        ..Default::default()
    });
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline
        .ask("q", "engineering", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Generation(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cancellation_stops_before_generation() {
    let cancel = CancellationToken::new();
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex {
        ranked: ranked(&mixed_department_corpus()),
        cancel_on_search: Some(cancel.clone()),
        ..Default::default()
    });
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline.ask("q", "executive", &cancel).await.unwrap_err();

    assert!(matches!(err, RagError::Cancelled));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_token_skips_all_calls() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&mixed_department_corpus())));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let err = pipeline.ask("q", "hr", &cancel).await.unwrap_err();

    assert!(matches!(err, RagError::Cancelled));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_context_budget_drops_whole_chunks() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(ranked(&[
        "finance/a.md",
        "finance/b.md",
        "finance/c.md",
    ])));
    let generator = Arc::new(RecordingGenerator::default());
    let mut config = RAGConfig::default();
    // One block is "[1] Source: finance/a.md\ntext of finance/a.md" (45 chars)
    config.context.max_context_chars = 60;
    let retriever = retriever(PolicyRegistry::finsolve_default(), &embedder, &index, 3);
    let pipeline = RAGPipeline::new(retriever, generator.clone(), &config);

    let answer = pipeline
        .ask("q", "finance", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer.chunks_used, 1);
    assert_eq!(answer.sources, vec!["finance/a.md"]);
    assert!(!generator.last_context().unwrap().contains("finance/b.md"));
}

#[tokio::test]
async fn test_oversized_top_chunk_does_not_hide_authorized_material() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(vec![
        candidate_with_text("finance/big.md", 0, 0.9, &"revenue ".repeat(1_625)),
        candidate("finance/small.md", 1, 0.8),
    ]));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let answer = pipeline
        .ask("revenue", "finance", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!answer.is_empty_context());
    assert_eq!(answer.sources, vec!["finance/small.md"]);
    let context = generator.last_context().unwrap();
    assert_ne!(context, NO_ACCESSIBLE_CONTEXT);
    assert!(context.contains("[1] Source: finance/small.md"));
}

#[tokio::test]
async fn test_lone_oversized_chunk_sent_truncated() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(ScriptedIndex::new(vec![candidate_with_text(
        "finance/big.md",
        0,
        0.9,
        &"revenue ".repeat(1_625),
    )]));
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = pipeline(&embedder, &index, &generator, 3);

    let answer = pipeline
        .ask("revenue", "finance", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer.chunks_used, 1);
    assert_eq!(answer.sources, vec!["finance/big.md"]);
    let context = generator.last_context().unwrap();
    assert_ne!(context, NO_ACCESSIBLE_CONTEXT);
    assert!(context.starts_with("[1] Source: finance/big.md"));
    assert!(context.len() <= RAGConfig::default().context.max_context_chars);
}
