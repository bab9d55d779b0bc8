//! rbac-rag - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rbac_rag::{
    cancellation::CancellationToken,
    cli::{Args, Commands},
    config::{Config, IndexBackend},
    embedding::{Embedder, OllamaEmbedder},
    generation::OllamaGenerator,
    index::{EmbeddingIndex, InMemoryIndex, QdrantIndex},
    ingest::Ingestor,
    policy::{AuthorizationFilter, PolicyRegistry, Role},
    rag::{Answer, RAGPipeline, RoleFilteredRetriever},
    retry::RetryPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(policy) = &args.policy {
        config.policy_file = Some(policy.clone());
    }
    if let Some(data_dir) = &args.data_dir {
        config.corpus.data_dir = data_dir.clone();
    }

    match &args.command {
        Commands::Ask { role, k, query } => {
            if let Some(k) = k {
                config.rag.retrieval.k = *k;
            }
            run_ask(&config, role, query).await?;
        }
        Commands::Ingest => {
            run_ingest(&config).await?;
        }
        Commands::Roles => {
            let registry = load_registry(&config, &[])?;
            for (role, rules) in registry.iter() {
                let patterns: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
                let shown = if patterns.is_empty() {
                    "(no access)".dimmed().to_string()
                } else {
                    patterns.join(", ")
                };
                println!("{:<12} {}", role.to_string().bold(), shown);
            }
        }
        Commands::Check { role, path } => {
            let registry = load_registry(&config, &[])?;
            let filter = AuthorizationFilter::new(&registry);
            if filter.is_authorized_by_name(role, path)? {
                println!("{} {} may read {}", "ALLOW".green().bold(), role, path);
            } else {
                println!("{} {} may not read {}", "DENY".red().bold(), role, path);
            }
        }
        Commands::Config => {
            let toml_string = toml::to_string_pretty(&config)
                .context("Failed to serialize config")?;
            println!("{}", toml_string);
        }
    }

    Ok(())
}

fn load_registry(config: &Config, known_paths: &[String]) -> Result<PolicyRegistry> {
    match &config.policy_file {
        Some(path) => PolicyRegistry::from_file(path, known_paths)
            .with_context(|| format!("Failed to load policy {}", path.display())),
        None => Ok(PolicyRegistry::finsolve_default()),
    }
}

async fn build_index(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<(Arc<dyn EmbeddingIndex>, Vec<String>)> {
    match config.index.backend {
        IndexBackend::Memory => {
            let ingestor = Ingestor::new(&config.corpus.data_dir, config.corpus.chunk_chars)
                .with_progress(true);
            let chunks = ingestor.ingest(embedder).await?;

            let mut index = InMemoryIndex::new();
            index.extend(chunks)?;
            let paths = index.source_paths();
            info!(chunks = index.len(), documents = paths.len(), "in-memory index ready");
            Ok((Arc::new(index), paths))
        }
        IndexBackend::Qdrant => {
            let index = QdrantIndex::connect(&config.index.qdrant_url, &config.index.collection)?;
            Ok((Arc::new(index), Vec::new()))
        }
    }
}

/// Embed the corpus once and store it in Qdrant for later `ask` calls
async fn run_ingest(config: &Config) -> Result<()> {
    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
        &config.ollama.url,
        &config.ollama.embedding_model,
    )?);

    let ingestor = Ingestor::new(&config.corpus.data_dir, config.corpus.chunk_chars)
        .with_progress(true);
    let chunks = ingestor.ingest(embedder).await?;
    let dimension = match chunks.first() {
        Some(chunk) => chunk.embedding.len() as u64,
        None => anyhow::bail!(
            "No documents found under {}",
            config.corpus.data_dir.display()
        ),
    };

    let paths: std::collections::BTreeSet<&str> =
        chunks.iter().map(|c| c.source_path.as_str()).collect();
    // Fail before uploading if the policy cannot cover this corpus
    let known: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    load_registry(config, &known)?;

    let index = QdrantIndex::connect(&config.index.qdrant_url, &config.index.collection)?;
    index.ensure_collection(dimension).await?;
    index.upsert_chunks(&chunks, 0).await?;

    info!(
        chunks = chunks.len(),
        documents = paths.len(),
        collection = %config.index.collection,
        "corpus ingested"
    );
    println!(
        "{} {} chunks from {} documents into '{}'",
        "Ingested".green().bold(),
        chunks.len(),
        paths.len(),
        config.index.collection
    );
    if config.index.backend != IndexBackend::Qdrant {
        println!(
            "{}",
            "Set [index] backend = \"qdrant\" to answer from this collection.".dimmed()
        );
    }
    Ok(())
}

async fn run_ask(config: &Config, role: &str, query: &str) -> Result<()> {
    // Reject unknown roles before ingestion or any model call
    let role: Role = role.parse()?;

    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
        &config.ollama.url,
        &config.ollama.embedding_model,
    )?);
    let generator = Arc::new(OllamaGenerator::new(
        &config.ollama.url,
        &config.ollama.generation_model,
    )?);

    let (index, known_paths) = build_index(config, Arc::clone(&embedder)).await?;
    let registry = Arc::new(load_registry(config, &known_paths)?);

    let retriever = RoleFilteredRetriever::new(
        registry,
        embedder,
        index,
        config.rag.retrieval.clone(),
    )?;
    let pipeline = RAGPipeline::new(retriever, generator, &config.rag);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling request");
            on_interrupt.cancel();
        }
    });

    let retry = RetryPolicy::new();
    let answer = retry
        .run(|| pipeline.ask(query, role.as_str(), &cancel))
        .await?;

    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    println!();
    if answer.sources.is_empty() {
        println!("{}", "No sources accessible to this role.".dimmed());
    } else {
        println!("{}", "Sources:".bold());
        for source in &answer.sources {
            println!("  - {}", source.cyan());
        }
    }
}
