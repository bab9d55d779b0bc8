//! Corpus ingestion: load documents, split into chunks, embed, index
//!
//! Supported sources: `.md` and `.txt` (paragraph-packed chunks) and `.csv`
//! (one chunk per row, rendered as `column: value` lines). Source paths are
//! recorded relative to the corpus root with `/` separators, which is the
//! form the policy rules are written against.

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::index::DocumentChunk;
use crate::policy::normalize_path;

/// Text of one chunk before embedding
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub chunk_id: String,
    pub source_path: String,
    pub text: String,
    pub row: Option<usize>,
}

/// Loads and chunks a directory of documents
#[derive(Debug, Clone)]
pub struct Ingestor {
    root: PathBuf,
    chunk_chars: usize,
    show_progress: bool,
}

impl Ingestor {
    pub fn new(root: impl Into<PathBuf>, chunk_chars: usize) -> Self {
        Self {
            root: root.into(),
            chunk_chars: chunk_chars.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Supported files under the root, sorted for a stable corpus order
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files)
            .with_context(|| format!("Failed to scan {}", self.root.display()))?;
        files.sort();
        Ok(files)
    }

    /// Split every discovered document into raw chunks
    pub fn load_chunks(&self) -> Result<Vec<RawChunk>> {
        let mut chunks = Vec::new();
        for path in self.discover()? {
            let source_path = self.source_path(&path)?;
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let before = chunks.len();
            match extension(&path).as_deref() {
                Some("csv") => chunks.extend(split_csv(&source_path, &contents)),
                _ => chunks.extend(split_text(&source_path, &contents, self.chunk_chars)),
            }
            debug!(source = %source_path, chunks = chunks.len() - before, "loaded document");
        }
        Ok(chunks)
    }

    /// Load, chunk and embed the corpus
    pub async fn ingest(&self, embedder: Arc<dyn Embedder>) -> Result<Vec<DocumentChunk>> {
        let raw = self.load_chunks()?;
        info!(chunks = raw.len(), root = %self.root.display(), "embedding corpus");

        let progress = if self.show_progress {
            let pb = ProgressBar::new(raw.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let concurrency = num_cpus::get().max(1);
        let chunks: Vec<DocumentChunk> = stream::iter(raw)
            .map(|chunk| {
                let embedder = Arc::clone(&embedder);
                let progress = progress.clone();
                async move {
                    let embedding = embedder
                        .embed(&chunk.text)
                        .await
                        .with_context(|| format!("Failed to embed {}", chunk.chunk_id))?;
                    progress.inc(1);
                    Ok::<_, anyhow::Error>(DocumentChunk {
                        chunk_id: chunk.chunk_id,
                        source_path: chunk.source_path,
                        text: chunk.text,
                        embedding,
                        row: chunk.row,
                    })
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        progress.finish_and_clear();
        Ok(chunks)
    }

    fn source_path(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.root)
            .with_context(|| format!("{} is outside the corpus root", path.display()))?;
        Ok(normalize_path(&relative.to_string_lossy()))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if matches!(extension(&path).as_deref(), Some("md" | "txt" | "csv")) {
            out.push(path);
        }
    }
    Ok(())
}

/// Pack blank-line separated paragraphs into chunks of at most
/// `max_chars` bytes. Longer paragraphs are split first, at whitespace
/// where possible.
pub fn split_text(source_path: &str, contents: &str, max_chars: usize) -> Vec<RawChunk> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    let paragraphs = contents
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| split_long(p, max_chars));

    for paragraph in paragraphs {
        if !current.is_empty() && current.len() + 2 + paragraph.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| RawChunk {
            chunk_id: format!("{}#{}", source_path, i),
            source_path: source_path.to_string(),
            text,
            row: None,
        })
        .collect()
}

/// Cut `text` into pieces of at most `max` bytes, preferring the last
/// whitespace before the limit and never splitting a character.
fn split_long(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single character wider than the limit
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        } else if let Some(space) = rest[..cut].rfind(char::is_whitespace) {
            if space > 0 {
                cut = space;
            }
        }

        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// One chunk per data row, rendered as `column: value` lines.
/// Fields are split on commas; quoted commas are not supported.
pub fn split_csv(source_path: &str, contents: &str) -> Vec<RawChunk> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = match lines.next() {
        Some(h) => h.split(',').map(str::trim).collect(),
        None => return Vec::new(),
    };

    lines
        .enumerate()
        .map(|(row, line)| {
            let text = header
                .iter()
                .zip(line.split(',').map(str::trim))
                .map(|(col, val)| format!("{}: {}", col, val))
                .collect::<Vec<_>>()
                .join("\n");
            RawChunk {
                chunk_id: format!("{}#{}", source_path, row),
                source_path: source_path.to_string(),
                text,
                row: Some(row),
            }
        })
        .collect()
}
