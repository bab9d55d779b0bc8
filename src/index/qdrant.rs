// Qdrant-backed embedding index
//
// Chunk text, source path, chunk id and optional row live in the point
// payload. Ties follow the order Qdrant returns.
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        vectors_config::Config, with_payload_selector::SelectorOptions, CreateCollection,
        Distance, PointStruct, SearchPoints, Value as QdrantValue, VectorParams, VectorsConfig,
        WithPayloadSelector,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::{RagError, Result};
use crate::index::{Candidate, DocumentChunk, EmbeddingIndex};

const PAYLOAD_TEXT: &str = "text";
const PAYLOAD_SOURCE: &str = "source_path";
const PAYLOAD_CHUNK_ID: &str = "chunk_id";
const PAYLOAD_ROW: &str = "row";

const UPSERT_BATCH: usize = 256;

/// Embedding index stored in a Qdrant collection
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
}

impl QdrantIndex {
    /// Connect to a Qdrant server
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    /// Create the collection with cosine distance if it does not exist yet
    pub async fn ensure_collection(&self, dimension: u64) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(unavailable)?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: dimension,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(unavailable)?;
        }

        Ok(())
    }

    /// Upload chunks in batches; point ids are assigned from `first_id`
    /// upwards in chunk order
    pub async fn upsert_chunks(&self, chunks: &[DocumentChunk], first_id: u64) -> Result<()> {
        for (batch_no, batch) in chunks.chunks(UPSERT_BATCH).enumerate() {
            let offset = first_id + (batch_no * UPSERT_BATCH) as u64;
            let points: Vec<PointStruct> = batch
                .iter()
                .enumerate()
                .map(|(i, chunk)| chunk_point(chunk, offset + i as u64))
                .collect();

            self.client
                .upsert_points_blocking(&self.collection, None, points, None)
                .await
                .map_err(unavailable)?;

            debug!(batch = batch_no, points = batch.len(), "upserted chunks");
        }

        Ok(())
    }
}

fn chunk_point(chunk: &DocumentChunk, id: u64) -> PointStruct {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert(PAYLOAD_TEXT.to_string(), QdrantValue::from(chunk.text.clone()));
    payload.insert(
        PAYLOAD_SOURCE.to_string(),
        QdrantValue::from(chunk.source_path.clone()),
    );
    payload.insert(
        PAYLOAD_CHUNK_ID.to_string(),
        QdrantValue::from(chunk.chunk_id.clone()),
    );
    if let Some(row) = chunk.row {
        payload.insert(PAYLOAD_ROW.to_string(), QdrantValue::from(row as i64));
    }
    PointStruct::new(id, chunk.embedding.clone(), payload)
}

/// Rebuild a candidate from a search hit. Points without a source path
/// cannot be authorized and are skipped.
fn candidate_from_payload(payload: &HashMap<String, QdrantValue>, score: f32) -> Option<Candidate> {
    let source_path = payload_string(payload, PAYLOAD_SOURCE).filter(|p| !p.is_empty())?;
    let chunk = DocumentChunk {
        chunk_id: payload_string(payload, PAYLOAD_CHUNK_ID).unwrap_or_default(),
        source_path,
        text: payload_string(payload, PAYLOAD_TEXT).unwrap_or_default(),
        embedding: Vec::new(),
        row: payload_integer(payload, PAYLOAD_ROW).map(|r| r as usize),
    };
    Some(Candidate {
        chunk: Arc::new(chunk),
        score,
    })
}

#[async_trait]
impl EmbeddingIndex for QdrantIndex {
    async fn search(&self, query: &[f32], n: usize) -> Result<Vec<Candidate>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: query.to_vec(),
                limit: n as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(unavailable)?;

        debug!(returned = response.result.len(), limit = n, "qdrant search");

        let returned = response.result.len();
        let candidates: Vec<Candidate> = response
            .result
            .into_iter()
            .filter_map(|point| candidate_from_payload(&point.payload, point.score))
            .collect();

        if candidates.len() < returned {
            warn!(
                skipped = returned - candidates.len(),
                collection = %self.collection,
                "points without a source path skipped"
            );
        }

        Ok(candidates)
    }

    async fn corpus_size(&self) -> Result<usize> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(unavailable)?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }
}

fn unavailable(err: impl std::fmt::Display) -> RagError {
    RagError::IndexUnavailable(err.to_string())
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    payload.get(key).and_then(|value| {
        use qdrant_client::qdrant::value::Kind;
        match value.kind.as_ref()? {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

fn payload_integer(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<i64> {
    payload.get(key).and_then(|value| {
        use qdrant_client::qdrant::value::Kind;
        match value.kind.as_ref()? {
            Kind::IntegerValue(i) => Some(*i),
            _ => None,
        }
    })
}
