use async_trait::async_trait;
use personarag_core::{Candidate, CandidateMeta, CorpusChunk, PersonaError, PersonaResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::embedding::{cosine_similarity, EmbeddingProvider};

/// One hit returned by a dense index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseHit {
    /// Chunk text.
    pub content: String,
    /// Similarity, higher is better. Only comparable within one call.
    pub score: f32,
    /// Chunk metadata; should carry `chunk_id` when the backend knows it.
    #[serde(default)]
    pub meta: CandidateMeta,
}

impl From<DenseHit> for Candidate {
    fn from(hit: DenseHit) -> Self {
        let mut meta = hit.meta;
        meta.dense_score = Some(hit.score);
        Candidate::new(hit.content, meta)
    }
}

/// Semantic search over the corpus.
///
/// Implementations are usually remote (a vector database) and may be slow
/// or fail; callers bound every call with a timeout.
#[async_trait]
pub trait DenseIndexClient: Send + Sync {
    /// The `k` most similar chunks to `query`, best first.
    async fn top_k(&self, query: &str, k: usize) -> PersonaResult<Vec<DenseHit>>;

    /// Number of indexed chunks, when the index knows it locally.
    fn chunk_count(&self) -> Option<usize> {
        None
    }

    /// A new index over `chunks`, when this index is derived from the
    /// docstore.
    ///
    /// Indexes fed by their own ingestion (a vector database) return
    /// `None` and are kept as they are when the docstore is reloaded.
    async fn rebuild(
        &self,
        _chunks: &[CorpusChunk],
    ) -> PersonaResult<Option<Arc<dyn DenseIndexClient>>> {
        Ok(None)
    }
}

struct DenseEntry {
    chunk: CorpusChunk,
    embedding: Vec<f32>,
}

/// In-memory dense index using brute-force cosine similarity.
/// Suitable for small corpora such as a single person's profile.
pub struct LocalDenseIndex {
    entries: Vec<DenseEntry>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LocalDenseIndex {
    /// Embed every chunk up front. Chunks with blank content get a zero
    /// vector and never score above 0.
    pub async fn build(
        chunks: &[CorpusChunk],
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> PersonaResult<Self> {
        let texts: Vec<&str> = chunks
            .iter()
            .map(|c| c.content.as_str())
            .filter(|text| !text.trim().is_empty())
            .collect();
        let mut embedded = embedder.embed_batch(&texts).await?.into_iter();

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = if chunk.content.trim().is_empty() {
                vec![0.0; embedder.dimension()]
            } else {
                embedded.next().ok_or_else(|| {
                    PersonaError::Dense("embedding provider returned too few vectors".to_string())
                })?
            };
            entries.push(DenseEntry {
                chunk: chunk.clone(),
                embedding,
            });
        }
        info!(
            chunks = entries.len(),
            dimension = embedder.dimension(),
            "Built local dense index"
        );
        Ok(Self { entries, embedder })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no chunk is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DenseIndexClient for LocalDenseIndex {
    async fn top_k(&self, query: &str, k: usize) -> PersonaResult<Vec<DenseHit>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| PersonaError::Dense(format!("Failed to embed query: {e}")))?;

        let mut scored: Vec<DenseHit> = self
            .entries
            .iter()
            .map(|e| DenseHit {
                content: e.chunk.content.clone(),
                score: cosine_similarity(&query_embedding, &e.embedding),
                meta: CandidateMeta::for_chunk(&e.chunk),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        Ok(scored)
    }

    fn chunk_count(&self) -> Option<usize> {
        Some(self.len())
    }

    async fn rebuild(
        &self,
        chunks: &[CorpusChunk],
    ) -> PersonaResult<Option<Arc<dyn DenseIndexClient>>> {
        let index = Self::build(chunks, Arc::clone(&self.embedder)).await?;
        Ok(Some(Arc::new(index)))
    }
}
