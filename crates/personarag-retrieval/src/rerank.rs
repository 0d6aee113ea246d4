//! Reranking of fused candidates.
//!
//! A [`Reranker`] may reorder and truncate its input but never adds
//! candidates or grows the list. [`build_reranker`] picks the
//! implementation from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use personarag_core::{FusedCandidate, PersonaError, PersonaResult};
use tracing::{debug, warn};

use crate::config::{RerankerConfig, RerankerKind};
use crate::embedding::{cosine_similarity, EmbeddingProvider};

/// Reorders a fused candidate list for a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// At most `k` candidates drawn from `candidates`.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedCandidate],
        k: usize,
    ) -> PersonaResult<Vec<FusedCandidate>>;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

fn check_k(k: usize) -> PersonaResult<()> {
    if k == 0 {
        return Err(PersonaError::InvalidArgument(
            "rerank k must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Keeps the fused order and truncates to `k`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReranker;

#[async_trait]
impl Reranker for IdentityReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: &[FusedCandidate],
        k: usize,
    ) -> PersonaResult<Vec<FusedCandidate>> {
        check_k(k)?;
        Ok(candidates.iter().take(k).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Independent relevance model used by [`ScoredReranker`].
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per passage, higher is more relevant.
    async fn score(&self, query: &str, passages: &[&str]) -> PersonaResult<Vec<f32>>;
}

/// Scores passages by cosine similarity of their embeddings to the query.
pub struct EmbeddingScorer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingScorer {
    /// Score with cosine similarity under `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score(&self, query: &str, passages: &[&str]) -> PersonaResult<Vec<f32>> {
        let query_embedding = self.embedder.embed(query).await?;
        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            if passage.trim().is_empty() {
                scores.push(0.0);
                continue;
            }
            let embedding = self.embedder.embed(passage).await?;
            scores.push(cosine_similarity(&query_embedding, &embedding));
        }
        Ok(scores)
    }
}

/// Re-scores every candidate with a [`RelevanceScorer`] and keeps the
/// best `k`.
///
/// The score is stored in `meta.rerank_score`; `hybrid_score` is left as
/// fusion produced it. Equal scores keep their fused order. If the scorer
/// fails the fused order is kept, so a broken relevance model never fails
/// the request.
pub struct ScoredReranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl ScoredReranker {
    /// Rerank by `scorer`.
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Reranker for ScoredReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedCandidate],
        k: usize,
    ) -> PersonaResult<Vec<FusedCandidate>> {
        check_k(k)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passages: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let scores = match self.scorer.score(query, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "Relevance scorer returned wrong number of scores, keeping fused order"
                );
                return Ok(candidates.iter().take(k).cloned().collect());
            }
            Err(e) => {
                warn!(error = %e, "Relevance scorer failed, keeping fused order");
                return Ok(candidates.iter().take(k).cloned().collect());
            }
        };

        let mut rescored: Vec<FusedCandidate> = candidates
            .iter()
            .zip(scores)
            .map(|(candidate, score)| {
                let mut candidate = candidate.clone();
                candidate.meta.rerank_score = Some(score);
                candidate
            })
            .collect();

        // Stable: ties keep fused order. Non-finite scores sink.
        rescored.sort_by(|a, b| rank_key(b).total_cmp(&rank_key(a)));
        rescored.truncate(k);

        debug!(
            input = candidates.len(),
            output = rescored.len(),
            "Reranked candidates"
        );
        Ok(rescored)
    }

    fn name(&self) -> &'static str {
        "scored"
    }
}

fn rank_key(candidate: &FusedCandidate) -> f32 {
    candidate
        .meta
        .rerank_score
        .filter(|s| s.is_finite())
        .unwrap_or(f32::NEG_INFINITY)
}

/// Build the reranker named by `config`.
pub fn build_reranker(
    config: &RerankerConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Arc<dyn Reranker> {
    match config.kind {
        RerankerKind::Identity => Arc::new(IdentityReranker),
        RerankerKind::Scored => Arc::new(ScoredReranker::new(Arc::new(EmbeddingScorer::new(
            embedder,
        )))),
    }
}
