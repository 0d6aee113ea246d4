use std::fmt;
use std::path::Path;
use std::sync::Arc;

use personarag_core::{
    Citation, ContextBlock, CorpusChunk, FusedCandidate, PersonaError, PersonaResult,
    VerificationResult,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::bm25::LexicalIndex;
use crate::config::ServiceConfig;
use crate::corpus::load_corpus;
use crate::dense::{DenseIndexClient, LocalDenseIndex};
use crate::embedding::{EmbeddingProvider, LocalEmbedding};
use crate::generation::{build_context, AnswerGenerator};
use crate::hybrid::{Degradation, FusedResults, FusionParams, HybridRetriever};
use crate::query_expansion::RuleBasedExpander;
use crate::rerank::{build_reranker, Reranker};
use crate::verifier::FaithfulnessVerifier;

/// Result of [`RetrievalService::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The query as given.
    pub query: String,
    /// Fused candidates, best first, at most `k`.
    pub results: Vec<FusedCandidate>,
    /// Set when the dense side was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

/// Result of [`RetrievalService::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    /// The question as given.
    pub question: String,
    /// Generated answer text.
    pub answer: String,
    /// Citations into `contexts`.
    pub citations: Vec<Citation>,
    /// Numbered passages the answer was generated from.
    pub contexts: Vec<ContextBlock>,
    /// Lexical support of `answer` in `contexts`.
    pub verification: VerificationResult,
    /// Set when the dense side was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

/// Owns every constructed handle a request needs: the hybrid retriever,
/// the reranker, the verifier and the validated configuration.
///
/// Cheap to share behind an `Arc`; requests never mutate it. The indexes
/// can be refreshed with [`reload_corpus`](Self::reload_corpus).
pub struct RetrievalService {
    retriever: HybridRetriever,
    reranker: Arc<dyn Reranker>,
    verifier: FaithfulnessVerifier,
    config: ServiceConfig,
}

fn require_query(query: &str) -> PersonaResult<()> {
    if query.trim().is_empty() {
        return Err(PersonaError::InvalidArgument(
            "query must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl RetrievalService {
    /// Assemble a service from constructed parts.
    ///
    /// The config is validated here and its dense timeout is applied to
    /// `retriever`.
    pub fn new(
        retriever: HybridRetriever,
        reranker: Arc<dyn Reranker>,
        config: ServiceConfig,
    ) -> PersonaResult<Self> {
        config.validate()?;
        let retriever = retriever.with_dense_timeout(config.retrieval.dense_timeout());
        Ok(Self {
            retriever,
            reranker,
            verifier: FaithfulnessVerifier::from_config(&config.verifier),
            config,
        })
    }

    /// Index `chunks` lexically and wire them to `dense`.
    ///
    /// `embedder` backs the scored reranker when one is configured.
    pub fn from_chunks(
        chunks: Vec<CorpusChunk>,
        dense: Arc<dyn DenseIndexClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ServiceConfig,
    ) -> PersonaResult<Self> {
        config.validate()?;
        let lexical = LexicalIndex::with_config(
            chunks,
            config.retrieval.bm25,
            Arc::new(RuleBasedExpander::new()),
        );
        let reranker = build_reranker(&config.rerank, embedder);
        info!(
            chunks = lexical.len(),
            terms = lexical.term_count(),
            reranker = reranker.name(),
            "Retrieval service ready"
        );
        Self::new(HybridRetriever::new(dense, lexical), reranker, config)
    }

    /// Load the docstore at `corpus_path` and serve it with an external
    /// dense index.
    pub async fn open(
        corpus_path: &Path,
        dense: Arc<dyn DenseIndexClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ServiceConfig,
    ) -> PersonaResult<Self> {
        config.validate()?;
        let chunks = load_corpus(corpus_path).await?;
        Self::from_chunks(chunks, dense, embedder, config)
    }

    /// Like [`open`](Self::open), with an in-process dense index built
    /// from the same read of the docstore using [`LocalEmbedding`].
    pub async fn open_local(corpus_path: &Path, config: ServiceConfig) -> PersonaResult<Self> {
        Self::open_local_with(corpus_path, Arc::new(LocalEmbedding::default()), config).await
    }

    /// [`open_local`](Self::open_local) with a chosen embedding provider.
    pub async fn open_local_with(
        corpus_path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ServiceConfig,
    ) -> PersonaResult<Self> {
        config.validate()?;
        let chunks = load_corpus(corpus_path).await?;
        let dense = LocalDenseIndex::build(&chunks, Arc::clone(&embedder)).await?;
        Self::from_chunks(chunks, Arc::new(dense), embedder, config)
    }

    /// The validated configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The hybrid retriever and its live indexes.
    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// The configured reranker.
    pub fn reranker(&self) -> &Arc<dyn Reranker> {
        &self.reranker
    }

    /// Hybrid retrieval with explicit weight and cap; the remaining
    /// parameters come from the config.
    pub async fn fuse(
        &self,
        query: &str,
        alpha: f32,
        top_cap: usize,
    ) -> PersonaResult<FusedResults> {
        require_query(query)?;
        let params = FusionParams {
            alpha,
            top_cap,
            ..self.config.retrieval.fusion_params()
        };
        self.retriever.retrieve(query, &params).await
    }

    /// Rerank fused candidates down to at most `k`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedCandidate],
        k: usize,
    ) -> PersonaResult<Vec<FusedCandidate>> {
        self.reranker.rerank(query, candidates, k).await
    }

    /// Lexical support of `answer` in `contexts`.
    pub fn verify(&self, answer: &str, contexts: &[ContextBlock]) -> VerificationResult {
        self.verifier.verify(answer, contexts)
    }

    /// The `k` best fused candidates, without reranking.
    pub async fn search(&self, query: &str, k: usize) -> PersonaResult<SearchResponse> {
        if k == 0 {
            return Err(PersonaError::InvalidArgument(
                "k must be positive".to_string(),
            ));
        }
        let retrieval = &self.config.retrieval;
        let mut fused = self
            .fuse(query, retrieval.alpha, k.max(retrieval.k_rerank))
            .await?;
        fused.candidates.truncate(k);

        Ok(SearchResponse {
            query: query.to_string(),
            results: fused.candidates,
            degradation: fused.degradation,
        })
    }

    /// Retrieve, rerank, generate and verify.
    ///
    /// Generation is bounded by the configured timeout; a generator error
    /// or timeout fails the request. Dense degradation does not.
    pub async fn answer(
        &self,
        question: &str,
        generator: &dyn AnswerGenerator,
    ) -> PersonaResult<QaResponse> {
        let retrieval = &self.config.retrieval;
        let fused = self
            .fuse(question, retrieval.alpha, retrieval.top_cap)
            .await?;
        let top = self
            .rerank(question, &fused.candidates, retrieval.k_rerank)
            .await?;
        let contexts = build_context(&top);

        let timeout = self.config.generation.timeout();
        let generated = tokio::time::timeout(timeout, generator.generate(question, &contexts))
            .await
            .map_err(|_| {
                PersonaError::Timeout(format!(
                    "generation did not finish within {}ms",
                    timeout.as_millis()
                ))
            })??;

        let verification = self.verify(&generated.answer, &contexts);
        if verification.support_rate < 0.5 {
            warn!(
                support_rate = verification.support_rate,
                "Answer is weakly supported by its context"
            );
        }

        Ok(QaResponse {
            question: question.to_string(),
            answer: generated.answer,
            citations: generated.citations,
            contexts,
            verification,
            degradation: fused.degradation,
        })
    }

    /// Rebuild the indexes from the docstore at `path` and swap them in
    /// together. Returns the new chunk count.
    ///
    /// A dense index built from the docstore is rebuilt from the same read
    /// as the lexical one; an external dense index is left as is. On error
    /// the previous indexes keep serving.
    pub async fn reload_corpus(&self, path: &Path) -> PersonaResult<usize> {
        self.retriever.indexes().reload(path).await
    }
}

impl fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalService")
            .field("retriever", &self.retriever)
            .field("reranker", &self.reranker.name())
            .field("verifier", &self.verifier)
            .field("config", &self.config)
            .finish()
    }
}
