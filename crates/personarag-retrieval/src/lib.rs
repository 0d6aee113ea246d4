//! Hybrid retrieval, score fusion, reranking and faithfulness verification.
//!
//! A query flows through the pipeline as:
//!
//! ```text
//! query -> QueryExpander -> { LexicalIndex::retrieve, DenseIndexClient::top_k }
//!       -> fusion::fuse -> Reranker::rerank -> AnswerGenerator -> FaithfulnessVerifier
//! ```
//!
//! # Main types
//!
//! - [`RuleBasedExpander`]: deterministic synonym-bucket query expansion.
//! - [`LexicalIndex`]: in-memory BM25 index.
//! - [`SharedIndexes`]: the live lexical and dense index pair, rebuilt and
//!   swapped together on reload.
//! - [`DenseIndexClient`]: contract for semantic search; [`LocalDenseIndex`]
//!   is the in-process implementation.
//! - [`HybridRetriever`]: queries both sources and fuses them, degrading to
//!   lexical-only when the dense side fails.
//! - [`Reranker`]: [`IdentityReranker`] or [`ScoredReranker`], chosen by
//!   [`RerankerConfig`].
//! - [`FaithfulnessVerifier`]: lexical grounding check of an answer.
//! - [`RetrievalService`]: the service context owning all of the above.
//! - [`Evaluator`]: Recall@10 and answer-quality metrics per retrieval mode.

/// BM25 lexical index.
pub mod bm25;
/// Configuration structs with defaults and validation.
pub mod config;
/// JSONL docstore loading.
pub mod corpus;
/// Dense index contract and local brute-force implementation.
pub mod dense;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Offline evaluation harness.
pub mod eval;
/// Pure fusion of dense and lexical result lists.
pub mod fusion;
/// Generation contract, context numbering and prompt rendering.
pub mod generation;
/// Hybrid retriever with dense timeout and degradation.
pub mod hybrid;
/// Live index generation and its swap handle.
pub mod indexes;
/// Query expansion for improved lexical recall.
pub mod query_expansion;
/// Reranker contract and implementations.
pub mod rerank;
/// Service context tying the pipeline together.
pub mod service;
/// Lexical faithfulness verification.
pub mod verifier;

pub use bm25::{Bm25Params, LexicalIndex};
pub use config::{
    GenerationConfig, RerankerConfig, RerankerKind, RetrievalConfig, ServiceConfig,
    VerifierConfig,
};
pub use corpus::{load_corpus, parse_corpus};
pub use dense::{DenseHit, DenseIndexClient, LocalDenseIndex};
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use eval::{EvalExample, EvalReport, Evaluator, RetrievalMode};
pub use fusion::{candidate_key, fuse, min_max_normalize, TieBreak};
pub use generation::{
    build_context, build_prompt, citations_for, AnswerGenerator, ExtractiveGenerator,
};
pub use hybrid::{Degradation, FusedResults, FusionParams, HybridRetriever};
pub use indexes::{CorpusIndexes, SharedIndexes};
pub use query_expansion::{QueryExpander, RuleBasedExpander, SynonymBucket};
pub use rerank::{
    build_reranker, EmbeddingScorer, IdentityReranker, RelevanceScorer, Reranker, ScoredReranker,
};
pub use service::{QaResponse, RetrievalService, SearchResponse};
pub use verifier::FaithfulnessVerifier;
