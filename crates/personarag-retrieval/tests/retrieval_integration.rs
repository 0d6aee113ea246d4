#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests for the retrieval pipeline.
//!
//! Covers docstore loading, hybrid search over a local dense index,
//! dense degradation, reranking, answering with verification, corpus
//! reload, and the evaluation harness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use personarag_core::{PersonaError, PersonaResult};
use personarag_retrieval::eval::load_eval_set;
use personarag_retrieval::{
    DenseHit, DenseIndexClient, EmbeddingProvider, Evaluator, ExtractiveGenerator,
    LocalEmbedding, RetrievalMode, RetrievalService, ServiceConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DOCSTORE: &str = r#"{"chunk_id": 0, "section": "resume::education[0]", "source": "resume.json", "content": "Bachelor of Science in Computer Science from Stanford University, 2015."}
{"chunk_id": 1, "section": "resume::experience[0]", "source": "resume.json", "content": "Built a distributed search engine in Rust serving millions of queries."}
{"chunk_id": 2, "section": "resume::contact", "source": "resume.json", "content": "Reach me by email or on github and linkedin."}
{"chunk_id": 3, "section": "docs::hobbies", "source": "notes.md", "content": "On weekends I climb and cook ramen."}
"#;

fn write_docstore(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("docstore.jsonl");
    std::fs::write(&path, contents).unwrap();
    path
}

async fn local_service(path: &Path) -> RetrievalService {
    RetrievalService::open_local(path, ServiceConfig::default())
        .await
        .unwrap()
}

struct DownDense;

#[async_trait]
impl DenseIndexClient for DownDense {
    async fn top_k(&self, _query: &str, _k: usize) -> PersonaResult<Vec<DenseHit>> {
        Err(PersonaError::Dense("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_docstore_fails_startup() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.jsonl");
    let err = RetrievalService::open_local(&missing, ServiceConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PersonaError::Corpus(_)), "{err}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_invalid_config_fails_startup() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let mut config = ServiceConfig::default();
    config.retrieval.alpha = -0.5;
    let err = RetrievalService::open_local(&path, config).await.unwrap_err();
    assert!(err.is_fatal(), "{err}");
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_search_ranks_keyword_match_first() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    // lexically weighted so hashed-embedding collisions cannot reorder the top
    let fused = service
        .fuse("which university did you attend", 0.3, 10)
        .await
        .unwrap();
    assert!(fused.degradation.is_none());
    assert_eq!(fused.candidates[0].meta.chunk_id, Some(0));

    let response = service.search("which university did you attend", 3).await.unwrap();
    assert!(response.results.len() <= 3);
    for pair in response.results.windows(2) {
        assert!(pair[0].hybrid_score >= pair[1].hybrid_score);
    }
}

#[tokio::test]
async fn test_search_rejects_blank_query_and_zero_k() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    assert!(matches!(
        service.search("   ", 5).await,
        Err(PersonaError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.search("rust", 0).await,
        Err(PersonaError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_search_response_serializes() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    let response = service.search("rust search engine", 2).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["query"], "rust search engine");
    assert!(json.get("degradation").is_none());
    assert!(json["results"][0]["hybrid_score"].is_number());
}

// ---------------------------------------------------------------------------
// Degradation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dense_outage_degrades_to_lexical() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::default());
    let service =
        RetrievalService::open(&path, Arc::new(DownDense), embedder, ServiceConfig::default())
            .await
            .unwrap();

    let response = service.search("rust search engine", 5).await.unwrap();
    assert!(response.degradation.is_some());
    assert!(!response.results.is_empty());
    for result in &response.results {
        assert!(result.meta.dense_score.is_none());
        assert!(result.meta.bm25_score.is_some());
    }
    assert_eq!(response.results[0].meta.chunk_id, Some(1));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["degradation"]["kind"], "dense_failed");
}

#[tokio::test]
async fn test_degraded_answer_still_verified() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::default());
    let service =
        RetrievalService::open(&path, Arc::new(DownDense), embedder, ServiceConfig::default())
            .await
            .unwrap();

    let response = service
        .answer("what did you build in rust", &ExtractiveGenerator::default())
        .await
        .unwrap();
    assert!(response.degradation.is_some());
    assert!(!response.contexts.is_empty());
    assert_eq!(response.verification.support_rate, 1.0);
}

// ---------------------------------------------------------------------------
// Answering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_extractive_answer_is_fully_supported() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    let response = service
        .answer("what did you build in rust", &ExtractiveGenerator::default())
        .await
        .unwrap();

    assert!(!response.citations.is_empty());
    for (i, context) in response.contexts.iter().enumerate() {
        assert_eq!(context.index, i + 1);
    }
    assert_eq!(response.verification.support_rate, 1.0);
    assert!(response.verification.total_sentences >= 1);
}

#[tokio::test]
async fn test_rerank_truncates_to_k() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    let fused = service.fuse("email github", 0.5, 10).await.unwrap();
    let top = service.rerank("email github", &fused.candidates, 2).await.unwrap();
    assert_eq!(top.len(), 2.min(fused.candidates.len()));
    assert_eq!(top[0].meta.chunk_id, fused.candidates[0].meta.chunk_id);
}

// ---------------------------------------------------------------------------
// Reload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reload_swaps_both_indexes() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let service = local_service(&path).await;
    let before = service.retriever().indexes().current();
    assert_eq!(before.lexical.len(), 4);
    assert_eq!(before.dense.chunk_count(), Some(4));

    let mut grown = DOCSTORE.to_string();
    grown.push_str(concat!(
        r#"{"chunk_id": 4, "section": "docs::talks", "source": "notes.md", "#,
        r#""content": "I spoke about compilers at RustConf."}"#,
        "\n"
    ));
    std::fs::write(&path, grown).unwrap();

    let count = service.reload_corpus(&path).await.unwrap();
    assert_eq!(count, 5);
    let after = service.retriever().indexes().current();
    assert_eq!(after.lexical.len(), 5);
    assert_eq!(after.dense.chunk_count(), Some(5));
    // readers holding the old snapshot are unaffected
    assert_eq!(before.lexical.len(), 4);
    assert_eq!(before.dense.chunk_count(), Some(4));

    let hits = service.retriever().lexical_only("compilers rustconf", 1);
    assert_eq!(hits[0].meta.chunk_id, Some(4));
}

#[tokio::test]
async fn test_fused_results_follow_reloaded_content() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let service = local_service(&path).await;

    let rewritten = DOCSTORE
        .replace("docs::hobbies", "docs::travel")
        .replace(
            "On weekends I climb and cook ramen.",
            "On weekends I hike volcanoes in Iceland.",
        );
    assert_ne!(rewritten, DOCSTORE);
    std::fs::write(&path, rewritten).unwrap();
    service.reload_corpus(&path).await.unwrap();

    let fused = service.fuse("weekends volcanoes iceland", 0.5, 10).await.unwrap();
    assert!(fused.degradation.is_none());
    let top = &fused.candidates[0];
    assert_eq!(top.meta.chunk_id, Some(3));
    assert_eq!(top.content, "On weekends I hike volcanoes in Iceland.");
    assert_eq!(top.meta.section.as_deref(), Some("docs::travel"));
    assert!(top.meta.dense_score.is_some());
    assert!(top.meta.bm25_score.is_some());

    // no candidate anywhere carries the retired text
    for candidate in &fused.candidates {
        assert!(!candidate.content.contains("ramen"), "{candidate:?}");
    }
    let dense = service.retriever().dense_only("climb cook ramen", 10).await.unwrap();
    assert!(dense.iter().all(|hit| !hit.content.contains("ramen")));
}

#[tokio::test]
async fn test_reload_keeps_external_dense_index() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::default());
    let external: Arc<dyn DenseIndexClient> = Arc::new(DownDense);
    let service =
        RetrievalService::open(&path, Arc::clone(&external), embedder, ServiceConfig::default())
            .await
            .unwrap();

    assert_eq!(service.reload_corpus(&path).await.unwrap(), 4);
    assert!(Arc::ptr_eq(&service.retriever().indexes().current().dense, &external));
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let path = write_docstore(&tmp, DOCSTORE);
    let service = local_service(&path).await;

    std::fs::write(&path, "{not json}\n").unwrap();
    assert!(service.reload_corpus(&path).await.is_err());
    let live = service.retriever().indexes().current();
    assert_eq!(live.lexical.len(), 4);
    assert_eq!(live.dense.chunk_count(), Some(4));
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_eval_all_modes() {
    let tmp = TempDir::new().unwrap();
    let service = local_service(&write_docstore(&tmp, DOCSTORE)).await;

    let eval_path = tmp.path().join("eval_set.json");
    std::fs::write(
        &eval_path,
        r#"[
  {"id": 1, "question": "Which university did you attend?", "relevant_sections": ["education[0]"], "keywords": ["Stanford"]},
  {"id": "contact", "question": "How can I email you?", "relevant_sections": ["resume::contact"], "keywords": ["email", "github"]}
]"#,
    )
    .unwrap();
    let examples = load_eval_set(&eval_path).await.unwrap();
    assert_eq!(examples.len(), 2);

    let generator = ExtractiveGenerator::default();
    let evaluator = Evaluator::new(&service).with_generator(&generator);

    for mode in RetrievalMode::ALL {
        let report = evaluator.run(&examples, mode).await.unwrap();
        assert_eq!(report.mode, mode);
        assert_eq!(report.examples, 2);
        assert_eq!(report.per_example.len(), 2);
        assert!((0.0..=1.0).contains(&report.recall_at_10));
        assert!(report.avg_support_rate.is_some());
        assert!(report.avg_keyword_hit_rate.is_some());
    }

    // with four chunks every gold section is inside the top ten
    let bm25 = evaluator.run(&examples, RetrievalMode::Bm25Only).await.unwrap();
    assert_eq!(bm25.recall_at_10, 1.0);
}

#[tokio::test]
async fn test_missing_eval_set_is_config_error() {
    let tmp = TempDir::new().unwrap();
    let err = load_eval_set(&tmp.path().join("missing.json")).await.unwrap_err();
    assert!(matches!(err, PersonaError::Config(_)), "{err}");
}
