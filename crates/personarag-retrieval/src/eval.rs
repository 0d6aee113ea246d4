//! Offline evaluation of retrieval modes against a labelled question set.
//!
//! Retrieval quality is measured at section level: an example is a hit when
//! any of the top passages comes from one of its gold sections. When a
//! generator is supplied the answers are also scored for faithfulness and
//! gold keyword coverage.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use personarag_core::{Candidate, ContextBlock, PersonaError, PersonaResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::generation::AnswerGenerator;
use crate::rerank::Reranker;
use crate::service::RetrievalService;

/// Passages considered for Recall@10.
const RECALL_DEPTH: usize = 10;

/// Section prefixes added by the ingestion loaders.
const SECTION_PREFIXES: [&str; 2] = ["resume::", "docs::"];

/// Example identifier; eval sets use both numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExampleId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One labelled question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalExample {
    /// Numeric or string identifier.
    pub id: ExampleId,
    /// Question put to the pipeline.
    pub question: String,
    /// Gold section labels, with or without loader prefix.
    #[serde(default)]
    pub relevant_sections: Vec<String>,
    /// Words a good answer should mention.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Read an eval set: a JSON array of [`EvalExample`].
pub async fn load_eval_set(path: &Path) -> PersonaResult<Vec<EvalExample>> {
    let data = tokio::fs::read_to_string(path).await.map_err(|e| {
        PersonaError::Config(format!("Failed to read eval set '{}': {e}", path.display()))
    })?;
    let examples: Vec<EvalExample> = serde_json::from_str(&data)?;
    info!(path = %path.display(), examples = examples.len(), "Loaded eval set");
    Ok(examples)
}

/// How candidates are produced for an eval run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    DenseOnly,
    Bm25Only,
    Hybrid,
    HybridRerank,
}

impl RetrievalMode {
    /// Every mode, in report order.
    pub const ALL: [RetrievalMode; 4] = [
        Self::DenseOnly,
        Self::Bm25Only,
        Self::Hybrid,
        Self::HybridRerank,
    ];

    /// Label used in reports and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DenseOnly => "dense_only",
            Self::Bm25Only => "bm25_only",
            Self::Hybrid => "hybrid",
            Self::HybridRerank => "hybrid_rerank",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip a leading `resume::` or `docs::`.
pub fn normalize_section(section: &str) -> &str {
    SECTION_PREFIXES
        .iter()
        .find_map(|prefix| section.strip_prefix(prefix))
        .unwrap_or(section)
}

/// Whether `section` matches any gold label after normalization.
///
/// A label matches exactly, or as a coarse prefix: `experience` matches
/// `experience[0]` but not `experiences`.
pub fn section_is_relevant(section: Option<&str>, relevant_sections: &[String]) -> bool {
    let Some(section) = section.map(normalize_section).filter(|s| !s.is_empty()) else {
        return false;
    };
    relevant_sections
        .iter()
        .map(|label| normalize_section(label))
        .filter(|label| !label.is_empty())
        .any(|label| {
            section == label
                || section
                    .strip_prefix(label)
                    .is_some_and(|rest| rest.starts_with('['))
        })
}

/// Fraction of `keywords` found in `answer`, case-insensitive substring
/// match. 0.0 when there are no keywords.
pub fn keyword_hit_rate(answer: &str, keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let answer = answer.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| answer.contains(&kw.to_lowercase()))
        .count();
    hits as f32 / keywords.len() as f32
}

/// Per-example outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExampleReport {
    /// Identifier of the example.
    pub id: ExampleId,
    /// The question asked.
    pub question: String,
    /// Sections of the top ten results, best first.
    pub top_sections: Vec<Option<String>>,
    /// Whether a gold section appears in the top ten.
    pub hit: bool,
    /// Generated answer, when a generator is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Verifier support rate of the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_rate: Option<f32>,
    /// Fraction of expected keywords found in the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_hit_rate: Option<f32>,
    /// Wall time for the example.
    pub latency_ms: f64,
}

/// Aggregate metrics for one mode.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    /// Mode the report was produced with.
    pub mode: RetrievalMode,
    /// Number of examples run.
    pub examples: usize,
    /// Section-level Recall@10.
    pub recall_at_10: f32,
    /// Mean support rate over generated answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_support_rate: Option<f32>,
    /// Mean keyword hit rate over generated answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_keyword_hit_rate: Option<f32>,
    /// Mean wall time per example.
    pub avg_latency_ms: f64,
    /// Outcome of every example, in input order.
    pub per_example: Vec<ExampleReport>,
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Runs an eval set through a [`RetrievalService`].
pub struct Evaluator<'a> {
    service: &'a RetrievalService,
    generator: Option<&'a dyn AnswerGenerator>,
    reranker: Arc<dyn Reranker>,
}

impl<'a> Evaluator<'a> {
    /// Retrieval-only evaluation; `hybrid_rerank` uses the service's reranker.
    pub fn new(service: &'a RetrievalService) -> Self {
        Self {
            service,
            generator: None,
            reranker: Arc::clone(service.reranker()),
        }
    }

    /// Also generate, verify and keyword-score every answer.
    pub fn with_generator(mut self, generator: &'a dyn AnswerGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Reranker used by [`RetrievalMode::HybridRerank`].
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Run every example in `mode` and aggregate.
    pub async fn run(
        &self,
        examples: &[EvalExample],
        mode: RetrievalMode,
    ) -> PersonaResult<EvalReport> {
        let mut per_example = Vec::with_capacity(examples.len());
        for example in examples {
            per_example.push(self.run_example(example, mode).await?);
        }

        let hits = per_example.iter().filter(|r| r.hit).count();
        let recall_at_10 = if per_example.is_empty() {
            0.0
        } else {
            hits as f32 / per_example.len() as f32
        };
        let avg_latency_ms = if per_example.is_empty() {
            0.0
        } else {
            per_example.iter().map(|r| r.latency_ms).sum::<f64>() / per_example.len() as f64
        };

        let report = EvalReport {
            mode,
            examples: per_example.len(),
            recall_at_10,
            avg_support_rate: mean(per_example.iter().filter_map(|r| r.support_rate)),
            avg_keyword_hit_rate: mean(per_example.iter().filter_map(|r| r.keyword_hit_rate)),
            avg_latency_ms,
            per_example,
        };
        info!(
            mode = %report.mode,
            examples = report.examples,
            recall_at_10 = report.recall_at_10,
            avg_latency_ms = report.avg_latency_ms,
            "Evaluation finished"
        );
        Ok(report)
    }

    async fn retrieve(&self, question: &str, mode: RetrievalMode) -> PersonaResult<Vec<Candidate>> {
        let retrieval = &self.service.config().retrieval;
        let retriever = self.service.retriever();
        let k = retrieval.k_rerank;

        let mut pool = match mode {
            RetrievalMode::DenseOnly => {
                match retriever.dense_only(question, retrieval.k_dense).await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(error = %e, "Dense retrieval failed during evaluation");
                        Vec::new()
                    }
                }
            }
            RetrievalMode::Bm25Only => retriever.lexical_only(question, retrieval.k_bm25),
            RetrievalMode::Hybrid => self
                .service
                .fuse(question, retrieval.alpha, retrieval.top_cap)
                .await?
                .candidates
                .into_iter()
                .map(Candidate::from)
                .collect(),
            RetrievalMode::HybridRerank => {
                let fused = self
                    .service
                    .fuse(question, retrieval.alpha, retrieval.top_cap)
                    .await?;
                self.reranker
                    .rerank(question, &fused.candidates, k)
                    .await?
                    .into_iter()
                    .map(Candidate::from)
                    .collect()
            }
        };
        pool.truncate(k);
        Ok(pool)
    }

    async fn run_example(
        &self,
        example: &EvalExample,
        mode: RetrievalMode,
    ) -> PersonaResult<ExampleReport> {
        let started = Instant::now();
        let top = self.retrieve(&example.question, mode).await?;

        let top_sections: Vec<Option<String>> = top
            .iter()
            .take(RECALL_DEPTH)
            .map(|c| c.meta.section.clone())
            .collect();
        let hit = top_sections
            .iter()
            .any(|s| section_is_relevant(s.as_deref(), &example.relevant_sections));

        let (answer, support_rate, keyword_rate) = match self.generator {
            Some(generator) => {
                let contexts: Vec<ContextBlock> = top
                    .iter()
                    .enumerate()
                    .map(|(i, c)| ContextBlock::from_candidate(i + 1, c))
                    .collect();
                let generated = generator.generate(&example.question, &contexts).await?;
                let verification = self.service.verify(&generated.answer, &contexts);
                let keyword_rate = keyword_hit_rate(&generated.answer, &example.keywords);
                (
                    Some(generated.answer),
                    Some(verification.support_rate),
                    Some(keyword_rate),
                )
            }
            None => (None, None, None),
        };

        Ok(ExampleReport {
            id: example.id.clone(),
            question: example.question.clone(),
            top_sections,
            hit,
            answer,
            support_rate,
            keyword_hit_rate: keyword_rate,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
