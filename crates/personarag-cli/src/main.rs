//! `personarag`: query, answer, verify and evaluate against a personal
//! knowledge base from the command line.

mod config;
mod corpus_watcher;

use clap::{Parser, Subcommand, ValueEnum};
use config::{parse_config, PersonaConfig};
use corpus_watcher::CorpusWatcher;
use personarag_core::ContextBlock;
use personarag_retrieval::eval::load_eval_set;
use personarag_retrieval::{
    build_context, build_prompt, build_reranker, EmbeddingProvider, Evaluator,
    ExtractiveGenerator, LocalEmbedding, RerankerConfig, RerankerKind, RetrievalMode,
    RetrievalService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "personarag.toml";

#[derive(Parser)]
#[command(name = "personarag", about = "PersonaRAG: grounded Q&A over a personal knowledge base")]
struct Cli {
    /// Path to config file (defaults to ./personarag.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Docstore to load (overrides config)
    #[arg(long)]
    docstore: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hybrid search, printing the top fused candidates as JSON
    Search {
        query: String,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// Answer a question with the local extractive generator and verify it
    Ask { question: String },
    /// Render the grounded-answer prompt for an external model
    Prompt { question: String },
    /// Check an answer's lexical support
    Verify {
        answer: String,
        /// Context passage (repeatable)
        #[arg(long = "context")]
        contexts: Vec<String>,
        /// Retrieve context for this question instead of / in addition to --context
        #[arg(long)]
        question: Option<String>,
    },
    /// Evaluate retrieval modes against a labelled eval set
    Eval {
        #[arg(short, long, value_enum, default_value_t = EvalMode::HybridRerank)]
        mode: EvalMode,
        /// Eval set JSON (overrides config)
        #[arg(long)]
        eval_set: Option<PathBuf>,
        /// Skip answer generation; report retrieval metrics only
        #[arg(long)]
        no_generate: bool,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer questions read from stdin, one per line
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EvalMode {
    #[value(name = "dense_only")]
    DenseOnly,
    #[value(name = "bm25_only")]
    Bm25Only,
    #[value(name = "hybrid")]
    Hybrid,
    #[value(name = "hybrid_rerank")]
    HybridRerank,
    #[value(name = "all")]
    All,
}

impl EvalMode {
    fn modes(self) -> Vec<RetrievalMode> {
        match self {
            Self::DenseOnly => vec![RetrievalMode::DenseOnly],
            Self::Bm25Only => vec![RetrievalMode::Bm25Only],
            Self::Hybrid => vec![RetrievalMode::Hybrid],
            Self::HybridRerank => vec![RetrievalMode::HybridRerank],
            Self::All => RetrievalMode::ALL.to_vec(),
        }
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<PersonaConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            info!("No {DEFAULT_CONFIG} found, using defaults");
            return Ok(PersonaConfig::default());
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        }
    };

    let mut config = parse_config(&content)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}

async fn build_service(config: &PersonaConfig) -> anyhow::Result<Arc<RetrievalService>> {
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(LocalEmbedding::new(config.dense.dimension));
    let service = RetrievalService::open_local_with(
        &config.corpus.docstore,
        embedder,
        config.service_config(),
    )
    .await?;
    Ok(Arc::new(service))
}

/// Context blocks for `question` after fusion and reranking.
async fn retrieve_contexts(
    service: &RetrievalService,
    question: &str,
) -> anyhow::Result<Vec<ContextBlock>> {
    let retrieval = &service.config().retrieval;
    let fused = service
        .fuse(question, retrieval.alpha, retrieval.top_cap)
        .await?;
    if let Some(degradation) = &fused.degradation {
        warn!(%degradation, "Serving lexical-only results");
    }
    let top = service
        .rerank(question, &fused.candidates, retrieval.k_rerank)
        .await?;
    Ok(build_context(&top))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_chat(service: Arc<RetrievalService>, config: &PersonaConfig) -> anyhow::Result<()> {
    let _watcher = if config.corpus.watch {
        let handle = tokio::runtime::Handle::current();
        let reload_service = Arc::clone(&service);
        Some(CorpusWatcher::start(
            config.corpus.docstore.clone(),
            config.corpus.debounce_ms,
            move |path| {
                let service = Arc::clone(&reload_service);
                handle.spawn(async move {
                    match service.reload_corpus(&path).await {
                        Ok(chunks) => info!(chunks, "Corpus indexes rebuilt"),
                        Err(e) => {
                            warn!(error = %e, "Docstore reload failed, keeping previous indexes")
                        }
                    }
                });
            },
        )?)
    } else {
        None
    };

    let generator = ExtractiveGenerator::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match service.answer(question, &generator).await {
            Ok(response) => {
                println!("{}", response.answer);
                println!(
                    "  (support {:.2}, {} of {} sentences)",
                    response.verification.support_rate,
                    response.verification.supported_sentences,
                    response.verification.total_sentences
                );
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(error = %e, "Question failed"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).await?;
    if let Some(docstore) = cli.docstore {
        config.corpus.docstore = docstore;
    }

    let service = build_service(&config).await?;

    match cli.command {
        Commands::Search { query, k } => {
            let response = service.search(&query, k).await?;
            print_json(&response)?;
        }
        Commands::Ask { question } => {
            let response = service
                .answer(&question, &ExtractiveGenerator::default())
                .await?;
            print_json(&response)?;
        }
        Commands::Prompt { question } => {
            let contexts = retrieve_contexts(&service, &question).await?;
            let today = chrono::Local::now().date_naive();
            println!(
                "{}",
                build_prompt(&question, &contexts, &config.generation.subject, today)
            );
        }
        Commands::Verify {
            answer,
            contexts,
            question,
        } => {
            let mut blocks = match question {
                Some(question) => retrieve_contexts(&service, &question).await?,
                None => Vec::new(),
            };
            for content in contexts {
                let index = blocks.len() + 1;
                blocks.push(ContextBlock {
                    index,
                    content,
                    section: None,
                    source: None,
                    chunk_id: None,
                });
            }
            print_json(&service.verify(&answer, &blocks))?;
        }
        Commands::Eval {
            mode,
            eval_set,
            no_generate,
            json,
        } => {
            let path = eval_set.unwrap_or_else(|| config.eval.eval_set.clone());
            let examples = load_eval_set(&path).await?;

            let generator = ExtractiveGenerator::default();
            let embedder: Arc<dyn EmbeddingProvider> =
                Arc::new(LocalEmbedding::new(config.dense.dimension));
            let scored = build_reranker(
                &RerankerConfig {
                    kind: RerankerKind::Scored,
                },
                embedder,
            );
            let mut evaluator = Evaluator::new(&service).with_reranker(scored);
            if !no_generate {
                evaluator = evaluator.with_generator(&generator);
            }

            for mode in mode.modes() {
                let report = evaluator.run(&examples, mode).await?;
                if json {
                    print_json(&report)?;
                    continue;
                }
                println!("=== Aggregate Metrics ===");
                println!("Mode:                                 {}", report.mode);
                println!("Examples:                             {}", report.examples);
                println!("Retrieval Recall@10 (section-level):  {:.3}", report.recall_at_10);
                if let Some(rate) = report.avg_support_rate {
                    println!("Average Support Rate (verifier):      {rate:.3}");
                }
                if let Some(rate) = report.avg_keyword_hit_rate {
                    println!("Average Keyword Hit Rate (QA proxy):  {rate:.3}");
                }
                println!("Average Latency (ms):                 {:.3}", report.avg_latency_ms);
                println!();
            }
        }
        Commands::Chat => run_chat(service, &config).await?,
    }

    Ok(())
}
