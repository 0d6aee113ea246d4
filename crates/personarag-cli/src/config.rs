//! `personarag.toml` loading.

use personarag_retrieval::{
    GenerationConfig, RerankerConfig, RetrievalConfig, ServiceConfig, VerifierConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Full binary configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonaConfig {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub dense: DenseConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankerConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    /// JSONL docstore produced by ingestion.
    #[serde(default = "default_docstore")]
    pub docstore: PathBuf,
    /// Rebuild the lexical index when the docstore changes (`chat` only).
    #[serde(default)]
    pub watch: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            docstore: default_docstore(),
            watch: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// In-process dense index settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DenseConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_eval_set")]
    pub eval_set: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            eval_set: default_eval_set(),
        }
    }
}

fn default_docstore() -> PathBuf {
    PathBuf::from("./artifacts/docstore.jsonl")
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_dimension() -> usize {
    256
}
fn default_eval_set() -> PathBuf {
    PathBuf::from("./data/eval_set.json")
}

impl PersonaConfig {
    /// The library-facing part of the configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            retrieval: self.retrieval.clone(),
            rerank: self.rerank.clone(),
            verifier: self.verifier.clone(),
            generation: self.generation.clone(),
        }
    }

    /// Resolve relative paths against the directory holding the config file.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.corpus.docstore.is_relative() {
            self.corpus.docstore = base.join(&self.corpus.docstore);
        }
        if self.eval.eval_set.is_relative() {
            self.eval.eval_set = base.join(&self.eval.eval_set);
        }
    }
}

/// Parse `personarag.toml` contents.
pub fn parse_config(content: &str) -> anyhow::Result<PersonaConfig> {
    let config: PersonaConfig = toml::from_str(content)?;
    config.service_config().validate()?;
    if config.dense.dimension == 0 {
        anyhow::bail!("[dense] dimension must be positive");
    }
    Ok(config)
}
