use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rewrites a query before it reaches the lexical index.
///
/// Implementations must be pure: the same input always yields the same
/// output. Expansion only feeds BM25; dense retrieval sees the raw query.
pub trait QueryExpander: Send + Sync {
    /// Return the expanded query as space-separated tokens.
    fn expand(&self, query: &str) -> String;
}

/// A set of synonyms appended when any trigger occurs in the query.
///
/// Triggers match as substrings of the lower-cased query, so `"project"`
/// also fires for `"projects"`. Multi-word expansions contribute each of
/// their words as separate tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymBucket {
    /// Words that activate the bucket.
    pub triggers: Vec<String>,
    /// Words appended when the bucket fires.
    pub expansions: Vec<String>,
}

impl SynonymBucket {
    /// Build a bucket from string slices.
    pub fn new(triggers: &[&str], expansions: &[&str]) -> Self {
        Self {
            triggers: triggers.iter().map(|t| t.to_lowercase()).collect(),
            expansions: expansions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn fires_on(&self, lowered_query: &str) -> bool {
        self.triggers
            .iter()
            .any(|trigger| lowered_query.contains(trigger.to_lowercase().as_str()))
    }
}

/// Synonym buckets for questions about a person's profile.
fn default_buckets() -> Vec<SynonymBucket> {
    vec![
        // Contact / identity
        SynonymBucket::new(
            &["mail", "email", "e-mail", "contact", "reach"],
            &[
                "email", "e-mail", "contact", "address", "linkedin", "github", "portfolio",
                "website",
            ],
        ),
        SynonymBucket::new(&["linkedin"], &["linkedin", "profile", "linked in", "social"]),
        SynonymBucket::new(
            &["github", "git hub"],
            &["github", "git hub", "repos", "repository", "code"],
        ),
        SynonymBucket::new(
            &["portfolio", "website", "site"],
            &["portfolio", "website", "personal site", "projects"],
        ),
        // Projects
        SynonymBucket::new(
            &["project", "projects"],
            &["projects", "apps", "applications", "work"],
        ),
        // Skills / tech stack
        SynonymBucket::new(
            &["skills", "tech stack"],
            &["skills", "technologies", "tools", "languages"],
        ),
        // Experience / work history
        SynonymBucket::new(
            &["experience", "worked", "job", "role", "position"],
            &["experience", "work history", "professional", "employment"],
        ),
        // Education
        SynonymBucket::new(
            &["education", "degree", "university", "college"],
            &["education", "degree", "university", "masters", "bachelor"],
        ),
    ]
}

/// Deterministic, rule-based expander driven by [`SynonymBucket`]s.
///
/// Output is the lower-cased original tokens, untouched and in order,
/// followed by every expansion token not already present, in first-seen
/// order.
#[derive(Debug, Clone)]
pub struct RuleBasedExpander {
    buckets: Vec<SynonymBucket>,
}

impl RuleBasedExpander {
    /// Expander with the built-in profile buckets.
    pub fn new() -> Self {
        Self {
            buckets: default_buckets(),
        }
    }

    /// Expander with no buckets; `expand` only lower-cases and re-joins.
    pub fn empty() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    /// Append a bucket, evaluated after the existing ones. Chainable.
    pub fn with_bucket(mut self, bucket: SynonymBucket) -> Self {
        self.buckets.push(bucket);
        self
    }

    /// Append several buckets. Chainable.
    pub fn with_buckets(mut self, buckets: impl IntoIterator<Item = SynonymBucket>) -> Self {
        self.buckets.extend(buckets);
        self
    }

    /// Configured buckets, in match order.
    pub fn buckets(&self) -> &[SynonymBucket] {
        &self.buckets
    }
}

impl Default for RuleBasedExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander for RuleBasedExpander {
    fn expand(&self, query: &str) -> String {
        let lowered = query.to_lowercase();

        let mut tokens: Vec<String> = lowered.split_whitespace().map(str::to_string).collect();
        let mut seen: HashSet<String> = tokens.iter().cloned().collect();

        for bucket in &self.buckets {
            if !bucket.fires_on(&lowered) {
                continue;
            }
            for phrase in &bucket.expansions {
                for word in phrase.split_whitespace() {
                    let word = word.to_lowercase();
                    if seen.insert(word.clone()) {
                        tokens.push(word);
                    }
                }
            }
        }

        tokens.join(" ")
    }
}
