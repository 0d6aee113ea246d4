#![allow(clippy::unwrap_used, clippy::expect_used)]

use personarag_core::*;

// ---------------------------------------------------------------------------
// 1. Corpus record parsing
// ---------------------------------------------------------------------------

#[test]
fn corpus_chunk_parses_docstore_line() {
    let line = r#"{"chunk_id": 12, "section": "resume::projects[1]", "source": "resume.json", "content": "Built a RAG assistant"}"#;
    let chunk: CorpusChunk = serde_json::from_str(line).unwrap();

    assert_eq!(chunk.chunk_id, 12);
    assert_eq!(chunk.section, "resume::projects[1]");
    assert_eq!(chunk.source, "resume.json");
    assert_eq!(chunk.content, "Built a RAG assistant");

    // section/source are optional in the docstore
    let bare: CorpusChunk = serde_json::from_str(r#"{"chunk_id": 3, "content": "x"}"#).unwrap();
    assert_eq!(bare.section, "");
    assert_eq!(bare.source, "");

    // content and chunk_id are not
    assert!(serde_json::from_str::<CorpusChunk>(r#"{"chunk_id": 3}"#).is_err());
    assert!(serde_json::from_str::<CorpusChunk>(r#"{"content": "x"}"#).is_err());
}

// ---------------------------------------------------------------------------
// 2. Candidate metadata keeps unknown backend fields
// ---------------------------------------------------------------------------

#[test]
fn candidate_meta_collects_extra_fields() {
    let json = serde_json::json!({
        "content": "Worked at Acme",
        "meta": {
            "section": "experience[0]",
            "chunk_id": 4,
            "dense_score": 0.5,
            "page": 3,
            "lang": "en"
        }
    });
    let candidate: Candidate = serde_json::from_value(json).unwrap();

    assert_eq!(candidate.meta.section.as_deref(), Some("experience[0]"));
    assert_eq!(candidate.meta.chunk_id, Some(4));
    assert_eq!(candidate.meta.dense_score, Some(0.5));
    assert_eq!(candidate.meta.bm25_score, None);
    assert_eq!(candidate.meta.extra.len(), 2);
    assert_eq!(candidate.meta.extra["page"], serde_json::json!(3));

    // Unset scores are not serialized
    let out = serde_json::to_value(&candidate).unwrap();
    assert!(out["meta"].get("bm25_score").is_none());
    assert!(out["meta"].get("hybrid_score").is_none());
    assert_eq!(out["meta"]["lang"], serde_json::json!("en"));
}

#[test]
fn candidate_from_chunk_carries_provenance() {
    let chunk = CorpusChunk {
        chunk_id: 9,
        section: "skills".into(),
        source: "resume.json".into(),
        content: "Rust, Python".into(),
    };
    let candidate = Candidate::from_chunk(&chunk);

    assert_eq!(candidate.content, "Rust, Python");
    assert_eq!(candidate.meta.chunk_id, Some(9));
    assert_eq!(candidate.meta.section.as_deref(), Some("skills"));
    assert_eq!(candidate.meta.source.as_deref(), Some("resume.json"));
    assert_eq!(candidate.meta.dense_score, None);
}

// ---------------------------------------------------------------------------
// 3. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let config_err = PersonaError::Config("alpha must be in [0, 1]".to_string());
    assert_eq!(config_err.to_string(), "Config error: alpha must be in [0, 1]");

    let corpus_err = PersonaError::Corpus("docstore not found".to_string());
    assert_eq!(corpus_err.to_string(), "Corpus error: docstore not found");

    let arg_err = PersonaError::InvalidArgument("top_cap must be positive".to_string());
    assert_eq!(arg_err.to_string(), "Invalid argument: top_cap must be positive");

    let dense_err = PersonaError::Dense("connection refused".to_string());
    assert_eq!(dense_err.to_string(), "Dense retrieval error: connection refused");

    let timeout_err = PersonaError::Timeout("dense index after 5000ms".to_string());
    assert_eq!(timeout_err.to_string(), "Timeout: dense index after 5000ms");

    let gen_err = PersonaError::Generation("rate limited".to_string());
    assert_eq!(gen_err.to_string(), "Generation error: rate limited");

    // From<serde_json::Error> conversion
    let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let persona_err: PersonaError = serde_err.into();
    assert!(persona_err.to_string().starts_with("JSON error:"));

    // From<std::io::Error> conversion is fatal at startup
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let persona_err: PersonaError = io_err.into();
    assert!(persona_err.to_string().starts_with("IO error:"));
    assert!(persona_err.is_fatal());
}

// ---------------------------------------------------------------------------
// 4. Grounding value objects
// ---------------------------------------------------------------------------

#[test]
fn context_block_from_candidate() {
    let candidate = Candidate::new(
        "Led the search team",
        CandidateMeta {
            section: Some("experience[1]".into()),
            source: Some("resume.json".into()),
            chunk_id: Some(21),
            hybrid_score: Some(0.8),
            ..CandidateMeta::default()
        },
    );
    let block = ContextBlock::from_candidate(2, &candidate);

    assert_eq!(block.index, 2);
    assert_eq!(block.content, "Led the search team");
    assert_eq!(block.section.as_deref(), Some("experience[1]"));
    assert_eq!(block.chunk_id, Some(21));
}

#[test]
fn verification_result_constructors() {
    let vacuous = VerificationResult::vacuous();
    assert_eq!(vacuous.support_rate, 1.0);
    assert_eq!(vacuous.total_sentences, 0);

    let undecided = VerificationResult::undecided();
    assert_eq!(undecided.support_rate, 0.5);
    assert_eq!(undecided.supported_sentences, 0);

    let counted = VerificationResult::from_counts(3, 4);
    assert_eq!(counted.support_rate, 0.75);
    assert_eq!(counted.total_sentences, 4);
    assert_eq!(counted.supported_sentences, 3);

    let json = serde_json::to_value(counted).unwrap();
    assert_eq!(json["total_sentences"], serde_json::json!(4));
}
