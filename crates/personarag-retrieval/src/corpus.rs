use personarag_core::{CorpusChunk, PersonaError, PersonaResult};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Load the chunk docstore: one JSON [`CorpusChunk`] per line.
///
/// Blank lines are skipped. A missing or unreadable file, an unparseable
/// line, or a repeated `chunk_id` is a [`PersonaError::Corpus`] error, which
/// callers treat as fatal at startup. An existing empty file yields an
/// empty corpus.
pub async fn load_corpus(path: &Path) -> PersonaResult<Vec<CorpusChunk>> {
    let data = tokio::fs::read_to_string(path).await.map_err(|e| {
        PersonaError::Corpus(format!(
            "Failed to read docstore '{}': {e}",
            path.display()
        ))
    })?;

    let chunks = parse_corpus(&data)?;
    info!(path = %path.display(), chunks = chunks.len(), "Loaded corpus");
    Ok(chunks)
}

/// Parse JSONL docstore contents. See [`load_corpus`].
pub fn parse_corpus(data: &str) -> PersonaResult<Vec<CorpusChunk>> {
    let mut chunks = Vec::new();
    let mut seen_ids = HashSet::new();

    for (line_no, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk: CorpusChunk = serde_json::from_str(line).map_err(|e| {
            PersonaError::Corpus(format!("Invalid docstore entry on line {}: {e}", line_no + 1))
        })?;
        if !seen_ids.insert(chunk.chunk_id) {
            return Err(PersonaError::Corpus(format!(
                "Duplicate chunk_id {} on line {}",
                chunk.chunk_id,
                line_no + 1
            )));
        }
        chunks.push(chunk);
    }

    Ok(chunks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_lines() {
        let data = "{\"chunk_id\": 0, \"section\": \"a\", \"source\": \"s\", \"content\": \"one\"}\n\n   \n{\"chunk_id\": 1, \"content\": \"two\"}\n";
        let chunks = parse_corpus(data).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "one");
        assert_eq!(chunks[1].chunk_id, 1);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let data = "{\"chunk_id\": 0, \"content\": \"ok\"}\nnot json\n";
        let err = parse_corpus(data).unwrap_err();
        assert!(matches!(err, PersonaError::Corpus(_)));
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_parse_rejects_duplicate_ids() {
        let data = "{\"chunk_id\": 5, \"content\": \"a\"}\n{\"chunk_id\": 5, \"content\": \"b\"}\n";
        let err = parse_corpus(data).unwrap_err();
        assert!(err.to_string().contains("Duplicate chunk_id 5"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_corpus_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_corpus(&tmp.path().join("missing.jsonl")).await.unwrap_err();
        assert!(matches!(err, PersonaError::Corpus(_)));
    }

    #[tokio::test]
    async fn test_load_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docstore.jsonl");
        std::fs::write(&path, "").unwrap();
        assert!(load_corpus(&path).await.unwrap().is_empty());
    }
}
