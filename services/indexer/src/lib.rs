use schema::{Document, KNOWN_DOMAINS, Passage, ValidationError, validate_document};
use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use store::{LexicalIndex, StoreError};
use text::{clean_text, segment_text, strip_tags};

pub use text::DEFAULT_MAX_PASSAGE_WORDS;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("corpus io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corpus parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid document '{source_id}': {error}")]
    InvalidDocument {
        source_id: String,
        error: ValidationError,
    },
    #[error("duplicate source_id '{0}'")]
    DuplicateSourceId(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorpusSummary {
    pub documents: usize,
    pub passages: usize,
    pub passages_per_domain: BTreeMap<String, usize>,
}

/// Reads documents from a JSON array file, or JSON Lines when the extension
/// is `.jsonl`.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, CorpusError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let documents = if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
        parse_json_lines(reader)?
    } else {
        serde_json::from_reader(reader).map_err(|err| CorpusError::Parse {
            line: err.line(),
            message: err.to_string(),
        })?
    };
    log::info!(
        "corpus loaded: path={}, documents={}",
        path.display(),
        documents.len()
    );
    Ok(documents)
}

fn parse_json_lines<R: BufRead>(reader: R) -> Result<Vec<Document>, CorpusError> {
    let mut documents = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document =
            serde_json::from_str::<Document>(&line).map_err(|err| CorpusError::Parse {
                line: idx + 1,
                message: err.to_string(),
            })?;
        documents.push(document);
    }
    Ok(documents)
}

/// Splits one document into passages of at most `max_words` words.
///
/// Sentences are packed from the tag-stripped raw text, where sentence
/// punctuation still exists, and each packed segment is cleaned afterwards.
/// Segments that clean down to nothing are skipped, so passage indexes stay
/// contiguous.
pub fn passages_for_document(document: &Document, max_words: usize) -> Vec<Passage> {
    let raw = strip_tags(&document.text);
    segment_text(&raw, max_words)
        .map(|segment| clean_text(&segment))
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(idx, segment)| Passage::from_document(document, idx, segment))
        .collect()
}

pub fn build_passages(
    documents: &[Document],
    max_words: usize,
) -> Result<Vec<Passage>, CorpusError> {
    let mut seen_source_ids: HashSet<&str> = HashSet::with_capacity(documents.len());
    let mut passages = Vec::new();
    for document in documents {
        validate_document(document).map_err(|error| CorpusError::InvalidDocument {
            source_id: document.source_id.clone(),
            error,
        })?;
        if !seen_source_ids.insert(document.source_id.as_str()) {
            return Err(CorpusError::DuplicateSourceId(document.source_id.clone()));
        }
        if !KNOWN_DOMAINS.contains(&document.domain.as_str()) {
            log::debug!(
                "document {} carries unlisted domain '{}'",
                document.source_id,
                document.domain
            );
        }
        passages.extend(passages_for_document(document, max_words));
    }
    Ok(passages)
}

pub fn build_index(documents: &[Document], max_words: usize) -> Result<LexicalIndex, CorpusError> {
    let passages = build_passages(documents, max_words)?;
    let mut index = LexicalIndex::new();
    index.build(passages)?;
    Ok(index)
}

pub fn summarize_corpus(documents: &[Document], passages: &[Passage]) -> CorpusSummary {
    let mut passages_per_domain: BTreeMap<String, usize> = BTreeMap::new();
    for passage in passages {
        *passages_per_domain
            .entry(passage.domain.clone())
            .or_insert(0) += 1;
    }
    CorpusSummary {
        documents: documents.len(),
        passages: passages.len(),
        passages_per_domain,
    }
}
