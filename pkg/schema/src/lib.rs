use std::{collections::BTreeSet, fmt};

use serde::{
    Deserialize, Serialize,
    ser::{SerializeMap, Serializer},
};

// ---------------------------------------------------------------------------
// Domain tags
// ---------------------------------------------------------------------------

pub const DOMAIN_GHOST_MYTHS: &str = "Ghost Myths";
pub const DOMAIN_UFO_ENCOUNTERS: &str = "UFO Encounters";
pub const DOMAIN_ASTROLOGY: &str = "Astrology";
pub const DOMAIN_SUPERNATURAL_POWERS: &str = "Supernatural Powers";

/// Topic tags the bundled corpora are organised by. Loaders may carry other
/// tags; filtering on a tag no passage has simply matches nothing.
pub const KNOWN_DOMAINS: [&str; 4] = [
    DOMAIN_GHOST_MYTHS,
    DOMAIN_UFO_ENCOUNTERS,
    DOMAIN_ASTROLOGY,
    DOMAIN_SUPERNATURAL_POWERS,
];

pub const UNKNOWN_FIELD: &str = "unknown";

// ---------------------------------------------------------------------------
// Corpus records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,
    #[serde(default = "unknown_field")]
    pub source: String,
    #[serde(default)]
    pub publication_date: String,
    #[serde(default = "unknown_field")]
    pub domain: String,
    #[serde(default)]
    pub text: String,
}

/// A bounded slice of one document's normalized text; the unit of indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub passage_id: String,
    pub source_id: String,
    pub source: String,
    pub publication_date: String,
    pub domain: String,
    pub text: String,
}

impl Passage {
    /// Derives the `index`-th passage of `document` carrying `text`.
    pub fn from_document(document: &Document, index: usize, text: String) -> Self {
        Self {
            passage_id: format!("{}_{index}", document.source_id),
            source_id: document.source_id.clone(),
            source: document.source.clone(),
            publication_date: document.publication_date.clone(),
            domain: document.domain.clone(),
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(flatten)]
    pub passage: Passage,
    pub similarity: f64,
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Debunked,
    Unsupported,
    #[serde(rename = "Requires Further Research")]
    RequiresFurtherResearch,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debunked => "Debunked",
            Self::Unsupported => "Unsupported",
            Self::RequiresFurtherResearch => "Requires Further Research",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictResult {
    pub verdict: Verdict,
    pub explanation: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Fact summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub text: String,
    pub source: String,
    pub keyword: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingFact {
    pub text: String,
    pub source: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

/// Keyword counter that remembers the order in which terms were first seen.
///
/// Serializes as a JSON object in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TermFrequencies {
    entries: Vec<TermCount>,
}

impl TermFrequencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, term: &str) {
        match self.entries.iter_mut().find(|entry| entry.term == term) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(TermCount {
                term: term.to_string(),
                count: 1,
            }),
        }
    }

    pub fn get(&self, term: &str) -> usize {
        self.entries
            .iter()
            .find(|entry| entry.term == term)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermCount> {
        self.entries.iter()
    }

    /// Up to `n` terms by descending count; equal counts keep first-seen order.
    pub fn most_common(&self, n: usize) -> Vec<&TermCount> {
        let mut ranked: Vec<&TermCount> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(n);
        ranked
    }
}

impl Serialize for TermFrequencies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.term, &entry.count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FactSummary {
    pub contradictions: Vec<ContradictionRecord>,
    pub supporting_facts: Vec<SupportingFact>,
    pub relevant_terms: TermFrequencies,
    pub sources: BTreeSet<String>,
    pub domains: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("value out of range: {0}")]
    InvalidRange(&'static str),
}

pub fn validate_document(document: &Document) -> Result<(), ValidationError> {
    if document.source_id.trim().is_empty() {
        return Err(ValidationError::MissingField("source_id"));
    }
    if document.source.trim().is_empty() {
        return Err(ValidationError::MissingField("source"));
    }
    if document.domain.trim().is_empty() {
        return Err(ValidationError::MissingField("domain"));
    }
    Ok(())
}

pub fn validate_passage(passage: &Passage) -> Result<(), ValidationError> {
    if passage.passage_id.trim().is_empty() {
        return Err(ValidationError::MissingField("passage_id"));
    }
    if passage.source_id.trim().is_empty() {
        return Err(ValidationError::MissingField("source_id"));
    }
    if passage.domain.trim().is_empty() {
        return Err(ValidationError::MissingField("domain"));
    }
    Ok(())
}

pub fn validate_evidence(item: &EvidenceItem) -> Result<(), ValidationError> {
    validate_passage(&item.passage)?;
    if !(0.0..=1.0).contains(&item.similarity) {
        return Err(ValidationError::InvalidRange("similarity"));
    }
    Ok(())
}

fn unknown_field() -> String {
    UNKNOWN_FIELD.to_string()
}

/// Helper to create a `Passage` without spelling out every metadata field.
/// Used throughout tests to avoid repetitive struct construction.
pub fn passage_builder(passage_id: &str, source: &str, domain: &str, text: &str) -> Passage {
    Passage {
        passage_id: passage_id.to_string(),
        source_id: passage_id.to_string(),
        source: source.to_string(),
        publication_date: String::new(),
        domain: domain.to_string(),
        text: text.to_string(),
    }
}
