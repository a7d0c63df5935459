use std::collections::{BTreeSet, HashSet};

use ranking::{TermVector, cosine_similarity};
use schema::{EvidenceItem, Passage, ValidationError, validate_passage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("lexical index has not been built")]
    IndexNotBuilt,
    #[error("duplicate passage_id '{0}'")]
    DuplicatePassageId(String),
    #[error("invalid passage: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreIndexStats {
    pub passage_count: usize,
    pub vocabulary_size: usize,
    pub domains: Vec<String>,
}

#[derive(Debug)]
struct IndexedCorpus {
    passages: Vec<Passage>,
    vectors: Vec<TermVector>,
}

/// In-memory term-frequency index over corpus passages.
///
/// The index is built once and then queried through shared references;
/// rebuilding needs `&mut`, so a build can never overlap a query.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    corpus: Option<IndexedCorpus>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `passages` in order, replacing whatever was indexed before.
    ///
    /// The batch is validated up front; on error the previous contents stay
    /// in place and remain queryable.
    pub fn build(&mut self, passages: Vec<Passage>) -> Result<StoreIndexStats, StoreError> {
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(passages.len());
        for passage in &passages {
            validate_passage(passage)?;
            if !seen_ids.insert(passage.passage_id.as_str()) {
                return Err(StoreError::DuplicatePassageId(passage.passage_id.clone()));
            }
        }

        let vectors = passages
            .iter()
            .map(|passage| TermVector::from_text(&passage.text))
            .collect();
        self.corpus = Some(IndexedCorpus { passages, vectors });

        let stats = self.index_stats();
        log::info!(
            "lexical index built: passages={}, vocabulary={}, domains={}",
            stats.passage_count,
            stats.vocabulary_size,
            stats.domains.len()
        );
        Ok(stats)
    }

    /// Term vector for arbitrary text; does not require a built index.
    pub fn vectorize(&self, text: &str) -> TermVector {
        TermVector::from_text(text)
    }

    /// Top `k` passages by cosine similarity to `query`.
    ///
    /// Every passage is scored and stably sorted before the domain filter is
    /// applied, so equal scores keep corpus order.
    pub fn query(
        &self,
        query: &TermVector,
        k: usize,
        domain_filter: Option<&str>,
    ) -> Result<Vec<EvidenceItem>, StoreError> {
        let corpus = self.corpus.as_ref().ok_or(StoreError::IndexNotBuilt)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f64)> = corpus
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results: Vec<EvidenceItem> = scored
            .into_iter()
            .filter(|(idx, _)| {
                domain_filter.is_none_or(|domain| corpus.passages[*idx].domain == domain)
            })
            .take(k)
            .map(|(idx, similarity)| EvidenceItem {
                passage: corpus.passages[idx].clone(),
                similarity,
            })
            .collect();

        log::debug!(
            "lexical query: terms={}, k={k}, domain_filter={domain_filter:?}, hits={}",
            query.len(),
            results.len()
        );
        Ok(results)
    }

    pub fn is_built(&self) -> bool {
        self.corpus.is_some()
    }

    pub fn passages(&self) -> &[Passage] {
        self.corpus
            .as_ref()
            .map(|corpus| corpus.passages.as_slice())
            .unwrap_or(&[])
    }

    pub fn passages_len(&self) -> usize {
        self.passages().len()
    }

    pub fn index_stats(&self) -> StoreIndexStats {
        let Some(corpus) = self.corpus.as_ref() else {
            return StoreIndexStats::default();
        };
        let vocabulary: HashSet<&str> = corpus
            .vectors
            .iter()
            .flat_map(|vector| vector.terms())
            .collect();
        let domains: BTreeSet<&str> = corpus
            .passages
            .iter()
            .map(|passage| passage.domain.as_str())
            .collect();
        StoreIndexStats {
            passage_count: corpus.passages.len(),
            vocabulary_size: vocabulary.len(),
            domains: domains.into_iter().map(str::to_string).collect(),
        }
    }
}
