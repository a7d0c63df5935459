use std::collections::{BTreeMap, btree_map};

use serde::Serialize;

/// Words too common to say anything about a passage's topic.
pub const STOP_WORDS: [&str; 65] = [
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "in", "to", "of", "for",
    "with", "by", "at", "on", "from", "that", "this", "these", "those", "it", "its", "as", "be",
    "been", "being", "have", "has", "had", "do", "does", "did", "will", "would", "shall", "should",
    "can", "could", "may", "might", "must", "their", "they", "them", "he", "she", "him", "her",
    "his", "hers", "i", "me", "my", "mine", "we", "us", "our", "ours", "you", "your", "yours",
    "not",
];

pub const MIN_TOKEN_LEN: usize = 3;

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lowercases and splits on anything that is not an ASCII letter or digit.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().map(str::to_string).collect()
}

/// Sparse term-frequency vector.
///
/// Terms are kept sorted so iteration order, and anything derived from it,
/// is reproducible across runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TermVector {
    counts: BTreeMap<String, u32>,
}

impl TermVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the vector for `text`: tokenized, stop words and tokens shorter
    /// than three characters dropped, remaining tokens counted.
    pub fn from_text(text: &str) -> Self {
        let mut vector = Self::new();
        for token in tokenize(text) {
            if token.len() < MIN_TOKEN_LEN || is_stop_word(&token) {
                continue;
            }
            *vector.counts.entry(token).or_insert(0) += 1;
        }
        vector
    }

    pub fn get(&self, term: &str) -> u32 {
        self.counts.get(term).copied().unwrap_or(0)
    }

    /// Sets the count for `term`; a zero count removes it.
    pub fn insert(&mut self, term: impl Into<String>, count: u32) {
        let term = term.into();
        if count == 0 {
            self.counts.remove(&term);
        } else {
            self.counts.insert(term, count);
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u32> {
        self.counts.iter()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn squared_norm(&self) -> f64 {
        self.counts
            .values()
            .map(|count| f64::from(*count) * f64::from(*count))
            .sum()
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    pub fn dot(&self, other: &TermVector) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .iter()
            .map(|(term, count)| f64::from(*count) * f64::from(large.get(term)))
            .sum()
    }
}

impl FromIterator<(String, u32)> for TermVector {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        let mut vector = Self::new();
        for (term, count) in iter {
            vector.insert(term, count);
        }
        vector
    }
}

/// Cosine similarity of two term vectors, `0.0` when either is empty.
pub fn cosine_similarity(query: &TermVector, passage: &TermVector) -> f64 {
    let magnitude_product = query.squared_norm() * passage.squared_norm();
    if magnitude_product <= 0.0 {
        return 0.0;
    }
    // sqrt of the product keeps self-similarity at exactly 1.0
    query.dot(passage) / magnitude_product.sqrt()
}
