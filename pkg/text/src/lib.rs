//! Text normalization for corpus documents and incoming claims.
//!
//! `clean_text` produces the canonical lowercase, punctuation-free form that
//! passages and claims are compared in. `segment_text` is a heuristic sentence
//! packer: it splits on `.`, `!` and `?` only, so abbreviations, decimal
//! numbers and quoted punctuation split where a human would not.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_MAX_PASSAGE_WORDS: usize = 300;

const QUOTATION_MARKS: [char; 4] = ['\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `.` does not cross newlines, so a tag broken over two lines survives.
    PATTERN.get_or_init(|| Regex::new(r"<.*?>").expect("tag pattern compiles"))
}

/// Removes `<...>` markup without touching anything else.
pub fn strip_tags(text: &str) -> String {
    tag_pattern().replace_all(text, "").into_owned()
}

fn is_stripped_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || QUOTATION_MARKS.contains(&c)
}

/// Normalizes text for indexing and matching: tags removed, ASCII
/// punctuation and quotation marks dropped, lowercased, whitespace runs
/// collapsed to single spaces, trimmed.
///
/// Whitespace is collapsed after punctuation removal so that the result is a
/// fixed point: `clean_text(&clean_text(x)) == clean_text(x)`.
pub fn clean_text(text: &str) -> String {
    let without_tags = strip_tags(text);
    let without_punctuation: String = without_tags
        .chars()
        .filter(|c| !is_stripped_punctuation(*c))
        .collect();
    without_punctuation
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits text into sentences, each terminated by a single period.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.replace(['!', '?'], ".")
        .split('.')
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| format!("{sentence}."))
        .collect()
}

fn word_count(sentence: &str) -> usize {
    sentence.split_whitespace().count()
}

/// Lazily packs sentences into passages of at most `max_words` words.
///
/// A passage is closed only when it already holds words and the next sentence
/// would overflow it, so a single sentence longer than `max_words` still forms
/// its own passage.
#[derive(Debug)]
pub struct Segments {
    sentences: std::vec::IntoIter<String>,
    carried: Option<String>,
    max_words: usize,
}

impl Iterator for Segments {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let mut passage: Vec<String> = Vec::new();
        let mut words = 0usize;

        if let Some(sentence) = self.carried.take() {
            words += word_count(&sentence);
            passage.push(sentence);
        }

        for sentence in self.sentences.by_ref() {
            let sentence_words = word_count(&sentence);
            if words + sentence_words > self.max_words && words > 0 {
                self.carried = Some(sentence);
                return Some(passage.join(" "));
            }
            words += sentence_words;
            passage.push(sentence);
        }

        if passage.is_empty() {
            None
        } else {
            Some(passage.join(" "))
        }
    }
}

impl std::iter::FusedIterator for Segments {}

pub fn segment_text(text: &str, max_words: usize) -> Segments {
    Segments {
        sentences: split_sentences(text).into_iter(),
        carried: None,
        max_words,
    }
}
