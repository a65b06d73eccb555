//! Fuzzy search engine: case-insensitive subsequence matching with a small
//! bonus for consecutive characters and word starts.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use crate::domain::messages::SearchHit;

const MATCH_SCORE: u32 = 1;
const CONSECUTIVE_BONUS: u32 = 2;
const WORD_START_BONUS: u32 = 3;

/// Oldest documents are evicted past this many.
pub const MAX_DOCUMENTS: usize = 1_000;

/// Index of rendered documents. Shared through the dependency state, so
/// documents are added through `&self`.
#[derive(Debug, Default)]
pub struct FuzzySearch {
    documents: RwLock<VecDeque<String>>,
}

impl FuzzySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = Self::new();
        for document in documents {
            engine.index(document);
        }
        engine
    }

    pub fn index(&self, document: impl Into<String>) {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if documents.len() == MAX_DOCUMENTS {
            documents.pop_front();
        }
        documents.push_back(document.into());
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Score of `pattern` against `candidate`, or `None` when the pattern is
    /// not a subsequence of it. An empty pattern matches nothing.
    pub fn score(pattern: &str, candidate: &str) -> Option<u32> {
        if pattern.is_empty() {
            return None;
        }

        let mut needle = pattern.chars().flat_map(char::to_lowercase).peekable();
        let mut score = 0;
        let mut previous_matched = false;
        let mut previous_char: Option<char> = None;

        for ch in candidate.chars() {
            let lowered = ch.to_lowercase().next().unwrap_or(ch);
            let Some(&wanted) = needle.peek() else {
                break;
            };

            if lowered == wanted {
                needle.next();
                score += MATCH_SCORE;
                if previous_matched {
                    score += CONSECUTIVE_BONUS;
                }
                if previous_char.is_none_or(|prev| !prev.is_alphanumeric()) {
                    score += WORD_START_BONUS;
                }
                previous_matched = true;
            } else {
                previous_matched = false;
            }
            previous_char = Some(ch);
        }

        needle.peek().is_none().then_some(score)
    }

    /// Documents matching `pattern`, best score first; ties keep document
    /// order.
    pub fn search(&self, pattern: &str) -> Vec<SearchHit> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<SearchHit> = documents
            .iter()
            .enumerate()
            .filter_map(|(index, document)| {
                Self::score(pattern, document).map(|score| SearchHit {
                    index,
                    score,
                    text: document.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsequence_matches_case_insensitively() {
        assert!(FuzzySearch::score("RnD", "render pipeline dashboard").is_some());
        assert!(FuzzySearch::score("xyz", "render").is_none());
        assert!(FuzzySearch::score("", "render").is_none());
    }

    #[test]
    fn word_starts_outrank_mid_word_matches() {
        let engine = FuzzySearch::with_documents(["xabcx", "abc", "nothing", "a-b-c"]);
        let hits = engine.search("abc");
        let ranked: Vec<(usize, u32, &str)> = hits
            .iter()
            .map(|hit| (hit.index, hit.score, hit.text.as_str()))
            .collect();
        assert_eq!(
            ranked,
            vec![(3, 12, "a-b-c"), (1, 10, "abc"), (0, 7, "xabcx")]
        );
    }

    #[test]
    fn indexing_past_capacity_evicts_the_oldest() {
        let engine = FuzzySearch::new();
        for n in 0..=MAX_DOCUMENTS {
            engine.index(format!("doc {n}"));
        }
        assert_eq!(engine.len(), MAX_DOCUMENTS);
        let documents = engine.documents();
        assert_eq!(documents[0], "doc 1");
        assert_eq!(documents[MAX_DOCUMENTS - 1], format!("doc {MAX_DOCUMENTS}"));
    }
}
