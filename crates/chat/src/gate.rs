//! Relevance gate: greeting fast path, topic drift, context sufficiency.

use crate::cache::normalize_question;
use ragline_core::config::RelevanceConfig;
use ragline_knowledge::RetrievalResult;
use std::collections::HashSet;

/// Whether retrieved context is good enough to answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextVerdict {
    Sufficient,
    Insufficient,
}

/// Heuristic checks applied to each request, thresholds from config.
#[derive(Debug, Clone)]
pub struct RelevanceGate {
    config: RelevanceConfig,
}

impl RelevanceGate {
    pub fn new(config: RelevanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelevanceConfig {
        &self.config
    }

    /// True for inputs in the greeting lexicon, and for short inputs made
    /// only of alphabetic words.
    ///
    /// Surrounding punctuation is ignored for the lexicon ("hey!"), but
    /// disqualifies the short-input rule ("shipping?" is a question).
    pub fn is_greeting(&self, question: &str) -> bool {
        let normalized = normalize_question(question);
        if normalized.is_empty() {
            return false;
        }

        let stripped = normalized
            .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
        if !stripped.is_empty()
            && self.config.greetings.iter().any(|g| g.trim().eq_ignore_ascii_case(stripped))
        {
            return true;
        }

        normalized.chars().count() <= self.config.greeting_max_chars
            && normalized
                .split(' ')
                .all(|word| !word.is_empty() && word.chars().all(char::is_alphabetic))
    }

    /// True when the question drifted far enough from the previous one that
    /// a cached answer should not be served.
    pub fn should_bypass_cache(&self, previous: Option<&str>, current: &str) -> bool {
        match previous {
            None => false,
            Some(previous) => jaccard_similarity(previous, current) < self.config.drift_threshold,
        }
    }

    pub fn assess_context(&self, result: &RetrievalResult) -> ContextVerdict {
        if result.context.chars().count() < self.config.min_context_chars {
            return ContextVerdict::Insufficient;
        }

        let min_score = self.config.min_passage_score;
        let scored: Vec<f32> = result.passages.iter().filter_map(|p| p.score).collect();
        if !result.passages.is_empty()
            && scored.len() == result.passages.len()
            && scored.iter().all(|s| *s < min_score)
        {
            return ContextVerdict::Insufficient;
        }

        ContextVerdict::Sufficient
    }
}

/// `|A ∩ B| / |A ∪ B|` over lowercase word tokens. Two empty inputs are
/// identical (1.0).
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);

    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();

    intersection as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
