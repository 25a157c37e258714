//! Retrieval type definitions.

use serde::{Deserialize, Serialize};

/// A passage returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,

    /// Similarity in [-1, 1]; `None` when the backend reports no score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, score: Option<f32>) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Filtered passages plus the context blob handed to the prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Highest relevance first
    pub passages: Vec<RetrievedPassage>,

    /// Passage texts joined with a blank line
    pub context: String,
}

impl RetrievalResult {
    /// Build a result, joining passage texts in order.
    pub fn from_passages(passages: Vec<RetrievedPassage>) -> Self {
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { passages, context }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Outcome of loading passages into a namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub namespace: String,
    pub passages: usize,
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_joins_with_blank_line() {
        let result = RetrievalResult::from_passages(vec![
            RetrievedPassage::new("Returns within 30 days.", Some(0.9)),
            RetrievedPassage::new("Refunds go to the original card.", Some(0.8)),
        ]);
        assert_eq!(
            result.context,
            "Returns within 30 days.\n\nRefunds go to the original card."
        );
    }

    #[test]
    fn test_empty_result() {
        let result = RetrievalResult::from_passages(Vec::new());
        assert!(result.is_empty());
        assert_eq!(result.context, "");
    }
}
