//! One (question, answer) record in the conversation.

use serde::{Deserialize, Serialize};

/// Size cap for a single rendered exchange, in bytes.
pub const MAX_EXCHANGE_BYTES: usize = 100_000;

/// Marker appended when an exchange is cut at the size cap.
pub const TRUNCATION_MARKER: &str = "\n... [truncated: exchange size limit]";

/// An ordered (question, answer) pair rendered to a single string.
/// Immutable once created; oversized exchanges carry a visible marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    rendered: String,
}

impl Exchange {
    pub fn new(question: &str, answer: &str) -> Self {
        Self::from_rendered(format!("Question: {question}\nAnswer: {answer}"))
    }

    /// Wrap an already-rendered exchange string (session load path). The
    /// per-exchange cap is re-applied.
    pub fn from_rendered(rendered: String) -> Self {
        Self {
            rendered: truncate_with_marker(rendered, MAX_EXCHANGE_BYTES),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Byte length of the rendered exchange.
    pub fn size(&self) -> usize {
        self.rendered.len()
    }
}

fn truncate_with_marker(text: String, cap: usize) -> String {
    if text.len() <= cap {
        return text;
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = text[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_renders_question_and_answer() {
        let exchange = Exchange::new("2+2?", "4");
        assert_eq!(exchange.as_str(), "Question: 2+2?\nAnswer: 4");
        assert_eq!(exchange.size(), exchange.as_str().len());
    }

    #[test]
    fn exchange_at_cap_is_kept_verbatim() {
        let rendered = "x".repeat(MAX_EXCHANGE_BYTES);
        let exchange = Exchange::from_rendered(rendered.clone());
        assert_eq!(exchange.as_str(), rendered);
    }

    #[test]
    fn exchange_over_cap_is_truncated_with_marker() {
        let rendered = "x".repeat(MAX_EXCHANGE_BYTES + 1);
        let exchange = Exchange::from_rendered(rendered);
        assert!(exchange.as_str().ends_with(TRUNCATION_MARKER));
        assert_eq!(
            exchange.size(),
            MAX_EXCHANGE_BYTES + TRUNCATION_MARKER.len()
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let rendered = "é".repeat(MAX_EXCHANGE_BYTES); // 2 bytes each
        let exchange = Exchange::from_rendered(rendered);
        assert!(exchange.as_str().ends_with(TRUNCATION_MARKER));
    }
}
