//! Fraud scoring: independent detectors merged into one assessment.
//!
//! Detectors are table-driven where possible (see
//! [`crate::config::ReferenceData`]) and each returns plain findings; the
//! [`FraudScorer`] owns the aggregation arithmetic and the review notes.

mod crossref;
mod metadata;
mod patterns;
mod scorer;
mod template;
mod text;

pub use scorer::{AssessError, FraudScorer};

/// Extract a snippet around a match for evidence trails (up to ~100 chars
/// of surrounding context).
pub(crate) fn snippet_around(text: &str, start: usize, end: usize) -> String {
    let from = floor_char_boundary(text, start.saturating_sub(50));
    let to = floor_char_boundary(text, (end + 50).min(text.len()));
    format!("...{}...", text[from..to].trim())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_is_windowed() {
        let text = "a".repeat(200);
        let snippet = snippet_around(&text, 100, 104);
        assert!(snippet.starts_with("..."));
        assert!(snippet.len() < text.len());
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let text = "ценный сертификат подлинности на русском языке";
        let pos = text.find("сертификат").unwrap();
        // Must not panic on multi-byte boundaries
        let snippet = snippet_around(text, pos, pos + "сертификат".len());
        assert!(snippet.contains("сертификат"));
    }
}
