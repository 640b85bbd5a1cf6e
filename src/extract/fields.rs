//! Category-specific structured-field recognition.
//!
//! Regex tables run over the concatenated OCR text. Patterns are tried in
//! order and the first match wins; a field that matches nothing is simply
//! absent.

use regex::Regex;

use crate::models::{DocumentCategory, StructuredFields};

/// Compiled field patterns, built once and shared by the extractor.
pub struct FieldExtractor {
    serial: Vec<Regex>,
    issuer: Vec<Regex>,
    issue_date: Vec<Regex>,
    token_id: Vec<Regex>,
    blockchain: Vec<Regex>,
    appraiser: Vec<Regex>,
    market_value: Vec<Regex>,
    replacement_value: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid built-in field pattern"))
        .collect()
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self {
            serial: compile(&[
                r"(?i)serial(?:\s*(?:number|no|#))?[:\s]*([A-Z0-9][A-Z0-9-]+)",
                r"(?i)\bs/n[:\s]*([A-Z0-9][A-Z0-9-]+)",
            ]),
            issuer: compile(&[
                r"(?i)(?:issued by|issuer|certified by)[:\s]*([^\n]+)",
            ]),
            issue_date: compile(&[
                r"(?i)(?:date of issue|issue date|issued on|dated?)[:\s]*(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[-/]\d{1,2}[-/]\d{2,4})",
                r"(\d{4}[-/]\d{1,2}[-/]\d{1,2})",
                r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})",
            ]),
            token_id: compile(&[r"(?i)token\s*(?:id)?\s*[:#]?\s*(\d+)"]),
            blockchain: compile(&[
                r"(?i)\b(ethereum|polygon|solana|bitcoin|tezos|arbitrum|base)\b",
            ]),
            appraiser: compile(&[
                r"(?i)(?:appraiser|appraised by|evaluated by)[:\s]*([^\n]+)",
            ]),
            market_value: compile(&[
                r"(?i)(?:market value|estimated value|appraised value)[:\s]*\$?\s*([\d,]+(?:\.\d{1,2})?)",
            ]),
            replacement_value: compile(&[
                r"(?i)replacement\s*(?:value|cost)[:\s]*\$?\s*([\d,]+(?:\.\d{1,2})?)",
            ]),
        }
    }
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the category's patterns over the concatenated text.
    pub fn extract(&self, category: DocumentCategory, text: &str) -> StructuredFields {
        let mut fields = StructuredFields {
            serial_number: first_match(&self.serial, text).map(|s| s.to_uppercase()),
            issuer: first_match(&self.issuer, text),
            issue_date: first_match(&self.issue_date, text),
            ..Default::default()
        };

        match category {
            DocumentCategory::NftCertificate => {
                fields.token_id = first_match(&self.token_id, text);
                fields.blockchain = first_match(&self.blockchain, text).map(|s| s.to_lowercase());
            }
            DocumentCategory::Appraisal => {
                fields.appraiser = first_match(&self.appraiser, text);
                fields.market_value = first_match(&self.market_value, text);
                fields.replacement_value = first_match(&self.replacement_value, text);
            }
            _ => {}
        }

        fields
    }
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(text) {
            if let Some(group) = captures.get(1) {
                let value = group.as_str().trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
