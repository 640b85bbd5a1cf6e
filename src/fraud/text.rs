//! Text-pattern and category-completeness detectors.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use crate::config::{CategoryTemplate, TextPattern};
use crate::models::{
    DocumentCategory, ExtractionResult, FraudIssue, IssueEvidence, IssueSeverity,
};

use super::snippet_around;

/// Extraction confidence below which the text itself is treated as unreliable.
const LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Scan the OCR text against the configured suspicious-pattern table and
/// flag extraction-quality problems.
pub fn scan(extraction: &ExtractionResult, patterns: &[TextPattern]) -> Vec<FraudIssue> {
    let mut issues = Vec::new();

    for entry in patterns {
        let regex = match Regex::new(&entry.pattern) {
            Ok(r) => r,
            Err(e) => {
                warn!(pattern = %entry.pattern, error = %e, "skipping invalid text pattern");
                continue;
            }
        };
        if let Some(found) = regex.find(&extraction.text) {
            issues.push(FraudIssue {
                category: "suspicious_keyword".to_string(),
                severity: entry.severity,
                description: entry.description.clone(),
                evidence: IssueEvidence::KeywordMatch {
                    pattern: entry.pattern.clone(),
                    snippet: snippet_around(&extraction.text, found.start(), found.end()),
                },
                confidence: entry.confidence,
            });
        }
    }

    if extraction.confidence < LOW_CONFIDENCE_THRESHOLD {
        issues.push(FraudIssue {
            category: "text_inconsistency".to_string(),
            severity: IssueSeverity::Medium,
            description: "Overall extraction confidence is too low to trust the text"
                .to_string(),
            evidence: IssueEvidence::TextQuality {
                detail: format!("extraction confidence {:.2}", extraction.confidence),
            },
            confidence: 0.6,
        });
    }

    let duplicates = duplicate_keys(extraction);
    if !duplicates.is_empty() {
        issues.push(FraudIssue {
            category: "duplicate_fields".to_string(),
            severity: IssueSeverity::Medium,
            description: "Form contains duplicated field keys".to_string(),
            evidence: IssueEvidence::TextQuality {
                detail: format!("duplicate keys: {}", duplicates.join(", ")),
            },
            confidence: 0.7,
        });
    }

    issues
}

fn duplicate_keys(extraction: &ExtractionResult) -> Vec<String> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    for pair in &extraction.key_values {
        let normalized = pair.key.trim_end_matches(':').trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        *seen.entry(normalized).or_insert(0) += 1;
    }
    let mut duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect();
    duplicates.sort();
    duplicates
}

/// Check the category's required semantic elements against the text.
/// Missing two or more is high severity; missing one is medium.
pub fn completeness(
    category: DocumentCategory,
    text: &str,
    template: Option<&CategoryTemplate>,
) -> Option<FraudIssue> {
    let template = template?;
    let lower = text.to_lowercase();

    let mut required: Vec<String> = template.required_elements.clone();
    let mut missing: Vec<String> = template
        .required_elements
        .iter()
        .filter(|el| !lower.contains(el.as_str()))
        .cloned()
        .collect();

    if !template.any_of_elements.is_empty() {
        let alternatives = template.any_of_elements.join("|");
        required.push(format!("any of: {alternatives}"));
        if !template
            .any_of_elements
            .iter()
            .any(|el| lower.contains(el.as_str()))
        {
            missing.push(format!("any of: {alternatives}"));
        }
    }

    if missing.is_empty() {
        return None;
    }

    let severity = if missing.len() >= 2 {
        IssueSeverity::High
    } else {
        IssueSeverity::Medium
    };

    Some(FraudIssue {
        category: "incomplete_document".to_string(),
        severity,
        description: format!(
            "Document is missing {} expected element(s) for a {}",
            missing.len(),
            category.as_str()
        ),
        evidence: IssueEvidence::MissingElements { required, missing },
        confidence: 0.7,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceData;
    use crate::models::KeyValuePair;
    use chrono::Utc;

    fn extraction(text: &str, confidence: f32) -> ExtractionResult {
        ExtractionResult {
            document_id: "d".into(),
            text: text.into(),
            key_values: Vec::new(),
            tables: Vec::new(),
            words: Vec::new(),
            fields: Default::default(),
            confidence,
            duration_ms: 1,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_suspicious_keywords_fire_with_configured_severity() {
        let reference = ReferenceData::default();
        let ex = extraction("this is a REPLICA of the original certificate", 0.9);
        let issues = scan(&ex, &reference.text_patterns);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "suspicious_keyword");
        assert_eq!(issues[0].severity, IssueSeverity::Critical);
        assert_eq!(issues[0].confidence, 0.8);
        match &issues[0].evidence {
            IssueEvidence::KeywordMatch { snippet, .. } => {
                assert!(snippet.contains("REPLICA"));
            }
            other => panic!("wrong evidence: {other:?}"),
        }
    }

    #[test]
    fn test_draft_marker_is_high_severity() {
        let reference = ReferenceData::default();
        let ex = extraction("DRAFT - not for distribution", 0.9);
        let issues = scan(&ex, &reference.text_patterns);
        assert_eq!(issues[0].severity, IssueSeverity::High);
    }

    #[test]
    fn test_low_confidence_flagged() {
        let reference = ReferenceData::default();
        let ex = extraction("perfectly ordinary text", 0.3);
        let issues = scan(&ex, &reference.text_patterns);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "text_inconsistency");
        assert_eq!(issues[0].severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_duplicate_keys_flagged() {
        let reference = ReferenceData::default();
        let mut ex = extraction("clean", 0.9);
        ex.key_values = vec![
            KeyValuePair {
                key: "Serial Number:".into(),
                value: "A".into(),
                confidence: 0.9,
            },
            KeyValuePair {
                key: "serial number".into(),
                value: "B".into(),
                confidence: 0.9,
            },
            KeyValuePair {
                key: "Issuer".into(),
                value: "C".into(),
                confidence: 0.9,
            },
        ];
        let issues = scan(&ex, &reference.text_patterns);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "duplicate_fields");
    }

    #[test]
    fn test_completeness_missing_two_is_high() {
        let reference = ReferenceData::default();
        let template = reference.template_for(DocumentCategory::AuthenticityCertificate);
        let issue = completeness(
            DocumentCategory::AuthenticityCertificate,
            "certificate that is authentic",
            template,
        )
        .unwrap();
        assert_eq!(issue.severity, IssueSeverity::High);
        match &issue.evidence {
            IssueEvidence::MissingElements { missing, .. } => {
                assert_eq!(missing.len(), 2); // "issued", "date"
            }
            other => panic!("wrong evidence: {other:?}"),
        }
    }

    #[test]
    fn test_completeness_missing_one_is_medium() {
        let reference = ReferenceData::default();
        let template = reference.template_for(DocumentCategory::AuthenticityCertificate);
        let issue = completeness(
            DocumentCategory::AuthenticityCertificate,
            "certificate, authentic, issued by someone",
            template,
        )
        .unwrap();
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_completeness_any_of_satisfied_by_one_term() {
        let reference = ReferenceData::default();
        let template = reference.template_for(DocumentCategory::NftCertificate);
        assert!(completeness(
            DocumentCategory::NftCertificate,
            "proof of ownership recorded on the Ethereum ledger",
            template,
        )
        .is_none());

        let issue = completeness(
            DocumentCategory::NftCertificate,
            "proof of ownership, no chain mentioned",
            template,
        )
        .unwrap();
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_no_template_no_issue() {
        assert!(completeness(DocumentCategory::Photo, "whatever", None).is_none());
    }
}
