//! Template/layout conformance: extracted field keys vs. the category's
//! expected-field list.

use crate::config::{CategoryTemplate, ReferenceData};
use crate::models::{
    DocumentCategory, ExtractionResult, FraudIssue, IssueEvidence, IssueSeverity, PatternMatch,
};

/// Match ratios below this are anomalous.
const MATCH_THRESHOLD: f32 = 0.6;

/// Outcome of the layout comparison.
#[derive(Debug, Default)]
pub struct LayoutComparison {
    pub issue: Option<FraudIssue>,
    pub pattern_match: Option<PatternMatch>,
}

/// Compare extracted field keys against the category template.
pub fn compare(
    category: DocumentCategory,
    extraction: &ExtractionResult,
    reference: &ReferenceData,
) -> LayoutComparison {
    let Some(template) = reference.template_for(category) else {
        return LayoutComparison::default();
    };
    if template.expected_fields.is_empty() {
        return LayoutComparison::default();
    }

    let present = present_keys(extraction);
    let (matched, ratio) = match_ratio(template, &present);

    if ratio >= MATCH_THRESHOLD {
        return LayoutComparison::default();
    }

    let description = format!(
        "Layout matches only {matched} of {} expected fields for a {}",
        template.expected_fields.len(),
        category.as_str()
    );

    LayoutComparison {
        issue: Some(FraudIssue {
            category: "layout_anomaly".to_string(),
            severity: IssueSeverity::Medium,
            description: description.clone(),
            evidence: IssueEvidence::LayoutMismatch {
                expected: template.expected_fields.clone(),
                present,
                match_ratio: ratio,
            },
            confidence: 1.0 - ratio,
        }),
        pattern_match: Some(PatternMatch {
            pattern: format!("template:{}", category.as_str()),
            description,
            match_confidence: 1.0 - ratio,
        }),
    }
}

/// Fraction of the template's expected fields found among the extracted
/// keys. Used by both the layout detector and the cross-reference template
/// validation check.
pub fn field_match_ratio(
    template: &CategoryTemplate,
    extraction: &ExtractionResult,
) -> (usize, f32) {
    let present = present_keys(extraction);
    match_ratio(template, &present)
}

fn match_ratio(template: &CategoryTemplate, present: &[String]) -> (usize, f32) {
    if template.expected_fields.is_empty() {
        return (0, 1.0);
    }
    let matched = template
        .expected_fields
        .iter()
        .filter(|expected| {
            let expected = normalize(expected);
            present.iter().any(|p| p.contains(&expected))
        })
        .count();
    (matched, matched as f32 / template.expected_fields.len() as f32)
}

/// All field keys the extraction surfaced: recognized structured fields plus
/// normalized form-field keys.
fn present_keys(extraction: &ExtractionResult) -> Vec<String> {
    let mut keys: Vec<String> = extraction
        .fields
        .present_names()
        .iter()
        .map(|n| normalize(n))
        .collect();
    keys.extend(
        extraction
            .key_values
            .iter()
            .map(|kv| normalize(kv.key.trim_end_matches(':'))),
    );
    keys
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase().replace(['_', '-'], " ")
}
