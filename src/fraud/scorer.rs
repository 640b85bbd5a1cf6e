//! Fraud score aggregation.
//!
//! `assess` is a pure function of the extraction output, the raw bytes and
//! the reference tables: fixed inputs always produce the same score, tier
//! and review decision. Finding fraud is a normal outcome expressed in the
//! score, never an error.

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::config::ReferenceData;
use crate::models::{
    DocumentCategory, ExtractionResult, FraudAssessment, FraudIssue, IssueEvidence,
    IssueSeverity, RiskTier,
};

use super::{crossref, metadata, patterns, template, text};

/// Pattern matches above this confidence add a flat score bonus.
const STRONG_MATCH_THRESHOLD: f32 = 0.7;
/// Flat contribution of each strong pattern match.
const STRONG_MATCH_BONUS: f64 = 0.4;
/// Flat contribution of suspicious metadata.
const SUSPICIOUS_METADATA_BONUS: f64 = 0.3;
/// Score multiplier rewarding clean metadata.
const CLEAN_METADATA_MULTIPLIER: f64 = 0.8;

/// Scorer infrastructure failures. Fraud findings are never errors.
#[derive(Debug, Error)]
pub enum AssessError {
    /// The ordering invariant: no assessment without a successful
    /// extraction for the same attempt.
    #[error("no successful extraction to assess: {0}")]
    ExtractionIncomplete(String),
}

/// Aggregates detector findings into a fraud assessment.
#[derive(Debug, Clone)]
pub struct FraudScorer {
    review_threshold: f32,
}

impl FraudScorer {
    pub fn new(review_threshold: f32) -> Self {
        Self { review_threshold }
    }

    /// Score one document from its extraction output and raw bytes.
    pub fn assess(
        &self,
        extraction: &ExtractionResult,
        bytes: &[u8],
        mime_type: &str,
        category: DocumentCategory,
        reference: &ReferenceData,
    ) -> Result<FraudAssessment, AssessError> {
        if let Some(error) = &extraction.error {
            return Err(AssessError::ExtractionIncomplete(error.clone()));
        }

        let mut issues = text::scan(extraction, &reference.text_patterns);
        if let Some(issue) = text::completeness(
            category,
            &extraction.text,
            reference.template_for(category),
        ) {
            issues.push(issue);
        }

        let metadata = metadata::analyze(bytes, mime_type);
        let tampering_detected = metadata.suspicious;
        if metadata.suspicious {
            issues.push(FraudIssue {
                category: "metadata_tampering".to_string(),
                severity: IssueSeverity::High,
                description: "File metadata shows signs of tampering".to_string(),
                evidence: IssueEvidence::MetadataFinding {
                    consistency: metadata.consistency,
                    tools: metadata.tools.clone(),
                },
                confidence: 0.8,
            });
        }

        let (mut pattern_matches, known_issues) =
            patterns::scan(&extraction.text, &reference.fraud_patterns);
        issues.extend(known_issues);

        let layout = template::compare(category, extraction, reference);
        if let Some(issue) = layout.issue {
            issues.push(issue);
        }
        if let Some(pattern_match) = layout.pattern_match {
            pattern_matches.push(pattern_match);
        }

        let crossref = crossref::run(extraction, category, reference);
        issues.extend(crossref.issues);

        // Aggregation. Each issue contributes severity weight x confidence
        // to both the running score and the weight total; clean metadata
        // discounts the score, suspicious metadata and strong pattern
        // matches add flat contributions to both sides.
        let mut score: f64 = 0.0;
        let mut weight_total: f64 = 0.0;
        for issue in &issues {
            let contribution = (issue.severity.weight() * issue.confidence) as f64;
            score += contribution;
            weight_total += contribution;
        }

        if metadata.suspicious {
            score += SUSPICIOUS_METADATA_BONUS;
            weight_total += SUSPICIOUS_METADATA_BONUS;
        } else {
            score *= CLEAN_METADATA_MULTIPLIER;
        }

        for pattern_match in &pattern_matches {
            if pattern_match.match_confidence > STRONG_MATCH_THRESHOLD {
                score += STRONG_MATCH_BONUS;
                weight_total += STRONG_MATCH_BONUS;
            }
        }

        let fraud_score = round3((score / weight_total.max(1.0)).clamp(0.0, 1.0) as f32);
        let risk_tier = RiskTier::from_score(fraud_score);
        let authenticity_score = (1.0 - fraud_score).max(0.0);

        let strong_issues = issues.iter().filter(|i| i.confidence > 0.7).count();
        let mut confidence =
            (extraction.confidence + 0.1 * strong_issues as f32).clamp(0.0, 1.0);
        if extraction.confidence < 0.5 {
            confidence *= 0.7;
        }

        let manual_review_required = fraud_score >= self.review_threshold
            || issues.iter().any(|i| i.severity == IssueSeverity::Critical);

        let review_notes = review_notes(fraud_score, risk_tier, &issues);

        debug!(
            document_id = %extraction.document_id,
            fraud_score,
            risk_tier = risk_tier.as_str(),
            issues = issues.len(),
            manual_review_required,
            "assessment complete"
        );

        Ok(FraudAssessment {
            document_id: extraction.document_id.clone(),
            fraud_score,
            risk_tier,
            issues,
            authenticity_score,
            tampering_detected,
            metadata,
            pattern_matches,
            cross_reference_checks: crossref.checks,
            confidence,
            manual_review_required,
            review_notes,
            created_at: Utc::now(),
        })
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Deterministic review summary: score/tier line, issue count, the first
/// three critical issues, and a fixed-threshold recommendation.
fn review_notes(score: f32, tier: RiskTier, issues: &[FraudIssue]) -> String {
    let mut lines = vec![format!("Fraud score {score:.3} ({} risk).", tier.as_str())];

    if issues.is_empty() {
        lines.push("No issues detected.".to_string());
    } else {
        lines.push(format!("{} issue(s) detected.", issues.len()));
    }

    for issue in issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Critical)
        .take(3)
    {
        lines.push(format!("- [critical] {}", issue.description));
    }

    let recommendation = if score >= 0.7 {
        "Manual review required."
    } else if score >= 0.5 {
        "Additional verification recommended."
    } else {
        "Document appears legitimate."
    };
    lines.push(recommendation.to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StructuredFields;

    fn extraction(text: &str, confidence: f32) -> ExtractionResult {
        ExtractionResult {
            document_id: "doc".into(),
            text: text.into(),
            key_values: Vec::new(),
            tables: Vec::new(),
            words: Vec::new(),
            fields: StructuredFields::default(),
            confidence,
            duration_ms: 1,
            error: None,
            created_at: Utc::now(),
        }
    }

    fn scorer() -> FraudScorer {
        FraudScorer::new(0.5)
    }

    const CLEAN_PDF: &[u8] = b"%PDF-1.7 ordinary bytes";

    #[test]
    fn test_assess_refuses_failed_extraction() {
        let failed = ExtractionResult::failed("doc".into(), "ocr exploded".into(), 3);
        let err = scorer()
            .assess(
                &failed,
                CLEAN_PDF,
                "application/pdf",
                DocumentCategory::Other,
                &ReferenceData::default(),
            )
            .unwrap_err();
        assert!(matches!(err, AssessError::ExtractionIncomplete(_)));
    }

    #[test]
    fn test_assess_is_deterministic() {
        let reference = ReferenceData::default();
        let ex = extraction("this might be a fake certificate, a draft copy", 0.6);
        let a = scorer()
            .assess(&ex, CLEAN_PDF, "application/pdf", DocumentCategory::Other, &reference)
            .unwrap();
        let b = scorer()
            .assess(&ex, CLEAN_PDF, "application/pdf", DocumentCategory::Other, &reference)
            .unwrap();
        assert_eq!(a.fraud_score, b.fraud_score);
        assert_eq!(a.risk_tier, b.risk_tier);
        assert_eq!(a.manual_review_required, b.manual_review_required);
        assert_eq!(a.review_notes, b.review_notes);
    }

    #[test]
    fn test_scores_stay_in_bounds_under_many_issues() {
        let reference = ReferenceData::default();
        // Every text detector and pattern fires, extraction is garbage.
        let ex = extraction(
            "fake fraud counterfeit replica copy duplicate sample temporary draft \
             not valid specimen counterfeit authentic fake certificate not an official",
            0.1,
        );
        let assessment = scorer()
            .assess(
                &ex,
                b"JUNK Photoshop GIMP iText Ghostscript",
                "application/pdf",
                DocumentCategory::AuthenticityCertificate,
                &reference,
            )
            .unwrap();

        assert!((0.0..=1.0).contains(&assessment.fraud_score));
        assert!((0.0..=1.0).contains(&assessment.authenticity_score));
        assert!((0.0..=1.0).contains(&assessment.confidence));
        assert_eq!(assessment.risk_tier, RiskTier::Critical);
        assert!(assessment.manual_review_required);
    }

    #[test]
    fn test_adding_critical_issue_never_lowers_the_score() {
        let reference = ReferenceData::default();
        let clean = extraction("an unremarkable document", 0.9);
        let with_critical = extraction("an unremarkable document mentioning FRAUD", 0.9);

        let base = scorer()
            .assess(&clean, CLEAN_PDF, "application/pdf", DocumentCategory::Other, &reference)
            .unwrap();
        let bumped = scorer()
            .assess(
                &with_critical,
                CLEAN_PDF,
                "application/pdf",
                DocumentCategory::Other,
                &reference,
            )
            .unwrap();

        assert!(bumped.fraud_score >= base.fraud_score);
        assert!(bumped.manual_review_required);
        assert!(!base.manual_review_required);
    }

    #[test]
    fn test_low_extraction_confidence_discounts_assessment_confidence() {
        let reference = ReferenceData::default();
        let ex = extraction("ordinary text", 0.4);
        let assessment = scorer()
            .assess(&ex, CLEAN_PDF, "application/pdf", DocumentCategory::Other, &reference)
            .unwrap();
        // 0.4 confidence raises the text_inconsistency issue (conf 0.6, not
        // counted as strong), then the whole confidence is discounted.
        assert!((assessment.confidence - 0.4 * 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_scenario_tampered_pdf_magic() {
        // Bytes that do not start with %PDF- for a declared PDF: metadata
        // tampering drives the assessment regardless of OCR content.
        let reference = ReferenceData::default();
        let ex = extraction("ordinary certificate content", 0.9);
        let assessment = scorer()
            .assess(
                &ex,
                b"JUNK0001 stream data",
                "application/pdf",
                DocumentCategory::Other,
                &reference,
            )
            .unwrap();

        let tampering = assessment
            .issues
            .iter()
            .find(|i| i.category == "metadata_tampering")
            .expect("metadata_tampering issue");
        assert_eq!(tampering.severity, IssueSeverity::High);
        assert!(assessment.tampering_detected);
        assert_eq!(assessment.metadata.consistency, 0.0);
        assert!(assessment.manual_review_required);
        // 0.8*0.8 = 0.64 issue contribution plus the 0.3 flat bonus on both
        // sides: 0.94 / max(0.94, 1) = 0.94.
        assert!((assessment.fraud_score - 0.94).abs() < 1e-6);
    }

    #[test]
    fn test_scenario_counterfeit_authentic_certificate() {
        let reference = ReferenceData::default();
        let ex = extraction("COUNTERFEIT AUTHENTIC CERTIFICATE", 0.9);
        let assessment = scorer()
            .assess(&ex, CLEAN_PDF, "application/pdf", DocumentCategory::Other, &reference)
            .unwrap();

        let known = assessment
            .issues
            .iter()
            .find(|i| i.category == "known_fraud_pattern")
            .expect("known_fraud_pattern issue");
        assert_eq!(known.severity, IssueSeverity::Critical);
        assert_eq!(known.confidence, 0.95);

        // keyword 1.0*0.8 + known 1.0*0.95 = 1.75 to both sides, clean
        // metadata multiplies the score by 0.8, the 0.95 match adds 0.4 to
        // both: 1.8 / 2.15 = 0.837.
        assert_eq!(assessment.fraud_score, 0.837);
        assert_eq!(assessment.risk_tier, RiskTier::Critical);
        assert!(assessment.manual_review_required);
        assert!(assessment.review_notes.contains("Manual review required."));
    }

    #[test]
    fn test_scenario_clean_appraisal() {
        let reference = ReferenceData::default();
        let mut ex = extraction(
            "APPRAISAL REPORT\nAppraiser: Jordan Michaels\nMarket Value: $12,500\n\
             Date: 2024-03-15\nThis appraisal states the fair value of the item.",
            0.97,
        );
        ex.fields = StructuredFields {
            appraiser: Some("Jordan Michaels".into()),
            market_value: Some("12,500".into()),
            issue_date: Some("2024-03-15".into()),
            ..Default::default()
        };

        let assessment = scorer()
            .assess(&ex, b"\x89PNG\r\n\x1a\n...", "image/png", DocumentCategory::Appraisal, &reference)
            .unwrap();

        assert!(assessment.issues.is_empty(), "{:?}", assessment.issues);
        assert!(assessment.fraud_score < 0.05);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
        assert!(!assessment.manual_review_required);
        assert!(assessment.authenticity_score > 0.95);
        assert!(assessment
            .review_notes
            .contains("Document appears legitimate."));
        assert!(assessment.review_notes.contains("No issues detected."));
    }

    #[test]
    fn test_review_notes_list_at_most_three_criticals() {
        let issues: Vec<FraudIssue> = (0..5)
            .map(|i| FraudIssue {
                category: "known_fraud_pattern".into(),
                severity: IssueSeverity::Critical,
                description: format!("critical issue {i}"),
                evidence: IssueEvidence::TextQuality {
                    detail: "x".into(),
                },
                confidence: 0.9,
            })
            .collect();
        let notes = review_notes(0.91, RiskTier::Critical, &issues);
        assert_eq!(notes.matches("- [critical]").count(), 3);
        assert!(notes.starts_with("Fraud score 0.910 (critical risk)."));
        assert!(notes.contains("5 issue(s) detected."));
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert!(review_notes(0.7, RiskTier::High, &[]).contains("Manual review required."));
        assert!(review_notes(0.5, RiskTier::Medium, &[])
            .contains("Additional verification recommended."));
        assert!(review_notes(0.49, RiskTier::Medium, &[])
            .contains("Document appears legitimate."));
    }
}
