//! Cross-reference checks: serial blacklist, issuer verification and
//! template validation against maintained reference data.

use crate::config::ReferenceData;
use crate::models::{
    CheckOutcome, CrossReferenceCheck, DocumentCategory, ExtractionResult, FraudIssue,
    IssueEvidence, IssueSeverity,
};

use super::template::field_match_ratio;

const BLACKLIST_CONFIDENCE: f32 = 0.95;
const ISSUER_CONFIDENCE: f32 = 0.8;
/// Template validation fails below this required-field ratio.
const TEMPLATE_THRESHOLD: f32 = 0.6;

/// Outcome of all cross-reference checks.
#[derive(Debug, Default)]
pub struct CrossRefOutcome {
    pub checks: Vec<CrossReferenceCheck>,
    pub issues: Vec<FraudIssue>,
}

/// Run the three checks. Checks whose input was not extracted report
/// `Unknown` and raise nothing.
pub fn run(
    extraction: &ExtractionResult,
    category: DocumentCategory,
    reference: &ReferenceData,
) -> CrossRefOutcome {
    let mut outcome = CrossRefOutcome::default();

    serial_blacklist(extraction, reference, &mut outcome);
    issuer_verification(extraction, category, reference, &mut outcome);
    template_validation(extraction, category, reference, &mut outcome);

    outcome
}

fn serial_blacklist(
    extraction: &ExtractionResult,
    reference: &ReferenceData,
    outcome: &mut CrossRefOutcome,
) {
    let Some(serial) = extraction.fields.serial_number.as_deref() else {
        outcome.checks.push(CrossReferenceCheck {
            name: "serial_blacklist".to_string(),
            subject: None,
            outcome: CheckOutcome::Unknown,
            confidence: 0.0,
        });
        return;
    };

    let blacklisted = reference.is_serial_blacklisted(serial);
    outcome.checks.push(CrossReferenceCheck {
        name: "serial_blacklist".to_string(),
        subject: Some(serial.to_string()),
        outcome: if blacklisted {
            CheckOutcome::Fail
        } else {
            CheckOutcome::Pass
        },
        confidence: BLACKLIST_CONFIDENCE,
    });

    if blacklisted {
        outcome.issues.push(FraudIssue {
            category: "cross_reference".to_string(),
            severity: IssueSeverity::Critical,
            description: format!("Serial number {serial} is blacklisted"),
            evidence: IssueEvidence::CrossReference {
                check: "serial_blacklist".to_string(),
                subject: serial.to_string(),
            },
            confidence: BLACKLIST_CONFIDENCE,
        });
    }
}

fn issuer_verification(
    extraction: &ExtractionResult,
    category: DocumentCategory,
    reference: &ReferenceData,
    outcome: &mut CrossRefOutcome,
) {
    let known = reference.issuers_for(category);
    let Some(issuer) = extraction.fields.issuer.as_deref() else {
        outcome.checks.push(CrossReferenceCheck {
            name: "issuer_verification".to_string(),
            subject: None,
            outcome: CheckOutcome::Unknown,
            confidence: 0.0,
        });
        return;
    };

    if known.is_empty() {
        outcome.checks.push(CrossReferenceCheck {
            name: "issuer_verification".to_string(),
            subject: Some(issuer.to_string()),
            outcome: CheckOutcome::Unknown,
            confidence: 0.0,
        });
        return;
    }

    let issuer_lower = issuer.to_lowercase();
    let recognized = known.iter().any(|k| {
        let k = k.to_lowercase();
        issuer_lower.contains(&k) || k.contains(&issuer_lower)
    });

    outcome.checks.push(CrossReferenceCheck {
        name: "issuer_verification".to_string(),
        subject: Some(issuer.to_string()),
        outcome: if recognized {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail
        },
        confidence: ISSUER_CONFIDENCE,
    });

    if !recognized {
        outcome.issues.push(FraudIssue {
            category: "cross_reference".to_string(),
            severity: IssueSeverity::High,
            description: format!(
                "Issuer \"{issuer}\" is not a recognized {} issuer",
                category.as_str()
            ),
            evidence: IssueEvidence::CrossReference {
                check: "issuer_verification".to_string(),
                subject: issuer.to_string(),
            },
            confidence: ISSUER_CONFIDENCE,
        });
    }
}

fn template_validation(
    extraction: &ExtractionResult,
    category: DocumentCategory,
    reference: &ReferenceData,
    outcome: &mut CrossRefOutcome,
) {
    let template = reference.template_for(category);
    let Some(template) = template.filter(|t| !t.expected_fields.is_empty()) else {
        outcome.checks.push(CrossReferenceCheck {
            name: "template_validation".to_string(),
            subject: None,
            outcome: CheckOutcome::Unknown,
            confidence: 0.0,
        });
        return;
    };

    let (matched, ratio) = field_match_ratio(template, extraction);
    let failed = ratio < TEMPLATE_THRESHOLD;

    outcome.checks.push(CrossReferenceCheck {
        name: "template_validation".to_string(),
        subject: Some(format!(
            "{matched}/{} required fields",
            template.expected_fields.len()
        )),
        outcome: if failed {
            CheckOutcome::Fail
        } else {
            CheckOutcome::Pass
        },
        confidence: ratio,
    });

    if failed {
        outcome.issues.push(FraudIssue {
            category: "cross_reference".to_string(),
            severity: IssueSeverity::High,
            description: format!(
                "Document carries only {matched} of {} required fields for a {}",
                template.expected_fields.len(),
                category.as_str()
            ),
            evidence: IssueEvidence::CrossReference {
                check: "template_validation".to_string(),
                subject: format!("{matched}/{}", template.expected_fields.len()),
            },
            confidence: ratio,
        });
    }
}
