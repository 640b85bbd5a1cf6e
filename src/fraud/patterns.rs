//! Known-fraud pattern matcher.
//!
//! Checks the OCR text against the maintained table of known-fraud regexes.
//! Every hit is recorded as a pattern match; hits with confidence >= 0.7
//! additionally raise a critical issue.

use regex::Regex;
use tracing::warn;

use crate::config::FraudPattern;
use crate::models::{FraudIssue, IssueEvidence, IssueSeverity, PatternMatch};

use super::snippet_around;

/// Matches at or above this confidence raise a critical issue.
const ISSUE_THRESHOLD: f32 = 0.7;

/// Scan the text; returns the full match list and the issues derived from
/// the strong matches.
pub fn scan(text: &str, patterns: &[FraudPattern]) -> (Vec<PatternMatch>, Vec<FraudIssue>) {
    let mut matches = Vec::new();
    let mut issues = Vec::new();

    for entry in patterns {
        let regex = match Regex::new(&entry.pattern) {
            Ok(r) => r,
            Err(e) => {
                warn!(pattern = %entry.pattern, error = %e, "skipping invalid fraud pattern");
                continue;
            }
        };

        let Some(found) = regex.find(text) else {
            continue;
        };

        matches.push(PatternMatch {
            pattern: entry.pattern.clone(),
            description: entry.description.clone(),
            match_confidence: entry.confidence,
        });

        if entry.confidence >= ISSUE_THRESHOLD {
            issues.push(FraudIssue {
                category: "known_fraud_pattern".to_string(),
                severity: IssueSeverity::Critical,
                description: entry.description.clone(),
                evidence: IssueEvidence::KnownPattern {
                    pattern: entry.pattern.clone(),
                    snippet: snippet_around(text, found.start(), found.end()),
                },
                confidence: entry.confidence,
            });
        }
    }

    (matches, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceData;

    #[test]
    fn test_counterfeit_authentic_hits_at_095() {
        let reference = ReferenceData::default();
        let (matches, issues) = scan(
            "COUNTERFEIT AUTHENTIC CERTIFICATE",
            &reference.fraud_patterns,
        );

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_confidence, 0.95);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "known_fraud_pattern");
        assert_eq!(issues[0].severity, IssueSeverity::Critical);
        assert_eq!(issues[0].confidence, 0.95);
    }

    #[test]
    fn test_fake_certificate_hits_at_09() {
        let reference = ReferenceData::default();
        let (matches, issues) =
            scan("this fake luxury certificate", &reference.fraud_patterns);
        assert_eq!(matches[0].match_confidence, 0.9);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_clean_text_matches_nothing() {
        let reference = ReferenceData::default();
        let (matches, issues) = scan(
            "Certificate of Authenticity issued 2024-01-02",
            &reference.fraud_patterns,
        );
        assert!(matches.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_weak_pattern_matches_without_issue() {
        let patterns = vec![FraudPattern {
            pattern: r"(?i)suspicious".to_string(),
            confidence: 0.5,
            description: "weak signal".to_string(),
        }];
        let (matches, issues) = scan("mildly suspicious wording", &patterns);
        assert_eq!(matches.len(), 1);
        assert!(issues.is_empty());
    }
}
