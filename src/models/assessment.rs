//! Fraud assessment models.
//!
//! One `FraudAssessment` is derived from exactly one `ExtractionResult` plus
//! the raw file bytes, and is never mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    /// Weight used by the score aggregation.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.5,
            Self::High => 0.8,
            Self::Critical => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Coarse risk bucket derived from the fraud score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Pure function of the fraud score via fixed thresholds.
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Typed evidence attached to a detected issue, one shape per detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueEvidence {
    /// A text-pattern detector hit: the pattern and the text around it.
    KeywordMatch { pattern: String, snippet: String },
    /// Required semantic elements missing for the document category.
    MissingElements {
        required: Vec<String>,
        missing: Vec<String>,
    },
    /// Structural metadata finding from the raw bytes.
    MetadataFinding {
        consistency: f32,
        tools: Vec<String>,
    },
    /// A known-fraud pattern table hit.
    KnownPattern { pattern: String, snippet: String },
    /// Extracted field keys diverge from the category template.
    LayoutMismatch {
        expected: Vec<String>,
        present: Vec<String>,
        match_ratio: f32,
    },
    /// A cross-reference check failed.
    CrossReference { check: String, subject: String },
    /// Extraction-quality finding (low confidence, duplicate keys).
    TextQuality { detail: String },
}

/// One detected issue contributing to the fraud score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudIssue {
    /// Machine-readable issue category, e.g. `known_fraud_pattern`.
    pub category: String,
    pub severity: IssueSeverity,
    /// Human description for the audit trail.
    pub description: String,
    pub evidence: IssueEvidence,
    /// Per-issue confidence in [0,1].
    pub confidence: f32,
}

/// Metadata/tamper analysis summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataAnalysis {
    pub has_been_edited: bool,
    pub suspicious: bool,
    /// Structural consistency score in [0,1].
    pub consistency: f32,
    /// Editing tool signatures found in the byte stream.
    pub tools: Vec<String>,
}

impl Default for MetadataAnalysis {
    fn default() -> Self {
        Self {
            has_been_edited: false,
            suspicious: false,
            consistency: 1.0,
            tools: Vec::new(),
        }
    }
}

/// A known-fraud or layout pattern match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub description: String,
    pub match_confidence: f32,
}

/// Outcome of a cross-reference check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Fail,
    /// The input needed for the check was not extracted.
    Unknown,
}

/// A single cross-reference check (blacklist / issuer / template).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReferenceCheck {
    pub name: String,
    /// The value that was checked, when one was available.
    pub subject: Option<String>,
    pub outcome: CheckOutcome,
    pub confidence: f32,
}

/// One fraud-scoring outcome for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub document_id: String,
    /// Aggregate suspicion in [0,1], higher is more suspicious.
    /// Rounded to 3 decimals.
    pub fraud_score: f32,
    pub risk_tier: RiskTier,
    pub issues: Vec<FraudIssue>,
    /// `1 - fraud_score`, clamped at 0.
    pub authenticity_score: f32,
    pub tampering_detected: bool,
    pub metadata: MetadataAnalysis,
    pub pattern_matches: Vec<PatternMatch>,
    pub cross_reference_checks: Vec<CrossReferenceCheck>,
    /// Confidence in the assessment itself, in [0,1].
    pub confidence: f32,
    pub manual_review_required: bool,
    /// Deterministic human-readable review summary.
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
}
