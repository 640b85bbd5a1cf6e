//! Data models for the verification pipeline.

mod assessment;
mod document;
mod extraction;
mod queue;

pub use assessment::{
    CheckOutcome, CrossReferenceCheck, FraudAssessment, FraudIssue, IssueEvidence, IssueSeverity,
    MetadataAnalysis, PatternMatch, RiskTier,
};
pub use document::{Document, DocumentCategory, DocumentStatus};
pub use extraction::{
    ExtractionResult, KeyValuePair, Region, StructuredFields, Table, WordBox,
};
pub use queue::{priority, QueueEntry, QueueStatus};
