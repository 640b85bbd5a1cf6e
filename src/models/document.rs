//! Document models for collateral verification.
//!
//! A document is one uploaded file tied to a loan submission. Its bytes are
//! content-addressed by SHA-256 checksum so re-uploads of identical files can
//! be detected and audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Closed set of document categories accepted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentCategory {
    AuthenticityCertificate,
    NftCertificate,
    Insurance,
    Appraisal,
    Photo,
    Video,
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticityCertificate => "authenticity-certificate",
            Self::NftCertificate => "nft-certificate",
            Self::Insurance => "insurance",
            Self::Appraisal => "appraisal",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authenticity-certificate" => Some(Self::AuthenticityCertificate),
            "nft-certificate" => Some(Self::NftCertificate),
            "insurance" => Some(Self::Insurance),
            "appraisal" => Some(Self::Appraisal),
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// All categories, for CLI help text and template iteration.
    pub fn all() -> &'static [DocumentCategory] {
        &[
            Self::AuthenticityCertificate,
            Self::NftCertificate,
            Self::Insurance,
            Self::Appraisal,
            Self::Photo,
            Self::Video,
            Self::Other,
        ]
    }
}

/// Analysis status of a document.
///
/// Transitions are monotonic (`Pending -> Processing -> Completed | Failed`)
/// except for explicit retry resets back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One uploaded file tied to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Owning submission.
    pub submission_id: String,
    /// User who uploaded the file.
    pub uploader_id: String,
    /// Declared document category.
    pub category: DocumentCategory,
    /// Original filename as uploaded.
    pub filename: String,
    /// Object-store locator for the raw bytes.
    pub storage_locator: String,
    /// Object-store locator for the thumbnail, if one was generated.
    pub thumbnail_locator: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Detected MIME type (byte-sniffed, not the declared one).
    pub mime_type: String,
    /// SHA-256 hash of the content, hex encoded.
    pub checksum: String,
    /// Current analysis status.
    pub status: DocumentStatus,
    /// Scheduling priority, higher is more urgent. Immutable once set
    /// unless explicitly updated by an administrative action.
    pub priority: i32,
    /// Free-form metadata supplied at ingestion.
    pub metadata: serde_json::Value,
    /// When the document was ingested.
    pub created_at: DateTime<Utc>,
    /// When the document was last modified by the pipeline.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Compute the SHA-256 checksum of document content.
    pub fn compute_checksum(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// Create a new pending document at ingestion time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        submission_id: String,
        uploader_id: String,
        category: DocumentCategory,
        filename: String,
        storage_locator: String,
        size: u64,
        mime_type: String,
        checksum: String,
        priority: i32,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            submission_id,
            uploader_id,
            category,
            filename,
            storage_locator,
            thumbnail_locator: None,
            size,
            mime_type,
            checksum,
            status: DocumentStatus::Pending,
            priority,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum() {
        let hash = Document::compute_checksum(b"Hello, World!");
        assert_eq!(hash.len(), 64); // SHA-256 produces 64 hex chars
        assert_eq!(hash, Document::compute_checksum(b"Hello, World!"));
        assert_ne!(hash, Document::compute_checksum(b"hello, world!"));
    }

    #[test]
    fn test_category_round_trip() {
        for cat in DocumentCategory::all() {
            assert_eq!(DocumentCategory::parse(cat.as_str()), Some(*cat));
        }
        assert_eq!(DocumentCategory::parse("passport"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), Some(s));
        }
    }
}
