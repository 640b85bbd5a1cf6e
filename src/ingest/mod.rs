//! Upload validation and ingestion helpers.
//!
//! Validation runs synchronously before anything is queued: size cap,
//! byte-sniffed content type, SHA-256 checksum. The declared MIME type is
//! never trusted when the magic bytes identify the content; when the magic
//! bytes are unrecognized the declared type is accepted as a fallback if it
//! is in the supported set, so mislabeled or tampered files reach the
//! metadata detector as evidence instead of bouncing at the door.

pub mod thumbnail;

use crate::models::Document;

/// MIME types the pipeline accepts.
pub const SUPPORTED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "application/pdf",
];

/// Facts established about an upload during validation.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub size: u64,
    /// Sniffed content type, or the declared type when sniffing found
    /// nothing recognizable.
    pub detected_type: String,
    /// SHA-256 of the raw bytes, hex encoded.
    pub checksum: String,
}

/// Outcome of upload validation.
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub info: FileInfo,
}

/// Validates uploads prior to queueing.
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_size: u64,
}

impl FileValidator {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// Validate an upload. Content errors are reported, not thrown; the
    /// caller decides whether to reject.
    pub fn validate(&self, bytes: &[u8], declared_mime: &str) -> Validation {
        let mut errors = Vec::new();

        let size = bytes.len() as u64;
        if size > self.max_size {
            errors.push(format!(
                "file is {} bytes, maximum allowed is {} bytes",
                size, self.max_size
            ));
        }
        if bytes.is_empty() {
            errors.push("file is empty".to_string());
        }

        let sniffed = infer::get(bytes).map(|t| t.mime_type());
        let detected_type = match sniffed {
            Some(mime) if is_supported(mime) => mime.to_string(),
            Some(mime) => {
                errors.push(format!(
                    "unsupported format {mime} (supported: JPEG, PNG, WEBP, PDF)"
                ));
                mime.to_string()
            }
            None if is_supported(declared_mime) => declared_mime.to_string(),
            None => {
                errors.push(format!(
                    "unrecognized content and unsupported declared type {declared_mime}"
                ));
                declared_mime.to_string()
            }
        };

        let checksum = Document::compute_checksum(bytes);

        Validation {
            is_valid: errors.is_empty(),
            errors,
            info: FileInfo {
                size,
                detected_type,
                checksum,
            },
        }
    }
}

fn is_supported(mime: &str) -> bool {
    SUPPORTED_TYPES.contains(&mime)
}
