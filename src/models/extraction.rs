//! Extraction result models.
//!
//! One `ExtractionResult` is produced per (re-)analysis attempt and is
//! immutable once written; re-analysis deletes and recreates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized page-relative geometry of a block (fractions of page size).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// A single recognized word with its position and recognition confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    /// Recognition confidence in [0,1].
    pub confidence: f32,
    pub region: Region,
}

/// A reconstructed table: a dense 2-D grid of cell text.
///
/// Gaps in the source cells are filled with empty strings so every row has
/// the same width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
    /// Mean confidence of the cells that were present.
    pub confidence: f32,
    pub region: Option<Region>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }
}

/// A key/value form field pair, whitespace-trimmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
    pub confidence: f32,
}

/// Category-specific structured fields recognized from the OCR text.
///
/// Absence of any field is not an error; patterns are tried in order and the
/// first match wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFields {
    pub serial_number: Option<String>,
    pub issuer: Option<String>,
    pub issue_date: Option<String>,
    pub token_id: Option<String>,
    pub blockchain: Option<String>,
    pub appraiser: Option<String>,
    pub market_value: Option<String>,
    pub replacement_value: Option<String>,
}

impl StructuredFields {
    /// Names of the fields that were recognized, for template matching.
    pub fn present_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.serial_number.is_some() {
            names.push("serial_number");
        }
        if self.issuer.is_some() {
            names.push("issuer");
        }
        if self.issue_date.is_some() {
            names.push("issue_date");
        }
        if self.token_id.is_some() {
            names.push("token_id");
        }
        if self.blockchain.is_some() {
            names.push("blockchain");
        }
        if self.appraiser.is_some() {
            names.push("appraiser");
        }
        if self.market_value.is_some() {
            names.push("market_value");
        }
        if self.replacement_value.is_some() {
            names.push("replacement_value");
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.present_names().is_empty()
    }
}

/// One OCR/structured-extraction outcome for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: String,
    /// Concatenated line text.
    pub text: String,
    /// Key/value form pairs.
    pub key_values: Vec<KeyValuePair>,
    /// Reconstructed tables.
    pub tables: Vec<Table>,
    /// Word-level bounding boxes above the confidence threshold.
    pub words: Vec<WordBox>,
    /// Category-specific structured fields.
    pub fields: StructuredFields,
    /// Arithmetic mean of all block confidences, 0 if there were no blocks.
    pub confidence: f32,
    /// Wall-clock processing duration.
    pub duration_ms: u64,
    /// Failure message. A result carrying an error has no usable
    /// structured content.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// An empty result recording a failed extraction attempt.
    pub fn failed(document_id: String, error: String, duration_ms: u64) -> Self {
        Self {
            document_id,
            text: String::new(),
            key_values: Vec::new(),
            tables: Vec::new(),
            words: Vec::new(),
            fields: StructuredFields::default(),
            confidence: 0.0,
            duration_ms,
            error: Some(error),
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
