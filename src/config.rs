//! Pipeline configuration and maintained reference data.
//!
//! Every knob has a baked-in default so the pipeline runs with no config
//! file at all. Reference tables (fraud patterns, category templates, issuer
//! whitelist, serial blacklist) are data, not code: they load from TOML at
//! process start and can be mutated through the admin operations without a
//! redeploy.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{DocumentCategory, IssueSeverity};

/// Maximum accepted upload size: 50 MB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
/// Payloads above this run the asynchronous extraction path: 10 MB.
pub const DEFAULT_SYNC_EXTRACTION_LIMIT: u64 = 10 * 1024 * 1024;

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_sync_extraction_limit() -> u64 {
    DEFAULT_SYNC_EXTRACTION_LIMIT
}

fn default_word_confidence_threshold() -> f32 {
    0.80
}

fn default_review_threshold() -> f32 {
    0.5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_processing_timeout_secs() -> u64 {
    300
}

fn default_stale_claim_timeout_secs() -> u64 {
    600
}

fn default_priority_age_interval_secs() -> i64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_thumbnail_size() -> u32 {
    320
}

/// Tunable pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Reject uploads larger than this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Payloads above this require the asynchronous extraction path.
    #[serde(default = "default_sync_extraction_limit")]
    pub sync_extraction_limit: u64,
    /// Drop recognized words below this confidence.
    #[serde(default = "default_word_confidence_threshold")]
    pub word_confidence_threshold: f32,
    /// Fraud score at or above which manual review is required.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f32,
    /// Maximum analysis attempts before an entry is permanently failed.
    /// The canonical retry policy: after attempt N fails, the next retry is
    /// scheduled 2^(N-1) minutes out.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-document processing bound covering extract + score.
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    /// Entries stuck in `processing` longer than this are reclaimed
    /// (crashed worker).
    #[serde(default = "default_stale_claim_timeout_secs")]
    pub stale_claim_timeout_secs: u64,
    /// Queued entries age up one priority level per this many seconds of
    /// waiting, so high-priority floods cannot starve old work.
    #[serde(default = "default_priority_age_interval_secs")]
    pub priority_age_interval_secs: i64,
    /// Worker pool size.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Idle worker poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Thumbnail bounding box (square), pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            sync_extraction_limit: default_sync_extraction_limit(),
            word_confidence_threshold: default_word_confidence_threshold(),
            review_threshold: default_review_threshold(),
            max_attempts: default_max_attempts(),
            processing_timeout_secs: default_processing_timeout_secs(),
            stale_claim_timeout_secs: default_stale_claim_timeout_secs(),
            priority_age_interval_secs: default_priority_age_interval_secs(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// anything the file omits.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

/// A suspicious-text pattern: regex plus the severity and confidence the
/// text detector assigns to a hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPattern {
    pub pattern: String,
    pub severity: IssueSeverity,
    pub confidence: f32,
    pub description: String,
}

/// A known-fraud pattern: regex plus a fixed match confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudPattern {
    pub pattern: String,
    pub confidence: f32,
    pub description: String,
}

/// Expected shape of a document category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTemplate {
    pub category: DocumentCategory,
    /// Semantic elements that must appear somewhere in the OCR text.
    #[serde(default)]
    pub required_elements: Vec<String>,
    /// At least one of these must appear (empty = no such requirement).
    #[serde(default)]
    pub any_of_elements: Vec<String>,
    /// Field keys the category's layout is expected to carry.
    #[serde(default)]
    pub expected_fields: Vec<String>,
}

/// Maintained reference data consumed by the fraud detectors.
///
/// Plain-value fields come first so the TOML rendition stays valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Blacklisted serial numbers, matched case-insensitively.
    #[serde(default)]
    pub blacklisted_serials: Vec<String>,
    /// Recognized issuers per category (`as_str` keys).
    #[serde(default)]
    pub known_issuers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub text_patterns: Vec<TextPattern>,
    #[serde(default)]
    pub fraud_patterns: Vec<FraudPattern>,
    #[serde(default)]
    pub templates: Vec<CategoryTemplate>,
}

impl Default for ReferenceData {
    fn default() -> Self {
        let mut known_issuers = HashMap::new();
        known_issuers.insert(
            DocumentCategory::AuthenticityCertificate.as_str().to_string(),
            vec![
                "Gemological Institute of America".to_string(),
                "International Gemological Institute".to_string(),
                "Professional Coin Grading Service".to_string(),
                "Numismatic Guaranty Company".to_string(),
                "Beckett Authentication Services".to_string(),
                "PSA/DNA".to_string(),
            ],
        );
        known_issuers.insert(
            DocumentCategory::Appraisal.as_str().to_string(),
            vec![
                "American Society of Appraisers".to_string(),
                "Appraisers Association of America".to_string(),
                "International Society of Appraisers".to_string(),
            ],
        );
        known_issuers.insert(
            DocumentCategory::Insurance.as_str().to_string(),
            vec![
                "Lloyd's of London".to_string(),
                "Chubb".to_string(),
                "AXA".to_string(),
            ],
        );

        Self {
            text_patterns: vec![
                TextPattern {
                    pattern: r"(?i)\b(fake|fraud|counterfeit|replica)\b".to_string(),
                    severity: IssueSeverity::Critical,
                    confidence: 0.8,
                    description: "Document text contains a suspicious keyword".to_string(),
                },
                TextPattern {
                    pattern: r"(?i)\b(copy|duplicate|sample)\b".to_string(),
                    severity: IssueSeverity::Medium,
                    confidence: 0.7,
                    description: "Document text suggests a non-original copy".to_string(),
                },
                TextPattern {
                    pattern: r"(?i)\b(temporary|draft|not\s+valid)\b".to_string(),
                    severity: IssueSeverity::High,
                    confidence: 0.8,
                    description: "Document text marks the document as non-final".to_string(),
                },
            ],
            fraud_patterns: vec![
                FraudPattern {
                    pattern: r"(?i)fake.*certificate".to_string(),
                    confidence: 0.9,
                    description: "Fabricated certificate language".to_string(),
                },
                FraudPattern {
                    pattern: r"(?i)counterfeit.*authentic".to_string(),
                    confidence: 0.95,
                    description: "Counterfeit claiming authenticity".to_string(),
                },
                FraudPattern {
                    pattern: r"(?i)\bspecimen\b".to_string(),
                    confidence: 0.8,
                    description: "Specimen/demo document language".to_string(),
                },
                FraudPattern {
                    pattern: r"(?i)not\s+an?\s+official".to_string(),
                    confidence: 0.85,
                    description: "Self-declared unofficial document".to_string(),
                },
            ],
            templates: vec![
                CategoryTemplate {
                    category: DocumentCategory::AuthenticityCertificate,
                    required_elements: vec![
                        "certificate".to_string(),
                        "authentic".to_string(),
                        "issued".to_string(),
                        "date".to_string(),
                    ],
                    any_of_elements: Vec::new(),
                    expected_fields: vec![
                        "serial_number".to_string(),
                        "issuer".to_string(),
                        "issue_date".to_string(),
                    ],
                },
                CategoryTemplate {
                    category: DocumentCategory::Appraisal,
                    required_elements: vec![
                        "appraisal".to_string(),
                        "value".to_string(),
                        "appraiser".to_string(),
                        "date".to_string(),
                    ],
                    any_of_elements: Vec::new(),
                    expected_fields: vec![
                        "appraiser".to_string(),
                        "market_value".to_string(),
                        "issue_date".to_string(),
                    ],
                },
                CategoryTemplate {
                    category: DocumentCategory::NftCertificate,
                    required_elements: Vec::new(),
                    any_of_elements: vec![
                        "blockchain".to_string(),
                        "nft".to_string(),
                        "token".to_string(),
                        "ethereum".to_string(),
                        "polygon".to_string(),
                        "solana".to_string(),
                    ],
                    expected_fields: vec![
                        "token_id".to_string(),
                        "blockchain".to_string(),
                        "issuer".to_string(),
                    ],
                },
                CategoryTemplate {
                    category: DocumentCategory::Insurance,
                    required_elements: vec![
                        "insurance".to_string(),
                        "policy".to_string(),
                        "coverage".to_string(),
                        "date".to_string(),
                    ],
                    any_of_elements: Vec::new(),
                    expected_fields: vec!["issuer".to_string(), "issue_date".to_string()],
                },
            ],
            known_issuers,
            blacklisted_serials: Vec::new(),
        }
    }
}

impl ReferenceData {
    /// Load reference data from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let data = toml::from_str(&raw)?;
        Ok(data)
    }

    pub fn template_for(&self, category: DocumentCategory) -> Option<&CategoryTemplate> {
        self.templates.iter().find(|t| t.category == category)
    }

    pub fn issuers_for(&self, category: DocumentCategory) -> &[String] {
        self.known_issuers
            .get(category.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Admin operation: register an additional known-fraud pattern.
    pub fn add_fraud_pattern(&mut self, pattern: FraudPattern) {
        self.fraud_patterns.push(pattern);
    }

    /// Admin operation: blacklist a serial number. Case-insensitive,
    /// idempotent.
    pub fn add_blacklisted_serial(&mut self, serial: &str) {
        let normalized = serial.trim().to_uppercase();
        if !self
            .blacklisted_serials
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&normalized))
        {
            self.blacklisted_serials.push(normalized);
        }
    }

    /// Admin operation: remove a serial from the blacklist. Returns whether
    /// it was present.
    pub fn remove_blacklisted_serial(&mut self, serial: &str) -> bool {
        let before = self.blacklisted_serials.len();
        self.blacklisted_serials
            .retain(|s| !s.eq_ignore_ascii_case(serial.trim()));
        self.blacklisted_serials.len() != before
    }

    pub fn is_serial_blacklisted(&self, serial: &str) -> bool {
        self.blacklisted_serials
            .iter()
            .any(|s| s.eq_ignore_ascii_case(serial.trim()))
    }
}
