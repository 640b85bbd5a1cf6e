//! Document extraction: OCR delegation and block post-processing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ingest::SUPPORTED_TYPES;
use crate::models::{DocumentCategory, ExtractionResult, KeyValuePair, Table, WordBox};

use super::block::{Block, BlockKind, BlockSource};
use super::fields::FieldExtractor;

/// Errors the extractor returns to the caller. Vendor-side failures are
/// captured into the result's error field instead so the pipeline can still
/// record a partial outcome.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error(
        "payload of {size} bytes exceeds the synchronous limit of {limit} bytes \
         and the block source has no asynchronous path"
    )]
    PayloadTooLarge { size: u64, limit: u64 },
}

/// Extraction tunables, typically sourced from `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Bound on the external extraction call.
    pub timeout: Duration,
    /// Words below this recognition confidence are dropped.
    pub word_confidence_threshold: f32,
    /// Payloads above this require the asynchronous vendor path.
    pub sync_size_limit: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            word_confidence_threshold: 0.80,
            sync_size_limit: crate::config::DEFAULT_SYNC_EXTRACTION_LIMIT,
        }
    }
}

/// Wraps the external block source and normalizes its output.
pub struct DocumentExtractor {
    source: Arc<dyn BlockSource>,
    options: ExtractOptions,
    fields: FieldExtractor,
}

impl DocumentExtractor {
    pub fn new(source: Arc<dyn BlockSource>, options: ExtractOptions) -> Self {
        Self {
            source,
            options,
            fields: FieldExtractor::new(),
        }
    }

    /// Run extraction for a document.
    ///
    /// Fails fast on unsupported formats, oversized payloads and timeouts;
    /// any other vendor failure is recorded in the returned result's error
    /// field.
    pub async fn analyze(
        &self,
        document_id: &str,
        bytes: &[u8],
        mime_type: &str,
        category: DocumentCategory,
    ) -> Result<ExtractionResult, ExtractError> {
        if !SUPPORTED_TYPES.contains(&mime_type) {
            return Err(ExtractError::UnsupportedFormat(mime_type.to_string()));
        }

        let size = bytes.len() as u64;
        if size > self.options.sync_size_limit && !self.source.supports_large_payloads() {
            return Err(ExtractError::PayloadTooLarge {
                size,
                limit: self.options.sync_size_limit,
            });
        }

        let start = Instant::now();
        let extraction = tokio::time::timeout(
            self.options.timeout,
            self.source.extract_blocks(bytes, mime_type),
        )
        .await
        .map_err(|_| ExtractError::Timeout(self.options.timeout))?;

        let duration_ms = start.elapsed().as_millis() as u64;

        let blocks = match extraction {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(document_id, error = %e, "block extraction failed");
                return Ok(ExtractionResult::failed(
                    document_id.to_string(),
                    e.to_string(),
                    duration_ms,
                ));
            }
        };

        debug!(document_id, blocks = blocks.len(), "post-processing blocks");
        Ok(self.post_process(document_id, category, blocks, duration_ms))
    }

    fn post_process(
        &self,
        document_id: &str,
        category: DocumentCategory,
        blocks: Vec<Block>,
        duration_ms: u64,
    ) -> ExtractionResult {
        let text = concatenate_text(&blocks);
        let words = collect_words(&blocks, self.options.word_confidence_threshold);
        let tables = reconstruct_tables(&blocks);
        let key_values = pair_form_fields(&blocks);
        let confidence = mean_confidence(&blocks);
        let fields = self.fields.extract(category, &text);

        ExtractionResult {
            document_id: document_id.to_string(),
            text,
            key_values,
            tables,
            words,
            fields,
            confidence,
            duration_ms,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Concatenated line text; falls back to space-joined words when the source
/// emits no line blocks.
fn concatenate_text(blocks: &[Block]) -> String {
    let lines: Vec<&str> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Line)
        .map(|b| b.text.as_str())
        .collect();

    if !lines.is_empty() {
        return lines.join("\n");
    }

    blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Word)
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_words(blocks: &[Block], threshold: f32) -> Vec<WordBox> {
    blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Word && b.confidence >= threshold)
        .map(|b| WordBox {
            text: b.text.clone(),
            confidence: b.confidence,
            region: b.region.unwrap_or_default(),
        })
        .collect()
}

/// Group cells under their table block and lay them out as a dense grid,
/// filling gaps with empty strings.
fn reconstruct_tables(blocks: &[Block]) -> Vec<Table> {
    let mut tables = Vec::new();

    for table_block in blocks.iter().filter(|b| b.kind == BlockKind::Table) {
        let cells: Vec<&Block> = blocks
            .iter()
            .filter(|b| {
                b.kind == BlockKind::Cell && b.table_id.as_deref() == Some(table_block.id.as_str())
            })
            .collect();

        let max_row = cells.iter().filter_map(|c| c.row).max().unwrap_or(0);
        let max_col = cells.iter().filter_map(|c| c.column).max().unwrap_or(0);
        if max_row == 0 || max_col == 0 {
            continue;
        }

        let mut rows = vec![vec![String::new(); max_col]; max_row];
        let mut confidence_sum = 0.0;
        let mut counted = 0u32;
        for cell in &cells {
            if let (Some(row @ 1..), Some(col @ 1..)) = (cell.row, cell.column) {
                rows[row - 1][col - 1] = cell.text.trim().to_string();
                confidence_sum += cell.confidence;
                counted += 1;
            }
        }

        tables.push(Table {
            rows,
            confidence: if counted > 0 {
                confidence_sum / counted as f32
            } else {
                0.0
            },
            region: table_block.region,
        });
    }

    tables
}

/// Pair KEY blocks to their linked VALUE blocks, trimming whitespace.
fn pair_form_fields(blocks: &[Block]) -> Vec<KeyValuePair> {
    let mut pairs = Vec::new();

    for key_block in blocks.iter().filter(|b| b.kind == BlockKind::Key) {
        let mut value_text = Vec::new();
        let mut confidence = key_block.confidence;

        for value_id in &key_block.value_ids {
            if let Some(value_block) = blocks
                .iter()
                .find(|b| b.kind == BlockKind::Value && &b.id == value_id)
            {
                value_text.push(value_block.text.trim().to_string());
                confidence = confidence.min(value_block.confidence);
            }
        }

        pairs.push(KeyValuePair {
            key: key_block.text.trim().to_string(),
            value: value_text.join(" ").trim().to_string(),
            confidence,
        });
    }

    pairs
}

fn mean_confidence(blocks: &[Block]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    blocks.iter().map(|b| b.confidence).sum::<f32>() / blocks.len() as f32
}
