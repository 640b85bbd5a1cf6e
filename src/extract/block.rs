//! Raw extraction blocks and the external OCR capability trait.
//!
//! The pipeline never assumes a specific OCR vendor. Whatever engine is
//! wired in implements [`BlockSource`] and emits flat [`Block`] lists; all
//! structure (lines, tables, form pairs) is reconstructed downstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Region;

/// Kind of a raw extraction block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Line,
    Word,
    Table,
    Cell,
    /// The key half of a form field.
    Key,
    /// The value half of a form field.
    Value,
}

/// One block of recognized content from the OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    pub text: String,
    /// Recognition confidence in [0,1].
    pub confidence: f32,
    #[serde(default)]
    pub region: Option<Region>,
    /// 1-based row index, for cells.
    #[serde(default)]
    pub row: Option<usize>,
    /// 1-based column index, for cells.
    #[serde(default)]
    pub column: Option<usize>,
    /// Owning table block id, for cells.
    #[serde(default)]
    pub table_id: Option<String>,
    /// Linked value block ids, for key blocks.
    #[serde(default)]
    pub value_ids: Vec<String>,
}

impl Block {
    fn bare(kind: BlockKind, text: &str, confidence: f32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            text: text.to_string(),
            confidence,
            region: None,
            row: None,
            column: None,
            table_id: None,
            value_ids: Vec::new(),
        }
    }

    pub fn line(text: &str, confidence: f32) -> Self {
        Self::bare(BlockKind::Line, text, confidence)
    }

    pub fn word(text: &str, confidence: f32, region: Region) -> Self {
        let mut block = Self::bare(BlockKind::Word, text, confidence);
        block.region = Some(region);
        block
    }

    pub fn table(id: &str, confidence: f32) -> Self {
        let mut block = Self::bare(BlockKind::Table, "", confidence);
        block.id = id.to_string();
        block
    }

    pub fn cell(table_id: &str, row: usize, column: usize, text: &str, confidence: f32) -> Self {
        let mut block = Self::bare(BlockKind::Cell, text, confidence);
        block.table_id = Some(table_id.to_string());
        block.row = Some(row);
        block.column = Some(column);
        block
    }

    /// A key block linked to an already-created value block.
    pub fn key(text: &str, confidence: f32, value_id: &str) -> Self {
        let mut block = Self::bare(BlockKind::Key, text, confidence);
        block.value_ids = vec![value_id.to_string()];
        block
    }

    pub fn value(id: &str, text: &str, confidence: f32) -> Self {
        let mut block = Self::bare(BlockKind::Value, text, confidence);
        block.id = id.to_string();
        block
    }
}

/// Errors from the external extraction capability.
#[derive(Debug, Error)]
pub enum BlockSourceError {
    #[error("extraction backend not available: {0}")]
    Unavailable(String),

    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External text/structure extraction capability (the OCR vendor).
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Extract raw blocks from document bytes.
    async fn extract_blocks(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError>;

    /// Whether the source can take payloads above the synchronous size
    /// limit (store externally, start a job, poll to completion). Sources
    /// without that path cause oversized payloads to be rejected upstream.
    fn supports_large_payloads(&self) -> bool {
        false
    }
}
