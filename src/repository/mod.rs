//! Persistence traits for pipeline state.
//!
//! The relational store itself is an external collaborator; the pipeline
//! talks to it through these traits. The in-memory implementations in
//! [`memory`] are the single-process reference backend and the test
//! fixtures.

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Document, DocumentStatus, ExtractionResult, FraudAssessment, QueueEntry};

pub use memory::{MemoryDocumentRepository, MemoryQueueRepository, MemoryResultRepository};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional transition lost a race (e.g. two workers claiming the
    /// same queue entry). Exactly one caller wins; everyone else sees this.
    #[error("claim conflict: {0}")]
    ClaimConflict(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Persistence for documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn save(&self, document: &Document) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Update a document's analysis status, bumping `updated_at`.
    async fn set_status(&self, id: &str, status: DocumentStatus) -> Result<()>;

    /// Counts by status for the statistics endpoint.
    async fn count_by_status(&self) -> Result<HashMap<DocumentStatus, u64>>;
}

/// Persistence for extraction results and fraud assessments.
///
/// Results are immutable once written; re-analysis deletes and recreates
/// the pair for a document.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn save_extraction(&self, result: &ExtractionResult) -> Result<()>;

    async fn save_assessment(&self, assessment: &FraudAssessment) -> Result<()>;

    async fn get_extraction(&self, document_id: &str) -> Result<Option<ExtractionResult>>;

    async fn get_assessment(&self, document_id: &str) -> Result<Option<FraudAssessment>>;

    /// Delete both result records for a document (re-analysis reset).
    async fn delete_for(&self, document_id: &str) -> Result<()>;

    /// Number of stored assessments flagged for manual review.
    async fn count_requiring_review(&self) -> Result<u64>;
}

/// Persistence and scheduling for queue entries.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()>;

    async fn get(&self, entry_id: &str) -> Result<Option<QueueEntry>>;

    async fn get_by_document(&self, document_id: &str) -> Result<Option<QueueEntry>>;

    /// Atomically claim the best queued entry: highest effective priority
    /// first (see [`QueueEntry::effective_priority`]), FIFO within equal
    /// priority. Returns `None` when nothing is queued.
    ///
    /// The transition queued -> processing must succeed for exactly one
    /// concurrent caller per entry.
    async fn claim_next(
        &self,
        node_id: &str,
        now: DateTime<Utc>,
        age_interval_secs: i64,
        priority_ceiling: i32,
    ) -> Result<Option<QueueEntry>>;

    /// Atomically claim a specific entry. Fails with
    /// [`RepositoryError::ClaimConflict`] unless the entry is queued.
    async fn claim(&self, entry_id: &str, node_id: &str) -> Result<QueueEntry>;

    /// Persist the new state of an entry (complete/fail transitions).
    async fn update(&self, entry: &QueueEntry) -> Result<()>;

    /// Move failed entries whose `next_retry_at` has passed back to queued.
    /// Returns the affected document ids.
    async fn requeue_due(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Requeue entries stuck in `processing` since before `cutoff`
    /// (crashed worker reclaim). Returns the affected document ids.
    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// All entries, for operational visibility.
    async fn snapshot(&self) -> Result<Vec<QueueEntry>>;
}
