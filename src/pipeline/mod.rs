//! Pipeline orchestration: document lifecycle, scheduling, retries and the
//! supervised worker pool.

mod orchestrator;
mod worker;

use thiserror::Error;

use crate::extract::ExtractError;
use crate::fraud::AssessError;
use crate::repository::RepositoryError;
use crate::storage::StorageError;

pub use orchestrator::{
    AnalysisResults, BatchFailure, BatchOutcome, IngestRequest, MaintenanceReport, Pipeline,
    PipelineStatistics, ProcessOutcome, StatusReport,
};
pub use worker::{PipelineEvent, WorkerPool, WorkerPoolHandle};

/// Top-level pipeline error taxonomy.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad upload; returned synchronously at ingestion, never queued.
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The external extractor reported a failure (captured in the
    /// extraction result before this is raised).
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Assess(#[from] AssessError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("processing timed out after {0:?}")]
    Timeout(std::time::Duration),
}
