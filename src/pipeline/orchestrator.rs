//! The pipeline facade: ingestion, analysis execution, retry policy and
//! operational queries.
//!
//! All collaborators are injected at construction; the orchestrator owns no
//! global state. Workers drive it through `claim_next`/`process_claimed`,
//! callers through `ingest`, `reanalyze`, `batch_analyze` and the read-only
//! queries.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{FraudPattern, PipelineConfig, ReferenceData};
use crate::extract::{BlockSource, DocumentExtractor, ExtractOptions};
use crate::fraud::FraudScorer;
use crate::ingest::{thumbnail, FileValidator};
use crate::models::{
    priority, Document, DocumentCategory, DocumentStatus, ExtractionResult, FraudAssessment,
    QueueEntry, QueueStatus,
};
use crate::repository::{DocumentRepository, QueueRepository, ResultRepository};
use crate::storage::{mime_to_extension, ObjectStore};

use super::PipelineError;

/// One upload handed to `ingest`.
pub struct IngestRequest<'a> {
    pub bytes: &'a [u8],
    pub declared_mime: &'a str,
    pub filename: &'a str,
    pub submission_id: &'a str,
    pub uploader_id: &'a str,
    pub category: DocumentCategory,
    /// Defaults to normal priority.
    pub priority: Option<i32>,
    /// Free-form metadata stored on the document.
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of processing one claimed queue entry. Failures are recorded
/// state, not errors; a worker that cannot complete a document still leaves
/// the system consistent.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed {
        document_id: String,
        assessment: FraudAssessment,
    },
    Failed {
        document_id: String,
        attempts: u32,
        error: String,
        retrying: bool,
        next_retry_at: Option<DateTime<Utc>>,
    },
}

/// Caller-facing status of a document.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: DocumentStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Both result records for a completed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResults {
    pub extraction: ExtractionResult,
    pub assessment: FraudAssessment,
}

/// One failed member of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub document_id: String,
    pub error: String,
}

/// Settled outcome of `batch_analyze`: every member reported individually.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub processed: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

/// Aggregate counts for operational dashboards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatistics {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub requiring_manual_review: u64,
}

/// Documents moved by a maintenance sweep.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Failed entries whose retry time arrived.
    pub requeued: Vec<String>,
    /// Processing entries reclaimed from a dead worker.
    pub reclaimed: Vec<String>,
}

/// The document verification pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    reference: RwLock<ReferenceData>,
    store: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentRepository>,
    results: Arc<dyn ResultRepository>,
    queue: Arc<dyn QueueRepository>,
    extractor: DocumentExtractor,
    scorer: FraudScorer,
    validator: FileValidator,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        reference: ReferenceData,
        store: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentRepository>,
        results: Arc<dyn ResultRepository>,
        queue: Arc<dyn QueueRepository>,
        block_source: Arc<dyn BlockSource>,
    ) -> Self {
        let options = ExtractOptions {
            timeout: Duration::from_secs(config.processing_timeout_secs),
            word_confidence_threshold: config.word_confidence_threshold,
            sync_size_limit: config.sync_extraction_limit,
        };
        let extractor = DocumentExtractor::new(block_source, options);
        let scorer = FraudScorer::new(config.review_threshold);
        let validator = FileValidator::new(config.max_file_size);

        Self {
            config,
            reference: RwLock::new(reference),
            store,
            documents,
            results,
            queue,
            extractor,
            scorer,
            validator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate an upload, persist it and queue it for analysis.
    ///
    /// Validation errors are returned synchronously and nothing is queued.
    pub async fn ingest(&self, request: IngestRequest<'_>) -> Result<Document, PipelineError> {
        let validation = self.validator.validate(request.bytes, request.declared_mime);
        if !validation.is_valid {
            return Err(PipelineError::Validation {
                errors: validation.errors,
            });
        }
        let info = validation.info;

        let locator = self
            .store
            .put(request.bytes, mime_to_extension(&info.detected_type))
            .await?;

        let mut document = Document::new(
            request.submission_id.to_string(),
            request.uploader_id.to_string(),
            request.category,
            request.filename.to_string(),
            locator,
            info.size,
            info.detected_type.clone(),
            info.checksum,
            request.priority.unwrap_or(priority::NORMAL),
            request.metadata.unwrap_or_else(|| serde_json::json!({})),
        );

        // Thumbnails are best-effort; a failure never blocks ingestion.
        if thumbnail::supports(&info.detected_type) {
            match thumbnail::render(request.bytes, self.config.thumbnail_size) {
                Ok(thumb) => match self.store.put(&thumb, "png").await {
                    Ok(thumb_locator) => document.thumbnail_locator = Some(thumb_locator),
                    Err(e) => warn!(document_id = %document.id, error = %e, "storing thumbnail failed"),
                },
                Err(e) => warn!(document_id = %document.id, error = %e, "thumbnail render failed"),
            }
        }

        self.documents.save(&document).await?;

        let entry = QueueEntry::new(document.id.clone(), document.priority);
        self.queue.enqueue(&entry).await?;

        info!(
            document_id = %document.id,
            category = document.category.as_str(),
            size = document.size,
            priority = document.priority,
            "document ingested and queued"
        );
        Ok(document)
    }

    /// Queue an existing document for analysis at the given priority.
    pub async fn enqueue(
        &self,
        document_id: &str,
        priority: i32,
    ) -> Result<QueueEntry, PipelineError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;

        let entry = QueueEntry::new(document_id.to_string(), priority);
        self.queue.enqueue(&entry).await?;
        Ok(entry)
    }

    /// Claim the best queued entry for this worker, if any.
    pub async fn claim_next(&self, node_id: &str) -> Result<Option<QueueEntry>, PipelineError> {
        Ok(self
            .queue
            .claim_next(
                node_id,
                Utc::now(),
                self.config.priority_age_interval_secs,
                priority::URGENT,
            )
            .await?)
    }

    /// Claim and process one entry end-to-end. Convenience for workers and
    /// tests.
    pub async fn process_next(
        &self,
        node_id: &str,
    ) -> Result<Option<ProcessOutcome>, PipelineError> {
        match self.claim_next(node_id).await? {
            Some(entry) => Ok(Some(self.process_claimed(entry).await)),
            None => Ok(None),
        }
    }

    /// Run extract -> score -> persist for a claimed entry, bounded by the
    /// processing timeout. Every failure lands in the entry and the retry
    /// state machine; nothing propagates out of the worker.
    pub async fn process_claimed(&self, entry: QueueEntry) -> ProcessOutcome {
        let timeout = Duration::from_secs(self.config.processing_timeout_secs);
        let result = match tokio::time::timeout(timeout, self.run_analysis(&entry.document_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(timeout)),
        };

        match result {
            Ok(assessment) => match self.complete(entry, assessment).await {
                Ok(outcome) => outcome,
                Err((entry, error)) => self.fail(entry, error).await,
            },
            Err(e) => self.fail(entry, e.to_string()).await,
        }
    }

    /// The analysis itself: extraction is always persisted before the
    /// assessment is attempted.
    async fn run_analysis(&self, document_id: &str) -> Result<FraudAssessment, PipelineError> {
        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;

        self.documents
            .set_status(document_id, DocumentStatus::Processing)
            .await?;

        let bytes = self.store.get(&document.storage_locator).await?;

        let extraction = self
            .extractor
            .analyze(document_id, &bytes, &document.mime_type, document.category)
            .await?;
        self.results.save_extraction(&extraction).await?;

        if let Some(error) = extraction.error.clone() {
            return Err(PipelineError::ExtractionFailed(error));
        }

        let assessment = {
            let reference = self
                .reference
                .read()
                .expect("reference data lock poisoned");
            self.scorer.assess(
                &extraction,
                &bytes,
                &document.mime_type,
                document.category,
                &reference,
            )?
        };
        self.results.save_assessment(&assessment).await?;

        Ok(assessment)
    }

    async fn complete(
        &self,
        mut entry: QueueEntry,
        assessment: FraudAssessment,
    ) -> Result<ProcessOutcome, (QueueEntry, String)> {
        let document_id = entry.document_id.clone();

        entry.status = QueueStatus::Completed;
        entry.completed_at = Some(Utc::now());
        entry.next_retry_at = None;

        let persisted = async {
            self.documents
                .set_status(&document_id, DocumentStatus::Completed)
                .await?;
            self.queue.update(&entry).await
        }
        .await;

        if let Err(e) = persisted {
            return Err((entry, format!("persisting completion failed: {e}")));
        }

        info!(
            document_id = %document_id,
            fraud_score = assessment.fraud_score,
            risk_tier = assessment.risk_tier.as_str(),
            manual_review = assessment.manual_review_required,
            "analysis completed"
        );
        Ok(ProcessOutcome::Completed {
            document_id,
            assessment,
        })
    }

    /// Record a failed attempt: increment attempts, schedule the retry with
    /// exponential backoff, or park the entry permanently after the last
    /// allowed attempt.
    async fn fail(&self, mut entry: QueueEntry, error: String) -> ProcessOutcome {
        let document_id = entry.document_id.clone();

        entry.attempts += 1;
        entry.last_error = Some(error.clone());
        entry.status = QueueStatus::Failed;

        let retrying = entry.attempts < self.config.max_attempts;
        entry.next_retry_at = if retrying {
            Some(Utc::now() + backoff_delay(entry.attempts))
        } else {
            None
        };

        if let Err(e) = self
            .documents
            .set_status(&document_id, DocumentStatus::Failed)
            .await
        {
            warn!(document_id = %document_id, error = %e, "marking document failed errored");
        }
        if let Err(e) = self.queue.update(&entry).await {
            warn!(document_id = %document_id, error = %e, "persisting failed entry errored");
        }

        warn!(
            document_id = %document_id,
            attempts = entry.attempts,
            retrying,
            error = %error,
            "analysis attempt failed"
        );
        ProcessOutcome::Failed {
            document_id,
            attempts: entry.attempts,
            error,
            retrying,
            next_retry_at: entry.next_retry_at,
        }
    }

    /// Manual retry: drop prior results, reset the document and re-queue it
    /// with elevated priority. A straggling in-flight attempt is not
    /// cancelled; its results are simply superseded.
    pub async fn reanalyze(&self, document_id: &str) -> Result<(), PipelineError> {
        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;

        self.results.delete_for(document_id).await?;
        self.documents
            .set_status(document_id, DocumentStatus::Pending)
            .await?;

        let elevated = (document.priority + 5).min(priority::URGENT.max(document.priority));
        self.enqueue(document_id, elevated).await?;

        info!(document_id, priority = elevated, "document queued for re-analysis");
        Ok(())
    }

    /// Re-analyze a set of documents concurrently. Every member settles
    /// independently; one failure never aborts the batch.
    pub async fn batch_analyze(&self, document_ids: &[String]) -> BatchOutcome {
        let runs = document_ids.iter().map(|id| async move {
            let result = self.analyze_now(id).await;
            (id.clone(), result)
        });

        let mut outcome = BatchOutcome::default();
        for (document_id, result) in futures::future::join_all(runs).await {
            match result {
                Ok(_) => outcome.processed.push(document_id),
                Err(e) => outcome.failed.push(BatchFailure {
                    document_id,
                    error: e.to_string(),
                }),
            }
        }
        outcome
    }

    /// Immediate single-document analysis, bypassing the queue (used by
    /// batch re-analysis). Prior results are superseded.
    async fn analyze_now(&self, document_id: &str) -> Result<FraudAssessment, PipelineError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;

        self.results.delete_for(document_id).await?;

        match self.run_analysis(document_id).await {
            Ok(assessment) => {
                self.documents
                    .set_status(document_id, DocumentStatus::Completed)
                    .await?;
                Ok(assessment)
            }
            Err(e) => {
                let _ = self
                    .documents
                    .set_status(document_id, DocumentStatus::Failed)
                    .await;
                Err(e)
            }
        }
    }

    pub async fn get_status(&self, document_id: &str) -> Result<StatusReport, PipelineError> {
        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;
        let entry = self.queue.get_by_document(document_id).await?;

        Ok(StatusReport {
            status: document.status,
            attempts: entry.as_ref().map(|e| e.attempts).unwrap_or(0),
            last_error: entry.as_ref().and_then(|e| e.last_error.clone()),
            next_retry_at: entry.and_then(|e| e.next_retry_at),
        })
    }

    pub async fn get_results(
        &self,
        document_id: &str,
    ) -> Result<AnalysisResults, PipelineError> {
        let extraction = self
            .results
            .get_extraction(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("results for {document_id}")))?;
        let assessment = self
            .results
            .get_assessment(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("results for {document_id}")))?;
        Ok(AnalysisResults {
            extraction,
            assessment,
        })
    }

    /// All queue entries, for operational visibility.
    pub async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>, PipelineError> {
        Ok(self.queue.snapshot().await?)
    }

    pub async fn statistics(&self) -> Result<PipelineStatistics, PipelineError> {
        let counts = self.documents.count_by_status().await?;
        let get = |status: DocumentStatus| counts.get(&status).copied().unwrap_or(0);

        Ok(PipelineStatistics {
            total: counts.values().sum(),
            pending: get(DocumentStatus::Pending),
            processing: get(DocumentStatus::Processing),
            completed: get(DocumentStatus::Completed),
            failed: get(DocumentStatus::Failed),
            requiring_manual_review: self.results.count_requiring_review().await?,
        })
    }

    /// Maintenance sweep: promote due retries and reclaim entries whose
    /// worker died mid-processing.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, PipelineError> {
        let now = Utc::now();

        let requeued = self.queue.requeue_due(now).await?;
        for document_id in &requeued {
            let _ = self
                .documents
                .set_status(document_id, DocumentStatus::Pending)
                .await;
        }

        let cutoff = now - chrono::Duration::seconds(self.config.stale_claim_timeout_secs as i64);
        let reclaimed = self.queue.reclaim_stale(cutoff).await?;
        for document_id in &reclaimed {
            warn!(document_id = %document_id, "reclaimed entry from unresponsive worker");
            let _ = self
                .documents
                .set_status(document_id, DocumentStatus::Pending)
                .await;
        }

        Ok(MaintenanceReport {
            requeued,
            reclaimed,
        })
    }

    /// Admin: register an additional known-fraud pattern.
    pub fn add_fraud_pattern(&self, pattern: FraudPattern) {
        self.reference
            .write()
            .expect("reference data lock poisoned")
            .add_fraud_pattern(pattern);
    }

    /// Admin: blacklist a serial number.
    pub fn add_blacklisted_serial(&self, serial: &str) {
        self.reference
            .write()
            .expect("reference data lock poisoned")
            .add_blacklisted_serial(serial);
    }

    /// Admin: remove a serial from the blacklist.
    pub fn remove_blacklisted_serial(&self, serial: &str) -> bool {
        self.reference
            .write()
            .expect("reference data lock poisoned")
            .remove_blacklisted_serial(serial)
    }

    /// Current reference tables (cloned), for operational inspection.
    pub fn reference_snapshot(&self) -> ReferenceData {
        self.reference
            .read()
            .expect("reference data lock poisoned")
            .clone()
    }
}

/// Exponential backoff: the Nth failed attempt schedules the next try
/// 2^(N-1) minutes out.
fn backoff_delay(attempts: u32) -> chrono::Duration {
    let attempts = attempts.max(1).min(16);
    chrono::Duration::minutes(1i64 << (attempts - 1))
}
