//! End-to-end pipeline tests over scripted block sources and the in-memory
//! backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use veridoc::config::{PipelineConfig, ReferenceData};
use veridoc::extract::{Block, BlockSource, BlockSourceError};
use veridoc::models::{priority, DocumentCategory, DocumentStatus, QueueStatus};
use veridoc::pipeline::{
    IngestRequest, Pipeline, PipelineError, PipelineEvent, ProcessOutcome, WorkerPool,
};
use veridoc::repository::{
    MemoryDocumentRepository, MemoryQueueRepository, MemoryResultRepository, QueueRepository,
    ResultRepository,
};
use veridoc::storage::MemoryObjectStore;

/// Block source that reads the document bytes as plain text lines.
struct TextSource;

fn text_blocks(bytes: &[u8]) -> Vec<Block> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("%PDF"))
        .map(|line| Block::line(line.trim(), 0.9))
        .collect()
}

#[async_trait]
impl BlockSource for TextSource {
    async fn extract_blocks(
        &self,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError> {
        Ok(text_blocks(bytes))
    }
}

/// Fails a fixed number of calls, then behaves like `TextSource`.
struct FlakySource {
    failures_remaining: AtomicUsize,
}

#[async_trait]
impl BlockSource for FlakySource {
    async fn extract_blocks(
        &self,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BlockSourceError::Failed("transient ocr failure".into()));
        }
        Ok(text_blocks(bytes))
    }
}

/// Fails only for documents whose text contains "BOOM".
struct MarkerSource;

#[async_trait]
impl BlockSource for MarkerSource {
    async fn extract_blocks(
        &self,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError> {
        if String::from_utf8_lossy(bytes).contains("BOOM") {
            return Err(BlockSourceError::Failed("engine crashed".into()));
        }
        Ok(text_blocks(bytes))
    }
}

/// Never returns within any reasonable processing bound.
struct StalledSource;

#[async_trait]
impl BlockSource for StalledSource {
    async fn extract_blocks(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
    ) -> Result<Vec<Block>, BlockSourceError> {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(Vec::new())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    queue: Arc<MemoryQueueRepository>,
    results: Arc<MemoryResultRepository>,
}

fn harness(source: Arc<dyn BlockSource>, config: PipelineConfig) -> Harness {
    let queue = Arc::new(MemoryQueueRepository::new());
    let results = Arc::new(MemoryResultRepository::new());
    let pipeline = Arc::new(Pipeline::new(
        config,
        ReferenceData::default(),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(MemoryDocumentRepository::new()),
        results.clone(),
        queue.clone(),
        source,
    ));
    Harness {
        pipeline,
        queue,
        results,
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        workers: 2,
        poll_interval_ms: 10,
        ..Default::default()
    }
}

fn pdf_bytes(text: &str) -> Vec<u8> {
    format!("%PDF-1.4\n{text}").into_bytes()
}

const CLEAN_APPRAISAL: &str = "APPRAISAL REPORT\n\
Appraiser: Jordan Michaels\n\
Market Value: $12,500.00\n\
Date of Issue: 2024-03-15\n\
This appraisal records the fair market value of the item.";

async fn ingest(
    harness: &Harness,
    bytes: &[u8],
    category: DocumentCategory,
) -> Result<String, PipelineError> {
    harness
        .pipeline
        .ingest(IngestRequest {
            bytes,
            declared_mime: "application/pdf",
            filename: "upload.pdf",
            submission_id: "sub-1",
            uploader_id: "user-1",
            category,
            priority: None,
            metadata: None,
        })
        .await
        .map(|d| d.id)
}

#[tokio::test]
async fn clean_appraisal_completes_with_low_risk() {
    let h = harness(Arc::new(TextSource), test_config());
    let doc_id = ingest(&h, &pdf_bytes(CLEAN_APPRAISAL), DocumentCategory::Appraisal)
        .await
        .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Completed { assessment, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert!(assessment.fraud_score < 0.05);
    assert!(!assessment.manual_review_required);

    let status = h.pipeline.get_status(&doc_id).await.unwrap();
    assert_eq!(status.status, DocumentStatus::Completed);
    assert_eq!(status.attempts, 0);

    let results = h.pipeline.get_results(&doc_id).await.unwrap();
    assert_eq!(
        results.extraction.fields.appraiser.as_deref(),
        Some("Jordan Michaels")
    );
    assert!(results
        .assessment
        .review_notes
        .contains("Document appears legitimate."));

    let stats = h.pipeline.statistics().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.requiring_manual_review, 0);
}

#[tokio::test]
async fn validation_errors_are_synchronous_and_nothing_is_queued() {
    let mut config = test_config();
    config.max_file_size = 16;
    let h = harness(Arc::new(TextSource), config);

    let err = ingest(
        &h,
        &pdf_bytes("this payload is longer than sixteen bytes"),
        DocumentCategory::Other,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));

    // GIF sniffs fine but is unsupported.
    let err = h
        .pipeline
        .ingest(IngestRequest {
            bytes: b"GIF89a\x01\x00",
            declared_mime: "image/gif",
            filename: "a.gif",
            submission_id: "s",
            uploader_id: "u",
            category: DocumentCategory::Photo,
            priority: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));

    assert!(h.pipeline.queue_snapshot().await.unwrap().is_empty());
    assert_eq!(h.pipeline.statistics().await.unwrap().total, 0);
}

#[tokio::test]
async fn tampered_pdf_is_flagged_end_to_end() {
    let h = harness(Arc::new(TextSource), test_config());
    // Declared as PDF but the bytes carry no PDF magic: validation lets it
    // through (unrecognized magic + supported declared type) and the
    // metadata detector does the flagging.
    let doc_id = ingest(
        &h,
        b"JUNKHEADER\nCertificate text without tampering keywords",
        DocumentCategory::Other,
    )
    .await
    .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Completed { assessment, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert!(assessment.tampering_detected);
    assert_eq!(assessment.metadata.consistency, 0.0);
    assert!(assessment
        .issues
        .iter()
        .any(|i| i.category == "metadata_tampering"));
    assert!(assessment.manual_review_required);

    let stats = h.pipeline.statistics().await.unwrap();
    assert_eq!(stats.requiring_manual_review, 1);
    let _ = doc_id;
}

#[tokio::test]
async fn counterfeit_text_reaches_critical_tier() {
    let h = harness(Arc::new(TextSource), test_config());
    let doc_id = ingest(
        &h,
        &pdf_bytes("COUNTERFEIT AUTHENTIC CERTIFICATE"),
        DocumentCategory::Other,
    )
    .await
    .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Completed { assessment, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert_eq!(assessment.fraud_score, 0.837);
    assert_eq!(assessment.risk_tier.as_str(), "critical");
    assert!(assessment
        .issues
        .iter()
        .any(|i| i.category == "known_fraud_pattern"));

    let results = h.pipeline.get_results(&doc_id).await.unwrap();
    assert!(results.assessment.review_notes.contains("Manual review required."));
}

#[tokio::test]
async fn retries_back_off_exponentially_then_fail_permanently() {
    let h = harness(
        Arc::new(FlakySource {
            failures_remaining: AtomicUsize::new(usize::MAX),
        }),
        test_config(),
    );
    let doc_id = ingest(&h, &pdf_bytes("whatever"), DocumentCategory::Other)
        .await
        .unwrap();

    for attempt in 1..=3u32 {
        let failure_time = Utc::now();
        let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
        let ProcessOutcome::Failed {
            attempts,
            retrying,
            next_retry_at,
            ..
        } = outcome
        else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(attempts, attempt);

        if attempt < 3 {
            assert!(retrying);
            let expected = Duration::minutes(1i64 << (attempt - 1));
            let delta = next_retry_at.unwrap() - failure_time;
            assert!(
                (delta - expected).num_seconds().abs() <= 5,
                "attempt {attempt}: backoff was {delta}"
            );

            // Not due yet: nothing claimable until the retry time passes.
            assert!(h.pipeline.process_next("w1").await.unwrap().is_none());

            // Simulate the clock reaching the retry time.
            let requeued = h
                .queue
                .requeue_due(Utc::now() + expected + Duration::seconds(1))
                .await
                .unwrap();
            assert_eq!(requeued, vec![doc_id.clone()]);
        } else {
            // Attempts exhausted: permanently failed, never auto-requeued.
            assert!(!retrying);
            assert!(next_retry_at.is_none());
        }
    }

    let requeued = h
        .queue
        .requeue_due(Utc::now() + Duration::days(30))
        .await
        .unwrap();
    assert!(requeued.is_empty());

    let status = h.pipeline.get_status(&doc_id).await.unwrap();
    assert_eq!(status.status, DocumentStatus::Failed);
    assert_eq!(status.attempts, 3);
    assert!(status.last_error.unwrap().contains("transient ocr failure"));

    // The failed extraction was still recorded; no orphan assessment exists.
    let extraction = h.results.get_extraction(&doc_id).await.unwrap().unwrap();
    assert!(extraction.error.is_some());
    assert!(h.results.get_assessment(&doc_id).await.unwrap().is_none());
}

#[tokio::test]
async fn flaky_source_recovers_on_retry() {
    let h = harness(
        Arc::new(FlakySource {
            failures_remaining: AtomicUsize::new(1),
        }),
        test_config(),
    );
    let doc_id = ingest(&h, &pdf_bytes(CLEAN_APPRAISAL), DocumentCategory::Appraisal)
        .await
        .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    assert!(matches!(outcome, ProcessOutcome::Failed { retrying: true, .. }));

    h.queue
        .requeue_due(Utc::now() + Duration::minutes(2))
        .await
        .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));

    // The successful extraction superseded the failed one.
    let results = h.pipeline.get_results(&doc_id).await.unwrap();
    assert!(results.extraction.error.is_none());
    assert_eq!(
        h.pipeline.get_status(&doc_id).await.unwrap().status,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn processing_timeout_follows_the_retry_path() {
    let mut config = test_config();
    config.processing_timeout_secs = 1;
    let h = harness(Arc::new(StalledSource), config);
    let doc_id = ingest(&h, &pdf_bytes("text"), DocumentCategory::Other)
        .await
        .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Failed { error, retrying, .. } = outcome else {
        panic!("expected timeout failure, got {outcome:?}");
    };
    assert!(error.contains("timed out"), "{error}");
    assert!(retrying);
    assert_eq!(
        h.pipeline.get_status(&doc_id).await.unwrap().status,
        DocumentStatus::Failed
    );
}

#[tokio::test]
async fn batch_members_settle_independently() {
    let h = harness(Arc::new(MarkerSource), test_config());

    let a = ingest(&h, &pdf_bytes("clean document one"), DocumentCategory::Other)
        .await
        .unwrap();
    let b = ingest(&h, &pdf_bytes("BOOM goes the extractor"), DocumentCategory::Other)
        .await
        .unwrap();
    let c = ingest(&h, &pdf_bytes("clean document two"), DocumentCategory::Other)
        .await
        .unwrap();

    let ids = vec![a.clone(), b.clone(), c.clone(), "missing-doc".to_string()];
    let outcome = h.pipeline.batch_analyze(&ids).await;

    assert_eq!(outcome.processed, vec![a.clone(), c.clone()]);
    assert_eq!(outcome.failed.len(), 2);
    assert!(outcome.failed.iter().any(|f| f.document_id == b));
    assert!(outcome.failed.iter().any(|f| f.document_id == "missing-doc"));

    assert_eq!(
        h.pipeline.get_status(&a).await.unwrap().status,
        DocumentStatus::Completed
    );
    assert_eq!(
        h.pipeline.get_status(&b).await.unwrap().status,
        DocumentStatus::Failed
    );
    assert_eq!(
        h.pipeline.get_status(&c).await.unwrap().status,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn reanalyze_resets_results_and_elevates_priority() {
    let h = harness(Arc::new(TextSource), test_config());
    let doc_id = ingest(&h, &pdf_bytes(CLEAN_APPRAISAL), DocumentCategory::Appraisal)
        .await
        .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));

    h.pipeline.reanalyze(&doc_id).await.unwrap();

    assert_eq!(
        h.pipeline.get_status(&doc_id).await.unwrap().status,
        DocumentStatus::Pending
    );
    assert!(matches!(
        h.pipeline.get_results(&doc_id).await,
        Err(PipelineError::NotFound(_))
    ));

    let entry = h.queue.get_by_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Queued);
    assert_eq!(entry.priority, priority::HIGH);
    assert_eq!(entry.attempts, 0);

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    assert!(h.pipeline.get_results(&doc_id).await.is_ok());
}

#[tokio::test]
async fn blacklisted_serial_flags_after_admin_update() {
    let h = harness(Arc::new(TextSource), test_config());
    h.pipeline.add_blacklisted_serial("SN-STOLEN-77");

    let doc_id = ingest(
        &h,
        &pdf_bytes(
            "Certificate of Authenticity\nauthentic item, issued 2024\n\
             date: 2024-05-01\nSerial Number: SN-STOLEN-77\n\
             Issued by: Gemological Institute of America",
        ),
        DocumentCategory::AuthenticityCertificate,
    )
    .await
    .unwrap();

    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Completed { assessment, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert!(assessment
        .issues
        .iter()
        .any(|i| i.description.contains("blacklisted")));
    assert!(assessment.manual_review_required);

    // Removing the serial clears the signal for the next analysis.
    assert!(h.pipeline.remove_blacklisted_serial("sn-stolen-77"));
    h.pipeline.reanalyze(&doc_id).await.unwrap();
    let outcome = h.pipeline.process_next("w1").await.unwrap().unwrap();
    let ProcessOutcome::Completed { assessment, .. } = outcome else {
        panic!("expected completion");
    };
    assert!(!assessment
        .issues
        .iter()
        .any(|i| i.description.contains("blacklisted")));
}

#[tokio::test]
async fn worker_pool_drains_the_queue() {
    let h = harness(Arc::new(TextSource), test_config());
    for i in 0..4 {
        ingest(
            &h,
            &pdf_bytes(&format!("{CLEAN_APPRAISAL}\nUnique page {i}")),
            DocumentCategory::Appraisal,
        )
        .await
        .unwrap();
    }

    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(64);
    let handle = WorkerPool::new(h.pipeline.clone()).spawn(event_tx);

    let mut completed = 0;
    while completed < 4 {
        match event_rx.recv().await.expect("event channel closed") {
            PipelineEvent::Completed { .. } => completed += 1,
            PipelineEvent::Failed { document_id, error, .. } => {
                panic!("unexpected failure for {document_id}: {error}")
            }
            _ => {}
        }
    }
    handle.shutdown().await;

    let stats = h.pipeline.statistics().await.unwrap();
    assert_eq!(stats.completed, 4);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
}
