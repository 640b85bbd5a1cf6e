//! In-memory repository implementations.
//!
//! The reference backend for the single-process pipeline and the fixture
//! for tests. Claim exclusivity holds because every conditional transition
//! runs under the repository mutex.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{
    Document, DocumentStatus, ExtractionResult, FraudAssessment, QueueEntry, QueueStatus,
};

use super::{
    DocumentRepository, QueueRepository, RepositoryError, Result, ResultRepository,
};

/// In-memory document store keyed by document id.
#[derive(Default)]
pub struct MemoryDocumentRepository {
    documents: Mutex<HashMap<String, Document>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn save(&self, document: &Document) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.lock().await.get(id).cloned())
    }

    async fn set_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let mut documents = self.documents.lock().await;
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("document {id}")))?;
        doc.status = status;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn count_by_status(&self) -> Result<HashMap<DocumentStatus, u64>> {
        let documents = self.documents.lock().await;
        let mut counts = HashMap::new();
        for doc in documents.values() {
            *counts.entry(doc.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// In-memory extraction/assessment store keyed by document id.
#[derive(Default)]
pub struct MemoryResultRepository {
    extractions: Mutex<HashMap<String, ExtractionResult>>,
    assessments: Mutex<HashMap<String, FraudAssessment>>,
}

impl MemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultRepository for MemoryResultRepository {
    async fn save_extraction(&self, result: &ExtractionResult) -> Result<()> {
        self.extractions
            .lock()
            .await
            .insert(result.document_id.clone(), result.clone());
        Ok(())
    }

    async fn save_assessment(&self, assessment: &FraudAssessment) -> Result<()> {
        self.assessments
            .lock()
            .await
            .insert(assessment.document_id.clone(), assessment.clone());
        Ok(())
    }

    async fn get_extraction(&self, document_id: &str) -> Result<Option<ExtractionResult>> {
        Ok(self.extractions.lock().await.get(document_id).cloned())
    }

    async fn get_assessment(&self, document_id: &str) -> Result<Option<FraudAssessment>> {
        Ok(self.assessments.lock().await.get(document_id).cloned())
    }

    async fn delete_for(&self, document_id: &str) -> Result<()> {
        self.extractions.lock().await.remove(document_id);
        self.assessments.lock().await.remove(document_id);
        Ok(())
    }

    async fn count_requiring_review(&self) -> Result<u64> {
        let assessments = self.assessments.lock().await;
        Ok(assessments
            .values()
            .filter(|a| a.manual_review_required)
            .count() as u64)
    }
}

/// In-memory queue keyed by entry id.
#[derive(Default)]
pub struct MemoryQueueRepository {
    entries: Mutex<HashMap<String, QueueEntry>>,
}

impl MemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueRepository for MemoryQueueRepository {
    async fn enqueue(&self, entry: &QueueEntry) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
        Ok(self.entries.lock().await.get(entry_id).cloned())
    }

    async fn get_by_document(&self, document_id: &str) -> Result<Option<QueueEntry>> {
        let entries = self.entries.lock().await;
        // A document can be re-enqueued; report the most recent entry.
        Ok(entries
            .values()
            .filter(|e| e.document_id == document_id)
            .max_by_key(|e| e.enqueued_at)
            .cloned())
    }

    async fn claim_next(
        &self,
        node_id: &str,
        now: DateTime<Utc>,
        age_interval_secs: i64,
        priority_ceiling: i32,
    ) -> Result<Option<QueueEntry>> {
        let mut entries = self.entries.lock().await;

        let best_id = entries
            .values()
            .filter(|e| e.status == QueueStatus::Queued)
            .max_by(|a, b| {
                let pa = a.effective_priority(now, age_interval_secs, priority_ceiling);
                let pb = b.effective_priority(now, age_interval_secs, priority_ceiling);
                // Higher priority wins; FIFO within equal priority.
                pa.cmp(&pb)
                    .then_with(|| b.enqueued_at.cmp(&a.enqueued_at))
            })
            .map(|e| e.id.clone());

        let Some(id) = best_id else {
            return Ok(None);
        };

        let entry = entries.get_mut(&id).expect("entry disappeared under lock");
        entry.status = QueueStatus::Processing;
        entry.node_id = Some(node_id.to_string());
        entry.started_at = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn claim(&self, entry_id: &str, node_id: &str) -> Result<QueueEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("queue entry {entry_id}")))?;

        if entry.status != QueueStatus::Queued {
            return Err(RepositoryError::ClaimConflict(format!(
                "queue entry {entry_id} is {}",
                entry.status.as_str()
            )));
        }

        entry.status = QueueStatus::Processing;
        entry.node_id = Some(node_id.to_string());
        entry.started_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn update(&self, entry: &QueueEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(&entry.id) {
            return Err(RepositoryError::NotFound(format!("queue entry {}", entry.id)));
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn requeue_due(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let mut requeued = Vec::new();
        for entry in entries.values_mut() {
            if entry.status == QueueStatus::Failed {
                if let Some(retry_at) = entry.next_retry_at {
                    if retry_at <= now {
                        entry.status = QueueStatus::Queued;
                        entry.next_retry_at = None;
                        entry.node_id = None;
                        entry.started_at = None;
                        requeued.push(entry.document_id.clone());
                    }
                }
            }
        }
        Ok(requeued)
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let mut reclaimed = Vec::new();
        for entry in entries.values_mut() {
            if entry.status == QueueStatus::Processing {
                let started = entry.started_at.unwrap_or(entry.enqueued_at);
                if started < cutoff {
                    entry.status = QueueStatus::Queued;
                    entry.node_id = None;
                    entry.started_at = None;
                    reclaimed.push(entry.document_id.clone());
                }
            }
        }
        Ok(reclaimed)
    }

    async fn snapshot(&self) -> Result<Vec<QueueEntry>> {
        let entries = self.entries.lock().await;
        let mut all: Vec<QueueEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(all)
    }
}
