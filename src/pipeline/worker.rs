//! Supervised worker pool.
//!
//! Workers claim entries from the persistent queue and process one document
//! end-to-end before becoming available again. A maintenance task promotes
//! due retries and reclaims entries from dead workers. Progress is emitted
//! as events over an mpsc channel; a dropped receiver never stalls a worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::RiskTier;

use super::orchestrator::{Pipeline, ProcessOutcome};

/// How often the maintenance sweep runs.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

/// Events emitted while the pool runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A worker claimed an entry.
    Claimed {
        document_id: String,
        node_id: String,
        attempt: u32,
    },
    /// Analysis finished and results were persisted.
    Completed {
        document_id: String,
        fraud_score: f32,
        risk_tier: RiskTier,
        manual_review_required: bool,
    },
    /// An attempt failed; `retrying` tells whether a retry is scheduled.
    Failed {
        document_id: String,
        attempts: u32,
        error: String,
        retrying: bool,
        next_retry_at: Option<DateTime<Utc>>,
    },
    /// A failed entry's retry time arrived and it went back to queued.
    Requeued { document_id: String },
    /// An entry stuck in processing was reclaimed from a dead worker.
    Reclaimed { document_id: String },
}

/// Pool of worker tasks over one pipeline.
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Spawn the configured number of workers plus the maintenance task.
    pub fn spawn(&self, events: mpsc::Sender<PipelineEvent>) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll = Duration::from_millis(self.pipeline.config().poll_interval_ms);

        let mut handles = Vec::new();
        for index in 0..self.pipeline.config().workers {
            let node_id = format!("worker-{index}");
            handles.push(tokio::spawn(worker_loop(
                self.pipeline.clone(),
                node_id,
                events.clone(),
                shutdown_rx.clone(),
                poll,
            )));
        }
        handles.push(tokio::spawn(maintenance_loop(
            self.pipeline.clone(),
            events,
            shutdown_rx,
        )));

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

/// Handle for stopping a running pool.
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signal shutdown and wait for every task to finish its current
    /// document.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    pipeline: Arc<Pipeline>,
    node_id: String,
    events: mpsc::Sender<PipelineEvent>,
    mut shutdown: watch::Receiver<bool>,
    poll: Duration,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let claimed = match pipeline.claim_next(&node_id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "claim failed");
                None
            }
        };

        let Some(entry) = claimed else {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        let _ = events
            .send(PipelineEvent::Claimed {
                document_id: entry.document_id.clone(),
                node_id: node_id.clone(),
                attempt: entry.attempts + 1,
            })
            .await;

        let event = match pipeline.process_claimed(entry).await {
            ProcessOutcome::Completed {
                document_id,
                assessment,
            } => PipelineEvent::Completed {
                document_id,
                fraud_score: assessment.fraud_score,
                risk_tier: assessment.risk_tier,
                manual_review_required: assessment.manual_review_required,
            },
            ProcessOutcome::Failed {
                document_id,
                attempts,
                error,
                retrying,
                next_retry_at,
            } => PipelineEvent::Failed {
                document_id,
                attempts,
                error,
                retrying,
                next_retry_at,
            },
        };
        let _ = events.send(event).await;
    }
}

async fn maintenance_loop(
    pipeline: Arc<Pipeline>,
    events: mpsc::Sender<PipelineEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match pipeline.run_maintenance().await {
            Ok(report) => {
                for document_id in report.requeued {
                    let _ = events.send(PipelineEvent::Requeued { document_id }).await;
                }
                for document_id in report.reclaimed {
                    let _ = events.send(PipelineEvent::Reclaimed { document_id }).await;
                }
            }
            Err(e) => warn!(error = %e, "maintenance sweep failed"),
        }
    }
}
