//! Queue entry models: the unit of scheduled analysis work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Well-known priority levels. Priority is an open integer scale; these are
/// the values the platform assigns by default.
pub mod priority {
    pub const NORMAL: i32 = 0;
    pub const HIGH: i32 = 5;
    pub const URGENT: i32 = 10;
}

/// Scheduling status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The unit of scheduled work: one analysis attempt series for a document.
///
/// The attempt counter only increases; `next_retry_at` is only set while the
/// entry is failed and retryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub document_id: String,
    pub priority: i32,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Identity of the worker that claimed this entry.
    pub node_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(document_id: String, priority: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id,
            priority,
            status: QueueStatus::Queued,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            node_id: None,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Rough processing-time estimate by priority, for UI/SLA display only.
    pub fn estimated_processing(&self) -> Duration {
        if self.priority >= priority::URGENT {
            Duration::seconds(30)
        } else if self.priority >= priority::HIGH {
            Duration::seconds(60)
        } else {
            Duration::seconds(120)
        }
    }

    /// Effective scheduling priority at `now`.
    ///
    /// Waiting entries age up one level per `age_interval_secs` of queue
    /// time, capped at the urgent ceiling, so a flood of higher-priority
    /// work cannot starve old entries indefinitely.
    pub fn effective_priority(
        &self,
        now: DateTime<Utc>,
        age_interval_secs: i64,
        ceiling: i32,
    ) -> i64 {
        let waited = (now - self.enqueued_at).num_seconds().max(0);
        let boost = if age_interval_secs > 0 {
            waited / age_interval_secs
        } else {
            0
        };
        let ceiling = ceiling.max(self.priority) as i64;
        (self.priority as i64 + boost).min(ceiling)
    }
}
