//! Pipeline event types and broadcast EventBus
//!
//! Events are observational only: the scoring pipeline never waits on a
//! subscriber and never fails because nobody is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted while a batch is processed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A record entered the pipeline
    RecordStarted {
        batch_id: Uuid,
        record_id: Uuid,
        npi: String,
        /// 0-based position within the batch
        index: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage finished and its output was merged into the record state
    StageCompleted {
        record_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed; the record continues with that stage's default output
    StageFailed {
        record_id: Uuid,
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A record reached the terminal state
    RecordCompleted {
        batch_id: Uuid,
        record_id: Uuid,
        status: String,
        risk_score: f64,
        error_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every record in the batch is terminal and the summary is computed
    BatchCompleted {
        batch_id: Uuid,
        records: usize,
        portfolio_risk_score: f64,
        total_estimated_savings: f64,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RecordStarted { .. } => "RecordStarted",
            PipelineEvent::StageCompleted { .. } => "StageCompleted",
            PipelineEvent::StageFailed { .. } => "StageFailed",
            PipelineEvent::RecordCompleted { .. } => "RecordCompleted",
            PipelineEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    ///
    /// Returns the number of subscribers reached (0 when nobody listens).
    pub fn emit(&self, event: PipelineEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!("No subscribers for {}", event.event_type());
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
