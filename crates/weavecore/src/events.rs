use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        run_id: RunId,
        version: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        run_id: RunId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ActivityStarted {
        run_id: RunId,
        /// `Statement.id` when the document carries one, for diagnostics.
        statement_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },
    ActivityCompleted {
        run_id: RunId,
        name: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ActivityFailed {
        run_id: RunId,
        name: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Per-run emitter bound to the bus.
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(run_id: RunId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self { run_id, sender }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn workflow_started(&self, version: &str) {
        let _ = self.sender.send(ExecutionEvent::WorkflowStarted {
            run_id: self.run_id,
            version: version.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn workflow_completed(&self, success: bool, duration_ms: u64) {
        let _ = self.sender.send(ExecutionEvent::WorkflowCompleted {
            run_id: self.run_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn activity_started(&self, statement_id: &str, name: &str) {
        let _ = self.sender.send(ExecutionEvent::ActivityStarted {
            run_id: self.run_id,
            statement_id: statement_id.to_string(),
            name: name.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn activity_completed(&self, name: &str, duration_ms: u64) {
        let _ = self.sender.send(ExecutionEvent::ActivityCompleted {
            run_id: self.run_id,
            name: name.to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    pub fn activity_failed(&self, name: &str, error: &str) {
        let _ = self.sender.send(ExecutionEvent::ActivityFailed {
            run_id: self.run_id,
            name: name.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Broadcast bus for execution events; slow or absent subscribers never block
/// the interpreter.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, run_id: RunId) -> EventEmitter {
        EventEmitter::new(run_id, self.sender.clone())
    }
}
