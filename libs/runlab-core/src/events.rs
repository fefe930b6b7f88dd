//! Typed lifecycle events for the presentation layer.

use crate::validation::ValidationReport;
use runlab_common::types::{ExecutionResult, SubmissionStatus, TestReport};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum SubmissionEvent {
    #[serde(rename = "submission:start")]
    Start {
        submission_id: Uuid,
        session_id: String,
        code_preview: String,
        show_progress: bool,
        clear_output: bool,
    },
    #[serde(rename = "submission:complete")]
    Complete {
        submission_id: Uuid,
        session_id: String,
        status: SubmissionStatus,
        result: ExecutionResult,
        test_report: Option<TestReport>,
    },
    #[serde(rename = "submission:error")]
    Error {
        submission_id: Uuid,
        session_id: String,
        kind: String,
        message: String,
    },
    #[serde(rename = "submission:tests:complete")]
    TestsComplete {
        submission_id: Uuid,
        report: TestReport,
    },
    #[serde(rename = "submission:tests:error")]
    TestsError { submission_id: Uuid, message: String },
    #[serde(rename = "submission:validation")]
    Validation {
        session_id: String,
        report: ValidationReport,
    },
}

impl SubmissionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionEvent::Start { .. } => "submission:start",
            SubmissionEvent::Complete { .. } => "submission:complete",
            SubmissionEvent::Error { .. } => "submission:error",
            SubmissionEvent::TestsComplete { .. } => "submission:tests:complete",
            SubmissionEvent::TestsError { .. } => "submission:tests:error",
            SubmissionEvent::Validation { .. } => "submission:validation",
        }
    }
}

/// Fan-out channel. Publishing never blocks and never fails; events sent
/// while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SubmissionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SubmissionEvent) {
        let _ = self.sender.send(event);
    }
}
