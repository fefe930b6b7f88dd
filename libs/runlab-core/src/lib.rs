//! Submission pipeline: execution client, test runner, validation, metrics,
//! lifecycle orchestration and deferred batch dispatch.

pub mod batcher;
pub mod client;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod test_runner;
pub mod validation;

pub use batcher::{QueueBatcher, SubmissionDispatcher};
pub use client::{ExecutionClient, ExecutionFailure};
pub use error::SubmissionError;
pub use events::{EventBus, SubmissionEvent};
pub use history::SubmissionHistory;
pub use metrics::{Metrics, MetricsSnapshot, Outcome};
pub use orchestrator::{Orchestrator, SubmitOutcome};
pub use test_runner::TestRunner;
pub use validation::{ValidationEngine, ValidationReport};
