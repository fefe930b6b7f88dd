/// Metrics Aggregator
///
/// Process-wide counters shared by the execution client, test runner,
/// orchestrator and batcher. All mutation happens under one lock so the
/// running average is updated atomically with the success counter.
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// One observation fed into the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A submission passed input checks and was registered.
    Submitted,
    /// The execution client finished one remote call.
    ExecutionTimed { elapsed_ms: u64, succeeded: bool },
    /// A registered submission ended in failure.
    SubmissionFailed,
    TestPassed,
    TestFailed,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_submissions: u64,
    successful_submissions: u64,
    failed_submissions: u64,
    average_execution_time_ms: f64,
    last_execution_time_ms: Option<u64>,
    tests_passed: u64,
    tests_failed: u64,
    queue_depth: usize,
}

/// Read-only view returned by [`Metrics::snapshot`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_submissions: u64,
    pub successful_submissions: u64,
    pub failed_submissions: u64,
    pub average_execution_time_ms: f64,
    pub last_execution_time_ms: Option<u64>,
    pub tests_passed: u64,
    pub tests_failed: u64,
    /// Percentage with one decimal place, 0 when nothing was submitted.
    pub success_rate: f64,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    state: Arc<Mutex<MetricsState>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        // Counters stay usable even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, outcome: Outcome) {
        let mut state = self.lock();
        match outcome {
            Outcome::Submitted => state.total_submissions += 1,
            Outcome::ExecutionTimed {
                elapsed_ms,
                succeeded,
            } => {
                state.last_execution_time_ms = Some(elapsed_ms);
                if succeeded {
                    // n is the success count before this event is counted.
                    let n = state.successful_submissions as f64;
                    state.average_execution_time_ms =
                        (state.average_execution_time_ms * n + elapsed_ms as f64) / (n + 1.0);
                    state.successful_submissions += 1;
                }
            }
            Outcome::SubmissionFailed => state.failed_submissions += 1,
            Outcome::TestPassed => state.tests_passed += 1,
            Outcome::TestFailed => state.tests_failed += 1,
        }
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.lock().queue_depth = depth;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            total_submissions: state.total_submissions,
            successful_submissions: state.successful_submissions,
            failed_submissions: state.failed_submissions,
            average_execution_time_ms: state.average_execution_time_ms,
            last_execution_time_ms: state.last_execution_time_ms,
            tests_passed: state.tests_passed,
            tests_failed: state.tests_failed,
            success_rate: success_rate(state.successful_submissions, state.total_submissions),
            queue_depth: state.queue_depth,
        }
    }
}

fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = successful as f64 / total as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}
