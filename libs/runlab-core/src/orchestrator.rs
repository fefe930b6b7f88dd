/// Submission Orchestrator - Lifecycle Owner
///
/// **Responsibility:**
/// Drive one submission from code lookup to a terminal state.
///
/// **Pipeline:**
/// 1. Fetch code; empty code is rejected before anything is registered
/// 2. Register the record in the in-flight registry, emit `submission:start`
/// 3. Execute remotely, then (on success) run tests
/// 4. Finalize status, append to history, emit the terminal event
///
/// `submit` always returns an outcome; errors are reported, never raised.
/// The registry entry is removed on every exit path by a drop guard.
use crate::client::{ExecutionClient, ExecutionFailure};
use crate::error::SubmissionError;
use crate::events::{EventBus, SubmissionEvent};
use crate::history::SubmissionHistory;
use crate::metrics::{Metrics, Outcome};
use crate::providers::CodeProvider;
use crate::test_runner::TestRunner;
use runlab_common::types::{
    ExecutionResult, SubmissionRecord, SubmissionStatus, SubmitOptions, TestReport,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What the caller of `submit` gets back.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmitOutcome {
    pub success: bool,
    pub submission_id: Uuid,
    pub result: Option<ExecutionResult>,
    pub test_report: Option<TestReport>,
    pub error: Option<String>,
}

/// In-flight submissions. A record leaves once it is in history.
#[derive(Debug, Default)]
pub struct Registry {
    records: Mutex<HashMap<Uuid, SubmissionRecord>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SubmissionRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn upsert(&self, record: &SubmissionRecord) {
        self.lock().insert(record.id, record.clone());
    }

    fn remove(&self, id: &Uuid) -> Option<SubmissionRecord> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<SubmissionRecord> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn list(&self) -> Vec<SubmissionRecord> {
        self.lock().values().cloned().collect()
    }
}

/// Registry cleanup guard - removes the entry when dropped, including when
/// the submit future is cancelled or a step panics.
struct RegistryGuard<'a> {
    registry: &'a Registry,
    id: Uuid,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

pub struct Orchestrator {
    code_provider: Arc<dyn CodeProvider>,
    client: Arc<ExecutionClient>,
    test_runner: TestRunner,
    metrics: Metrics,
    events: EventBus,
    history: Arc<SubmissionHistory>,
    registry: Registry,
}

impl Orchestrator {
    pub fn new(
        code_provider: Arc<dyn CodeProvider>,
        client: Arc<ExecutionClient>,
        test_runner: TestRunner,
        metrics: Metrics,
        events: EventBus,
        history: Arc<SubmissionHistory>,
    ) -> Self {
        Self {
            code_provider,
            client,
            test_runner,
            metrics,
            events,
            history,
            registry: Registry::default(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn history(&self) -> &SubmissionHistory {
        &self.history
    }

    pub fn client(&self) -> &Arc<ExecutionClient> {
        &self.client
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// In-flight record first, then history.
    pub fn get_submission(&self, id: &Uuid) -> Option<SubmissionRecord> {
        self.registry.get(id).or_else(|| self.history.get(id))
    }

    pub async fn submit(&self, session_id: &str, options: Option<SubmitOptions>) -> SubmitOutcome {
        let options = options.unwrap_or_default();

        let code = match self.code_provider.get_code(session_id) {
            Ok(Some(code)) if !code.trim().is_empty() => code,
            Ok(_) => return self.reject(session_id, SubmissionError::EmptyCode),
            Err(e) => return self.reject(session_id, e),
        };

        let mut record = SubmissionRecord::new(session_id, code, options);
        let submission_id = record.id;

        self.metrics.record(Outcome::Submitted);
        self.registry.upsert(&record);
        let _guard = RegistryGuard {
            registry: &self.registry,
            id: submission_id,
        };

        info!(
            submission_id = %submission_id,
            session_id = session_id,
            source_size = record.source_code.len(),
            "Submission registered"
        );
        self.events.publish(SubmissionEvent::Start {
            submission_id,
            session_id: session_id.to_string(),
            code_preview: record.code_preview(),
            show_progress: record.options.show_progress,
            clear_output: record.options.clear_output,
        });

        self.set_status(&mut record, SubmissionStatus::Running);

        match self.client.execute(&record).await {
            Ok(result) => self.complete(record, result).await,
            Err(failure) => self.fail(record, failure),
        }
    }

    fn set_status(&self, record: &mut SubmissionRecord, status: SubmissionStatus) {
        if let Err(e) = record.transition(status) {
            error!(submission_id = %record.id, error = %e, "Rejected status change");
            return;
        }
        self.registry.upsert(record);
    }

    /// Hand a terminal record over to history. The registry copy is dropped
    /// only after history holds it, so lookups never miss or go stale.
    fn finalize(&self, record: &SubmissionRecord) {
        self.history.push(record.clone());
        self.registry.remove(&record.id);
    }

    async fn complete(&self, mut record: SubmissionRecord, result: ExecutionResult) -> SubmitOutcome {
        let test_report = match self.test_runner.run_tests(&record, &result).await {
            Ok(Some(report)) => {
                self.events.publish(SubmissionEvent::TestsComplete {
                    submission_id: record.id,
                    report: report.clone(),
                });
                Some(report)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(submission_id = %record.id, error = %e, "Test run failed");
                self.events.publish(SubmissionEvent::TestsError {
                    submission_id: record.id,
                    message: e.to_string(),
                });
                None
            }
        };

        record.result = Some(result.clone());
        record.test_report = test_report.clone();
        self.set_status(&mut record, SubmissionStatus::Completed);

        info!(
            submission_id = %record.id,
            status = ?record.status,
            execution_ms = result.execution_time_ms,
            tests_total = test_report.as_ref().map(|r| r.total).unwrap_or(0),
            tests_passed = test_report.as_ref().map(|r| r.passed).unwrap_or(0),
            "Submission completed"
        );

        self.finalize(&record);
        self.events.publish(SubmissionEvent::Complete {
            submission_id: record.id,
            session_id: record.session_id.clone(),
            status: record.status,
            result: result.clone(),
            test_report: test_report.clone(),
        });

        SubmitOutcome {
            success: true,
            submission_id: record.id,
            result: Some(result),
            test_report,
            error: None,
        }
    }

    fn fail(&self, mut record: SubmissionRecord, failure: ExecutionFailure) -> SubmitOutcome {
        self.metrics.record(Outcome::SubmissionFailed);

        let ExecutionFailure { error: err, result } = failure;
        let message = err.to_string();
        record.result = Some(result);
        self.set_status(&mut record, SubmissionStatus::Failed);

        error!(
            submission_id = %record.id,
            kind = err.kind(),
            error = %message,
            "Submission failed"
        );

        self.finalize(&record);
        self.events.publish(SubmissionEvent::Error {
            submission_id: record.id,
            session_id: record.session_id.clone(),
            kind: err.kind().to_string(),
            message: message.clone(),
        });

        SubmitOutcome {
            success: false,
            submission_id: record.id,
            result: None,
            test_report: None,
            error: Some(message),
        }
    }

    /// Input rejected before registration: no metrics, no history.
    fn reject(&self, session_id: &str, err: SubmissionError) -> SubmitOutcome {
        let submission_id = Uuid::new_v4();
        warn!(session_id = session_id, kind = err.kind(), error = %err, "Submission rejected");

        self.events.publish(SubmissionEvent::Error {
            submission_id,
            session_id: session_id.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });

        SubmitOutcome {
            success: false,
            submission_id,
            result: None,
            test_report: None,
            error: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{InMemoryCodeProvider, InMemoryTestCaseProvider};

    fn orchestrator(code: Arc<InMemoryCodeProvider>) -> Orchestrator {
        let metrics = Metrics::new();
        // Nothing listens on port 9, so every execution fails at transport.
        let client = Arc::new(ExecutionClient::new("http://127.0.0.1:9", metrics.clone()));
        let runner = TestRunner::new(
            client.clone(),
            Arc::new(InMemoryTestCaseProvider::new()),
            metrics.clone(),
            5000,
        );
        Orchestrator::new(
            code,
            client,
            runner,
            metrics,
            EventBus::new(),
            Arc::new(SubmissionHistory::new(10)),
        )
    }

    #[tokio::test]
    async fn test_empty_code_fails_fast() {
        let code = Arc::new(InMemoryCodeProvider::new());
        code.set_code("blank", "   \n\t ");
        let orchestrator = orchestrator(code);
        let mut rx = orchestrator.events().subscribe();

        for session in ["blank", "missing"] {
            let outcome = orchestrator.submit(session, None).await;
            assert!(!outcome.success);
            assert_eq!(outcome.error.as_deref(), Some("No code to submit"));
        }

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.total_submissions, 0);
        assert_eq!(snapshot.failed_submissions, 0);
        assert!(orchestrator.history().is_empty());
        assert!(orchestrator.registry().is_empty());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "submission:error");
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let code = Arc::new(InMemoryCodeProvider::new());
        code.set_code("s1", "print(1)");
        let orchestrator = orchestrator(code);
        let mut rx = orchestrator.events().subscribe();

        let outcome = orchestrator.submit("s1", None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Network error"));

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.total_submissions, 1);
        assert_eq!(snapshot.failed_submissions, 1);
        assert_eq!(snapshot.successful_submissions, 0);
        assert_eq!(snapshot.average_execution_time_ms, 0.0);

        assert!(orchestrator.registry().is_empty());
        let record = orchestrator.get_submission(&outcome.submission_id).unwrap();
        assert_eq!(record.status, SubmissionStatus::Failed);
        assert!(record.ended_at.is_some());

        assert_eq!(rx.recv().await.unwrap().name(), "submission:start");
        assert_eq!(rx.recv().await.unwrap().name(), "submission:error");
    }

    #[test]
    fn test_terminal_record_is_never_stale_or_missing() {
        let orchestrator = orchestrator(Arc::new(InMemoryCodeProvider::new()));
        let mut record = SubmissionRecord::new("s1", "x".to_string(), SubmitOptions::default());
        let id = record.id;
        orchestrator.registry.upsert(&record);

        orchestrator.set_status(&mut record, SubmissionStatus::Running);
        orchestrator.set_status(&mut record, SubmissionStatus::Completed);
        assert_eq!(
            orchestrator.get_submission(&id).unwrap().status,
            SubmissionStatus::Completed
        );

        orchestrator.finalize(&record);
        assert!(orchestrator.registry().is_empty());
        assert_eq!(
            orchestrator.get_submission(&id).unwrap().status,
            SubmissionStatus::Completed
        );
    }

    #[test]
    fn test_registry_guard_removes_on_drop() {
        let registry = Registry::default();
        let record = SubmissionRecord::new("s1", "x".to_string(), SubmitOptions::default());
        let id = record.id;
        registry.upsert(&record);
        {
            let _guard = RegistryGuard {
                registry: &registry,
                id,
            };
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.get(&id).is_none());
    }
}
