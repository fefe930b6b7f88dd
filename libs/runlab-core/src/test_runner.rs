/// Test Runner - Sequential Auto-Grading
///
/// **Responsibility:**
/// After a successful execution, fetch the session's test cases and run each
/// one through the execution client, then compare results.
///
/// **Execution Rules:**
/// - Test cases run one at a time, in provider order
/// - Each test program is `setup + submitted code + assertion`
/// - Each test uses the fixed per-test timeout, not the submission's own
/// - A failing test execution becomes a failed TestResult and never stops
///   the remaining tests
use crate::client::ExecutionClient;
use crate::evaluator::evaluate_test;
use crate::error::SubmissionError;
use crate::metrics::{Metrics, Outcome};
use crate::providers::TestCaseProvider;
use runlab_common::types::{ExecutionResult, SubmissionRecord, TestCase, TestReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 5000;

pub struct TestRunner {
    client: Arc<ExecutionClient>,
    provider: Arc<dyn TestCaseProvider>,
    metrics: Metrics,
    test_timeout_ms: u64,
}

/// Concatenate setup, submitted code and assertion into one program.
pub fn assemble_program(test_case: &TestCase, source_code: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(setup) = test_case.setup_code.as_deref() {
        if !setup.trim().is_empty() {
            parts.push(setup);
        }
    }
    parts.push(source_code);
    parts.push(&test_case.assertion_code);
    parts.join("\n")
}

impl TestRunner {
    pub fn new(
        client: Arc<ExecutionClient>,
        provider: Arc<dyn TestCaseProvider>,
        metrics: Metrics,
        test_timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            provider,
            metrics,
            test_timeout_ms,
        }
    }

    /// Returns `Ok(None)` when tests are disabled, the execution failed, or
    /// the session has no test cases.
    pub async fn run_tests(
        &self,
        submission: &SubmissionRecord,
        execution: &ExecutionResult,
    ) -> Result<Option<TestReport>, SubmissionError> {
        if !submission.options.enable_tests || !execution.succeeded {
            return Ok(None);
        }

        let test_cases = self.provider.get_test_cases(&submission.session_id).await?;
        if test_cases.is_empty() {
            debug!(submission_id = %submission.id, "No test cases for session");
            return Ok(None);
        }

        info!(
            submission_id = %submission.id,
            test_count = test_cases.len(),
            timeout_ms = self.test_timeout_ms,
            "Running test cases"
        );

        let mut results = Vec::with_capacity(test_cases.len());
        for (idx, test_case) in test_cases.iter().enumerate() {
            let program = assemble_program(test_case, &submission.source_code);
            let run = self
                .client
                .execute_test(
                    submission.id,
                    &execution.language,
                    &program,
                    test_case,
                    self.test_timeout_ms,
                )
                .await;

            if let Err(e) = &run {
                warn!(
                    submission_id = %submission.id,
                    test_num = idx + 1,
                    test_name = %test_case.name,
                    error = %e,
                    "Test execution failed"
                );
            }

            let result = evaluate_test(test_case, run);
            self.metrics.record(if result.passed {
                Outcome::TestPassed
            } else {
                Outcome::TestFailed
            });

            debug!(
                submission_id = %submission.id,
                test_num = idx + 1,
                test_name = %result.test_name,
                passed = result.passed,
                execution_ms = result.execution_time_ms,
                "Test result"
            );
            results.push(result);
        }

        let report = TestReport::from_results(results);
        info!(
            submission_id = %submission.id,
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            "Test run complete"
        );
        Ok(Some(report))
    }
}
