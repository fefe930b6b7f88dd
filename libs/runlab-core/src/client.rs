/// Execution Client
///
/// Boundary to the remote sandbox. Resolves the language for a submission,
/// picks the endpoint from the language table and performs exactly one
/// POST per call. The sandbox's own execution semantics are opaque here.
use crate::error::SubmissionError;
use crate::metrics::{Metrics, Outcome};
use chrono::Utc;
use runlab_common::language::{Language, BASELINE_LANGUAGE, VALIDATE_PATH};
use runlab_common::types::{ExecutionResult, SubmissionRecord, TestCase};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "X-Submission-Id";

/// A failed execution together with the failed result as measured: the
/// language actually used and the real elapsed time.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub error: SubmissionError,
    pub result: ExecutionResult,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    language: &'a Language,
    inputs: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct TestRequest<'a> {
    code: &'a str,
    test: &'a TestCase,
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    code: &'a str,
    language: &'a Language,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TestResponse {
    success: bool,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Lists returned by the remote validation service.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RemoteValidation {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Raw outcome of one test-case execution, before comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    /// Value reported by the sandbox; falls back to the printed output.
    pub actual: Value,
    pub elapsed_ms: u64,
}

pub struct ExecutionClient {
    http: reqwest::Client,
    base_url: String,
    session_languages: RwLock<HashMap<String, Language>>,
    metrics: Metrics,
}

impl ExecutionClient {
    pub fn new(base_url: &str, metrics: Metrics) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, metrics)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, metrics: Metrics) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_languages: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pin a session to a language, bypassing keyword detection.
    pub fn set_session_language(&self, session_id: &str, language: Language) {
        let mut sessions = self
            .session_languages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(session_id.to_string(), language);
    }

    pub fn session_language(&self, session_id: &str) -> Option<Language> {
        self.session_languages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
    }

    /// Session configuration first, then keyword heuristics, then baseline.
    pub fn resolve_language(&self, session_id: &str, code: &str) -> Language {
        self.session_language(session_id)
            .or_else(|| Language::detect(code))
            .unwrap_or(BASELINE_LANGUAGE)
    }

    /// Run a submission remotely. Elapsed time is recorded to metrics once,
    /// whether the call succeeds or not.
    pub async fn execute(&self, submission: &SubmissionRecord) -> Result<ExecutionResult, ExecutionFailure> {
        let language = self.resolve_language(&submission.session_id, &submission.source_code);
        let path = language.endpoint_path();

        debug!(
            submission_id = %submission.id,
            language = %language,
            path = path,
            timeout_ms = submission.options.timeout_ms,
            "Dispatching execution"
        );

        let request = ExecuteRequest {
            code: &submission.source_code,
            language: &language,
            inputs: &submission.options.inputs,
            timeout: submission.options.timeout_ms,
            context: submission.options.context.as_ref(),
        };

        let start = Instant::now();
        let outcome = self.send_execute(path, submission.id, &request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        self.metrics.record(Outcome::ExecutionTimed {
            elapsed_ms,
            succeeded: outcome.is_ok(),
        });

        match outcome {
            Ok(output) => {
                info!(
                    submission_id = %submission.id,
                    language = %language,
                    execution_ms = elapsed_ms,
                    "Execution succeeded"
                );
                Ok(ExecutionResult {
                    succeeded: true,
                    output,
                    error_message: None,
                    execution_time_ms: elapsed_ms,
                    language,
                    produced_at: Utc::now(),
                })
            }
            Err(e) => {
                warn!(
                    submission_id = %submission.id,
                    language = %language,
                    execution_ms = elapsed_ms,
                    error = %e,
                    "Execution failed"
                );
                Err(ExecutionFailure {
                    result: ExecutionResult {
                        succeeded: false,
                        output: String::new(),
                        error_message: Some(e.to_string()),
                        execution_time_ms: elapsed_ms,
                        language,
                        produced_at: Utc::now(),
                    },
                    error: e,
                })
            }
        }
    }

    async fn send_execute(
        &self,
        path: &str,
        submission_id: Uuid,
        request: &ExecuteRequest<'_>,
    ) -> Result<String, SubmissionError> {
        let response = self.post(path, Some(submission_id), request).await?;
        let body: ExecuteResponse = response.json().await?;

        if !body.success {
            return Err(SubmissionError::Execution(
                body.error.unwrap_or_else(|| "Execution failed".to_string()),
            ));
        }
        Ok(body.output.unwrap_or_default())
    }

    /// Run one assembled test program on the per-test endpoint. Any response
    /// that does not match the expected shape is a generic test failure.
    pub async fn execute_test(
        &self,
        submission_id: Uuid,
        language: &Language,
        program: &str,
        test_case: &TestCase,
        timeout_ms: u64,
    ) -> Result<TestRun, SubmissionError> {
        let request = TestRequest {
            code: program,
            test: test_case,
            timeout: timeout_ms,
        };

        let start = Instant::now();
        let response = self
            .post(&language.test_endpoint_path(), Some(submission_id), &request)
            .await
            .map_err(|e| SubmissionError::TestExecution(e.to_string()))?;

        let body: TestResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::TestExecution(format!("malformed test response: {}", e)))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !body.success {
            return Err(SubmissionError::TestExecution(
                body.error.unwrap_or_else(|| "Test execution failed".to_string()),
            ));
        }

        let actual = match (body.result, body.output) {
            (Some(value), _) => value,
            (None, Some(output)) => Value::String(output),
            (None, None) => Value::Null,
        };

        Ok(TestRun { actual, elapsed_ms })
    }

    pub async fn validate_remote(
        &self,
        code: &str,
        language: &Language,
    ) -> Result<RemoteValidation, SubmissionError> {
        let request = ValidateRequest { code, language };
        let response = self.post(VALIDATE_PATH, None, &request).await?;
        Ok(response.json().await?)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        correlation_id: Option<Uuid>,
        body: &T,
    ) -> Result<reqwest::Response, SubmissionError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.post(&url).json(body);
        if let Some(id) = correlation_id {
            request = request.header(CORRELATION_HEADER, id.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Prefer the sandbox's structured message, else `HTTP <status>: <reason>`.
async fn error_from_response(response: reqwest::Response) -> SubmissionError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let parsed = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .filter(|message| !message.is_empty());

    let message = parsed.unwrap_or_else(|| {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status")
        )
    });

    SubmissionError::Http {
        status: status.as_u16(),
        message,
    }
}
