use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Options recognised by `submit`. Missing fields fall back to the defaults
/// below when deserialized from a request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubmitOptions {
    pub enable_tests: bool,
    pub clear_output: bool,
    pub show_progress: bool,
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    pub context: Option<Value>,
    pub inputs: String,
}

pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 10_000;

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            enable_tests: true,
            clear_output: true,
            show_progress: true,
            timeout_ms: DEFAULT_SUBMIT_TIMEOUT_MS,
            context: None,
            inputs: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }

    /// Pending -> Running -> {Completed, Failed}. Nothing moves backwards and
    /// terminal states are final.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid status transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// One attempt to execute a snapshot of a session's source code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub session_id: String,
    pub source_code: String,
    pub created_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub options: SubmitOptions,
    pub result: Option<ExecutionResult>,
    pub test_report: Option<TestReport>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SubmissionRecord {
    pub fn new(session_id: &str, source_code: String, options: SubmitOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            source_code,
            created_at: Utc::now(),
            status: SubmissionStatus::Pending,
            options,
            result: None,
            test_report: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Move to `next`, stamping start/end times along the way.
    pub fn transition(&mut self, next: SubmissionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == SubmissionStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// First 100 characters of the code, used in start events.
    pub fn code_preview(&self) -> String {
        truncate_chars(&self.source_code, CODE_PREVIEW_CHARS)
    }
}

pub const CODE_PREVIEW_CHARS: usize = 100;

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Outcome of one remote execution. Built once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub output: String,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub language: Language,
    pub produced_at: DateTime<Utc>,
}

/// Externally supplied grading case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_code: Option<String>,
    pub assertion_code: String,
    pub expected_value: ExpectedValue,
}

/// Expected value of a test case. Text and lists have their own comparison
/// rules, everything else is compared strictly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExpectedValue {
    Text(String),
    List(Vec<Value>),
    Primitive(Value),
}

impl ExpectedValue {
    pub fn to_value(&self) -> Value {
        match self {
            ExpectedValue::Text(text) => Value::String(text.clone()),
            ExpectedValue::List(items) => Value::Array(items.clone()),
            ExpectedValue::Primitive(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub test_name: String,
    pub passed: bool,
    pub expected: Value,
    pub actual: Value,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub all_passed: bool,
    pub results: Vec<TestResult>,
}

impl TestReport {
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total,
            passed,
            failed: total - passed,
            all_passed: passed == total,
            results,
        }
    }
}

/// Deferred submission awaiting a batch drain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchQueueEntry {
    pub session_id: String,
    #[serde(default)]
    pub options: SubmitOptions,
}
