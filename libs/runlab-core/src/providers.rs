//! Collaborators the pipeline consumes: where session code and test cases
//! come from.

use crate::error::SubmissionError;
use async_trait::async_trait;
use runlab_common::types::TestCase;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Source of the code currently associated with a session.
pub trait CodeProvider: Send + Sync {
    /// `Ok(None)` means the session has no code at all.
    fn get_code(&self, session_id: &str) -> Result<Option<String>, SubmissionError>;
}

#[async_trait]
pub trait TestCaseProvider: Send + Sync {
    async fn get_test_cases(&self, session_id: &str) -> Result<Vec<TestCase>, SubmissionError>;
}

/// Session code held in memory, typically fed by an editor.
#[derive(Debug, Default)]
pub struct InMemoryCodeProvider {
    code: RwLock<HashMap<String, String>>,
}

impl InMemoryCodeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_code(&self, session_id: &str, code: impl Into<String>) {
        self.code
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session_id.to_string(), code.into());
    }
}

impl CodeProvider for InMemoryCodeProvider {
    fn get_code(&self, session_id: &str) -> Result<Option<String>, SubmissionError> {
        Ok(self
            .code
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned())
    }
}

/// Treats the session id as a path relative to `root`.
#[derive(Debug, Clone)]
pub struct FileCodeProvider {
    root: PathBuf,
}

impl FileCodeProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CodeProvider for FileCodeProvider {
    fn get_code(&self, session_id: &str) -> Result<Option<String>, SubmissionError> {
        let path = self.root.join(session_id);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| SubmissionError::CodeProvider(format!("{}: {}", path.display(), e)))
    }
}

/// Editor source first; plain-text source when the editor has nothing.
pub struct FallbackCodeProvider<P, F> {
    primary: P,
    fallback: F,
}

impl<P: CodeProvider, F: CodeProvider> FallbackCodeProvider<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: CodeProvider, F: CodeProvider> CodeProvider for FallbackCodeProvider<P, F> {
    fn get_code(&self, session_id: &str) -> Result<Option<String>, SubmissionError> {
        match self.primary.get_code(session_id) {
            Ok(Some(code)) => Ok(Some(code)),
            Ok(None) | Err(_) => self.fallback.get_code(session_id),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTestCaseProvider {
    cases: RwLock<HashMap<String, Vec<TestCase>>>,
}

impl InMemoryTestCaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_test_cases(&self, session_id: &str, cases: Vec<TestCase>) {
        self.cases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session_id.to_string(), cases);
    }
}

#[async_trait]
impl TestCaseProvider for InMemoryTestCaseProvider {
    async fn get_test_cases(&self, session_id: &str) -> Result<Vec<TestCase>, SubmissionError> {
        Ok(self
            .cases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Test cases read from a JSON array on disk, shared by every session.
#[derive(Debug, Clone)]
pub struct JsonFileTestCaseProvider {
    path: PathBuf,
}

impl JsonFileTestCaseProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TestCaseProvider for JsonFileTestCaseProvider {
    async fn get_test_cases(&self, _session_id: &str) -> Result<Vec<TestCase>, SubmissionError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SubmissionError::TestCaseProvider(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| SubmissionError::TestCaseProvider(format!("{}: {}", self.path.display(), e)))
    }
}
