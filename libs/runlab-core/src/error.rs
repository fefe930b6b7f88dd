use thiserror::Error;

/// Failure modes of the submission pipeline.
///
/// `Http` displays only the carried message: it is either the message parsed
/// from the sandbox's error body or a synthesized `HTTP <status>: <reason>`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("No code to submit")]
    EmptyCode,
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Execution(String),
    #[error("Test execution failed: {0}")]
    TestExecution(String),
    #[error("Invalid response from sandbox: {0}")]
    InvalidResponse(String),
    #[error("Code provider error: {0}")]
    CodeProvider(String),
    #[error("Test case provider error: {0}")]
    TestCaseProvider(String),
}

impl SubmissionError {
    /// Short classification used in error events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::EmptyCode => "empty_code",
            SubmissionError::Network(_) => "network",
            SubmissionError::Http { .. } => "http",
            SubmissionError::Execution(_) => "execution",
            SubmissionError::TestExecution(_) => "test_execution",
            SubmissionError::InvalidResponse(_) => "invalid_response",
            SubmissionError::CodeProvider(_) => "code_provider",
            SubmissionError::TestCaseProvider(_) => "test_case_provider",
        }
    }
}

impl From<reqwest::Error> for SubmissionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SubmissionError::InvalidResponse(err.to_string())
        } else {
            SubmissionError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_displays_message_only() {
        let err = SubmissionError::Http {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.kind(), "http");
    }

    #[test]
    fn test_empty_code_message() {
        assert_eq!(SubmissionError::EmptyCode.to_string(), "No code to submit");
    }
}
