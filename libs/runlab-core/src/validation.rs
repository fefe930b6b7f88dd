/// Validation Engine
///
/// Fast local heuristics plus a best-effort remote check. The remote side
/// never surfaces an error: when it is unreachable it contributes nothing.
use crate::client::ExecutionClient;
use crate::events::{EventBus, SubmissionEvent};
use runlab_common::language::Language;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Local entries first, then remote; duplicates are kept.
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn opens_block(line: &str, language: &Language) -> bool {
    let trimmed = line.trim_end();
    match language {
        Language::Python => trimmed.ends_with(':') && !trimmed.trim_start().starts_with('#'),
        Language::JavaScript | Language::Java | Language::Other(_) => trimmed.ends_with('{'),
    }
}

/// Deterministic checks that never touch the network.
pub fn local_checks(code: &str, language: &Language) -> ValidationReport {
    let mut report = ValidationReport::default();

    if code.trim().is_empty() {
        report.errors.push("Code is empty".to_string());
        return report;
    }

    let lines: Vec<&str> = code.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let opens = line.matches('(').count();
        let closes = line.matches(')').count();
        if opens != closes {
            report
                .warnings
                .push(format!("Line {}: Unmatched parentheses", idx + 1));
        }

        if !opens_block(line, language) {
            continue;
        }
        let next = lines
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(_, l)| !l.trim().is_empty());
        if let Some((next_idx, next_line)) = next {
            let closes_block = next_line.trim_start().starts_with('}');
            if !closes_block && indent_width(next_line) <= indent_width(line) {
                report.warnings.push(format!(
                    "Line {}: Expected indentation after line {}",
                    next_idx + 1,
                    idx + 1
                ));
            }
        }
    }

    report
}

pub struct ValidationEngine {
    client: Arc<ExecutionClient>,
    events: EventBus,
    remote_enabled: bool,
}

impl ValidationEngine {
    pub fn new(client: Arc<ExecutionClient>, events: EventBus, remote_enabled: bool) -> Self {
        Self {
            client,
            events,
            remote_enabled,
        }
    }

    pub async fn validate(&self, session_id: &str, code: &str) -> ValidationReport {
        let language = self.client.resolve_language(session_id, code);
        let local = local_checks(code, &language);

        let remote = if self.remote_enabled {
            match self.client.validate_remote(code, &language).await {
                Ok(remote) => ValidationReport {
                    errors: remote.errors,
                    warnings: remote.warnings,
                },
                Err(e) => {
                    debug!(session_id = session_id, error = %e, "Remote validation unavailable");
                    ValidationReport::default()
                }
            }
        } else {
            ValidationReport::default()
        };

        let report = local.merge(remote);
        self.events.publish(SubmissionEvent::Validation {
            session_id: session_id.to_string(),
            report: report.clone(),
        });
        report
    }
}
