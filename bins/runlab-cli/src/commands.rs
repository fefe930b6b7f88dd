// CLI commands wiring the submission pipeline against local files
use anyhow::{bail, Context, Result};
use runlab_common::config::RunlabConfig;
use runlab_common::language::Language;
use runlab_common::types::{SubmitOptions, TestReport};
use runlab_core::batcher::{QueueBatcher, TickOutcome};
use runlab_core::providers::{
    FileCodeProvider, InMemoryTestCaseProvider, JsonFileTestCaseProvider, TestCaseProvider,
};
use runlab_core::{
    EventBus, ExecutionClient, Metrics, Orchestrator, SubmissionHistory, TestRunner,
    ValidationEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct Pipeline {
    config: RunlabConfig,
    metrics: Metrics,
    events: EventBus,
    client: Arc<ExecutionClient>,
}

fn session_id(file: &Path) -> Result<String> {
    if !file.exists() {
        bail!("Source file not found: {}", file.display());
    }
    Ok(file.to_string_lossy().into_owned())
}

impl Pipeline {
    pub fn build(server: Option<&str>) -> Result<Self> {
        let mut config = RunlabConfig::load_default().context("Failed to load configuration")?;
        if let Some(server) = server {
            config.sandbox_url = server.to_string();
        }

        let metrics = Metrics::new();
        let client = Arc::new(ExecutionClient::new(&config.sandbox_url, metrics.clone()));
        for (session, language) in config.session_languages() {
            client.set_session_language(&session, language);
        }

        Ok(Self {
            config,
            metrics,
            events: EventBus::new(),
            client,
        })
    }

    fn orchestrator(&self, tests: Arc<dyn TestCaseProvider>) -> Orchestrator {
        let runner = TestRunner::new(
            self.client.clone(),
            tests,
            self.metrics.clone(),
            self.config.test_timeout_ms,
        );
        Orchestrator::new(
            Arc::new(FileCodeProvider::new(PathBuf::new())),
            self.client.clone(),
            runner,
            self.metrics.clone(),
            self.events.clone(),
            Arc::new(SubmissionHistory::new(self.config.history_capacity)),
        )
    }

    /// Submit one file. Returns whether execution succeeded and every test
    /// (if any) passed.
    pub async fn submit(
        &self,
        file: &Path,
        tests: Option<&Path>,
        language: Option<&str>,
        enable_tests: bool,
        timeout_ms: u64,
        inputs: String,
    ) -> Result<bool> {
        let session = session_id(file)?;
        if let Some(language) = language {
            self.client
                .set_session_language(&session, Language::from_name(language));
        }

        let provider: Arc<dyn TestCaseProvider> = match tests {
            Some(path) => Arc::new(JsonFileTestCaseProvider::new(path)),
            None => Arc::new(InMemoryTestCaseProvider::new()),
        };
        let orchestrator = self.orchestrator(provider);

        println!("🚀 Submitting {} to {}", file.display(), self.config.sandbox_url);
        let options = SubmitOptions {
            enable_tests,
            timeout_ms,
            inputs,
            ..SubmitOptions::default()
        };
        let outcome = orchestrator.submit(&session, Some(options)).await;

        if !outcome.success {
            println!("✗ Submission {} failed", outcome.submission_id);
            println!("  Error: {}", outcome.error.unwrap_or_default());
            return Ok(false);
        }

        if let Some(result) = &outcome.result {
            println!("✓ Executed as {} in {}ms", result.language, result.execution_time_ms);
            if !result.output.is_empty() {
                println!("\n--- output ---\n{}", result.output.trim_end());
            }
        }

        let all_passed = match &outcome.test_report {
            Some(report) => {
                print_report(report);
                report.all_passed
            }
            None => true,
        };
        Ok(all_passed)
    }

    /// Validate one file. Returns true when no errors were reported.
    pub async fn validate(&self, file: &Path) -> Result<bool> {
        let session = session_id(file)?;
        let code = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let engine = ValidationEngine::new(
            self.client.clone(),
            self.events.clone(),
            self.config.validation.enabled,
        );
        let report = engine.validate(&session, &code).await;

        for error in &report.errors {
            println!("✗ {}", error);
        }
        for warning in &report.warnings {
            println!("⚠ {}", warning);
        }
        if report.errors.is_empty() && report.warnings.is_empty() {
            println!("✓ No issues found");
        }
        Ok(report.errors.is_empty())
    }

    /// Queue every file, then tick until the queue is empty.
    pub async fn batch(&self, files: &[PathBuf], batch_size: usize) -> Result<()> {
        let orchestrator = Arc::new(self.orchestrator(Arc::new(InMemoryTestCaseProvider::new())));
        let batcher = QueueBatcher::new(
            orchestrator.clone(),
            self.metrics.clone(),
            batch_size,
            Duration::from_millis(self.config.batch.interval_ms),
        );

        for file in files {
            let session = session_id(file)?;
            batcher.enqueue(&session, SubmitOptions::default());
        }
        println!("📋 Queued {} submissions (batch size {})", files.len(), batch_size.max(1));

        let mut round = 0;
        while !batcher.is_empty() {
            round += 1;
            if let TickOutcome::Drained {
                sessions,
                succeeded,
                failed,
            } = batcher.tick().await
            {
                println!(
                    "  Batch {}: {} dispatched, {} succeeded, {} failed",
                    round,
                    sessions.len(),
                    succeeded,
                    failed
                );
            }
        }

        let snapshot = self.metrics.snapshot();
        println!();
        println!("→ Total: {}", snapshot.total_submissions);
        println!("  Successful: {}", snapshot.successful_submissions);
        println!("  Failed: {}", snapshot.failed_submissions);
        println!("  Success rate: {}%", snapshot.success_rate);
        println!("  Average execution: {:.1}ms", snapshot.average_execution_time_ms);

        for record in orchestrator.history().recent(files.len()) {
            let error = record
                .result
                .as_ref()
                .and_then(|r| r.error_message.clone())
                .unwrap_or_default();
            println!("  {:?} {} {}", record.status, record.session_id, error);
        }
        Ok(())
    }
}

fn print_report(report: &TestReport) {
    println!();
    println!("→ Tests: {} / {} passed", report.passed, report.total);
    for result in &report.results {
        if result.passed {
            println!("  ✓ {} ({}ms)", result.test_name, result.execution_time_ms);
        } else {
            println!("  ✗ {}", result.test_name);
            match &result.error_message {
                Some(error) => println!("    Error: {}", error),
                None => {
                    println!("    Expected: {}", result.expected);
                    println!("    Got:      {}", result.actual);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_requires_existing_file() {
        assert!(session_id(Path::new("definitely/missing.py")).is_err());
        let file = std::env::temp_dir().join(format!("runlab-cli-{}.py", std::process::id()));
        std::fs::write(&file, "print(1)").unwrap();
        assert_eq!(session_id(&file).unwrap(), file.to_string_lossy());
        std::fs::remove_file(&file).unwrap();
    }
}
