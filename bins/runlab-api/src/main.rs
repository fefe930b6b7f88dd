mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use runlab_common::config::RunlabConfig;
use runlab_core::batcher::QueueBatcher;
use runlab_core::providers::{InMemoryCodeProvider, InMemoryTestCaseProvider};
use runlab_core::{
    EventBus, ExecutionClient, Metrics, Orchestrator, SubmissionEvent, SubmissionHistory,
    TestRunner, ValidationEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub batcher: Arc<QueueBatcher>,
    pub validation: Arc<ValidationEngine>,
    pub code: Arc<InMemoryCodeProvider>,
    pub tests: Arc<InMemoryTestCaseProvider>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Runlab API booting...");

    let config = RunlabConfig::load_default().context("Failed to load configuration")?;
    info!(
        sandbox_url = %config.sandbox_url,
        batch_size = config.batch.size,
        batch_interval_ms = config.batch.interval_ms,
        history_capacity = config.history_capacity,
        "Configuration loaded"
    );

    let metrics = Metrics::new();
    let events = EventBus::new();
    let code = Arc::new(InMemoryCodeProvider::new());
    let tests = Arc::new(InMemoryTestCaseProvider::new());

    let client = Arc::new(ExecutionClient::new(&config.sandbox_url, metrics.clone()));
    for (session_id, language) in config.session_languages() {
        client.set_session_language(&session_id, language);
    }

    let runner = TestRunner::new(
        client.clone(),
        tests.clone(),
        metrics.clone(),
        config.test_timeout_ms,
    );
    let orchestrator = Arc::new(Orchestrator::new(
        code.clone(),
        client.clone(),
        runner,
        metrics.clone(),
        events.clone(),
        Arc::new(SubmissionHistory::new(config.history_capacity)),
    ));
    let validation = Arc::new(ValidationEngine::new(
        client,
        events.clone(),
        config.validation.enabled,
    ));
    let batcher = Arc::new(QueueBatcher::new(
        orchestrator.clone(),
        metrics,
        config.batch.size,
        Duration::from_millis(config.batch.interval_ms),
    ));

    tokio::spawn(log_events(events.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let batcher_handle = batcher.clone().spawn(shutdown_rx);

    let state = Arc::new(AppState {
        orchestrator,
        batcher,
        validation,
        code,
        tests,
    });

    let app = routes::routes().with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = batcher_handle.await {
        error!(error = %e, "Queue batcher task failed");
    }

    info!("API shutdown complete");
    Ok(())
}

/// Presentation-side subscriber: every lifecycle event ends up in the log.
async fn log_events(mut rx: broadcast::Receiver<SubmissionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                SubmissionEvent::Start { submission_id, session_id, code_preview, .. } => {
                    info!(event = event.name(), submission_id = %submission_id, session_id = %session_id, preview = %code_preview, "Lifecycle event");
                }
                SubmissionEvent::Complete { submission_id, status, result, .. } => {
                    info!(event = event.name(), submission_id = %submission_id, status = ?status, execution_ms = result.execution_time_ms, "Lifecycle event");
                }
                SubmissionEvent::Error { submission_id, kind, message, .. } => {
                    warn!(event = event.name(), submission_id = %submission_id, kind = %kind, error = %message, "Lifecycle event");
                }
                SubmissionEvent::TestsComplete { submission_id, report } => {
                    info!(event = event.name(), submission_id = %submission_id, passed = report.passed, total = report.total, "Lifecycle event");
                }
                SubmissionEvent::TestsError { submission_id, message } => {
                    warn!(event = event.name(), submission_id = %submission_id, error = %message, "Lifecycle event");
                }
                SubmissionEvent::Validation { session_id, report } => {
                    debug!(event = event.name(), session_id = %session_id, errors = report.errors.len(), warnings = report.warnings.len(), "Lifecycle event");
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
