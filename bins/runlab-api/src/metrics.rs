// Prometheus exposition of the pipeline metrics snapshot

use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};
use runlab_core::MetricsSnapshot;
use std::sync::Mutex;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    /// Held from the first gauge write until `gather`, so one exposition
    /// reflects exactly one snapshot.
    static ref RENDER_LOCK: Mutex<()> = Mutex::new(());
    static ref SUBMISSIONS_TOTAL: IntGauge =
        int_gauge("runlab_submissions_total", "Submissions registered");
    static ref SUBMISSIONS_SUCCESSFUL: IntGauge =
        int_gauge("runlab_submissions_successful", "Submissions whose execution succeeded");
    static ref SUBMISSIONS_FAILED: IntGauge =
        int_gauge("runlab_submissions_failed", "Submissions that ended in failure");
    static ref TESTS_PASSED: IntGauge = int_gauge("runlab_tests_passed", "Test cases passed");
    static ref TESTS_FAILED: IntGauge = int_gauge("runlab_tests_failed", "Test cases failed");
    static ref QUEUE_DEPTH: IntGauge = int_gauge("runlab_queue_depth", "Entries awaiting batch dispatch");
    static ref AVERAGE_EXECUTION_MS: Gauge = gauge(
        "runlab_average_execution_ms",
        "Running average execution time of successful submissions"
    );
    static ref SUCCESS_RATE: Gauge = gauge("runlab_success_rate", "Successful / total submissions, percent");
}

fn int_gauge(name: &str, help: &str) -> IntGauge {
    let metric = IntGauge::new(name, help).expect("valid metric definition");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric registered once");
    metric
}

fn gauge(name: &str, help: &str) -> Gauge {
    let metric = Gauge::new(name, help).expect("valid metric definition");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric registered once");
    metric
}

pub fn render(snapshot: &MetricsSnapshot) -> Result<String, prometheus::Error> {
    let guard = RENDER_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    SUBMISSIONS_TOTAL.set(snapshot.total_submissions as i64);
    SUBMISSIONS_SUCCESSFUL.set(snapshot.successful_submissions as i64);
    SUBMISSIONS_FAILED.set(snapshot.failed_submissions as i64);
    TESTS_PASSED.set(snapshot.tests_passed as i64);
    TESTS_FAILED.set(snapshot.tests_failed as i64);
    QUEUE_DEPTH.set(snapshot.queue_depth as i64);
    AVERAGE_EXECUTION_MS.set(snapshot.average_execution_time_ms);
    SUCCESS_RATE.set(snapshot.success_rate);

    let families = REGISTRY.gather();
    drop(guard);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
