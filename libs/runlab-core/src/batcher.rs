/// Queue Batcher - Deferred Submission Dispatch
///
/// Entries wait in an unbounded FIFO. Every tick drains up to `batch_size`
/// of them and dispatches the batch concurrently, waiting for every entry to
/// settle. A failing or panicking entry never cancels its siblings.
///
/// State machine: Idle -> Draining -> Idle. A tick that finds the batcher
/// Draining does nothing.
use crate::metrics::Metrics;
use crate::orchestrator::{Orchestrator, SubmitOutcome};
use async_trait::async_trait;
use futures_util::future::join_all;
use runlab_common::types::{BatchQueueEntry, SubmitOptions};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Anything that can run one submission to completion.
#[async_trait]
pub trait SubmissionDispatcher: Send + Sync {
    async fn dispatch(&self, session_id: &str, options: SubmitOptions) -> SubmitOutcome;
}

#[async_trait]
impl SubmissionDispatcher for Orchestrator {
    async fn dispatch(&self, session_id: &str, options: SubmitOptions) -> SubmitOutcome {
        self.submit(session_id, Some(options)).await
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another drain was still running.
    Skipped,
    Drained {
        /// Session ids in dispatch (FIFO) order.
        sessions: Vec<String>,
        succeeded: usize,
        failed: usize,
    },
}

/// Returns the batcher to Idle when dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct QueueBatcher {
    dispatcher: Arc<dyn SubmissionDispatcher>,
    queue: Mutex<VecDeque<BatchQueueEntry>>,
    draining: AtomicBool,
    batch_size: usize,
    interval: Duration,
    metrics: Metrics,
}

impl QueueBatcher {
    pub fn new(
        dispatcher: Arc<dyn SubmissionDispatcher>,
        metrics: Metrics,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            batch_size: batch_size.max(1),
            interval,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BatchQueueEntry>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, session_id: &str, options: SubmitOptions) -> usize {
        let depth = {
            let mut queue = self.lock();
            queue.push_back(BatchQueueEntry {
                session_id: session_id.to_string(),
                options,
            });
            queue.len()
        };
        self.metrics.set_queue_depth(depth);
        debug!(session_id = session_id, queue_depth = depth, "Submission queued");
        depth
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Drain and dispatch one batch, unless a drain is already running.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress, skipping tick");
            return TickOutcome::Skipped;
        }
        let _idle = DrainGuard(&self.draining);

        let (batch, remaining) = {
            let mut queue = self.lock();
            let take = self.batch_size.min(queue.len());
            let batch: Vec<BatchQueueEntry> = queue.drain(..take).collect();
            (batch, queue.len())
        };
        self.metrics.set_queue_depth(remaining);

        let sessions: Vec<String> = batch.iter().map(|e| e.session_id.clone()).collect();
        if batch.is_empty() {
            return TickOutcome::Drained {
                sessions,
                succeeded: 0,
                failed: 0,
            };
        }

        info!(batch_size = batch.len(), queue_depth = remaining, "Draining batch");

        // Each entry runs as its own task so a panic stays contained.
        let handles: Vec<JoinHandle<SubmitOutcome>> = batch
            .into_iter()
            .map(|entry| {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&entry.session_id, entry.options).await
                })
            })
            .collect();

        let mut succeeded = 0;
        let mut failed = 0;
        for (session_id, joined) in sessions.iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) if outcome.success => succeeded += 1,
                Ok(outcome) => {
                    failed += 1;
                    debug!(
                        session_id = %session_id,
                        submission_id = %outcome.submission_id,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "Queued submission failed"
                    );
                }
                Err(e) => {
                    failed += 1;
                    error!(session_id = %session_id, error = %e, "Queued submission task aborted");
                }
            }
        }

        info!(succeeded = succeeded, failed = failed, "Batch settled");
        TickOutcome::Drained {
            sessions,
            succeeded,
            failed,
        }
    }

    /// Start the periodic ticker. Each tick runs as its own task, so a tick
    /// that fires during a slow drain observes Draining and returns.
    ///
    /// On shutdown no further ticks start, and the returned handle resolves
    /// only after every in-flight drain has settled.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = JoinSet::new();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                batch_size = self.batch_size,
                interval_ms = self.interval.as_millis() as u64,
                "Queue batcher started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let batcher = self.clone();
                        ticks.spawn(async move {
                            batcher.tick().await;
                        });
                    }
                    Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "Batch tick task failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            if !ticks.is_empty() {
                debug!(pending = ticks.len(), "Waiting for in-flight drain");
            }
            while let Some(joined) = ticks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Batch tick task failed");
                }
            }

            info!(queue_depth = self.len(), "Queue batcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl SubmissionDispatcher for RecordingDispatcher {
        async fn dispatch(&self, session_id: &str, _options: SubmitOptions) -> SubmitOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.calls.lock().unwrap().push(session_id.to_string());
            self.active.fetch_sub(1, Ordering::SeqCst);

            if session_id == "panic" {
                panic!("dispatcher blew up");
            }
            SubmitOutcome {
                success: !session_id.starts_with("bad"),
                submission_id: Uuid::new_v4(),
                result: None,
                test_report: None,
                error: None,
            }
        }
    }

    fn batcher(dispatcher: Arc<RecordingDispatcher>, batch_size: usize) -> QueueBatcher {
        QueueBatcher::new(dispatcher, Metrics::new(), batch_size, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_twelve_entries_drain_in_three_ticks() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let batcher = batcher(dispatcher.clone(), 5);
        for i in 0..12 {
            batcher.enqueue(&format!("s{}", i), SubmitOptions::default());
        }

        let expected = |range: std::ops::Range<usize>| -> Vec<String> {
            range.map(|i| format!("s{}", i)).collect()
        };

        for (tick, range) in [(0, 0..5), (1, 5..10), (2, 10..12)] {
            match batcher.tick().await {
                TickOutcome::Drained { sessions, succeeded, failed } => {
                    assert_eq!(sessions, expected(range.clone()), "tick {}", tick);
                    assert_eq!(succeeded, range.len());
                    assert_eq!(failed, 0);
                }
                TickOutcome::Skipped => panic!("tick {} skipped", tick),
            }
        }

        assert!(batcher.is_empty());
        assert_eq!(batcher.metrics.snapshot().queue_depth, 0);

        let mut calls = dispatcher.calls.lock().unwrap().clone();
        calls.sort();
        let mut all = expected(0..12);
        all.sort();
        assert_eq!(calls, all);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_noop() {
        let dispatcher = Arc::new(RecordingDispatcher {
            delay_ms: 50,
            ..Default::default()
        });
        let batcher = batcher(dispatcher.clone(), 2);
        for i in 0..4 {
            batcher.enqueue(&format!("s{}", i), SubmitOptions::default());
        }

        let (first, second) = tokio::join!(batcher.tick(), batcher.tick());
        assert!(matches!(first, TickOutcome::Drained { .. }));
        assert_eq!(second, TickOutcome::Skipped);
        assert!(!batcher.is_draining());
        assert_eq!(batcher.len(), 2);

        // The batch itself runs concurrently.
        assert_eq!(dispatcher.max_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let batcher = batcher(dispatcher.clone(), 5);
        for session in ["ok1", "bad1", "panic", "ok2"] {
            batcher.enqueue(session, SubmitOptions::default());
        }

        match batcher.tick().await {
            TickOutcome::Drained { succeeded, failed, .. } => {
                assert_eq!(succeeded, 2);
                assert_eq!(failed, 2);
            }
            TickOutcome::Skipped => panic!("unexpected skip"),
        }
        assert!(!batcher.is_draining());
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 4);

        batcher.enqueue("ok3", SubmitOptions::default());
        assert!(matches!(batcher.tick().await, TickOutcome::Drained { succeeded: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_tick() {
        let batcher = batcher(Arc::new(RecordingDispatcher::default()), 5);
        assert_eq!(
            batcher.tick().await,
            TickOutcome::Drained {
                sessions: Vec::new(),
                succeeded: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_spawned_ticker_drains_and_stops() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let batcher = Arc::new(batcher(dispatcher.clone(), 5));
        for i in 0..7 {
            batcher.enqueue(&format!("s{}", i), SubmitOptions::default());
        }

        let (tx, rx) = watch::channel(false);
        let handle = batcher.clone().spawn(rx);

        for _ in 0..100 {
            if dispatcher.calls.lock().unwrap().len() == 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 7);
        assert!(batcher.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_inflight_drain() {
        let dispatcher = Arc::new(RecordingDispatcher {
            delay_ms: 300,
            ..Default::default()
        });
        let batcher = Arc::new(batcher(dispatcher.clone(), 5));
        for i in 0..3 {
            batcher.enqueue(&format!("s{}", i), SubmitOptions::default());
        }

        let (tx, rx) = watch::channel(false);
        let handle = batcher.clone().spawn(rx);

        for _ in 0..100 {
            if batcher.is_draining() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(batcher.is_draining());
        assert!(batcher.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!batcher.is_draining());
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 3);
    }
}
