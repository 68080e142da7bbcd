//! Outcome listener that maintains operational counters.
//!
//! Subscribes to the outcome bus and tallies terminal transitions per job
//! kind, plus failure reasons. Dashboards read snapshots; nothing here feeds
//! back into execution.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::info;

use payrun_events::{JobOutcome, OutcomeBus, Subscription};
use payrun_jobs::JobKind;

/// Counters over observed job outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobMetrics {
    pub payments_succeeded: u64,
    pub payments_failed: u64,
    pub payroll_succeeded: u64,
    pub payroll_failed: u64,
    /// Tally per failure reason, for the ops dashboard.
    pub failure_reasons: BTreeMap<String, u64>,
}

impl JobMetrics {
    fn apply(&mut self, outcome: &JobOutcome) {
        match (outcome.kind, outcome.success) {
            (JobKind::Payment, true) => self.payments_succeeded += 1,
            (JobKind::Payment, false) => self.payments_failed += 1,
            (JobKind::Payroll, true) => self.payroll_succeeded += 1,
            (JobKind::Payroll, false) => self.payroll_failed += 1,
        }
        if let Some(reason) = &outcome.failure_reason {
            *self.failure_reasons.entry(reason.clone()).or_insert(0) += 1;
        }
    }
}

/// Handle to the metrics worker: snapshot access + shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    metrics: Arc<Mutex<JobMetrics>>,
}

impl MetricsHandle {
    /// Current counters (copy).
    pub fn snapshot(&self) -> JobMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background outcome listener.
pub struct MetricsWorker;

impl MetricsWorker {
    /// Subscribe to `bus` and spawn the listener thread.
    pub fn spawn(bus: &dyn OutcomeBus) -> MetricsHandle {
        let subscription = bus.subscribe();
        let metrics = Arc::new(Mutex::new(JobMetrics::default()));
        let metrics_clone = Arc::clone(&metrics);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("metrics-worker".to_string())
            .spawn(move || listener_loop(subscription, shutdown_rx, metrics_clone))
            .expect("failed to spawn metrics worker thread");

        MetricsHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            metrics,
        }
    }
}

fn listener_loop(
    subscription: Subscription,
    shutdown_rx: mpsc::Receiver<()>,
    metrics: Arc<Mutex<JobMetrics>>,
) {
    let tick = Duration::from_millis(250);
    info!("metrics worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match subscription.recv_timeout(tick) {
            Ok(outcome) => {
                metrics.lock().unwrap().apply(&outcome);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("metrics worker stopped");
}
