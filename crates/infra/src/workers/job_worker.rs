//! Queue-consuming worker loop.
//!
//! On startup the worker runs a reconciliation pass (the "worker starting"
//! signal), then polls the queue and hands each message to the executor.
//! Reconciliation re-runs on a timer so a queue restart heals itself.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::executor::JobExecutor;
use crate::queue::JobQueue;
use crate::sync::JobSyncService;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// How often to poll an empty queue.
    pub poll_interval: Duration,
    /// How often to re-run reconciliation.
    pub sync_interval: Duration,
    /// Name for logging and the thread.
    pub name: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            sync_interval: Duration::from_secs(30),
            name: "job-worker".to_string(),
        }
    }
}

impl JobWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

/// Handle to control and join a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background queue consumer.
pub struct JobWorker;

impl JobWorker {
    /// Spawn the worker thread.
    pub fn spawn(
        config: JobWorkerConfig,
        executor: Arc<JobExecutor>,
        sync: Arc<JobSyncService>,
        queue: Arc<dyn JobQueue>,
    ) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(config, executor, sync, queue, shutdown_rx))
            .expect("failed to spawn job worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop(
    config: JobWorkerConfig,
    executor: Arc<JobExecutor>,
    sync: Arc<JobSyncService>,
    queue: Arc<dyn JobQueue>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    info!(worker = %config.name, "job worker started");

    // Startup reconciliation: must never block or kill the worker.
    let report = sync.sync_all(Utc::now());
    info!(worker = %config.name, synced = report.total(), "startup sync completed");
    let mut last_sync = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if last_sync.elapsed() >= config.sync_interval {
            sync.sync_all(Utc::now());
            last_sync = Instant::now();
        }

        match queue.dequeue() {
            Ok(Some(job_id)) => match executor.execute(job_id) {
                Ok(report) => {
                    info!(worker = %config.name, job_id = %job_id, status = ?report.status, "job settled");
                }
                Err(e) => {
                    // The job may be stuck in processing; leave it visible
                    // for recovery inspection rather than guessing.
                    error!(worker = %config.name, job_id = %job_id, error = %e, "job execution aborted");
                }
            },
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                warn!(worker = %config.name, error = %e, "queue unavailable");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "job worker stopped");
}
