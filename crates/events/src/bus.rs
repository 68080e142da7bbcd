//! Outcome publish/subscribe abstraction (mechanics only).
//!
//! Lightweight contract: best-effort fan-out, at-least-once acceptable,
//! no persistence (job state is the source of truth, not the bus).

use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::outcome::JobOutcome;

/// Publish failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Internal lock poisoning; the bus is unusable until process restart.
    #[error("outcome bus lock poisoned")]
    Poisoned,
}

/// A subscription to the outcome stream. Each subscriber receives a copy of
/// every outcome published after it subscribed (broadcast semantics).
///
/// Designed for single-threaded consumption; a worker loop typically polls
/// with `recv_timeout` so it can interleave shutdown checks.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<JobOutcome>,
}

impl Subscription {
    pub fn new(receiver: Receiver<JobOutcome>) -> Self {
        Self { receiver }
    }

    /// Block until the next outcome is available.
    pub fn recv(&self) -> Result<JobOutcome, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an outcome without blocking.
    pub fn try_recv(&self) -> Result<JobOutcome, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for an outcome.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<JobOutcome, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Outcome distribution channel.
///
/// The executor writes to this after every terminal transition; metrics and
/// notification listeners subscribe. Implementations may be in-memory
/// channels or a message broker; consumers must be idempotent either way.
pub trait OutcomeBus: Send + Sync {
    fn publish(&self, outcome: JobOutcome) -> Result<(), PublishError>;

    fn subscribe(&self) -> Subscription;
}
