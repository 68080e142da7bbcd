//! In-memory outcome bus for tests/dev and single-process deployments.

use std::sync::{Mutex, mpsc};

use crate::bus::{OutcomeBus, PublishError, Subscription};
use crate::outcome::JobOutcome;

/// In-memory pub/sub over std channels.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - Dead subscribers are dropped on publish
#[derive(Debug, Default)]
pub struct InMemoryOutcomeBus {
    subscribers: Mutex<Vec<mpsc::Sender<JobOutcome>>>,
}

impl InMemoryOutcomeBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeBus for InMemoryOutcomeBus {
    fn publish(&self, outcome: JobOutcome) -> Result<(), PublishError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| PublishError::Poisoned)?;

        subs.retain(|tx| tx.send(outcome.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();

        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}
