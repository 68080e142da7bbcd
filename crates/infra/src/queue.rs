//! Background job queue abstraction.
//!
//! At-least-once delivery: a message may be handed out more than once
//! (broker restarts, visibility timeouts), so execution must be idempotent,
//! which it is, via the idempotency store. The in-memory variant is FIFO and
//! non-blocking; workers poll it on an interval.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use payrun_jobs::JobId;

/// Queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
}

/// Job queue abstraction.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job_id: JobId) -> Result<(), QueueError>;

    /// Pop the next message, if any. Non-blocking.
    fn dequeue(&self) -> Result<Option<JobId>, QueueError>;

    fn len(&self) -> Result<usize, QueueError>;

    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

/// In-memory FIFO queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    messages: Mutex<VecDeque<JobId>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        self.messages.lock().unwrap().push_back(job_id);
        Ok(())
    }

    fn dequeue(&self) -> Result<Option<JobId>, QueueError> {
        Ok(self.messages.lock().unwrap().pop_front())
    }

    fn len(&self) -> Result<usize, QueueError> {
        Ok(self.messages.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let queue = InMemoryJobQueue::new();
        let a = JobId::new();
        let b = JobId::new();

        queue.enqueue(a).unwrap();
        queue.enqueue(b).unwrap();

        assert_eq!(queue.len().unwrap(), 2);
        assert_eq!(queue.dequeue().unwrap(), Some(a));
        assert_eq!(queue.dequeue().unwrap(), Some(b));
        assert_eq!(queue.dequeue().unwrap(), None);
    }

    #[test]
    fn duplicate_enqueue_is_allowed() {
        // At-least-once: the same message may sit in the queue twice;
        // idempotent execution makes that harmless.
        let queue = InMemoryJobQueue::new();
        let id = JobId::new();
        queue.enqueue(id).unwrap();
        queue.enqueue(id).unwrap();
        assert_eq!(queue.len().unwrap(), 2);
    }
}
