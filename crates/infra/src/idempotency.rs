//! Run-once protection for money-moving operations.
//!
//! The store maps a caller-chosen key to the stored result of one logical
//! operation. Re-executing with the same key within the record's lifetime
//! returns the stored result instead of re-running the operation, which makes
//! at-least-once queue delivery and worker restarts safe.
//!
//! The check-and-insert is atomic per key: concurrent callers with the same
//! key serialize on a per-key lock (the in-process analogue of a row lock
//! held across a transactional read-then-insert), so the wrapped operation
//! runs exactly once and every caller observes the same stored result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// The operation wrapped by [`IdempotencyStore::execute`].
///
/// Returns the serialized result to persist. If it errors, nothing is
/// persisted and the next call with the same key retries it.
pub type IdempotentOp<'a> = &'a mut dyn FnMut() -> anyhow::Result<JsonValue>;

/// Idempotency store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdempotencyError {
    /// The backing store could not be reached. Never swallowed: callers must
    /// decide whether to retry with backoff, not silently skip protection.
    #[error("idempotency backing store unavailable: {0}")]
    StoreUnavailable(String),
    /// The wrapped operation itself failed; no record was persisted.
    #[error("idempotent operation failed: {0}")]
    Operation(String),
}

/// One stored result with its expiry. Reads after expiry are misses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub value: JsonValue,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    fn live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Run-once store abstraction.
///
/// Backing storage is pluggable (durable table, key-value cache); behavior
/// must be identical for any backend.
pub trait IdempotencyStore: Send + Sync {
    /// Return the stored result for `key` if a live record exists; otherwise
    /// run `op` exactly once, persist its result with expiry `now + ttl`,
    /// and return it.
    fn execute(
        &self,
        key: &str,
        ttl: Duration,
        op: IdempotentOp<'_>,
    ) -> Result<JsonValue, IdempotencyError>;

    /// Side-effect-free lookup.
    fn check(&self, key: &str) -> Result<Option<JsonValue>, IdempotencyError>;

    /// Explicit write, for results computed outside the wrapped call.
    fn record(&self, key: &str, value: JsonValue, ttl: Duration) -> Result<(), IdempotencyError>;
}

/// In-memory implementation for tests/dev and single-process deployments.
///
/// Each key owns a slot behind its own mutex; `execute` holds the slot lock
/// across check → run → insert, which is the whole single-execution
/// guarantee. The outer map lock is only held long enough to fetch the slot.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    slots: Mutex<HashMap<String, Arc<Mutex<Option<IdempotencyRecord>>>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Option<IdempotencyRecord>>> {
        let mut slots = self.slots.lock().unwrap();
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn expiry(ttl: Duration) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn execute(
        &self,
        key: &str,
        ttl: Duration,
        op: IdempotentOp<'_>,
    ) -> Result<JsonValue, IdempotencyError> {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap();

        if let Some(record) = guard.as_ref() {
            if record.live_at(Utc::now()) {
                debug!(key, "idempotency hit, returning stored result");
                return Ok(record.value.clone());
            }
        }

        // Miss (or expired): run the operation while holding the key lock.
        // An operation error leaves the slot empty so the next call retries.
        let value = op().map_err(|e| IdempotencyError::Operation(e.to_string()))?;
        *guard = Some(IdempotencyRecord {
            value: value.clone(),
            expires_at: Self::expiry(ttl),
        });
        Ok(value)
    }

    fn check(&self, key: &str) -> Result<Option<JsonValue>, IdempotencyError> {
        let slot = self.slot(key);
        let guard = slot.lock().unwrap();
        Ok(guard
            .as_ref()
            .filter(|record| record.live_at(Utc::now()))
            .map(|record| record.value.clone()))
    }

    fn record(&self, key: &str, value: JsonValue, ttl: Duration) -> Result<(), IdempotencyError> {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap();
        *guard = Some(IdempotencyRecord {
            value,
            expires_at: Self::expiry(ttl),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn second_execute_returns_stored_result_without_rerunning() {
        let store = InMemoryIdempotencyStore::new();
        let calls = AtomicUsize::new(0);

        let mut op = || -> anyhow::Result<JsonValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"txn": "abc"}))
        };

        let first = store.execute("k1", TTL, &mut op).unwrap();
        let second = store.execute("k1", TTL, &mut op).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_run_independently() {
        let store = InMemoryIdempotencyStore::new();
        let calls = AtomicUsize::new(0);
        let mut op = || -> anyhow::Result<JsonValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(1))
        };

        store.execute("a", TTL, &mut op).unwrap();
        store.execute("b", TTL, &mut op).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_operations_are_not_persisted() {
        let store = InMemoryIdempotencyStore::new();
        let calls = AtomicUsize::new(0);

        let mut failing = || -> anyhow::Result<JsonValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("gateway exploded")
        };
        let err = store.execute("k", TTL, &mut failing).unwrap_err();
        assert!(matches!(err, IdempotencyError::Operation(_)));
        assert_eq!(store.check("k").unwrap(), None);

        // The next attempt retries the operation rather than returning a
        // failure placeholder.
        let mut ok = || -> anyhow::Result<JsonValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("recovered"))
        };
        assert_eq!(store.execute("k", TTL, &mut ok).unwrap(), json!("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn expired_records_are_misses() {
        let store = InMemoryIdempotencyStore::new();
        let calls = AtomicUsize::new(0);
        let mut op = || -> anyhow::Result<JsonValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(calls.load(Ordering::SeqCst)))
        };

        store.execute("k", Duration::ZERO, &mut op).unwrap();
        store.execute("k", Duration::ZERO, &mut op).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn check_and_record_round_trip() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.check("k").unwrap(), None);

        store.record("k", json!({"manual": true}), TTL).unwrap();
        assert_eq!(store.check("k").unwrap(), Some(json!({"manual": true})));

        // check never executes anything and never extends the record.
        let mut op = || -> anyhow::Result<JsonValue> { panic!("must not run") };
        let stored = store.execute("k", TTL, &mut op).unwrap();
        assert_eq!(stored, json!({"manual": true}));
    }

    #[test]
    fn racing_executes_with_one_key_run_the_operation_once() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                let mut op = || -> anyhow::Result<JsonValue> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Widen the race window.
                    thread::sleep(Duration::from_millis(20));
                    Ok(json!("winner"))
                };
                store.execute("contended", TTL, &mut op).unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), json!("winner"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
