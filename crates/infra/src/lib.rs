//! Infrastructure for the payment execution core.
//!
//! ## Components
//!
//! - `idempotency`: run-once protection for money-moving operations
//! - `store`: persistence traits + in-memory implementations
//!   (jobs, schedules, escrow accounts)
//! - `queue`: at-least-once background job queue abstraction
//! - `executor`: the job state machine (claim → gateway → settle escrow)
//! - `sync`: reconciliation between due jobs and the queue
//! - `billing`: platform subscription charges under idempotency keys
//! - `workers`: background loops (job worker, metrics listener)
//!
//! Everything is injected explicitly: gateways, stores and buses are
//! constructor parameters, never global lookups.

pub mod billing;
pub mod executor;
pub mod idempotency;
pub mod queue;
pub mod store;
pub mod sync;
pub mod workers;

pub use billing::{BillingError, SubscriptionBiller};
pub use executor::{ExecuteError, ExecutionReport, JobExecutor, JobExecutorConfig};
pub use idempotency::{
    IdempotencyError, IdempotencyRecord, IdempotencyStore, IdempotentOp,
    InMemoryIdempotencyStore,
};
pub use queue::{InMemoryJobQueue, JobQueue, QueueError};
pub use store::escrow::{EscrowStore, EscrowStoreError, InMemoryEscrowStore};
pub use store::jobs::{ClaimOutcome, InMemoryJobStore, JobStore, JobStoreError};
pub use store::schedules::{InMemoryScheduleStore, ScheduleStore, ScheduleStoreError};
pub use sync::{JobSyncService, SyncCount, SyncReport};
pub use workers::job_worker::{JobWorker, JobWorkerConfig, WorkerHandle};
pub use workers::metrics_worker::{JobMetrics, MetricsHandle, MetricsWorker};
