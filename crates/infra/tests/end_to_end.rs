//! End-to-end scenarios: schedule → sync → queue → executor → escrow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use payrun_core::{BusinessId, Currency, Money, ReceiverId};
use payrun_escrow::DepositState;
use payrun_events::InMemoryOutcomeBus;
use payrun_gateway::{
    GatewayResult, Metadata, MockGateway, MockGatewayConfig, PaymentGateway, FAILURE_REASONS,
};
use payrun_infra::{
    EscrowStore, InMemoryEscrowStore, InMemoryIdempotencyStore, InMemoryJobQueue,
    InMemoryJobStore, InMemoryScheduleStore, JobExecutor, JobExecutorConfig, JobQueue, JobStore,
    JobSyncService, JobWorker, JobWorkerConfig, MetricsWorker, ScheduleStore,
};
use payrun_jobs::{Job, JobKind, JobStatus};
use payrun_schedule::{Frequency, Schedule};

fn zar(s: &str) -> Money {
    Money::new(s.parse().unwrap(), Currency::new("ZAR").unwrap())
}

struct Pipeline {
    jobs: Arc<InMemoryJobStore>,
    schedules: Arc<InMemoryScheduleStore>,
    escrow: Arc<InMemoryEscrowStore>,
    idempotency: Arc<InMemoryIdempotencyStore>,
    queue: Arc<InMemoryJobQueue>,
    bus: Arc<InMemoryOutcomeBus>,
    business: BusinessId,
}

impl Pipeline {
    fn new() -> Self {
        payrun_observability::init();

        let escrow = InMemoryEscrowStore::arc();
        let business = BusinessId::new();
        escrow
            .open_account(business, Currency::new("ZAR").unwrap())
            .unwrap();
        escrow.top_up(business, zar("10000.00")).unwrap();

        Self {
            jobs: InMemoryJobStore::arc(),
            schedules: InMemoryScheduleStore::arc(),
            escrow,
            idempotency: InMemoryIdempotencyStore::arc(),
            queue: InMemoryJobQueue::arc(),
            bus: Arc::new(InMemoryOutcomeBus::new()),
            business,
        }
    }

    fn executor(&self, gateway: Arc<dyn PaymentGateway>) -> Arc<JobExecutor> {
        Arc::new(JobExecutor::new(
            self.jobs.clone(),
            self.schedules.clone(),
            self.escrow.clone(),
            self.idempotency.clone(),
            gateway,
            self.bus.clone(),
            JobExecutorConfig::default(),
        ))
    }

    fn sync_service(&self) -> Arc<JobSyncService> {
        Arc::new(JobSyncService::new(
            self.jobs.clone(),
            self.schedules.clone(),
            self.queue.clone(),
        ))
    }

    /// A due schedule with one funded pending job hanging off it.
    fn seed_job(
        &self,
        kind: JobKind,
        amount: Money,
        fee: Money,
        first_run: DateTime<Utc>,
        frequency: Frequency,
    ) -> Job {
        let schedule = Schedule::new(self.business, frequency, amount.clone(), first_run);
        let schedule_id = self.schedules.insert(schedule).unwrap();

        let deposit_id = self
            .escrow
            .fund_deposit(self.business, amount.clone(), fee.clone(), Utc::now())
            .unwrap();

        let job = Job::new(
            schedule_id,
            self.business,
            ReceiverId::new(),
            kind,
            amount,
            fee,
        )
        .unwrap()
        .with_deposit(deposit_id);
        self.jobs.insert(job.clone()).unwrap();
        job
    }
}

/// Scenario A: monthly schedule due on 2024-01-31 executes against a fully
/// reliable gateway, and the next run is the month-end-aware 2024-02-29.
#[test]
fn monthly_payment_succeeds_and_advances_month_end_aware() {
    let p = Pipeline::new();
    let first_run = Utc.with_ymd_and_hms(2024, 1, 31, 6, 0, 0).unwrap();
    let job = p.seed_job(
        JobKind::Payment,
        zar("1000.00"),
        zar("25.00"),
        first_run,
        Frequency::Monthly,
    );

    let gateway = Arc::new(MockGateway::seeded(
        1,
        MockGatewayConfig::default()
            .with_success_rate(1.0)
            .without_latency(),
    ));
    let executor = p.executor(gateway);

    // Sync reflects the due job in the queue exactly once.
    let report = p.sync_service().sync_all(Utc::now());
    assert_eq!(report.payment_jobs.synced, 1);
    assert_eq!(p.sync_service().sync_all(Utc::now()).total(), 0);

    let job_id = p.queue.dequeue().unwrap().unwrap();
    let outcome = executor.execute(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert!(outcome.transaction_id.is_some());

    let deposit = p
        .escrow
        .deposit(p.business, job.escrow_deposit_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(deposit.state, DepositState::Released);

    let schedule = p.schedules.get(job.schedule_id).unwrap().unwrap();
    assert_eq!(
        schedule.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap())
    );
}

/// Scenario B: the same shape with a fully failing gateway: the job fails
/// with one of the defined reasons and the business's available balance is
/// restored by the full 1000.00 ZAR.
#[test]
fn failed_payment_returns_escrow_to_the_business() {
    let p = Pipeline::new();
    let first_run = Utc.with_ymd_and_hms(2024, 1, 31, 6, 0, 0).unwrap();
    let job = p.seed_job(
        JobKind::Payment,
        zar("1000.00"),
        zar("0.00"),
        first_run,
        Frequency::Monthly,
    );

    let balance_before = p.escrow.available_balance(p.business).unwrap();
    assert_eq!(balance_before, zar("9000.00"));

    let gateway = Arc::new(MockGateway::seeded(
        2,
        MockGatewayConfig::default()
            .with_success_rate(0.0)
            .without_latency(),
    ));
    let executor = p.executor(gateway);

    p.sync_service().sync_all(Utc::now());
    let job_id = p.queue.dequeue().unwrap().unwrap();
    let outcome = executor.execute(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    let reason = outcome.error_message.unwrap();
    assert!(FAILURE_REASONS.contains(&reason.as_str()), "unexpected reason: {reason}");

    let deposit = p
        .escrow
        .deposit(p.business, job.escrow_deposit_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(deposit.state, DepositState::Returned);
    assert_eq!(p.escrow.available_balance(p.business).unwrap(), zar("10000.00"));
}

/// Scenario C: two workers race the same job id; the gateway is called
/// exactly once and both observe the same terminal result.
#[test]
fn racing_workers_converge_on_one_gateway_call() {
    struct SlowCountingGateway {
        calls: AtomicUsize,
    }

    impl PaymentGateway for SlowCountingGateway {
        fn process_payment(
            &self,
            _amount: &Money,
            _receiver: ReceiverId,
            _metadata: &Metadata,
        ) -> GatewayResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window.
            thread::sleep(Duration::from_millis(50));
            GatewayResult::success("txn-raced")
        }

        fn charge_subscription(
            &self,
            _amount: &Money,
            _business: BusinessId,
            _metadata: &Metadata,
        ) -> GatewayResult {
            GatewayResult::failure("unused")
        }
    }

    let p = Pipeline::new();
    let job = p.seed_job(
        JobKind::Payment,
        zar("1000.00"),
        zar("25.00"),
        Utc::now(),
        Frequency::Monthly,
    );

    let gateway = Arc::new(SlowCountingGateway {
        calls: AtomicUsize::new(0),
    });
    let executor = p.executor(gateway.clone());

    let mut handles = Vec::new();
    for _ in 0..2 {
        let executor = Arc::clone(&executor);
        let job_id = job.id;
        handles.push(thread::spawn(move || executor.execute(job_id).unwrap()));
    }
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    for report in &reports {
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.transaction_id.as_deref(), Some("txn-raced"));
    }

    // The fee left escrow exactly once.
    assert_eq!(p.escrow.available_balance(p.business).unwrap(), zar("8975.00"));
    let deposit = p
        .escrow
        .deposit(p.business, job.escrow_deposit_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(deposit.state, DepositState::Released);
}

/// The full worker pipeline: startup sync discovers due jobs, the worker
/// drains the queue, the metrics listener tallies the outcomes.
#[test]
fn worker_drains_due_jobs_and_metrics_observe_them() {
    let p = Pipeline::new();
    let now = Utc::now();
    let payment = p.seed_job(
        JobKind::Payment,
        zar("500.00"),
        zar("10.00"),
        now - chrono::Duration::hours(1),
        Frequency::Monthly,
    );
    let payroll = p.seed_job(
        JobKind::Payroll,
        zar("800.00"),
        zar("0.00"),
        now - chrono::Duration::hours(1),
        Frequency::Fortnightly,
    );

    let metrics = MetricsWorker::spawn(p.bus.as_ref());

    let executor = p.executor(Arc::new(MockGateway::seeded(
        3,
        MockGatewayConfig::default()
            .with_success_rate(1.0)
            .without_latency(),
    )));
    let worker = JobWorker::spawn(
        JobWorkerConfig::default().with_name("e2e-worker"),
        executor,
        p.sync_service(),
        p.queue.clone(),
    );

    // Wait for both jobs to settle.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let done = [payment.id, payroll.id].iter().all(|id| {
            p.jobs
                .get(*id)
                .unwrap()
                .map(|j| j.status.is_terminal())
                .unwrap_or(false)
        });
        if done {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "jobs did not settle in time"
        );
        thread::sleep(Duration::from_millis(20));
    }
    worker.shutdown();

    assert_eq!(
        p.jobs.get(payment.id).unwrap().unwrap().status,
        JobStatus::Succeeded
    );
    assert_eq!(
        p.jobs.get(payroll.id).unwrap().unwrap().status,
        JobStatus::Succeeded
    );

    // Metrics are asynchronous; poll briefly.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = metrics.snapshot();
        if snapshot.payments_succeeded == 1 && snapshot.payroll_succeeded == 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "metrics did not observe the outcomes: {snapshot:?}"
        );
        thread::sleep(Duration::from_millis(20));
    }
    metrics.shutdown();
}
