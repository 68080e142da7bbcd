//! Mock gateway for tests and staging.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use payrun_core::{BusinessId, Currency, Money, ReceiverId};
use payrun_escrow::DepositId;

use crate::gateway::{EscrowGateway, PaymentGateway};
use crate::result::{GatewayResult, Metadata};

/// Failure reasons the mock picks from uniformly at random.
pub const FAILURE_REASONS: [&str; 5] = [
    "Insufficient funds in the source account",
    "Receiving bank rejected the transfer",
    "Receiver account details could not be verified",
    "Transaction limit exceeded for this account",
    "Banking network timeout, please retry",
];

/// Mock gateway configuration.
#[derive(Debug, Clone)]
pub struct MockGatewayConfig {
    /// Probability that a call succeeds, in `[0.0, 1.0]`.
    pub success_rate: f64,
    /// Simulated latency range in milliseconds; `None` disables sleeping
    /// (unit tests want deterministic timing).
    pub latency_ms: Option<(u64, u64)>,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.95,
            latency_ms: Some((100, 500)),
        }
    }
}

impl MockGatewayConfig {
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate;
        self
    }

    pub fn without_latency(mut self) -> Self {
        self.latency_ms = None;
        self
    }
}

/// Gateway that simulates a banking provider: configurable success rate,
/// 100–500 ms latency, and descriptive failure reasons.
///
/// Seed the RNG (`MockGateway::seeded`) for reproducible test runs.
pub struct MockGateway {
    config: MockGatewayConfig,
    rng: Mutex<StdRng>,
}

impl MockGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64, config: MockGatewayConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Every call succeeds, no latency. For the happy-path tests.
    pub fn always_succeeding() -> Self {
        Self::seeded(
            0,
            MockGatewayConfig::default()
                .with_success_rate(1.0)
                .without_latency(),
        )
    }

    /// Every call fails, no latency. For the compensation-path tests.
    pub fn always_failing() -> Self {
        Self::seeded(
            0,
            MockGatewayConfig::default()
                .with_success_rate(0.0)
                .without_latency(),
        )
    }

    fn simulate_call(&self, operation: &str) -> GatewayResult {
        let (succeeded, latency, reason_idx) = {
            let mut rng = self.rng.lock().unwrap();
            let succeeded = rng.gen_range(0.0..1.0) < self.config.success_rate;
            let latency = self
                .config
                .latency_ms
                .map(|(lo, hi)| rng.gen_range(lo..=hi));
            let reason_idx = rng.gen_range(0..FAILURE_REASONS.len());
            (succeeded, latency, reason_idx)
        };

        if let Some(ms) = latency {
            thread::sleep(Duration::from_millis(ms));
        }

        let mut metadata = Metadata::new();
        metadata.insert("provider".to_string(), "mock".to_string());
        metadata.insert("operation".to_string(), operation.to_string());

        if succeeded {
            let result = GatewayResult::success_with(format!("mock-txn-{}", Uuid::now_v7()), metadata);
            debug!(operation, "mock gateway call succeeded");
            result
        } else {
            let reason = FAILURE_REASONS[reason_idx];
            debug!(operation, reason, "mock gateway call failed");
            GatewayResult::failure_with(reason, metadata)
        }
    }
}

impl PaymentGateway for MockGateway {
    fn process_payment(
        &self,
        amount: &Money,
        receiver: ReceiverId,
        _metadata: &Metadata,
    ) -> GatewayResult {
        debug!(%amount, %receiver, "mock process_payment");
        self.simulate_call("process_payment")
    }

    fn charge_subscription(
        &self,
        amount: &Money,
        business: BusinessId,
        _metadata: &Metadata,
    ) -> GatewayResult {
        debug!(%amount, %business, "mock charge_subscription");
        self.simulate_call("charge_subscription")
    }
}

impl EscrowGateway for MockGateway {
    fn create_escrow_account(&self, business: BusinessId, currency: &Currency) -> GatewayResult {
        debug!(%business, %currency, "mock create_escrow_account");
        self.simulate_call("create_escrow_account")
    }

    fn process_deposit(&self, business: BusinessId, amount: &Money) -> GatewayResult {
        debug!(%business, %amount, "mock process_deposit");
        self.simulate_call("process_deposit")
    }

    fn release_fee(&self, deposit: DepositId, fee: &Money) -> GatewayResult {
        debug!(%deposit, %fee, "mock release_fee");
        self.simulate_call("release_fee")
    }

    fn return_funds(&self, deposit: DepositId, amount: &Money) -> GatewayResult {
        debug!(%deposit, %amount, "mock return_funds");
        self.simulate_call("return_funds")
    }
}
