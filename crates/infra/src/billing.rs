//! Platform subscription billing.
//!
//! Charges the platform fee through the payment gateway under the key
//! `subscription:{business}:{period}`, so a billing run can be re-executed
//! (cron overlap, worker restart) without double-charging anyone.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use payrun_core::{BusinessId, Money};
use payrun_gateway::{GatewayResult, Metadata, PaymentGateway};

use crate::idempotency::{IdempotencyError, IdempotencyStore};

/// Billing error.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error("stored billing result could not be decoded: {0}")]
    Codec(String),
}

/// Charges businesses their platform subscription fee.
pub struct SubscriptionBiller {
    gateway: Arc<dyn PaymentGateway>,
    idempotency: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl SubscriptionBiller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, idempotency: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            gateway,
            idempotency,
            // A billing period is at most a month; keep the record well past
            // any plausible re-run of the same run.
            ttl: Duration::from_secs(45 * 24 * 60 * 60),
        }
    }

    /// Charge `business` its fee for `period` (e.g. `"2024-03"`). Re-charging
    /// the same period returns the recorded result without a gateway call.
    pub fn charge(
        &self,
        business: BusinessId,
        amount: &Money,
        period: &str,
    ) -> Result<GatewayResult, BillingError> {
        let key = format!("subscription:{business}:{period}");

        let gateway = Arc::clone(&self.gateway);
        let amount = amount.clone();
        let mut metadata = Metadata::new();
        metadata.insert("business_id".to_string(), business.to_string());
        metadata.insert("period".to_string(), period.to_string());

        let mut op = move || -> anyhow::Result<JsonValue> {
            let result = gateway.charge_subscription(&amount, business, &metadata);
            Ok(serde_json::to_value(&result)?)
        };

        let value = self.idempotency.execute(&key, self.ttl, &mut op)?;
        let result: GatewayResult =
            serde_json::from_value(value).map_err(|e| BillingError::Codec(e.to_string()))?;

        match &result {
            GatewayResult::Success { .. } => {
                info!(%business, period, "subscription charge recorded")
            }
            GatewayResult::Failure { error, .. } => {
                warn!(%business, period, error = %error, "subscription charge failed")
            }
        }
        Ok(result)
    }
}
