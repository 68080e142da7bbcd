//! Gateway call outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provider metadata attached to a gateway outcome.
pub type Metadata = BTreeMap<String, String>;

/// Outcome of a single gateway call.
///
/// Tagged: a result is either a success carrying a transaction identifier or
/// a failure carrying an error message, never both. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GatewayResult {
    Success {
        transaction_id: String,
        #[serde(default)]
        metadata: Metadata,
    },
    Failure {
        error: String,
        #[serde(default)]
        metadata: Metadata,
    },
}

impl GatewayResult {
    pub fn success(transaction_id: impl Into<String>) -> Self {
        Self::Success {
            transaction_id: transaction_id.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn success_with(transaction_id: impl Into<String>, metadata: Metadata) -> Self {
        Self::Success {
            transaction_id: transaction_id.into(),
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn failure_with(error: impl Into<String>, metadata: Metadata) -> Self {
        Self::Failure {
            error: error.into(),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GatewayResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            GatewayResult::Success { transaction_id, .. } => Some(transaction_id),
            GatewayResult::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GatewayResult::Success { .. } => None,
            GatewayResult::Failure { error, .. } => Some(error),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            GatewayResult::Success { metadata, .. } => metadata,
            GatewayResult::Failure { metadata, .. } => metadata,
        }
    }
}
