//! Payment/escrow gateway boundary.
//!
//! The gateway is an in-process interface: a production deployment maps it
//! onto whatever protocol the banking provider requires. Variants are chosen
//! once at process start and injected, never looked up by name at runtime.

pub mod gateway;
pub mod manual;
pub mod mock;
pub mod result;

pub use gateway::{EscrowGateway, PaymentGateway};
pub use manual::ManualEscrowGateway;
pub use mock::{MockGateway, MockGatewayConfig, FAILURE_REASONS};
pub use result::{GatewayResult, Metadata};
