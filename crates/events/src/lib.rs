//! Job outcome events and their distribution channel.
//!
//! The executor publishes one [`JobOutcome`] per terminal transition on an
//! explicitly injected bus; there is no global dispatcher. Consumers
//! (metrics, notifications) subscribe and must tolerate at-least-once
//! delivery.

pub mod bus;
pub mod in_memory_bus;
pub mod outcome;

pub use bus::{OutcomeBus, PublishError, Subscription};
pub use in_memory_bus::InMemoryOutcomeBus;
pub use outcome::JobOutcome;
