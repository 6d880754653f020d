//! Delivery of codes through channel adapters
//!
//! The dispatcher renders a channel-specific message, calls the adapter under
//! a per-call timeout, retries transient failures with exponential backoff and
//! records a `DeliveryAttempt` for every dispatch.

pub mod dispatcher;
pub mod retry;
pub mod template;

#[cfg(test)]
mod tests;

pub use dispatcher::{DeliveryDispatcher, DeliveryFailure, DispatchReport};
pub use retry::RetryPolicy;
