//! Channel adapter abstraction and destination resolution

pub mod adapter;
pub mod destination;

#[cfg(test)]
pub mod mock;

pub use adapter::{ChannelAdapter, DeliveryResult, RenderedMessage};
pub use destination::{DestinationResolver, IdentityDestinationResolver};
