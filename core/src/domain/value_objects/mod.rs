//! Value objects representing immutable domain concepts.

mod channel;

// Re-export commonly used types
pub use channel::Channel;
