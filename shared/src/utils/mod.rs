//! Identity validation and masking utilities

pub mod identity;
pub mod phone;
pub mod validation;

// Re-export commonly used utilities
pub use identity::*;
pub use phone::*;
pub use validation::*;
