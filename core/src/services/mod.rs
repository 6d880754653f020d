//! Business services containing the OTP lifecycle logic.

pub mod channel;
pub mod clock;
pub mod code_generator;
pub mod deadline;
pub mod delivery;
pub mod encryption;
pub mod otp;
pub mod sweeper;

// Re-export commonly used types
pub use channel::{
    ChannelAdapter, DeliveryResult, DestinationResolver, IdentityDestinationResolver,
    RenderedMessage,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code_generator::{Alphabet, CodeGenerator};
pub use delivery::{DeliveryDispatcher, DeliveryFailure, DispatchReport, RetryPolicy};
pub use encryption::{AesGcmCodeEncryption, CodeEncryption};
pub use otp::{
    CoordinatorConfig, DeliverySummary, OtpCoordinator, RequestOutcome, ResendOutcome,
    VerifyOutcome,
};
pub use sweeper::{OtpSweeper, SweepResult};
