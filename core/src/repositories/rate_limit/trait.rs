//! Rate limiter trait bounding issuance per identity and channel.

use async_trait::async_trait;

use crate::domain::entities::RateDecision;
use crate::domain::value_objects::Channel;
use crate::errors::DomainError;

/// Issuance limiter keyed by (identity, channel)
///
/// `check_and_increment` must be atomic: concurrent calls for one key may not
/// both observe the last free slot. Denied calls do not count.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one issuance attempt if the window has room
    async fn check_and_increment(
        &self,
        identity: &str,
        channel: Channel,
    ) -> Result<RateDecision, DomainError>;

    /// Forget all state for the key
    async fn reset(&self, identity: &str, channel: Channel) -> Result<(), DomainError>;
}
