//! OTP store trait defining persistence of records and delivery attempts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::{ConsumeOutcome, DeliveryAttempt, OtpRecord};
use crate::errors::DomainError;

/// Persistence contract for OTP records and their delivery attempts
///
/// Implementations own the one-active-record-per-(identity, purpose)
/// invariant and the consume-once guarantee:
/// - `issue` supersedes any active record for the tuple and inserts the new
///   one in a single atomic step
/// - `consume` reads, evaluates and writes back under an exclusive lock, so
///   two concurrent consumes of the same code cannot both succeed
/// - any read that finds an active record past its expiry moves it to
///   `expired`
///
/// Races that cannot be serialised surface as `OtpError::StoreConflict`.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Supersede the active record for the tuple (if any) and insert `record`
    ///
    /// # Returns
    /// * `Ok(OtpRecord)` - The stored record
    /// * `Err(DomainError)` - `StoreConflict` when a concurrent issue won the race
    async fn issue(&self, record: OtpRecord) -> Result<OtpRecord, DomainError>;

    /// Present a code for the newest record of (identity, purpose)
    ///
    /// A match consumes the record. A mismatch increments its attempt counter;
    /// the mismatch that reaches `max_attempts` locks it out.
    async fn consume(
        &self,
        identity: &str,
        purpose: &str,
        supplied_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, DomainError>;

    /// Newest record for the tuple if it is active at `now`
    async fn find_active(
        &self,
        identity: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError>;

    /// Look up a record by id regardless of state
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError>;

    /// Persist a new (pending) delivery attempt
    async fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError>;

    /// Store the outcome of a pending attempt. Terminal attempts are immutable.
    async fn update_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError>;

    /// Most recent delivery attempt for a record
    async fn latest_delivery(&self, otp_id: Uuid) -> Result<Option<DeliveryAttempt>, DomainError>;

    /// Delete records (and their attempts) that expired before `older_than`
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of records removed
    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError>;
}
