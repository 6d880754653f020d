//! In-memory OTP store
//!
//! Every operation runs in one critical section of a single async mutex,
//! which gives the same atomicity the PostgreSQL store gets from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::entities::{ConsumeOutcome, DeliveryAttempt, OtpRecord, OtpState};
use crate::errors::DomainError;

use super::r#trait::OtpStore;

#[derive(Default)]
struct Inner {
    // Insertion order: later entries are newer
    records: Vec<OtpRecord>,
    deliveries: Vec<DeliveryAttempt>,
}

impl Inner {
    fn newest_index(&self, identity: &str, purpose: &str) -> Option<usize> {
        self.records
            .iter()
            .rposition(|r| r.identity == identity && r.purpose == purpose)
    }
}

/// Process-local OTP store for single-instance deployments and tests
#[derive(Default)]
pub struct InMemoryOtpStore {
    inner: Mutex<Inner>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, in any state
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn issue(&self, record: OtpRecord) -> Result<OtpRecord, DomainError> {
        let mut inner = self.inner.lock().await;

        for existing in inner
            .records
            .iter_mut()
            .filter(|r| r.identity == record.identity && r.purpose == record.purpose)
        {
            existing.supersede();
        }

        inner.records.push(record.clone());
        Ok(record)
    }

    async fn consume(
        &self,
        identity: &str,
        purpose: &str,
        supplied_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, DomainError> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.newest_index(identity, purpose) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        Ok(inner.records[index].apply_attempt(supplied_code, now))
    }

    async fn find_active(
        &self,
        identity: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.newest_index(identity, purpose) else {
            return Ok(None);
        };

        let record = &mut inner.records[index];
        record.expire_if_due(now);
        Ok(if record.state == OtpState::Active {
            Some(record.clone())
        } else {
            None
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        if inner.deliveries.iter().any(|d| d.id == attempt.id) {
            return Err(DomainError::Internal {
                message: format!("Delivery attempt {} already recorded", attempt.id),
            });
        }
        inner.deliveries.push(attempt.clone());
        Ok(())
    }

    async fn update_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .deliveries
            .iter_mut()
            .find(|d| d.id == attempt.id)
            .ok_or_else(|| DomainError::NotFound {
                resource: format!("delivery attempt {}", attempt.id),
            })?;

        if stored.status.is_terminal() {
            return Err(DomainError::Internal {
                message: format!("Delivery attempt {} is already {}", stored.id, stored.status),
            });
        }

        *stored = attempt.clone();
        Ok(())
    }

    async fn latest_delivery(&self, otp_id: Uuid) -> Result<Option<DeliveryAttempt>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .deliveries
            .iter()
            .rev()
            .find(|d| d.otp_id == otp_id)
            .cloned())
    }

    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut inner = self.inner.lock().await;

        let purged: HashSet<Uuid> = inner
            .records
            .iter()
            .filter(|r| r.expires_at < older_than)
            .map(|r| r.id)
            .collect();

        inner.records.retain(|r| !purged.contains(&r.id));
        inner.deliveries.retain(|d| !purged.contains(&d.otp_id));

        Ok(purged.len() as u64)
    }
}
