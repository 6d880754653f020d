//! PostgreSQL implementation of the OTP store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use otp_core::domain::entities::{
    CodeCipher, ConsumeOutcome, DeliveryAttempt, DeliveryStatus, OtpRecord, OtpState,
};
use otp_core::errors::{DomainError, DomainResult};
use otp_core::repositories::OtpStore;
use otp_shared::utils::mask_identity;

use crate::InfrastructureError;

const RECORD_COLUMNS: &str = "id, identity, purpose, channel, code_hash, code_ciphertext, \
     code_nonce, code_key_id, state, attempts, max_attempts, created_at, expires_at, consumed_at";

const DELIVERY_COLUMNS: &str = "id, otp_id, channel, status, tries, provider_message_id, \
     error_detail, created_at, updated_at";

/// OTP store backed by PostgreSQL
///
/// The partial unique index `otp_records_one_active` enforces one active
/// record per (identity, purpose); `consume` holds a row lock for its
/// read-evaluate-write cycle.
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    /// Create a new store on an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<OtpRecord, DomainError> {
        let channel: String = row.try_get("channel").map_err(db_error)?;
        let state: String = row.try_get("state").map_err(db_error)?;
        let attempts: i32 = row.try_get("attempts").map_err(db_error)?;
        let max_attempts: i32 = row.try_get("max_attempts").map_err(db_error)?;

        Ok(OtpRecord {
            id: row.try_get("id").map_err(db_error)?,
            identity: row.try_get("identity").map_err(db_error)?,
            purpose: row.try_get("purpose").map_err(db_error)?,
            channel: channel.parse()?,
            code_hash: row.try_get("code_hash").map_err(db_error)?,
            code_cipher: CodeCipher {
                ciphertext: row.try_get("code_ciphertext").map_err(db_error)?,
                nonce: row.try_get("code_nonce").map_err(db_error)?,
                key_id: row.try_get("code_key_id").map_err(db_error)?,
            },
            state: state.parse()?,
            attempts: attempts.max(0) as u32,
            max_attempts: max_attempts.max(0) as u32,
            created_at: row.try_get("created_at").map_err(db_error)?,
            expires_at: row.try_get("expires_at").map_err(db_error)?,
            consumed_at: row.try_get("consumed_at").map_err(db_error)?,
        })
    }

    fn row_to_delivery(row: &PgRow) -> Result<DeliveryAttempt, DomainError> {
        let channel: String = row.try_get("channel").map_err(db_error)?;
        let status: String = row.try_get("status").map_err(db_error)?;
        let tries: i32 = row.try_get("tries").map_err(db_error)?;

        Ok(DeliveryAttempt {
            id: row.try_get("id").map_err(db_error)?,
            otp_id: row.try_get("otp_id").map_err(db_error)?,
            channel: channel.parse()?,
            status: status.parse()?,
            tries: tries.max(0) as u32,
            provider_message_id: row.try_get("provider_message_id").map_err(db_error)?,
            error_detail: row.try_get("error_detail").map_err(db_error)?,
            created_at: row.try_get("created_at").map_err(db_error)?,
            updated_at: row.try_get("updated_at").map_err(db_error)?,
        })
    }

    /// Newest record of the tuple, locked until the transaction ends
    async fn lock_newest(
        tx: &mut Transaction<'_, Postgres>,
        identity: &str,
        purpose: &str,
    ) -> DomainResult<Option<OtpRecord>> {
        let query = format!(
            "SELECT {} FROM otp_records \
             WHERE identity = $1 AND purpose = $2 \
             ORDER BY created_at DESC, (state = 'active') DESC \
             LIMIT 1 \
             FOR UPDATE",
            RECORD_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(identity)
            .bind(purpose)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn write_back(
        tx: &mut Transaction<'_, Postgres>,
        record: &OtpRecord,
    ) -> DomainResult<()> {
        sqlx::query(
            "UPDATE otp_records SET state = $2, attempts = $3, consumed_at = $4 WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.state.as_str())
        .bind(record.attempts as i32)
        .bind(record.consumed_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn issue(&self, record: OtpRecord) -> Result<OtpRecord, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let superseded = sqlx::query(
            "UPDATE otp_records SET state = 'superseded' \
             WHERE identity = $1 AND purpose = $2 AND state = 'active'",
        )
        .bind(&record.identity)
        .bind(&record.purpose)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .rows_affected();

        let query = format!(
            "INSERT INTO otp_records ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            RECORD_COLUMNS
        );
        sqlx::query(&query)
            .bind(record.id)
            .bind(&record.identity)
            .bind(&record.purpose)
            .bind(record.channel.as_str())
            .bind(&record.code_hash)
            .bind(&record.code_cipher.ciphertext)
            .bind(&record.code_cipher.nonce)
            .bind(&record.code_cipher.key_id)
            .bind(record.state.as_str())
            .bind(record.attempts as i32)
            .bind(record.max_attempts as i32)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.consumed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(
                    identity = %mask_identity(&record.identity),
                    purpose = %record.purpose,
                    error = %e,
                    "Failed to insert OTP record"
                );
                db_error(e)
            })?;

        tx.commit().await.map_err(db_error)?;

        debug!(
            otp_id = %record.id,
            superseded = superseded,
            "Stored OTP record"
        );
        Ok(record)
    }

    async fn consume(
        &self,
        identity: &str,
        purpose: &str,
        supplied_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let Some(mut record) = Self::lock_newest(&mut tx, identity, purpose).await? else {
            tx.rollback().await.map_err(db_error)?;
            return Ok(ConsumeOutcome::NotFound);
        };

        let before = (record.state, record.attempts);
        let outcome = record.apply_attempt(supplied_code, now);

        if (record.state, record.attempts) != before {
            Self::write_back(&mut tx, &record).await?;
        }
        tx.commit().await.map_err(db_error)?;

        Ok(outcome)
    }

    async fn find_active(
        &self,
        identity: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let Some(mut record) = Self::lock_newest(&mut tx, identity, purpose).await? else {
            tx.rollback().await.map_err(db_error)?;
            return Ok(None);
        };

        if record.expire_if_due(now) {
            Self::write_back(&mut tx, &record).await?;
        }
        tx.commit().await.map_err(db_error)?;

        Ok((record.state == OtpState::Active).then_some(record))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError> {
        let query = format!("SELECT {} FROM otp_records WHERE id = $1", RECORD_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        let query = format!(
            "INSERT INTO otp_delivery_attempts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            DELIVERY_COLUMNS
        );
        sqlx::query(&query)
            .bind(attempt.id)
            .bind(attempt.otp_id)
            .bind(attempt.channel.as_str())
            .bind(attempt.status.as_str())
            .bind(attempt.tries as i32)
            .bind(&attempt.provider_message_id)
            .bind(&attempt.error_detail)
            .bind(attempt.created_at)
            .bind(attempt.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn update_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        let updated = sqlx::query(
            "UPDATE otp_delivery_attempts \
             SET status = $2, tries = $3, provider_message_id = $4, error_detail = $5, updated_at = $6 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(attempt.tries as i32)
        .bind(&attempt.provider_message_id)
        .bind(&attempt.error_detail)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM otp_delivery_attempts WHERE id = $1")
                .bind(attempt.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match status {
            None => Err(DomainError::NotFound {
                resource: format!("delivery attempt {}", attempt.id),
            }),
            Some(status) => {
                let status: DeliveryStatus = status.parse()?;
                Err(DomainError::Internal {
                    message: format!("Delivery attempt {} is already {}", attempt.id, status),
                })
            }
        }
    }

    async fn latest_delivery(&self, otp_id: Uuid) -> Result<Option<DeliveryAttempt>, DomainError> {
        let query = format!(
            "SELECT {} FROM otp_delivery_attempts WHERE otp_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
            DELIVERY_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(otp_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(Self::row_to_delivery).transpose()
    }

    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        // Delivery attempts go with their record (ON DELETE CASCADE)
        let purged = sqlx::query("DELETE FROM otp_records WHERE expires_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        Ok(purged)
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    InfrastructureError::Database(e).into()
}
