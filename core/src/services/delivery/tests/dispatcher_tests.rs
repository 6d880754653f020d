//! Unit tests for the delivery dispatcher

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::entities::{CodeCipher, ConsumeOutcome, DeliveryAttempt, DeliveryStatus, OtpRecord};
use crate::domain::value_objects::Channel;
use crate::errors::{DomainError, OtpError};
use crate::repositories::{InMemoryOtpStore, OtpStore};
use crate::services::channel::mock::ScriptedChannelAdapter;
use crate::services::channel::{DeliveryResult, IdentityDestinationResolver};
use crate::services::clock::SystemClock;
use crate::services::delivery::{DeliveryDispatcher, DeliveryFailure, RetryPolicy};

async fn issued(store: &InMemoryOtpStore, identity: &str, channel: Channel) -> OtpRecord {
    let record = OtpRecord::new(
        identity,
        "login",
        channel,
        "482913",
        CodeCipher {
            ciphertext: String::new(),
            nonce: String::new(),
            key_id: "k1".to_string(),
        },
        ChronoDuration::seconds(300),
        5,
        Utc::now(),
    );
    store.issue(record).await.unwrap()
}

fn dispatcher(store: Arc<InMemoryOtpStore>, adapter: Arc<ScriptedChannelAdapter>) -> DeliveryDispatcher {
    DeliveryDispatcher::new(
        store,
        Arc::new(IdentityDestinationResolver),
        Arc::new(SystemClock),
        RetryPolicy::default(),
    )
    .register(adapter)
}

/// In-memory store whose final delivery update always fails
struct UpdateFailingStore {
    inner: InMemoryOtpStore,
}

#[async_trait]
impl OtpStore for UpdateFailingStore {
    async fn issue(&self, record: OtpRecord) -> Result<OtpRecord, DomainError> {
        self.inner.issue(record).await
    }

    async fn consume(
        &self,
        identity: &str,
        purpose: &str,
        supplied_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, DomainError> {
        self.inner.consume(identity, purpose, supplied_code, now).await
    }

    async fn find_active(
        &self,
        identity: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, DomainError> {
        self.inner.find_active(identity, purpose, now).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OtpRecord>, DomainError> {
        self.inner.find_by_id(id).await
    }

    async fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        self.inner.record_delivery(attempt).await
    }

    async fn update_delivery(&self, _attempt: &DeliveryAttempt) -> Result<(), DomainError> {
        Err(OtpError::Storage {
            message: "connection reset".to_string(),
        }
        .into())
    }

    async fn latest_delivery(&self, otp_id: Uuid) -> Result<Option<DeliveryAttempt>, DomainError> {
        self.inner.latest_delivery(otp_id).await
    }

    async fn purge_expired(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        self.inner.purge_expired(older_than).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_delivered_on_first_try() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::new(Channel::Sms));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "+15551234567", Channel::Sms).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Sms).await.unwrap();

    assert!(report.failure.is_none());
    assert_eq!(report.attempt.status, DeliveryStatus::Sent);
    assert_eq!(report.attempt.tries, 1);
    assert_eq!(report.attempt.provider_message_id.as_deref(), Some("mock-msg-1"));

    let stored = store.latest_delivery(record.id).await.unwrap().unwrap();
    assert_eq!(stored, report.attempt);

    let delivered = adapter.delivered();
    assert_eq!(delivered[0].0, "+15551234567");
    assert!(delivered[0].1.body.contains("482913"));
    assert!(delivered[0].1.body.contains("5 minutes"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::with_script(
        Channel::Email,
        vec![
            DeliveryResult::transient("421 try later"),
            DeliveryResult::transient("connection reset"),
        ],
    ));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "jane@example.com", Channel::Email).await;

    let started = tokio::time::Instant::now();
    let report = dispatcher.dispatch(&record, "482913", Channel::Email).await.unwrap();

    assert!(report.failure.is_none());
    assert_eq!(report.attempt.status, DeliveryStatus::Sent);
    assert_eq!(report.attempt.tries, 3);
    assert_eq!(adapter.calls(), 3);
    // 500ms + 1000ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_mark_failed() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::with_script(
        Channel::Telegram,
        vec![
            DeliveryResult::transient("502 bad gateway"),
            DeliveryResult::transient("502 bad gateway"),
            DeliveryResult::transient("502 bad gateway"),
        ],
    ));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "123456789", Channel::Telegram).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Telegram).await.unwrap();

    assert_eq!(report.attempt.status, DeliveryStatus::Failed);
    assert_eq!(report.attempt.tries, 3);
    assert_eq!(report.attempt.error_detail.as_deref(), Some("502 bad gateway"));
    assert_eq!(
        report.failure,
        Some(DeliveryFailure::Transient { reason: "502 bad gateway".to_string() })
    );

    match report.into_result() {
        Err(DomainError::Otp(OtpError::DeliveryTransient { channel, .. })) => {
            assert_eq!(channel, Channel::Telegram)
        }
        other => panic!("Expected transient delivery error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_address_bounces_without_retry() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::with_script(
        Channel::Sms,
        vec![DeliveryResult::rejected_address("invalid destination address")],
    ));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "+15551234567", Channel::Sms).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Sms).await.unwrap();

    assert_eq!(report.attempt.status, DeliveryStatus::Bounced);
    assert_eq!(adapter.calls(), 1);
    assert!(matches!(
        report.into_result(),
        Err(DomainError::Otp(OtpError::DeliveryPermanent { .. }))
    ));

    // The code itself is untouched by a failed delivery
    assert!(store
        .find_active("+15551234567", "login", Utc::now())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_slow_adapter_times_out_as_transient() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(
        ScriptedChannelAdapter::new(Channel::Sms).with_delay(Duration::from_secs(11)),
    );
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "+15551234567", Channel::Sms).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Sms).await.unwrap();

    assert_eq!(report.attempt.status, DeliveryStatus::Failed);
    assert_eq!(adapter.calls(), 3);
    assert!(report
        .attempt
        .error_detail
        .unwrap_or_default()
        .contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_beyond_budget_stops_retrying() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::with_script(
        Channel::Telegram,
        vec![DeliveryResult::TransientFailure {
            reason: "429 too many requests".to_string(),
            retry_after: Some(Duration::from_secs(60)),
        }],
    ));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "123456789", Channel::Telegram).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Telegram).await.unwrap();

    assert_eq!(adapter.calls(), 1);
    assert_eq!(report.attempt.status, DeliveryStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_outcome_update_keeps_delivery() {
    let store = Arc::new(UpdateFailingStore {
        inner: InMemoryOtpStore::new(),
    });
    let adapter = Arc::new(ScriptedChannelAdapter::new(Channel::Sms));
    let dispatcher = DeliveryDispatcher::new(
        store.clone(),
        Arc::new(IdentityDestinationResolver),
        Arc::new(SystemClock),
        RetryPolicy::default(),
    )
    .register(adapter.clone());
    let record = issued(&store.inner, "+15551234567", Channel::Sms).await;

    let report = dispatcher.dispatch(&record, "482913", Channel::Sms).await.unwrap();

    assert_eq!(adapter.calls(), 1);
    assert!(report.failure.is_none());
    assert_eq!(report.attempt.status, DeliveryStatus::Sent);
    assert!(report.into_result().is_ok());

    // Only the pending row made it to the store
    let stored = store.latest_delivery(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_provider_hint_within_cap_is_waited_out() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::with_script(
        Channel::Telegram,
        vec![DeliveryResult::TransientFailure {
            reason: "429 too many requests".to_string(),
            retry_after: Some(Duration::from_secs(12)),
        }],
    ));
    let dispatcher = dispatcher(store.clone(), adapter.clone());
    let record = issued(&store, "123456789", Channel::Telegram).await;

    let started = tokio::time::Instant::now();
    let report = dispatcher.dispatch(&record, "482913", Channel::Telegram).await.unwrap();

    assert_eq!(adapter.calls(), 2);
    assert_eq!(report.attempt.status, DeliveryStatus::Sent);
    assert!(started.elapsed() >= Duration::from_secs(12));
}

#[tokio::test]
async fn test_unregistered_channel_is_unavailable() {
    let store = Arc::new(InMemoryOtpStore::new());
    let adapter = Arc::new(ScriptedChannelAdapter::new(Channel::Sms));
    let dispatcher = dispatcher(store.clone(), adapter);
    let record = issued(&store, "jane@example.com", Channel::Email).await;

    assert!(!dispatcher.supports(Channel::Email));
    assert_eq!(dispatcher.channels(), vec![Channel::Sms]);

    match dispatcher.dispatch(&record, "482913", Channel::Email).await {
        Err(DomainError::Otp(OtpError::ChannelUnavailable { channel })) => {
            assert_eq!(channel, Channel::Email)
        }
        other => panic!("Expected channel unavailable, got {:?}", other),
    }
}
