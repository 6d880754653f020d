//! Unit tests for the in-memory OTP store

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::domain::entities::{
    CodeCipher, ConsumeOutcome, DeliveryAttempt, DeliveryStatus, OtpRecord, OtpState,
    DEFAULT_MAX_ATTEMPTS,
};
use crate::domain::value_objects::Channel;
use crate::repositories::otp_store::{InMemoryOtpStore, OtpStore};

fn cipher() -> CodeCipher {
    CodeCipher {
        ciphertext: String::new(),
        nonce: String::new(),
        key_id: "k1".to_string(),
    }
}

fn record(code: &str, ttl_seconds: i64, now: DateTime<Utc>) -> OtpRecord {
    OtpRecord::new(
        "+15551234567",
        "login",
        Channel::Sms,
        code,
        cipher(),
        Duration::seconds(ttl_seconds),
        DEFAULT_MAX_ATTEMPTS,
        now,
    )
}

#[tokio::test]
async fn test_second_issue_supersedes_first() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();

    let first = store.issue(record("111111", 300, now)).await.unwrap();
    let second = store.issue(record("222222", 300, now)).await.unwrap();

    let stored_first = store.find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(stored_first.state, OtpState::Superseded);

    let active = store.find_active("+15551234567", "login", now).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);

    // The old code is just a wrong guess against the newest record
    assert_eq!(
        store.consume("+15551234567", "login", "111111", now).await.unwrap(),
        ConsumeOutcome::Mismatch { attempts: 1, remaining: 4 }
    );
    assert_eq!(
        store.consume("+15551234567", "login", "222222", now).await.unwrap(),
        ConsumeOutcome::Valid
    );
}

#[tokio::test]
async fn test_tuples_are_independent() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();

    let login = store.issue(record("111111", 300, now)).await.unwrap();
    let mut reset = record("222222", 300, now);
    reset.purpose = "password_reset".to_string();
    store.issue(reset).await.unwrap();

    let still_active = store.find_by_id(login.id).await.unwrap().unwrap();
    assert_eq!(still_active.state, OtpState::Active);
}

#[tokio::test]
async fn test_consume_once() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();
    store.issue(record("123456", 300, now)).await.unwrap();

    assert_eq!(
        store.consume("+15551234567", "login", "123456", now).await.unwrap(),
        ConsumeOutcome::Valid
    );
    assert_eq!(
        store.consume("+15551234567", "login", "123456", now).await.unwrap(),
        ConsumeOutcome::AlreadyConsumed
    );
    assert!(store.find_active("+15551234567", "login", now).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_tuple_is_not_found() {
    let store = InMemoryOtpStore::new();
    assert_eq!(
        store.consume("+15550000000", "login", "123456", Utc::now()).await.unwrap(),
        ConsumeOutcome::NotFound
    );
}

#[tokio::test]
async fn test_five_mismatches_lock_out() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();
    store.issue(record("123456", 300, now)).await.unwrap();

    for attempt in 1..=4 {
        assert_eq!(
            store.consume("+15551234567", "login", "000000", now).await.unwrap(),
            ConsumeOutcome::Mismatch { attempts: attempt, remaining: 5 - attempt }
        );
    }
    assert_eq!(
        store.consume("+15551234567", "login", "000000", now).await.unwrap(),
        ConsumeOutcome::LockedOut
    );
    assert_eq!(
        store.consume("+15551234567", "login", "123456", now).await.unwrap(),
        ConsumeOutcome::LockedOut
    );
}

#[tokio::test]
async fn test_expired_code_at_ttl_plus_one() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();
    let issued = store.issue(record("123456", 60, now)).await.unwrap();

    let later = now + Duration::seconds(61);
    assert_eq!(
        store.consume("+15551234567", "login", "123456", later).await.unwrap(),
        ConsumeOutcome::Expired
    );

    let stored = store.find_by_id(issued.id).await.unwrap().unwrap();
    assert_eq!(stored.state, OtpState::Expired);
}

#[tokio::test]
async fn test_find_active_expires_lazily() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();
    let issued = store.issue(record("123456", 60, now)).await.unwrap();

    assert!(store
        .find_active("+15551234567", "login", now + Duration::seconds(61))
        .await
        .unwrap()
        .is_none());
    let stored = store.find_by_id(issued.id).await.unwrap().unwrap();
    assert_eq!(stored.state, OtpState::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumes_succeed_exactly_once() {
    let store = Arc::new(InMemoryOtpStore::new());
    let now = Utc::now();
    store.issue(record("123456", 300, now)).await.unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.consume("+15551234567", "login", "123456", now).await.unwrap()
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| **o == ConsumeOutcome::Valid).count(), 1);
    assert_eq!(
        outcomes.iter().filter(|o| **o == ConsumeOutcome::AlreadyConsumed).count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issues_leave_one_active() {
    let store = Arc::new(InMemoryOtpStore::new());
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let code = format!("{:06}", 100_000 + i);
                let issued = store.issue(record(&code, 300, now)).await.unwrap();
                (issued.id, code)
            })
        })
        .collect();

    let mut issued = Vec::new();
    for handle in handles {
        issued.push(handle.await.unwrap());
    }

    let mut active = Vec::new();
    for (id, code) in &issued {
        let stored = store.find_by_id(*id).await.unwrap().unwrap();
        match stored.state {
            OtpState::Active => active.push((*id, code.clone())),
            state => assert_eq!(state, OtpState::Superseded),
        }
    }
    assert_eq!(active.len(), 1);

    let (active_id, active_code) = active.remove(0);
    let newest = store.find_active("+15551234567", "login", now).await.unwrap().unwrap();
    assert_eq!(newest.id, active_id);

    let (_, stale_code) = issued.iter().find(|(id, _)| *id != active_id).unwrap();
    assert_eq!(
        store.consume("+15551234567", "login", stale_code, now).await.unwrap(),
        ConsumeOutcome::Mismatch { attempts: 1, remaining: 4 }
    );
    assert_eq!(
        store.consume("+15551234567", "login", &active_code, now).await.unwrap(),
        ConsumeOutcome::Valid
    );
}

#[tokio::test]
async fn test_delivery_attempt_lifecycle() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();
    let issued = store.issue(record("123456", 300, now)).await.unwrap();

    let mut attempt = DeliveryAttempt::new(issued.id, Channel::Sms, now);
    store.record_delivery(&attempt).await.unwrap();

    let pending = store.latest_delivery(issued.id).await.unwrap().unwrap();
    assert_eq!(pending.status, DeliveryStatus::Pending);

    attempt.mark_sent("smsc-42", 1, now).unwrap();
    store.update_delivery(&attempt).await.unwrap();

    let sent = store.latest_delivery(issued.id).await.unwrap().unwrap();
    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.provider_message_id.as_deref(), Some("smsc-42"));

    // Stored terminal attempts cannot be overwritten
    let mut rewrite = sent.clone();
    rewrite.status = DeliveryStatus::Failed;
    assert!(store.update_delivery(&rewrite).await.is_err());
}

#[tokio::test]
async fn test_purge_removes_old_records_and_attempts() {
    let store = InMemoryOtpStore::new();
    let now = Utc::now();

    let old = store
        .issue(record("111111", 60, now - Duration::hours(30)))
        .await
        .unwrap();
    store
        .record_delivery(&DeliveryAttempt::new(old.id, Channel::Sms, now))
        .await
        .unwrap();

    let mut fresh = record("222222", 300, now);
    fresh.identity = "jane@example.com".to_string();
    let fresh = store.issue(fresh).await.unwrap();

    let purged = store.purge_expired(now - Duration::hours(24)).await.unwrap();
    assert_eq!(purged, 1);
    assert!(store.find_by_id(old.id).await.unwrap().is_none());
    assert!(store.latest_delivery(old.id).await.unwrap().is_none());
    assert!(store.find_by_id(fresh.id).await.unwrap().is_some());
    assert_eq!(store.len().await, 1);
}
