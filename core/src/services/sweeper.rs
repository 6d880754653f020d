//! Periodic purge of expired OTP records
//!
//! Records past their expiry are kept for a retention period so recent
//! verification outcomes remain inspectable, then deleted together with their
//! delivery attempts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use otp_shared::config::OtpConfig;

use crate::errors::DomainResult;
use crate::repositories::OtpStore;
use crate::services::clock::Clock;

/// Result of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Records deleted
    pub purged: u64,
    /// Records that expired before this instant were eligible
    pub cutoff: DateTime<Utc>,
}

/// Background task deleting records that expired more than `retention` ago
pub struct OtpSweeper {
    store: Arc<dyn OtpStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: ChronoDuration,
}

impl OtpSweeper {
    pub fn new(
        store: Arc<dyn OtpStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        retention: ChronoDuration,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            retention,
        }
    }

    /// Build with `sweep_interval_secs` and `retention_hours` from config
    pub fn from_config(store: Arc<dyn OtpStore>, clock: Arc<dyn Clock>, config: &OtpConfig) -> Self {
        Self::new(
            store,
            clock,
            Duration::from_secs(config.sweep_interval_secs.max(1)),
            ChronoDuration::hours(config.retention_hours as i64),
        )
    }

    /// Run a single sweep
    pub async fn run_once(&self) -> DomainResult<SweepResult> {
        let cutoff = self.clock.now() - self.retention;
        let purged = self.store.purge_expired(cutoff).await?;

        if purged > 0 {
            info!(
                purged = purged,
                cutoff = %cutoff,
                event = "otp_sweep",
                "Purged expired OTP records"
            );
        }

        Ok(SweepResult { purged, cutoff })
    }

    /// Start sweeping on a tokio interval until `shutdown` turns true
    /// or its sender is dropped
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                retention_hours = self.retention.num_hours(),
                "OTP sweeper started"
            );

            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, event = "otp_sweep_failed", "OTP sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("OTP sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CodeCipher, OtpRecord};
    use crate::domain::value_objects::Channel;
    use crate::repositories::InMemoryOtpStore;
    use crate::services::clock::ManualClock;

    fn record(identity: &str, now: DateTime<Utc>) -> OtpRecord {
        OtpRecord::new(
            identity,
            "login",
            Channel::Sms,
            "482913",
            CodeCipher {
                ciphertext: String::new(),
                nonce: String::new(),
                key_id: "k1".to_string(),
            },
            ChronoDuration::seconds(300),
            5,
            now,
        )
    }

    #[tokio::test]
    async fn test_run_once_respects_retention() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryOtpStore::new());
        store.issue(record("+15551234567", start)).await.unwrap();

        let sweeper = OtpSweeper::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(60),
            ChronoDuration::hours(1),
        );

        // Expired, but still inside the retention period
        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(sweeper.run_once().await.unwrap().purged, 0);
        assert_eq!(store.len().await, 1);

        clock.advance(ChronoDuration::hours(1));
        let result = sweeper.run_once().await.unwrap();
        assert_eq!(result.purged, 1);
        assert_eq!(result.cutoff, clock.now() - ChronoDuration::hours(1));
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_sweeps_and_stops() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryOtpStore::new());
        store.issue(record("+15551234567", start)).await.unwrap();
        clock.advance(ChronoDuration::hours(2));

        let sweeper = Arc::new(OtpSweeper::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(60),
            ChronoDuration::hours(1),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = sweeper.start(rx);

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.is_empty().await);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
