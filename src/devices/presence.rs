//! Periodic presence sweep
//!
//! Re-evaluates liveness of every device on a fixed interval: idle devices go
//! offline, long-idle devices are reaped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::DeviceRegistry;
use crate::{Error, Result};

/// Default sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle time before a device is marked offline
pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Default idle time before a device is deleted
pub const DEFAULT_REAP_AFTER: Duration = Duration::from_secs(10 * 60);

/// Sweep interval and expiry thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresencePolicy {
    interval: Duration,
    offline_after: TimeDelta,
    reap_after: TimeDelta,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            offline_after: TimeDelta::minutes(5),
            reap_after: TimeDelta::minutes(10),
        }
    }
}

impl PresencePolicy {
    /// Build a policy, validating the thresholds
    ///
    /// # Errors
    ///
    /// Returns `Config` if the interval is zero, a threshold is out of range,
    /// or the reap threshold does not exceed the offline threshold
    pub fn new(interval: Duration, offline_after: Duration, reap_after: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("sweep interval must be non-zero".to_string()));
        }
        if reap_after <= offline_after {
            return Err(Error::Config(format!(
                "reap threshold ({}s) must exceed offline threshold ({}s)",
                reap_after.as_secs(),
                offline_after.as_secs()
            )));
        }

        let to_delta = |d: Duration| {
            TimeDelta::from_std(d)
                .map_err(|e| Error::Config(format!("presence threshold out of range: {e}")))
        };

        Ok(Self {
            interval,
            offline_after: to_delta(offline_after)?,
            reap_after: to_delta(reap_after)?,
        })
    }

    /// Time between sweeps
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Idle time after which a device is marked offline
    #[must_use]
    pub const fn offline_after(&self) -> TimeDelta {
        self.offline_after
    }

    /// Idle time after which a device is deleted
    #[must_use]
    pub const fn reap_after(&self) -> TimeDelta {
        self.reap_after
    }
}

/// Spawn the sweep task; it stops when `shutdown` is cancelled
#[must_use]
pub fn spawn_sweep(
    registry: Arc<DeviceRegistry>,
    policy: PresencePolicy,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        tracing::info!(
            interval_secs = policy.interval().as_secs(),
            offline_after_secs = policy.offline_after().num_seconds(),
            reap_after_secs = policy.reap_after().num_seconds(),
            "presence sweep started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("presence sweep stopped");
                    break;
                }
                _ = interval.tick() => {
                    let report = registry.sweep(Utc::now(), &policy).await;
                    for id in &report.marked_offline {
                        tracing::info!(device_id = %id, "device marked offline due to inactivity");
                    }
                    for id in &report.reaped {
                        tracing::info!(device_id = %id, "device removed due to long inactivity");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reap_not_after_offline() {
        let err = PresencePolicy::new(
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(300),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(
            PresencePolicy::new(Duration::ZERO, DEFAULT_OFFLINE_AFTER, DEFAULT_REAP_AFTER).is_err()
        );
    }

    #[test]
    fn default_matches_constants() {
        let policy =
            PresencePolicy::new(DEFAULT_SWEEP_INTERVAL, DEFAULT_OFFLINE_AFTER, DEFAULT_REAP_AFTER)
                .unwrap();
        assert_eq!(policy, PresencePolicy::default());
    }

    #[tokio::test]
    async fn sweep_task_stops_on_cancel() {
        let registry = Arc::new(DeviceRegistry::new());
        let token = CancellationToken::new();
        let handle = spawn_sweep(registry, PresencePolicy::default(), token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep did not stop")
            .unwrap();
    }
}
