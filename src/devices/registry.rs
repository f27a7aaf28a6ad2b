//! Device registry for tracking presence of remote devices

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::presence::PresencePolicy;
use super::types::{Device, StatusUpdate, SweepReport};
use crate::{Error, Result};

/// Registry of known devices
///
/// Reads take the shared lock, every mutation and the presence sweep take the
/// exclusive lock. Nothing here performs I/O while a lock is held.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a device
    ///
    /// Overwrites the client id and merges attributes into any existing ones.
    /// A previously reported network status survives re-registration.
    pub async fn register(
        &self,
        id: &str,
        client_id: &str,
        attributes: HashMap<String, String>,
    ) -> Device {
        let mut devices = self.devices.write().await;
        let now = Utc::now();

        let device = devices
            .entry(id.to_string())
            .and_modify(|d| {
                d.client_id = client_id.to_string();
                d.last_seen = now;
                d.online = true;
            })
            .or_insert_with(|| Device {
                id: id.to_string(),
                client_id: client_id.to_string(),
                last_seen: now,
                online: true,
                network_status: String::new(),
                last_action: None,
                attributes: HashMap::new(),
            });
        device.attributes.extend(attributes);

        tracing::info!(device_id = %id, client_id = %client_id, "device registered");
        device.clone()
    }

    /// Register a device only if it is not known yet
    ///
    /// Returns true if the device was created by this call.
    pub async fn ensure_registered(
        &self,
        id: &str,
        client_id: &str,
        attributes: HashMap<String, String>,
    ) -> bool {
        let mut devices = self.devices.write().await;
        if devices.contains_key(id) {
            return false;
        }

        devices.insert(
            id.to_string(),
            Device {
                id: id.to_string(),
                client_id: client_id.to_string(),
                last_seen: Utc::now(),
                online: true,
                network_status: String::new(),
                last_action: None,
                attributes,
            },
        );
        tracing::info!(device_id = %id, client_id = %client_id, "device auto-registered");
        true
    }

    /// Apply a status report to a known device
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device is unknown
    pub async fn update_status(&self, id: &str, status: &StatusUpdate) -> Result<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        device.network_status.clone_from(&status.network_status);
        device.last_action.clone_from(&status.last_action);
        device.last_seen = Utc::now();
        device.online = true;

        tracing::info!(
            device_id = %id,
            network_status = %status.network_status,
            "device status updated"
        );
        Ok(())
    }

    /// Refresh the liveness of a known device
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device is unknown
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        device.last_seen = Utc::now();
        device.online = true;
        tracing::trace!(device_id = %id, "heartbeat");
        Ok(())
    }

    /// Mark a device offline without forgetting it
    ///
    /// Returns false if the device is unknown.
    pub async fn mark_offline(&self, id: &str) -> bool {
        let mut devices = self.devices.write().await;
        let Some(device) = devices.get_mut(id) else {
            return false;
        };

        device.online = false;
        tracing::info!(device_id = %id, "device marked offline");
        true
    }

    /// Forget a device, returning it if it was known
    pub async fn remove(&self, id: &str) -> Option<Device> {
        let removed = self.devices.write().await.remove(id);
        if removed.is_some() {
            tracing::info!(device_id = %id, "device removed");
        }
        removed
    }

    /// Snapshot of a single device
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device is unknown
    pub async fn get(&self, id: &str) -> Result<Device> {
        self.devices
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Snapshot of every device, in no particular order
    pub async fn list_all(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Snapshot of a device that can currently receive commands
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device is unknown, `DeviceOffline` if it is
    /// not online
    pub async fn command_target(&self, id: &str) -> Result<Device> {
        let device = self.get(id).await?;
        if !device.online {
            return Err(Error::DeviceOffline(id.to_string()));
        }
        Ok(device)
    }

    /// Number of known devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Age out stale devices as of `now`
    ///
    /// Devices idle past the offline threshold are marked offline, devices
    /// idle past the reap threshold are deleted.
    pub async fn sweep(&self, now: DateTime<Utc>, policy: &PresencePolicy) -> SweepReport {
        let mut report = SweepReport::default();
        let mut devices = self.devices.write().await;

        devices.retain(|id, device| {
            let idle = now.signed_duration_since(device.last_seen);
            if idle > policy.reap_after() {
                report.reaped.push(id.clone());
                return false;
            }
            if idle > policy.offline_after() && device.online {
                device.online = false;
                report.marked_offline.push(id.clone());
            }
            true
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;

    fn sample_attributes() -> HashMap<String, String> {
        HashMap::from([
            ("device_type".to_string(), "oppo".to_string()),
            ("platform".to_string(), "android".to_string()),
        ])
    }

    fn default_policy() -> PresencePolicy {
        PresencePolicy::new(
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(600),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", sample_attributes()).await;

        let device = registry.get("d1").await.unwrap();
        assert!(device.online);
        assert_eq!(device.client_id, "c1");
        assert_eq!(device.attributes, sample_attributes());
        assert!(device.network_status.is_empty());
    }

    #[tokio::test]
    async fn repeated_register_keeps_one_entry() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", sample_attributes()).await;
        registry.register("d1", "c1", sample_attributes()).await;

        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn register_merges_attributes_and_keeps_status() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", sample_attributes()).await;
        registry
            .update_status(
                "d1",
                &StatusUpdate {
                    network_status: "4g".to_string(),
                    ..StatusUpdate::default()
                },
            )
            .await
            .unwrap();
        registry.mark_offline("d1").await;

        let extra = HashMap::from([("device_type".to_string(), "xiaomi".to_string())]);
        let device = registry.register("d1", "c2", extra).await;

        assert!(device.online);
        assert_eq!(device.client_id, "c2");
        assert_eq!(device.attributes["device_type"], "xiaomi");
        assert_eq!(device.attributes["platform"], "android");
        assert_eq!(device.network_status, "4g");
    }

    #[tokio::test]
    async fn ensure_registered_only_creates_once() {
        let registry = DeviceRegistry::new();
        assert!(registry.ensure_registered("d1", "c1", HashMap::new()).await);
        assert!(!registry.ensure_registered("d1", "c2", sample_attributes()).await);

        let device = registry.get("d1").await.unwrap();
        assert_eq!(device.client_id, "c1");
        assert!(device.attributes.is_empty());
    }

    #[tokio::test]
    async fn unknown_device_writes() {
        let registry = DeviceRegistry::new();

        assert!(matches!(
            registry.heartbeat("ghost").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.update_status("ghost", &StatusUpdate::default()).await,
            Err(Error::NotFound(_))
        ));
        assert!(!registry.mark_offline("ghost").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn status_update_sets_fields_and_online() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;
        registry.mark_offline("d1").await;

        let status = StatusUpdate {
            device_id: "d1".to_string(),
            network_status: "wifi".to_string(),
            timestamp: 0,
            last_action: Some("status_report".to_string()),
        };
        registry.update_status("d1", &status).await.unwrap();

        let device = registry.get("d1").await.unwrap();
        assert!(device.online);
        assert_eq!(device.network_status, "wifi");
        assert_eq!(device.last_action.as_deref(), Some("status_report"));
    }

    #[tokio::test]
    async fn heartbeat_revives_offline_device() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;
        let before = registry.get("d1").await.unwrap().last_seen;
        registry.mark_offline("d1").await;

        registry.heartbeat("d1").await.unwrap();

        let device = registry.get("d1").await.unwrap();
        assert!(device.online);
        assert!(device.last_seen >= before);
    }

    #[tokio::test]
    async fn mark_offline_keeps_device() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;

        assert!(registry.mark_offline("d1").await);
        let device = registry.get("d1").await.unwrap();
        assert!(!device.online);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;

        assert!(registry.remove("d1").await.is_some());
        assert!(registry.remove("d1").await.is_none());
        assert!(matches!(registry.get("d1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_all_returns_copies() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;
        registry.register("d2", "c2", HashMap::new()).await;

        let mut snapshot = registry.list_all().await;
        assert_eq!(snapshot.len(), 2);
        snapshot[0].online = false;
        snapshot.clear();

        assert!(registry.list_all().await.iter().all(|d| d.online));
    }

    #[tokio::test]
    async fn command_target_checks_presence() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.command_target("d1").await,
            Err(Error::NotFound(_))
        ));

        registry.register("d1", "c1", HashMap::new()).await;
        assert!(registry.command_target("d1").await.is_ok());

        registry.mark_offline("d1").await;
        assert!(matches!(
            registry.command_target("d1").await,
            Err(Error::DeviceOffline(_))
        ));
    }

    #[tokio::test]
    async fn sweep_marks_idle_device_offline() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;

        let later = Utc::now() + TimeDelta::minutes(6);
        let report = registry.sweep(later, &default_policy()).await;

        assert_eq!(report.marked_offline, vec!["d1".to_string()]);
        assert!(report.reaped.is_empty());
        assert!(!registry.get("d1").await.unwrap().online);

        // Already offline devices are not reported twice
        let report = registry.sweep(later, &default_policy()).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn sweep_reaps_long_idle_device() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;

        let later = Utc::now() + TimeDelta::minutes(11);
        let report = registry.sweep(later, &default_policy()).await;

        assert_eq!(report.reaped, vec!["d1".to_string()]);
        assert!(registry.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_devices_alone() {
        let registry = DeviceRegistry::new();
        registry.register("d1", "c1", HashMap::new()).await;

        let report = registry
            .sweep(Utc::now() + TimeDelta::minutes(1), &default_policy())
            .await;

        assert!(report.is_empty());
        assert!(registry.get("d1").await.unwrap().online);
    }
}
