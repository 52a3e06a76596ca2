//! Device types and identity generation

use serde::{Deserialize, Serialize};

/// Device status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    /// Transient UI-visible state while a removal is in flight; persisted
    /// as `Offline`, never written to the store as-is.
    Removing,
}

impl DeviceStatus {
    pub fn as_store_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            // Removing is not a durable state
            DeviceStatus::Offline | DeviceStatus::Removing => "offline",
        }
    }

    pub fn from_store_str(s: &str) -> Self {
        match s {
            "online" => DeviceStatus::Online,
            _ => DeviceStatus::Offline,
        }
    }
}

/// A managed network endpoint exposing an HTTP control API and SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable primary key, generated once from region+ip at creation.
    /// The ip may later change or be reused across regions; identity never does.
    pub identity: String,
    pub ip: String,
    #[serde(default)]
    pub build_time: String,
    pub status: DeviceStatus,
    /// Grouping label; empty string means wildcard membership
    /// (visible under every region filter).
    #[serde(default)]
    pub region: String,
}

impl Device {
    /// Create a device with a freshly generated identity.
    pub fn new(ip: &str, build_time: &str, region: &str) -> Self {
        Self {
            identity: generate_identity(region, ip),
            ip: ip.to_string(),
            build_time: build_time.to_string(),
            status: DeviceStatus::Online,
            region: region.to_string(),
        }
    }
}

/// Generate a device identity from region+ip. Deterministic for one
/// region+ip pair so repeated discovery of the same endpoint never
/// produces duplicate entries; opaque to callers.
pub fn generate_identity(region: &str, ip: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    region.hash(&mut hasher);
    ip.hash(&mut hasher);
    format!("dev-{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_for_same_region_and_ip() {
        let a = generate_identity("east", "192.168.3.10");
        let b = generate_identity("east", "192.168.3.10");
        assert_eq!(a, b);
    }

    #[test]
    fn identity_differs_across_regions_for_same_ip() {
        let a = generate_identity("east", "192.168.3.10");
        let b = generate_identity("west", "192.168.3.10");
        assert_ne!(a, b);
    }

    #[test]
    fn removing_is_persisted_as_offline() {
        assert_eq!(DeviceStatus::Removing.as_store_str(), "offline");
        assert_eq!(
            DeviceStatus::from_store_str("offline"),
            DeviceStatus::Offline
        );
    }
}
