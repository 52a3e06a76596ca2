//! DeviceRegistry service
//!
//! In-memory cache + region-filtered materialized view over the durable
//! store. One lock covers both; mutations update memory first, release the
//! lock, then persist, so readers are never blocked on store I/O. A store
//! write failure is surfaced as `Error::Persistence` while reads keep
//! serving the last-known in-memory state.

use super::legacy;
use super::repository::DeviceRepository;
use super::types::{generate_identity, Device, DeviceStatus};
use crate::error::{Error, Result};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Default)]
struct RegistryCache {
    devices: Vec<Device>,
    /// Active region filter; `None` = no filter
    filter: Option<String>,
    /// Materialized filtered view, recomputed on every mutation and
    /// filter change. Avoids O(n) filtering on hot-path reads.
    view: Vec<Device>,
}

impl RegistryCache {
    fn recompute_view(&mut self) {
        self.view = match &self.filter {
            Some(region) => self
                .devices
                .iter()
                // empty region = wildcard membership, visible under every filter
                .filter(|d| d.region.is_empty() || &d.region == region)
                .cloned()
                .collect(),
            None => self.devices.clone(),
        };
    }
}

/// The authoritative device collection
pub struct DeviceRegistry {
    repo: DeviceRepository,
    cache: RwLock<RegistryCache>,
}

impl DeviceRegistry {
    /// Open the registry: ensure the schema, run the one-shot legacy
    /// import when applicable, and build the cache from the store.
    pub async fn open(repo: DeviceRepository, legacy_path: &Path) -> Result<Self> {
        repo.ensure_schema().await?;

        match legacy::import_if_needed(&repo, legacy_path).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(imported = n, "Legacy registry imported"),
            Err(e) => tracing::warn!(error = %e, "Legacy registry import failed"),
        }

        let devices = repo.get_all().await?;
        let mut cache = RegistryCache {
            devices,
            filter: None,
            view: Vec::new(),
        };
        cache.recompute_view();

        Ok(Self {
            repo: repo.clone(),
            cache: RwLock::new(cache),
        })
    }

    /// Devices under the current region filter (the materialized view).
    pub async fn get(&self) -> Vec<Device> {
        self.cache.read().await.view.clone()
    }

    /// All devices regardless of filter.
    pub async fn get_all(&self) -> Vec<Device> {
        self.cache.read().await.devices.clone()
    }

    /// Set or clear the region filter and recompute the view.
    pub async fn set_region_filter(&self, region: Option<String>) {
        let mut cache = self.cache.write().await;
        cache.filter = region;
        cache.recompute_view();
    }

    /// Upsert by identity: an existing identity is overwritten in place,
    /// a new one is appended. Generates the identity when empty.
    pub async fn add(&self, mut device: Device) -> Result<Device> {
        if device.identity.is_empty() {
            device.identity = generate_identity(&device.region, &device.ip);
        }

        {
            let mut cache = self.cache.write().await;
            match cache
                .devices
                .iter_mut()
                .find(|d| d.identity == device.identity)
            {
                Some(existing) => *existing = device.clone(),
                None => cache.devices.push(device.clone()),
            }
            cache.recompute_view();
        }

        self.repo
            .upsert(&device)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(device)
    }

    /// Remove a device. The entry is shown as `Removing` while the store
    /// delete is in flight, then dropped from the cache.
    pub async fn remove(&self, identity: &str) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            let device = cache
                .devices
                .iter_mut()
                .find(|d| d.identity == identity)
                .ok_or_else(|| Error::NotFound(format!("Device {} not found", identity)))?;
            device.status = DeviceStatus::Removing;
            cache.recompute_view();
        }

        let store_result = self.repo.delete(identity).await;

        {
            let mut cache = self.cache.write().await;
            cache.devices.retain(|d| d.identity != identity);
            cache.recompute_view();
        }

        store_result.map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn set_region(&self, identity: &str, region: &str) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            let device = cache
                .devices
                .iter_mut()
                .find(|d| d.identity == identity)
                .ok_or_else(|| Error::NotFound(format!("Device {} not found", identity)))?;
            device.region = region.to_string();
            cache.recompute_view();
        }

        self.repo
            .set_region(identity, region)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn set_region_bulk(&self, identities: &[String], region: &str) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            for device in cache.devices.iter_mut() {
                if identities.contains(&device.identity) {
                    device.region = region.to_string();
                }
            }
            cache.recompute_view();
        }

        self.repo
            .set_region_bulk(identities, region)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            cache.devices.clear();
            cache.recompute_view();
        }

        self.repo
            .clear()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn open_registry() -> DeviceRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = DeviceRepository::new(pool);
        DeviceRegistry::open(repo, Path::new("no-such-legacy.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_same_identity_never_duplicates() {
        let registry = open_registry().await;
        let device = Device::new("192.168.3.10", "2025-02-20_11:31:45", "east");
        registry.add(device.clone()).await.unwrap();

        let mut updated = device.clone();
        updated.build_time = "2025-03-01_09:00:00".to_string();
        registry.add(updated).await.unwrap();

        let all = registry.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].build_time, "2025-03-01_09:00:00");
    }

    #[tokio::test]
    async fn empty_region_is_wildcard_under_any_filter() {
        let registry = open_registry().await;
        registry
            .add(Device::new("10.0.0.1", "", ""))
            .await
            .unwrap();
        registry
            .add(Device::new("10.0.0.2", "", "east"))
            .await
            .unwrap();
        registry
            .add(Device::new("10.0.0.3", "", "west"))
            .await
            .unwrap();

        registry.set_region_filter(Some("east".to_string())).await;
        let view = registry.get().await;
        let ips: Vec<&str> = view.iter().map(|d| d.ip.as_str()).collect();
        assert!(ips.contains(&"10.0.0.1")); // wildcard
        assert!(ips.contains(&"10.0.0.2"));
        assert!(!ips.contains(&"10.0.0.3"));

        registry.set_region_filter(Some("west".to_string())).await;
        let view = registry.get().await;
        assert!(view.iter().any(|d| d.ip == "10.0.0.1")); // wildcard again

        registry.set_region_filter(None).await;
        assert_eq!(registry.get().await.len(), 3);
    }

    #[tokio::test]
    async fn view_tracks_mutations() {
        let registry = open_registry().await;
        let device = registry
            .add(Device::new("10.0.0.1", "", "east"))
            .await
            .unwrap();

        registry.set_region_filter(Some("east".to_string())).await;
        assert_eq!(registry.get().await.len(), 1);

        registry.set_region(&device.identity, "west").await.unwrap();
        assert!(registry.get().await.is_empty());

        registry.set_region_filter(Some("west".to_string())).await;
        assert_eq!(registry.get().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_unknown_identity_is_not_found() {
        let registry = open_registry().await;
        assert!(matches!(
            registry.remove("dev-missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_drops_entry_from_cache_and_store() {
        let registry = open_registry().await;
        let device = registry
            .add(Device::new("10.0.0.1", "", ""))
            .await
            .unwrap();
        registry.remove(&device.identity).await.unwrap();
        assert!(registry.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_registry() {
        let registry = open_registry().await;
        registry
            .add(Device::new("10.0.0.1", "", ""))
            .await
            .unwrap();
        registry.clear().await.unwrap();
        assert!(registry.get().await.is_empty());
    }
}
