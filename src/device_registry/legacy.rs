//! Legacy flat-file registry import
//!
//! Earlier releases kept the registry as a flat JSON array on disk. The
//! import runs once at startup: only when the store is still empty and the
//! legacy file exists. Every record is parsed, assigned an identity if
//! missing, inserted in one transaction, and the file is renamed to a
//! timestamped backup (never deleted). Once the store is non-empty the
//! import never runs again, so it is idempotent across restarts.

use super::repository::DeviceRepository;
use super::types::{generate_identity, Device, DeviceStatus};
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// Record shape of the legacy file; identity was optional in old layouts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDevice {
    #[serde(default)]
    identity: Option<String>,
    ip: String,
    #[serde(default)]
    build_time: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    region: String,
}

impl LegacyDevice {
    fn into_device(self) -> Device {
        let identity = match self.identity {
            Some(id) if !id.is_empty() => id,
            _ => generate_identity(&self.region, &self.ip),
        };
        Device {
            identity,
            ip: self.ip,
            build_time: self.build_time,
            status: self
                .status
                .as_deref()
                .map(DeviceStatus::from_store_str)
                .unwrap_or(DeviceStatus::Offline),
            region: self.region,
        }
    }
}

/// Import the legacy file when the store is empty. Returns the number of
/// imported records (0 when nothing was done).
pub async fn import_if_needed(repo: &DeviceRepository, path: &Path) -> Result<usize> {
    if repo.count().await? > 0 {
        return Ok(0);
    }
    if !path.exists() {
        return Ok(0);
    }

    let raw = std::fs::read_to_string(path)?;
    let records: Vec<LegacyDevice> = serde_json::from_str(&raw)?;
    let devices: Vec<Device> = records.into_iter().map(LegacyDevice::into_device).collect();

    repo.upsert_many(&devices).await?;

    // Keep the original around; rename, never delete.
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let backup = path.with_extension(format!("json.bak-{}", stamp));
    std::fs::rename(path, &backup)?;

    tracing::info!(
        count = devices.len(),
        backup = %backup.display(),
        "Imported legacy registry file"
    );
    Ok(devices.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_repo() -> DeviceRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = DeviceRepository::new(pool);
        repo.ensure_schema().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn imports_once_and_renames_file() {
        let repo = memory_repo().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(
            &path,
            r#"[
                {"ip": "192.168.3.10", "buildTime": "2025-02-20_11:31:45", "region": "east"},
                {"identity": "dev-existing", "ip": "192.168.3.11", "status": "online"}
            ]"#,
        )
        .unwrap();

        let imported = import_if_needed(&repo, &path).await.unwrap();
        assert_eq!(imported, 2);
        assert!(!path.exists());
        // backup with timestamp suffix exists
        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("bak-"))
            .collect();
        assert_eq!(backups.len(), 1);

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|d| d.identity == "dev-existing"));
        assert!(all.iter().all(|d| !d.identity.is_empty()));
    }

    #[tokio::test]
    async fn does_not_run_when_store_is_populated() {
        let repo = memory_repo().await;
        repo.upsert(&Device::new("10.0.0.1", "", "")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, r#"[{"ip": "10.0.0.2"}]"#).unwrap();

        let imported = import_if_needed(&repo, &path).await.unwrap();
        assert_eq!(imported, 0);
        assert!(path.exists()); // untouched
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_a_no_op() {
        let repo = memory_repo().await;
        let imported = import_if_needed(&repo, Path::new("nope/devices.json"))
            .await
            .unwrap();
        assert_eq!(imported, 0);
    }
}
