//! Application configuration
//!
//! Environment-variable backed settings with sensible defaults for the
//! appliance fleet this tool manages.

use std::path::PathBuf;

use crate::device_probe::HttpDeviceProbe;
use crate::remote_admin::RemoteAdmin;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Registry database URL (SQLite)
    pub database_url: String,
    /// HTTP control-API port on the devices
    pub device_api_port: u16,
    /// systemd unit name of the on-device service stopped around backup/restore
    pub device_service: String,
    /// Absolute path of the database file on the devices
    pub device_db_path: String,
    /// Legacy flat-file registry location (imported once, then renamed)
    pub legacy_registry_path: PathBuf,
    /// Local root directory for backup points
    pub backup_root: PathBuf,
}

impl AppConfig {
    /// HTTP probe against the configured device control-API port
    pub fn http_probe(&self) -> HttpDeviceProbe {
        HttpDeviceProbe::new(self.device_api_port)
    }

    /// SSH administrator bound to the configured on-device service and
    /// database path
    pub fn remote_admin(&self) -> RemoteAdmin {
        RemoteAdmin::new(&self.device_service, &self.device_db_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://camfleet.db".to_string()),
            device_api_port: std::env::var("DEVICE_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(80),
            device_service: std::env::var("DEVICE_SERVICE")
                .unwrap_or_else(|_| "appsvr".to_string()),
            device_db_path: std::env::var("DEVICE_DB_PATH")
                .unwrap_or_else(|_| "/opt/app/data/app.db".to_string()),
            legacy_registry_path: std::env::var("LEGACY_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("devices.json")),
            backup_root: std::env::var("BACKUP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("backups")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wires_remote_admin_from_device_settings() {
        let config = AppConfig {
            device_service: "appsvr".to_string(),
            device_db_path: "/opt/app/data/app.db".to_string(),
            ..AppConfig::default()
        };

        let admin = config.remote_admin();
        assert_eq!(admin.service, "appsvr");
        assert_eq!(admin.remote_db_path, "/opt/app/data/app.db");
        assert_eq!(admin.ssh_port, 22);
    }
}
