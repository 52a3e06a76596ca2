//! Clock synchronization
//!
//! Embedded devices drift; backup-point timestamps and on-device logs only
//! line up when the fleet shares the admin host's clock. Each worker reads
//! the host time just before issuing the remote `date`, so the batch start
//! time never becomes the time of a device served minutes later.

use super::session::{RemoteShell, SshSession};
use super::types::{cmd, BackupSettings, TimeSyncResult};
use super::RemoteAdmin;
use crate::device_registry::Device;
use crate::orchestrator::{self, HEAVY_CONCURRENCY};

impl RemoteAdmin {
    /// Set every device's clock to the admin host's current UTC time.
    /// One result per device; order unspecified.
    pub async fn sync_time(
        &self,
        devices: Vec<Device>,
        settings: &BackupSettings,
    ) -> Vec<TimeSyncResult> {
        tracing::info!(devices = devices.len(), "Time sync batch started");

        let port = self.ssh_port;
        let settings = settings.clone();

        let results = orchestrator::run(
            devices,
            HEAVY_CONCURRENCY,
            move |device| {
                let settings = settings.clone();
                async move {
                    let ip = device.ip.clone();
                    tokio::task::spawn_blocking(move || sync_one(&device, &settings, port))
                        .await
                        .unwrap_or_else(|e| {
                            TimeSyncResult::failure(&ip, format!("sync worker aborted: {}", e))
                        })
                }
            },
            |device| TimeSyncResult::failure(&device.ip, "sync worker aborted".to_string()),
        )
        .await;

        let ok = results.iter().filter(|r| r.success).count();
        tracing::info!(ok = ok, failed = results.len() - ok, "Time sync batch complete");
        results
    }
}

fn sync_one(device: &Device, settings: &BackupSettings, port: u16) -> TimeSyncResult {
    let session = match SshSession::connect(
        &device.ip,
        port,
        &settings.ssh_username,
        &settings.ssh_password,
    ) {
        Ok(s) => s,
        Err(e) => return TimeSyncResult::failure(&device.ip, e.to_string()),
    };

    let utc = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    match session.exec_ok(&cmd::set_clock(&utc)) {
        Ok(_) => {
            tracing::info!(ip = %device.ip, utc = %utc, "Clock set");
            TimeSyncResult {
                target: device.ip.clone(),
                success: true,
                message: format!("clock set to {} UTC", utc),
            }
        }
        Err(e) => TimeSyncResult::failure(&device.ip, e.to_string()),
    }
}
