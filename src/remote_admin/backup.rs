//! Backup state machine
//!
//! Per device: `Connect → StopService → CopyDbOut → RestartService → Done`.
//! The service is restarted even when the copy fails; a backup failure must
//! never leave the device's service stopped. The remote file is streamed
//! byte-for-byte over the session's stdout (no size precomputation on this
//! path; restore verifies sizes on the way back in).

use super::session::{RemoteShell, SshSession};
use super::types::{cmd, now_stamp, BackupPoint, BackupResult, BackupSettings};
use super::RemoteAdmin;
use crate::device_registry::Device;
use crate::orchestrator::{self, HEAVY_CONCURRENCY};
use std::path::Path;

impl RemoteAdmin {
    /// Back up every device's database into
    /// `root/region/{identity}/{stamp}/`. One result per device; order
    /// unspecified; a per-device failure never aborts the batch.
    pub async fn backup(
        &self,
        devices: Vec<Device>,
        settings: &BackupSettings,
    ) -> Vec<BackupResult> {
        tracing::info!(devices = devices.len(), "Backup batch started");

        let service = self.service.clone();
        let db_path = self.remote_db_path.clone();
        let port = self.ssh_port;
        let settings = settings.clone();

        let results = orchestrator::run(
            devices,
            HEAVY_CONCURRENCY,
            move |device| {
                let service = service.clone();
                let db_path = db_path.clone();
                let settings = settings.clone();
                async move {
                    let ip = device.ip.clone();
                    tokio::task::spawn_blocking(move || {
                        backup_one(&device, &settings, &service, &db_path, port)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        BackupResult::failure(&ip, format!("backup worker aborted: {}", e))
                    })
                }
            },
            |device| BackupResult::failure(&device.ip, "backup worker aborted".to_string()),
        )
        .await;

        let ok = results.iter().filter(|r| r.success).count();
        tracing::info!(ok = ok, failed = results.len() - ok, "Backup batch complete");
        results
    }
}

fn backup_one(
    device: &Device,
    settings: &BackupSettings,
    service: &str,
    db_path: &str,
    port: u16,
) -> BackupResult {
    let session = match SshSession::connect(
        &device.ip,
        port,
        &settings.ssh_username,
        &settings.ssh_password,
    ) {
        Ok(s) => s,
        Err(e) => return BackupResult::failure(&device.ip, e.to_string()),
    };
    run_backup(&session, device, settings, service, db_path)
}

/// Backup state machine against an established session. The service is
/// restarted on every path that reaches the stop.
fn run_backup(
    shell: &dyn RemoteShell,
    device: &Device,
    settings: &BackupSettings,
    service: &str,
    db_path: &str,
) -> BackupResult {
    if let Err(e) = shell.exec_ok(&cmd::stop_service(service)) {
        // Service untouched; nothing to restart.
        return BackupResult::failure(&device.ip, e.to_string());
    }

    let stamp = now_stamp();
    let point_dir = settings
        .root
        .join(&settings.region)
        .join(&device.identity)
        .join(&stamp);
    let db_name = Path::new(db_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "device.db".to_string());

    let copy_result = std::fs::create_dir_all(&point_dir)
        .map_err(crate::error::Error::from)
        .and_then(|_| shell.read_to_file(&cmd::read_file(db_path), &point_dir.join(&db_name)));

    // Restart regardless of the copy outcome.
    let restart_result = shell.exec_ok(&cmd::start_service(service));

    match (copy_result, restart_result) {
        (Ok(bytes), Ok(_)) => {
            tracing::info!(ip = %device.ip, bytes = bytes, stamp = %stamp, "Backup stored");
            BackupResult {
                target: device.ip.clone(),
                success: true,
                message: format!("backed up {} bytes", bytes),
                point: Some(BackupPoint {
                    device_identity: device.identity.clone(),
                    timestamp: stamp,
                    path: point_dir,
                }),
            }
        }
        (Ok(_), Err(restart)) => {
            // Data arrived but the device is not Done; drop the partial point.
            let _ = std::fs::remove_dir_all(&point_dir);
            BackupResult::failure(
                &device.ip,
                format!("backup copied but service restart failed: {}", restart),
            )
        }
        (Err(copy), restart) => {
            let _ = std::fs::remove_dir_all(&point_dir);
            if let Err(restart) = restart {
                tracing::error!(ip = %device.ip, error = %restart, "Restart after failed copy also failed");
            }
            BackupResult::failure(&device.ip, copy.to_string())
        }
    }
}
