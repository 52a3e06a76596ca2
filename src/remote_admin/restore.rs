//! Restore state machine with rollback
//!
//! Per device: `Connect → StopService → SnapshotRemote → TransferIn →
//! VerifySize → FixMode → RestartService → Done`. If the transfer or the
//! size verification fails, the pre-restore remote snapshot is copied back
//! over the live path before the service restarts: the device must never
//! end up with neither the old nor the new database.

use super::session::{RemoteShell, SshSession};
use super::types::{cmd, now_stamp, BackupPoint, BackupSettings, RestoreResult};
use super::RemoteAdmin;
use crate::device_registry::Device;
use crate::error::{Error, Result};
use crate::orchestrator::{self, HEAVY_CONCURRENCY};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

impl RemoteAdmin {
    /// Restore each device's database from its chosen backup point.
    /// Devices without a point, or whose point is missing on local disk,
    /// fail fast before any remote mutation. One result per device.
    pub async fn restore(
        &self,
        devices: Vec<Device>,
        settings: &BackupSettings,
        points: HashMap<String, BackupPoint>,
    ) -> Vec<RestoreResult> {
        tracing::info!(devices = devices.len(), "Restore batch started");

        let service = self.service.clone();
        let db_path = self.remote_db_path.clone();
        let port = self.ssh_port;
        let settings = settings.clone();
        let points = Arc::new(points);

        let results = orchestrator::run(
            devices,
            HEAVY_CONCURRENCY,
            move |device| {
                let service = service.clone();
                let db_path = db_path.clone();
                let settings = settings.clone();
                let points = points.clone();
                async move {
                    let ip = device.ip.clone();

                    // Precondition: the local point must be complete before
                    // the device is touched at all.
                    let local_db = match locate_local_db(&device, points.as_ref(), &db_path) {
                        Ok(path) => path,
                        Err(e) => return RestoreResult::failure(&ip, e.to_string()),
                    };

                    tokio::task::spawn_blocking(move || {
                        restore_one(&device, &settings, &service, &db_path, port, &local_db)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        RestoreResult::failure(&ip, format!("restore worker aborted: {}", e))
                    })
                }
            },
            |device| RestoreResult::failure(&device.ip, "restore worker aborted".to_string()),
        )
        .await;

        let ok = results.iter().filter(|r| r.success).count();
        tracing::info!(ok = ok, failed = results.len() - ok, "Restore batch complete");
        results
    }
}

/// Resolve and validate the local database file for a device's chosen
/// backup point.
fn locate_local_db(
    device: &Device,
    points: &HashMap<String, BackupPoint>,
    remote_db_path: &str,
) -> Result<PathBuf> {
    let point = points.get(&device.identity).ok_or_else(|| {
        Error::Validation(format!("no backup point selected for {}", device.identity))
    })?;

    if !point.path.is_dir() {
        return Err(Error::Validation(format!(
            "backup point directory missing: {}",
            point.path.display()
        )));
    }

    let db_name = Path::new(remote_db_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "device.db".to_string());
    let local_db = point.path.join(db_name);
    if !local_db.is_file() {
        return Err(Error::Validation(format!(
            "backup point database missing: {}",
            local_db.display()
        )));
    }
    Ok(local_db)
}

fn restore_one(
    device: &Device,
    settings: &BackupSettings,
    service: &str,
    db_path: &str,
    port: u16,
    local_db: &Path,
) -> RestoreResult {
    let session = match SshSession::connect(
        &device.ip,
        port,
        &settings.ssh_username,
        &settings.ssh_password,
    ) {
        Ok(s) => s,
        Err(e) => return RestoreResult::failure(&device.ip, e.to_string()),
    };
    run_restore(&session, device, service, db_path, local_db)
}

/// Restore state machine against an established session. A failed
/// transfer rolls the pre-restore snapshot back before the restart.
fn run_restore(
    shell: &dyn RemoteShell,
    device: &Device,
    service: &str,
    db_path: &str,
    local_db: &Path,
) -> RestoreResult {
    if let Err(e) = shell.exec_ok(&cmd::stop_service(service)) {
        return RestoreResult::failure(&device.ip, e.to_string());
    }

    let stamp = now_stamp();
    let snapshot_result = shell.exec_ok(&cmd::snapshot(db_path, &stamp));

    let transfer_result = match &snapshot_result {
        Ok(_) => transfer_in(shell, local_db, db_path),
        Err(e) => Err(Error::Ssh(format!("pre-restore snapshot failed: {}", e))),
    };

    if snapshot_result.is_ok() {
        if let Err(ref transfer_err) = transfer_result {
            // Put the old database back before the service comes up.
            match shell.exec_ok(&cmd::rollback(db_path, &stamp)) {
                Ok(_) => {
                    tracing::warn!(ip = %device.ip, error = %transfer_err, "Transfer failed, snapshot rolled back")
                }
                Err(e) => {
                    tracing::error!(ip = %device.ip, error = %e, "Rollback after failed transfer also failed")
                }
            }
        }
    }

    let restart_result = shell.exec_ok(&cmd::start_service(service));

    match (transfer_result, restart_result) {
        (Ok(bytes), Ok(_)) => {
            tracing::info!(ip = %device.ip, bytes = bytes, "Restore complete");
            RestoreResult {
                target: device.ip.clone(),
                success: true,
                message: format!("restored {} bytes", bytes),
            }
        }
        (Ok(_), Err(restart)) => RestoreResult::failure(
            &device.ip,
            format!("restored but service restart failed: {}", restart),
        ),
        (Err(transfer), restart) => {
            if let Err(restart) = restart {
                tracing::error!(ip = %device.ip, error = %restart, "Restart after failed restore also failed");
            }
            RestoreResult::failure(&device.ip, transfer.to_string())
        }
    }
}

/// Manual transfer-in: ensure the remote directory, stream the local file
/// into a remote block-copy receiver, verify the remote size against the
/// local size, then match the remote mode to the local one. Any size
/// mismatch is a hard failure; truncated transfers are never accepted.
fn transfer_in(shell: &dyn RemoteShell, local_db: &Path, db_path: &str) -> Result<u64> {
    if let Some(parent) = Path::new(db_path).parent() {
        shell.exec_ok(&cmd::ensure_dir(&parent.to_string_lossy()))?;
    }

    let sent = shell.stream_to_command(local_db, &cmd::receive_file(db_path))?;

    let remote_size: u64 = shell
        .exec_ok(&cmd::file_size(db_path))?
        .trim()
        .parse()
        .map_err(|e| Error::Ssh(format!("unparseable remote size: {}", e)))?;
    let local_size = std::fs::metadata(local_db)?.len();
    if remote_size != local_size {
        return Err(Error::Integrity(format!(
            "size mismatch after transfer: local {} vs remote {}",
            local_size, remote_size
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(local_db)?.permissions().mode();
        shell.exec_ok(&cmd::set_mode(db_path, mode))?;
    }

    Ok(sent)
}
