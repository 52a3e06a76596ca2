//! RemoteAdmin - SSH backup and restore of the on-device database
//!
//! ## Responsibilities
//!
//! - Backup: stop the device service, stream the database out to a local
//!   backup point, restart the service (restart even when the copy failed)
//! - Restore: stop, snapshot the remote database, stream the chosen backup
//!   point in, verify size, fix permissions, restart; roll the remote
//!   snapshot back when the transfer fails
//! - Backup-point catalog: timestamped directories under
//!   `root/region/{identity}/{YYYYMMDDHHMMSS}/`, newest first, pruned only
//!   on explicit request
//!
//! The transfer protocol is deliberately manual (remote command + channel
//! stream + size verification + chmod) rather than SFTP/SCP: the
//! verify-by-size and permission-fixup steps are invariants of the device
//! protocol. All SSH work is blocking `ssh2` driven from
//! `spawn_blocking`, so a worker only ever blocks on its own device.
//!
//! ## Module layout
//! - `types`: settings, results, backup points, remote command plans
//! - `session`: the `RemoteShell` trait and its ssh2 implementation
//!   (connect, exec, stream in/out); the state machines run against the
//!   trait so tests can drive them without a live peer
//! - `backup`: backup state machine
//! - `restore`: restore state machine with rollback
//! - `points`: backup-point catalog
//! - `time_sync`: fleet clock synchronization

pub mod backup;
pub mod points;
pub mod restore;
pub mod session;
pub mod time_sync;
pub mod types;

pub use points::{list_points, prune};
pub use session::{RemoteShell, SshSession};
pub use types::{BackupPoint, BackupResult, BackupSettings, RestoreResult, TimeSyncResult};

/// SSH administration over one fleet of devices
pub struct RemoteAdmin {
    /// systemd unit controlled around transfers
    pub service: String,
    /// absolute database path on the devices
    pub remote_db_path: String,
    pub ssh_port: u16,
}

impl RemoteAdmin {
    pub fn new(service: &str, remote_db_path: &str) -> Self {
        Self {
            service: service.to_string(),
            remote_db_path: remote_db_path.to_string(),
            ssh_port: 22,
        }
    }
}
