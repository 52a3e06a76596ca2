//! RemoteAdmin types and remote command plans

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Timestamp layout used for backup-point directory names and remote
/// snapshot suffixes: sortable, fixed width, parseable.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Current timestamp in `YYYYMMDDHHMMSS` form.
pub fn now_stamp() -> String {
    chrono::Utc::now().format(STAMP_FORMAT).to_string()
}

/// Validate a backup-point directory name as a timestamp.
pub fn parse_stamp(s: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(s, STAMP_FORMAT).ok()
}

/// Persisted backup settings (see `settings_store`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    /// Local root directory of the backup tree
    pub root: PathBuf,
    /// Region sub-path under the root
    pub region: String,
    pub ssh_username: String,
    pub ssh_password: String,
}

/// One timestamped snapshot of a device's remote database, stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPoint {
    pub device_identity: String,
    pub timestamp: String,
    pub path: PathBuf,
}

/// Outcome of one device backup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub target: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<BackupPoint>,
}

impl BackupResult {
    pub(crate) fn failure(target: &str, message: String) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
            point: None,
        }
    }
}

/// Outcome of one device clock synchronization
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncResult {
    pub target: String,
    pub success: bool,
    pub message: String,
}

impl TimeSyncResult {
    pub(crate) fn failure(target: &str, message: String) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
        }
    }
}

/// Outcome of one device restore
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub target: String,
    pub success: bool,
    pub message: String,
}

impl RestoreResult {
    pub(crate) fn failure(target: &str, message: String) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
        }
    }
}

/// Remote command plans. Pure string builders so the state machines stay
/// testable without a live SSH peer. Paths come from configuration, not
/// user input; they are single-quoted for the remote shell.
pub mod cmd {
    fn quote(path: &str) -> String {
        format!("'{}'", path.replace('\'', r"'\''"))
    }

    pub fn stop_service(unit: &str) -> String {
        format!("systemctl stop {}", unit)
    }

    pub fn start_service(unit: &str) -> String {
        format!("systemctl start {}", unit)
    }

    /// Stream the remote file over the session's stdout.
    pub fn read_file(path: &str) -> String {
        format!("cat {}", quote(path))
    }

    /// Snapshot the live database next to itself before a restore.
    pub fn snapshot(db_path: &str, stamp: &str) -> String {
        format!(
            "cp {} {}",
            quote(db_path),
            quote(&format!("{}.bak-{}", db_path, stamp))
        )
    }

    /// Copy a pre-restore snapshot back over the live path.
    pub fn rollback(db_path: &str, stamp: &str) -> String {
        format!(
            "cp {} {}",
            quote(&format!("{}.bak-{}", db_path, stamp)),
            quote(db_path)
        )
    }

    pub fn ensure_dir(dir: &str) -> String {
        format!("mkdir -p {}", quote(dir))
    }

    /// Block-copy receiver reading the session's stdin into the target file.
    pub fn receive_file(path: &str) -> String {
        format!("dd of={}", quote(path))
    }

    /// Query the remote file size for transfer verification.
    pub fn file_size(path: &str) -> String {
        format!("stat -c %s {}", quote(path))
    }

    /// Match the remote file mode to the local one.
    pub fn set_mode(path: &str, mode: u32) -> String {
        format!("chmod {:o} {}", mode & 0o7777, quote(path))
    }

    /// Set the remote clock to a UTC instant (`YYYY-MM-DD HH:MM:SS`).
    pub fn set_clock(utc: &str) -> String {
        format!("date -u -s {}", quote(utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_is_fixed_width_and_parseable() {
        let stamp = now_stamp();
        assert_eq!(stamp.len(), 14);
        assert!(parse_stamp(&stamp).is_some());
        assert!(parse_stamp("not-a-stamp").is_none());
        assert!(parse_stamp("20250230120000").is_none()); // Feb 30
    }

    #[test]
    fn stamps_sort_chronologically() {
        let a = "20250220113145";
        let b = "20251101000000";
        assert!(a < b);
        assert!(parse_stamp(a).unwrap() < parse_stamp(b).unwrap());
    }

    #[test]
    fn command_plans_quote_paths() {
        assert_eq!(
            cmd::read_file("/opt/app/data/app.db"),
            "cat '/opt/app/data/app.db'"
        );
        assert_eq!(
            cmd::snapshot("/opt/app/data/app.db", "20250220113145"),
            "cp '/opt/app/data/app.db' '/opt/app/data/app.db.bak-20250220113145'"
        );
        assert_eq!(
            cmd::rollback("/opt/app/data/app.db", "20250220113145"),
            "cp '/opt/app/data/app.db.bak-20250220113145' '/opt/app/data/app.db'"
        );
        assert_eq!(cmd::receive_file("/tmp/x"), "dd of='/tmp/x'");
        assert_eq!(cmd::file_size("/tmp/x"), "stat -c %s '/tmp/x'");
        assert_eq!(cmd::set_mode("/tmp/x", 0o100644), "chmod 644 '/tmp/x'");
        assert_eq!(cmd::stop_service("appsvr"), "systemctl stop appsvr");
        assert_eq!(
            cmd::set_clock("2025-02-20 11:31:45"),
            "date -u -s '2025-02-20 11:31:45'"
        );
    }
}
