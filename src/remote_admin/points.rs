//! Backup-point catalog
//!
//! Points live under `root/region/{identity}/{YYYYMMDDHHMMSS}/` on local
//! disk. The directory tree is the catalog; nothing else indexes it.
//! Points are created only by a completed backup and deleted only here.

use super::types::{parse_stamp, BackupPoint};
use crate::error::{Error, Result};
use std::path::Path;

/// List a device's backup points, newest first. Directories whose names
/// are not valid timestamps are ignored.
pub fn list_points(root: &Path, region: &str, identity: &str) -> Result<Vec<BackupPoint>> {
    let device_dir = root.join(region).join(identity);
    if !device_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut points = Vec::new();
    for entry in std::fs::read_dir(&device_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if parse_stamp(&name).is_none() {
            tracing::debug!(dir = %name, "Skipping non-timestamp directory");
            continue;
        }
        points.push(BackupPoint {
            device_identity: identity.to_string(),
            timestamp: name,
            path: entry.path(),
        });
    }

    // Fixed-width stamps sort lexicographically; newest first.
    points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(points)
}

/// Delete one backup point. Explicit pruning is the only deletion path.
pub fn prune(point: &BackupPoint) -> Result<()> {
    if !point.path.is_dir() {
        return Err(Error::NotFound(format!(
            "backup point missing: {}",
            point.path.display()
        )));
    }
    std::fs::remove_dir_all(&point.path)?;
    tracing::info!(
        identity = %point.device_identity,
        timestamp = %point.timestamp,
        "Backup point pruned"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_newest_first_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("east").join("dev-a");
        for stamp in ["20250220113145", "20251101000000", "20240101083000"] {
            std::fs::create_dir_all(device_dir.join(stamp)).unwrap();
        }
        std::fs::create_dir_all(device_dir.join("not-a-stamp")).unwrap();
        std::fs::write(device_dir.join("stray.txt"), b"x").unwrap();

        let points = list_points(dir.path(), "east", "dev-a").unwrap();
        let stamps: Vec<&str> = points.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec!["20251101000000", "20250220113145", "20240101083000"]
        );
    }

    #[test]
    fn unknown_device_has_no_points() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_points(dir.path(), "east", "dev-a").unwrap().is_empty());
    }

    #[test]
    fn prune_removes_only_the_chosen_point() {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("east").join("dev-a");
        std::fs::create_dir_all(device_dir.join("20250220113145")).unwrap();
        std::fs::create_dir_all(device_dir.join("20251101000000")).unwrap();

        let points = list_points(dir.path(), "east", "dev-a").unwrap();
        prune(&points[1]).unwrap();

        let remaining = list_points(dir.path(), "east", "dev-a").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, "20251101000000");
    }

    #[test]
    fn prune_of_missing_point_is_not_found() {
        let point = BackupPoint {
            device_identity: "dev-a".to_string(),
            timestamp: "20250220113145".to_string(),
            path: std::path::PathBuf::from("/nonexistent/20250220113145"),
        };
        assert!(matches!(prune(&point), Err(Error::NotFound(_))));
    }
}
