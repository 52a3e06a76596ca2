//! SettingsStore - durable backup settings record
//!
//! One JSON file holding the backup settings (root path, region, SSH
//! credentials). Writes are atomic: the payload goes to a temp file which
//! is renamed over the target, so a crash mid-write leaves either the old
//! or the fully-written new file, never a truncated one. If the rename
//! itself fails, the target is read back and the write is accepted when
//! its content already equals the payload.

use crate::error::{Error, Result};
use crate::remote_admin::BackupSettings;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the settings record; `None` when no record exists yet.
    pub fn load(&self) -> Result<Option<BackupSettings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, settings: &BackupSettings) -> Result<()> {
        let payload = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &payload)
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");

    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(payload)?;
        file.sync_all()?;
    }

    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Some filesystems fail the rename after the content already
            // landed; accept when the target matches what was written.
            match std::fs::read(path) {
                Ok(existing) if existing == payload => {
                    let _ = std::fs::remove_file(&tmp);
                    Ok(())
                }
                _ => Err(Error::Io(rename_err)),
            }
        }
    }
}
