//! camfleet - fleet administration core for embedded camera appliances
//!
//! ## Components
//!
//! 1. DeviceRegistry - identity-keyed device collection (cache + store)
//! 2. DeviceProbe - stateless HTTP health check and session login
//! 3. Orchestrator - bounded fan-out/fan-in for every bulk operation
//! 4. Scanner - IP sweep and registry refresh
//! 5. FirmwareUpdater - multipart firmware push
//! 6. RemoteAdmin - SSH backup/restore with verification and rollback
//! 7. CameraBatchConfigurator - session-reuse batched camera setup
//! 8. SettingsStore - atomic backup-settings record
//!
//! ## Design principles
//!
//! - One flat device collection; every bulk operation is a one-shot
//!   fan-out/fan-in with per-item failure isolation
//! - Identity, not IP, is the device primary key
//! - Complete result sets: one result per input item, order unspecified

pub mod camera_batch;
pub mod config;
pub mod device_probe;
pub mod device_registry;
pub mod error;
pub mod firmware;
pub mod logging;
pub mod orchestrator;
pub mod remote_admin;
pub mod scanner;
pub mod settings_store;

pub use config::AppConfig;
pub use error::{Error, Result};
