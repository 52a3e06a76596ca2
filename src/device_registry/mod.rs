//! DeviceRegistry - authoritative device collection
//!
//! ## Responsibilities
//!
//! - Identity-keyed device store: in-memory cache + durable SQLite table
//! - Region filtering with a materialized filtered view
//! - Upsert-by-identity, removal, region assignment (single and bulk)
//! - One-shot import of the legacy flat-file registry at startup
//!
//! ## Module layout
//! - `types`: Device / DeviceStatus / identity generation
//! - `repository`: DB persistence
//! - `service`: cache + lock + mutation ordering (mutate, release, persist)
//! - `legacy`: flat-file importer

pub mod legacy;
pub mod repository;
pub mod service;
pub mod types;

pub use repository::DeviceRepository;
pub use service::DeviceRegistry;
pub use types::{generate_identity, Device, DeviceStatus};
