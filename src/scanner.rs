//! Scanner - IP sweep and registry refresh
//!
//! ## Responsibilities
//!
//! - Sweep an explicit IP range or a CIDR block, probing every address
//! - Create a registry entry only on a successful probe; an address that
//!   fails or times out leaves no trace in the results or the registry
//! - Refresh all known devices (status + build time), one result each
//!
//! A registry store write failure during a sweep does not drop the device:
//! the in-memory registry entry is valid, so the device stays in the scan
//! outcome and the failure is carried back to the caller alongside it.
//!
//! Probing fans out at `PROBE_CONCURRENCY`; registry mutation happens after
//! fan-in so workers never contend on the registry lock.

use crate::device_probe::DeviceProber;
use crate::device_registry::{Device, DeviceRegistry, DeviceStatus};
use crate::error::{Error, Result};
use crate::orchestrator::{self, PROBE_CONCURRENCY};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Outcome of refreshing one known device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub identity: String,
    pub ip: String,
    pub online: bool,
    pub message: String,
}

/// Result of one sweep: the responsive devices, plus any store write
/// failures for devices that are registered in memory but not durably.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub devices: Vec<Device>,
    /// One `ip: error` entry per device whose store write failed
    pub persistence_failures: Vec<String>,
}

pub struct Scanner {
    prober: Arc<dyn DeviceProber>,
}

impl Scanner {
    pub fn new(prober: Arc<dyn DeviceProber>) -> Self {
        Self { prober }
    }

    /// Sweep an inclusive IPv4 range and register every responsive device
    /// under `region`. Unreachable addresses do not appear in the outcome.
    pub async fn scan_range(
        &self,
        registry: &DeviceRegistry,
        start: &str,
        end: &str,
        region: &str,
    ) -> Result<ScanOutcome> {
        let ips = parse_range(start, end)?;
        Ok(self.sweep(registry, ips, region).await)
    }

    /// Sweep a CIDR block (or a single IP without a prefix).
    pub async fn scan_cidr(
        &self,
        registry: &DeviceRegistry,
        cidr: &str,
        region: &str,
    ) -> Result<ScanOutcome> {
        let ips = parse_cidr(cidr)?;
        Ok(self.sweep(registry, ips, region).await)
    }

    async fn sweep(&self, registry: &DeviceRegistry, ips: Vec<String>, region: &str) -> ScanOutcome {
        let total = ips.len();
        tracing::info!(targets = total, region = %region, "Scan started");

        let prober = self.prober.clone();
        let outcomes = orchestrator::run(
            ips,
            PROBE_CONCURRENCY,
            move |ip| {
                let prober = prober.clone();
                async move {
                    let result = prober.test_device(&ip).await;
                    (ip, result)
                }
            },
            |ip| (ip.clone(), Err(Error::Internal("probe worker aborted".into()))),
        )
        .await;

        let mut found = ScanOutcome::default();
        for (ip, outcome) in outcomes {
            match outcome {
                Ok(build_time) => {
                    let device = Device::new(&ip, &build_time, region);
                    match registry.add(device.clone()).await {
                        Ok(device) => found.devices.push(device),
                        Err(e) => {
                            // The cache took the device; only the store write
                            // failed. Keep it in the outcome and tell the caller.
                            tracing::error!(ip = %ip, error = %e, "Failed to persist scanned device");
                            found.persistence_failures.push(format!("{}: {}", ip, e));
                            found.devices.push(device);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(ip = %ip, error = %e, "No device at address");
                }
            }
        }

        tracing::info!(
            found = found.devices.len(),
            targets = total,
            "Scan complete"
        );
        found
    }

    /// Re-probe every registered device, updating status and build time.
    /// One result per device; order unspecified.
    pub async fn refresh(&self, registry: &DeviceRegistry) -> Vec<RefreshResult> {
        let devices = registry.get_all().await;
        tracing::info!(devices = devices.len(), "Refresh started");

        let prober = self.prober.clone();
        let outcomes = orchestrator::run(
            devices,
            PROBE_CONCURRENCY,
            move |device| {
                let prober = prober.clone();
                async move {
                    let result = prober.test_device(&device.ip).await;
                    (device, result)
                }
            },
            |device| {
                (
                    device.clone(),
                    Err(Error::Internal("probe worker aborted".into())),
                )
            },
        )
        .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (mut device, outcome) in outcomes {
            let result = match outcome {
                Ok(build_time) => {
                    device.status = DeviceStatus::Online;
                    device.build_time = build_time;
                    RefreshResult {
                        identity: device.identity.clone(),
                        ip: device.ip.clone(),
                        online: true,
                        message: "online".to_string(),
                    }
                }
                Err(e) => {
                    device.status = DeviceStatus::Offline;
                    RefreshResult {
                        identity: device.identity.clone(),
                        ip: device.ip.clone(),
                        online: false,
                        message: e.to_string(),
                    }
                }
            };
            if let Err(e) = registry.add(device).await {
                tracing::error!(identity = %result.identity, error = %e, "Failed to persist refresh");
            }
            results.push(result);
        }
        results
    }
}

/// Largest sweep accepted, a /16 worth of addresses. Anything bigger is a
/// typo, not a management network.
pub const MAX_SCAN_TARGETS: u64 = 65_536;

/// Expand an inclusive IPv4 range into individual addresses.
pub fn parse_range(start: &str, end: &str) -> Result<Vec<String>> {
    let start_ip: Ipv4Addr = start
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid IP: {}", start)))?;
    let end_ip: Ipv4Addr = end
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid IP: {}", end)))?;

    let (start_u32, end_u32) = (u32::from(start_ip), u32::from(end_ip));
    if start_u32 > end_u32 {
        return Err(Error::Validation(format!(
            "Range start {} is after end {}",
            start, end
        )));
    }
    let count = u64::from(end_u32) - u64::from(start_u32) + 1;
    if count > MAX_SCAN_TARGETS {
        return Err(Error::Validation(format!(
            "Range {}-{} covers {} addresses (limit {})",
            start, end, count, MAX_SCAN_TARGETS
        )));
    }

    Ok((start_u32..=end_u32)
        .map(|n| Ipv4Addr::from(n).to_string())
        .collect())
}

/// Parse CIDR notation to an IP list. A bare IP yields a single address;
/// /24 through /30 skip the network and broadcast addresses; prefixes
/// shorter than /16 are rejected.
pub fn parse_cidr(cidr: &str) -> Result<Vec<String>> {
    if !cidr.contains('/') {
        return cidr
            .parse::<Ipv4Addr>()
            .map(|ip| vec![ip.to_string()])
            .map_err(|_| Error::Validation(format!("Invalid IP: {}", cidr)));
    }

    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(Error::Validation(format!("Invalid CIDR format: {}", cidr)));
    }

    let base_ip: Ipv4Addr = parts[0]
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid IP: {}", parts[0])))?;
    let prefix: u8 = parts[1]
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid prefix: {}", parts[1])))?;
    if prefix > 32 {
        return Err(Error::Validation(format!(
            "Invalid prefix: {} (must be 0-32)",
            prefix
        )));
    }
    if prefix < 16 {
        return Err(Error::Validation(format!(
            "Prefix /{} covers more than {} addresses",
            prefix, MAX_SCAN_TARGETS
        )));
    }

    let base_u32 = u32::from(base_ip);
    let mask = if prefix == 0 {
        0
    } else {
        !((1u32 << (32 - prefix)) - 1)
    };
    let network = base_u32 & mask;
    let broadcast = network | !mask;

    // /31 and /32 have no network/broadcast addresses to skip.
    let skip_edges = (24..=30).contains(&prefix);
    let start = if skip_edges { network + 1 } else { network };
    let end = if skip_edges { broadcast - 1 } else { broadcast };

    Ok((start..=end).map(|n| Ipv4Addr::from(n).to_string()).collect())
}
