//! FirmwareUpdater - push one firmware image to many devices
//!
//! ## Responsibilities
//!
//! - Validate the image file before any device is touched; a missing or
//!   empty file is a single synthetic failure result, never a partial batch
//! - Per device: login, then multipart upload to the upgrade endpoint with
//!   the session token in the request header
//! - Adaptive upload timeout so large images are not truncated and small
//!   ones do not hang on a dead device

use crate::device_probe::{DeviceProber, SESSION_TOKEN_HEADER};
use crate::device_registry::Device;
use crate::orchestrator::{self, HEAVY_CONCURRENCY};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Upload failure messages include at most this much of the response body.
const ERROR_BODY_CAP: usize = 512;

/// Outcome of one device update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub target: String,
    pub success: bool,
    pub message: String,
}

impl UpdateResult {
    fn failure(target: &str, message: String) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
        }
    }
}

/// Upload timeout: `max(30s, 10s per MB)`, MB rounded up.
pub fn upload_timeout(file_len: u64) -> Duration {
    const MB: u64 = 1024 * 1024;
    let megabytes = file_len.div_ceil(MB);
    Duration::from_secs((10 * megabytes).max(30))
}

pub struct FirmwareUpdater {
    prober: Arc<dyn DeviceProber>,
    client: reqwest::Client,
    port: u16,
}

impl FirmwareUpdater {
    pub fn new(prober: Arc<dyn DeviceProber>, client: reqwest::Client, port: u16) -> Self {
        Self {
            prober,
            client,
            port,
        }
    }

    /// Push the image at `file_path` to every device. One result per
    /// device; order unspecified. A per-device failure (login, transport,
    /// non-2xx status) never aborts the rest of the batch.
    pub async fn update(
        &self,
        devices: Vec<Device>,
        username: &str,
        password: &str,
        file_path: &Path,
    ) -> Vec<UpdateResult> {
        // Precondition: fail fast before touching any device.
        let image = match std::fs::read(file_path) {
            Ok(data) if !data.is_empty() => Arc::new(data),
            Ok(_) => {
                return vec![UpdateResult::failure(
                    &file_path.display().to_string(),
                    "firmware file is empty".to_string(),
                )]
            }
            Err(e) => {
                return vec![UpdateResult::failure(
                    &file_path.display().to_string(),
                    format!("firmware file unreadable: {}", e),
                )]
            }
        };

        let timeout = upload_timeout(image.len() as u64);
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "firmware.bin".to_string());

        tracing::info!(
            devices = devices.len(),
            size = image.len(),
            timeout_secs = timeout.as_secs(),
            "Firmware update started"
        );

        let prober = self.prober.clone();
        let client = self.client.clone();
        let port = self.port;
        let username = username.to_string();
        let password = password.to_string();

        let results = orchestrator::run(
            devices,
            HEAVY_CONCURRENCY,
            move |device| {
                let prober = prober.clone();
                let client = client.clone();
                let image = image.clone();
                let file_name = file_name.clone();
                let username = username.clone();
                let password = password.clone();
                async move {
                    update_one(
                        &*prober, &client, port, &device, &username, &password, &image,
                        &file_name, timeout,
                    )
                    .await
                }
            },
            |device| UpdateResult::failure(&device.ip, "update worker aborted".to_string()),
        )
        .await;

        let ok = results.iter().filter(|r| r.success).count();
        tracing::info!(ok = ok, failed = results.len() - ok, "Firmware update complete");
        results
    }
}

#[allow(clippy::too_many_arguments)]
async fn update_one(
    prober: &dyn DeviceProber,
    client: &reqwest::Client,
    port: u16,
    device: &Device,
    username: &str,
    password: &str,
    image: &Arc<Vec<u8>>,
    file_name: &str,
    timeout: Duration,
) -> UpdateResult {
    let token = match prober.login(&device.ip, username, password).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(ip = %device.ip, error = %e, "Firmware update login failed");
            return UpdateResult::failure(&device.ip, e.to_string());
        }
    };

    let form = Form::new().part(
        "binary",
        Part::bytes(image.as_ref().clone()).file_name(file_name.to_string()),
    );

    let response = client
        .post(format!("http://{}:{}/api/system/upgrade", device.ip, port))
        .header(SESSION_TOKEN_HEADER, token.as_str())
        .timeout(timeout)
        .multipart(form)
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!(ip = %device.ip, "Firmware uploaded");
            UpdateResult {
                target: device.ip.clone(),
                success: true,
                message: "upload accepted".to_string(),
            }
        }
        Ok(resp) => {
            let status = resp.status();
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_CAP);
            UpdateResult::failure(&device.ip, format!("upgrade returned {}: {}", status, body))
        }
        Err(e) => UpdateResult::failure(&device.ip, format!("upload failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_probe::SessionToken;
    use crate::device_registry::DeviceStatus;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    struct FakeLogin {
        /// IPs whose login is rejected
        reject: Vec<String>,
    }

    #[async_trait]
    impl DeviceProber for FakeLogin {
        async fn test_device(&self, _ip: &str) -> Result<String> {
            unreachable!("not probed by updater")
        }

        async fn login(&self, ip: &str, _user: &str, _pass: &str) -> Result<SessionToken> {
            if self.reject.iter().any(|r| r == ip) {
                Err(Error::Login(format!("{}: bad credentials", ip)))
            } else {
                Ok(SessionToken::new("session-1"))
            }
        }
    }

    fn device(ip: &str) -> Device {
        Device {
            identity: format!("dev-{}", ip),
            ip: ip.to_string(),
            build_time: String::new(),
            status: DeviceStatus::Online,
            region: String::new(),
        }
    }

    #[test]
    fn timeout_scales_with_size() {
        const MB: u64 = 1024 * 1024;
        assert_eq!(upload_timeout(0), Duration::from_secs(30));
        assert_eq!(upload_timeout(MB), Duration::from_secs(30));
        assert_eq!(upload_timeout(3 * MB), Duration::from_secs(30));
        assert_eq!(upload_timeout(5 * MB), Duration::from_secs(50));
        assert_eq!(upload_timeout(100 * MB), Duration::from_secs(1000));
    }

    #[tokio::test]
    async fn missing_file_yields_single_synthetic_failure() {
        let updater = FirmwareUpdater::new(
            Arc::new(FakeLogin { reject: vec![] }),
            reqwest::Client::new(),
            80,
        );
        let results = updater
            .update(
                vec![device("10.0.0.1"), device("10.0.0.2")],
                "admin",
                "pw",
                Path::new("does-not-exist.bin"),
            )
            .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].message.contains("unreadable"));
    }

    #[tokio::test]
    async fn login_failure_isolated_to_one_device() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("fw.bin");
        std::fs::write(&image, b"firmware-bytes").unwrap();

        // B's login fails; A and C pass login and then fail at transport
        // (nothing listens on the loopback addresses), which must not be
        // reported as a login failure.
        let updater = FirmwareUpdater::new(
            Arc::new(FakeLogin {
                reject: vec!["127.0.0.2".to_string()],
            }),
            reqwest::Client::new(),
            1,
        );
        let results = updater
            .update(
                vec![device("127.0.0.1"), device("127.0.0.2"), device("127.0.0.3")],
                "admin",
                "pw",
                &image,
            )
            .await;

        assert_eq!(results.len(), 3);
        let b = results.iter().find(|r| r.target == "127.0.0.2").unwrap();
        assert!(!b.success);
        assert!(b.message.contains("login failed"));
        for other in results.iter().filter(|r| r.target != "127.0.0.2") {
            assert!(!other.message.contains("login failed"));
        }
    }
}
