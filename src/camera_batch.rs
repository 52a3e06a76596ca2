//! CameraBatchConfigurator - per-device batched camera task setup
//!
//! ## Responsibilities
//!
//! - Group imported configuration rows by device IP
//! - Per device, log in once and reuse the session token for several
//!   dependent calls: task list (decide add-vs-modify), task add/modify,
//!   then config get → rewrite camera index → config mod
//! - Assign a device-local camera index per row, starting at 1 in row order
//!
//! The device initializes a new task asynchronously, so the configurator
//! waits a fixed settle delay between creating the task and fetching its
//! configuration. An index-set failure after a successful add is appended
//! to the same result message; it does not erase the add.

use crate::device_probe::{ApiResponse, DeviceProber, SessionToken, SESSION_TOKEN_HEADER};
use crate::orchestrator::{self, HEAVY_CONCURRENCY};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Wait for the device-side task initialization before touching its config.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// One parsed configuration row (spreadsheet parsing happens in the front
/// end; the backend only receives structured rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraRow {
    pub device_ip: String,
    pub camera_name: String,
    /// Source address substituted into the URL template
    pub source: String,
}

/// Outcome of configuring one device's row group
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfigResult {
    pub target: String,
    pub success: bool,
    pub message: String,
}

impl CameraConfigResult {
    fn failure(target: &str, message: String) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
        }
    }
}

/// Group rows by device IP, preserving row order within each group.
/// Group order follows first appearance so batches stay deterministic.
pub fn group_rows(rows: Vec<CameraRow>) -> Vec<(String, Vec<CameraRow>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<CameraRow>> = HashMap::new();
    for row in rows {
        if !groups.contains_key(&row.device_ip) {
            order.push(row.device_ip.clone());
        }
        groups.entry(row.device_ip.clone()).or_default().push(row);
    }
    order
        .into_iter()
        .map(|ip| {
            let rows = groups.remove(&ip).unwrap_or_default();
            (ip, rows)
        })
        .collect()
}

/// Rewrite the nested camera index field of a task configuration.
/// Returns false when the config has no `camera` object to rewrite.
pub fn set_camera_index(config: &mut Value, index: u32) -> bool {
    match config.get_mut("camera") {
        Some(Value::Object(camera)) => {
            camera.insert("index".to_string(), json!(index));
            true
        }
        _ => false,
    }
}

/// Find an existing task id by camera name in a task-list payload.
pub fn find_task_id(task_list: &Value, camera_name: &str) -> Option<i64> {
    task_list
        .get("tasks")?
        .as_array()?
        .iter()
        .find(|t| t.get("name").and_then(Value::as_str) == Some(camera_name))
        .and_then(|t| t.get("id").and_then(Value::as_i64))
}

pub struct CameraBatchConfigurator {
    prober: Arc<dyn DeviceProber>,
    client: reqwest::Client,
    port: u16,
}

impl CameraBatchConfigurator {
    pub fn new(prober: Arc<dyn DeviceProber>, client: reqwest::Client, port: u16) -> Self {
        Self {
            prober,
            client,
            port,
        }
    }

    /// Configure all rows, one worker per device, one result per device.
    /// A device whose login fails produces a single failure result for its
    /// whole row group; other devices are unaffected.
    pub async fn configure(
        &self,
        rows: Vec<CameraRow>,
        username: &str,
        password: &str,
        url_template: &str,
        algorithm: &str,
        region: &str,
    ) -> Vec<CameraConfigResult> {
        let groups = group_rows(rows);
        tracing::info!(
            devices = groups.len(),
            region = %region,
            "Camera batch configuration started"
        );

        let prober = self.prober.clone();
        let client = self.client.clone();
        let port = self.port;
        let username = username.to_string();
        let password = password.to_string();
        let url_template = url_template.to_string();
        let algorithm = algorithm.to_string();

        orchestrator::run(
            groups,
            HEAVY_CONCURRENCY,
            move |(ip, rows)| {
                let prober = prober.clone();
                let client = client.clone();
                let username = username.clone();
                let password = password.clone();
                let url_template = url_template.clone();
                let algorithm = algorithm.clone();
                async move {
                    configure_device(
                        &*prober,
                        &client,
                        port,
                        &ip,
                        rows,
                        &username,
                        &password,
                        &url_template,
                        &algorithm,
                    )
                    .await
                }
            },
            |(ip, _)| CameraConfigResult::failure(ip, "configuration worker aborted".to_string()),
        )
        .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn configure_device(
    prober: &dyn DeviceProber,
    client: &reqwest::Client,
    port: u16,
    ip: &str,
    rows: Vec<CameraRow>,
    username: &str,
    password: &str,
    url_template: &str,
    algorithm: &str,
) -> CameraConfigResult {
    // One login per device; the token authorizes every following call.
    let token = match prober.login(ip, username, password).await {
        Ok(token) => token,
        Err(e) => return CameraConfigResult::failure(ip, e.to_string()),
    };

    let api = DeviceApi {
        client,
        port,
        ip,
        token: &token,
    };

    let task_list = match api.call("/api/task/list", json!({})).await {
        Ok(list) => list,
        Err(e) => return CameraConfigResult::failure(ip, format!("task list failed: {}", e)),
    };

    let mut all_ok = true;
    let mut messages = Vec::with_capacity(rows.len());

    for (offset, row) in rows.into_iter().enumerate() {
        // Device-local camera index, starting at 1 in row order.
        let index = offset as u32 + 1;
        let (ok, message) =
            configure_row(&api, &task_list, &row, index, url_template, algorithm).await;
        all_ok &= ok;
        messages.push(format!("{}: {}", row.camera_name, message));
    }

    CameraConfigResult {
        target: ip.to_string(),
        success: all_ok,
        message: messages.join("; "),
    }
}

/// Configure one camera row; returns (success, message).
async fn configure_row(
    api: &DeviceApi<'_>,
    task_list: &Value,
    row: &CameraRow,
    index: u32,
    url_template: &str,
    algorithm: &str,
) -> (bool, String) {
    let camera_url = url_template.replace("{source}", &row.source);
    let existing_id = find_task_id(task_list, &row.camera_name);

    let (endpoint, mut body) = match existing_id {
        Some(id) => ("/api/task/modify", json!({ "id": id })),
        None => ("/api/task/add", json!({})),
    };
    body["name"] = json!(row.camera_name);
    body["url"] = json!(camera_url);
    body["algorithm"] = json!(algorithm);

    if let Err(e) = api.call(endpoint, body).await {
        return (false, format!("task setup failed: {}", e));
    }
    let added_msg = match existing_id {
        Some(_) => "task modified",
        None => "task added",
    };

    // The device initializes the task asynchronously.
    tokio::time::sleep(SETTLE_DELAY).await;

    let index_outcome = async {
        let mut config = api
            .call("/api/config/get", json!({ "name": row.camera_name }))
            .await?;
        if !set_camera_index(&mut config, index) {
            return Err(crate::error::Error::Protocol(
                "config has no camera object".to_string(),
            ));
        }
        api.call("/api/config/mod", config).await?;
        Ok::<(), crate::error::Error>(())
    }
    .await;

    match index_outcome {
        Ok(()) => (true, format!("{}, index {} set", added_msg, index)),
        // The add stands; report both outcomes in one message.
        Err(e) => (true, format!("{}, index set failed: {}", added_msg, e)),
    }
}

/// Token-bearing calls against one device
struct DeviceApi<'a> {
    client: &'a reqwest::Client,
    port: u16,
    ip: &'a str,
    token: &'a SessionToken,
}

impl DeviceApi<'_> {
    async fn call(&self, path: &str, body: Value) -> crate::error::Result<Value> {
        let response = self
            .client
            .post(format!("http://{}:{}{}", self.ip, self.port, path))
            .header(SESSION_TOKEN_HEADER, self.token.as_str())
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::error::Error::Network(format!("{}: {}", self.ip, e)))?;

        let envelope: ApiResponse<Value> = response
            .json()
            .await
            .map_err(|e| crate::error::Error::Protocol(format!("{}: {}", self.ip, e)))?;
        envelope.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    #[test]
    fn grouping_preserves_row_order_per_device() {
        let rows = vec![
            row("10.0.0.1", "lobby"),
            row("10.0.0.2", "gate"),
            row("10.0.0.1", "dock"),
        ];
        let groups = group_rows(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "10.0.0.1");
        let names: Vec<&str> = groups[0].1.iter().map(|r| r.camera_name.as_str()).collect();
        assert_eq!(names, vec!["lobby", "dock"]); // indexes 1 and 2
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn camera_index_rewrite() {
        let mut config = json!({
            "camera": {"index": 0, "mode": "day"},
            "threshold": 0.5
        });
        assert!(set_camera_index(&mut config, 3));
        assert_eq!(config["camera"]["index"], 3);
        assert_eq!(config["camera"]["mode"], "day"); // untouched

        let mut bare = json!({"threshold": 0.5});
        assert!(!set_camera_index(&mut bare, 1));
    }

    #[test]
    fn task_lookup_by_name() {
        let list = json!({
            "tasks": [
                {"id": 11, "name": "lobby"},
                {"id": 12, "name": "gate"}
            ]
        });
        assert_eq!(find_task_id(&list, "gate"), Some(12));
        assert_eq!(find_task_id(&list, "dock"), None);
        assert_eq!(find_task_id(&json!({}), "gate"), None);
    }

    struct NoLogin;

    #[async_trait]
    impl DeviceProber for NoLogin {
        async fn test_device(&self, _ip: &str) -> Result<String> {
            unreachable!()
        }
        async fn login(&self, ip: &str, _u: &str, _p: &str) -> Result<SessionToken> {
            Err(Error::Login(format!("{}: refused", ip)))
        }
    }

    fn row(ip: &str, name: &str) -> CameraRow {
        CameraRow {
            device_ip: ip.to_string(),
            camera_name: name.to_string(),
            source: format!("src-{}", name),
        }
    }

    #[tokio::test]
    async fn login_failure_yields_one_result_per_device() {
        let configurator =
            CameraBatchConfigurator::new(Arc::new(NoLogin), reqwest::Client::new(), 80);
        let results = configurator
            .configure(
                vec![
                    row("10.0.0.1", "lobby"),
                    row("10.0.0.1", "dock"),
                    row("10.0.0.2", "gate"),
                ],
                "admin",
                "pw",
                "rtsp://{source}/stream",
                "motion",
                "east",
            )
            .await;

        assert_eq!(results.len(), 2); // one per device, not per row
        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.message.contains("login failed")));
    }
}
