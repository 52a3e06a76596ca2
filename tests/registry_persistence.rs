//! Registry persistence across restarts: legacy import runs exactly once,
//! and devices written through the service survive a reopen.

use camfleet::device_registry::{Device, DeviceRegistry, DeviceRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

async fn open_pool(db_path: &Path) -> sqlx::SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap()
}

#[tokio::test]
async fn legacy_import_runs_once_and_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("registry.db");
    let legacy = dir.path().join("devices.json");
    std::fs::write(
        &legacy,
        r#"[
            {"ip": "192.168.3.10", "buildTime": "2025-02-20_11:31:45", "region": "east"},
            {"ip": "192.168.3.12", "buildTime": "2025-02-20_11:31:45", "region": "east"}
        ]"#,
    )
    .unwrap();

    // First open: empty store + legacy file present => import + rename.
    {
        let pool = open_pool(&db_path).await;
        let registry = DeviceRegistry::open(DeviceRepository::new(pool.clone()), &legacy)
            .await
            .unwrap();
        assert_eq!(registry.get_all().await.len(), 2);
        assert!(!legacy.exists());

        // Mutate through the service so it lands in the store.
        registry
            .add(Device::new("192.168.3.20", "2025-03-01_09:00:00", "west"))
            .await
            .unwrap();
        pool.close().await;
    }

    // Simulate the old file reappearing; the store is non-empty now, so
    // the import must not run again.
    std::fs::write(&legacy, r#"[{"ip": "10.9.9.9"}]"#).unwrap();

    {
        let pool = open_pool(&db_path).await;
        let registry = DeviceRegistry::open(DeviceRepository::new(pool.clone()), &legacy)
            .await
            .unwrap();
        let all = registry.get_all().await;
        assert_eq!(all.len(), 3);
        assert!(!all.iter().any(|d| d.ip == "10.9.9.9"));
        assert!(legacy.exists()); // untouched this time

        // Region filter works over state rebuilt from the store.
        registry.set_region_filter(Some("west".to_string())).await;
        let view = registry.get().await;
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].ip, "192.168.3.20");
        pool.close().await;
    }
}

#[tokio::test]
async fn removal_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("registry.db");
    let no_legacy = dir.path().join("none.json");

    let identity = {
        let pool = open_pool(&db_path).await;
        let registry = DeviceRegistry::open(DeviceRepository::new(pool.clone()), &no_legacy)
            .await
            .unwrap();
        let device = registry
            .add(Device::new("10.0.0.1", "b1", ""))
            .await
            .unwrap();
        registry.remove(&device.identity).await.unwrap();
        pool.close().await;
        device.identity
    };

    let pool = open_pool(&db_path).await;
    let registry = DeviceRegistry::open(DeviceRepository::new(pool.clone()), &no_legacy)
        .await
        .unwrap();
    assert!(registry.get_all().await.is_empty());
    assert!(matches!(
        registry.remove(&identity).await,
        Err(camfleet::Error::NotFound(_))
    ));
    pool.close().await;
}
