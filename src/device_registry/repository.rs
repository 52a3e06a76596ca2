//! DeviceRegistry repository
//!
//! Database access layer for the registry table.

use super::types::{Device, DeviceStatus};
use crate::error::Result;
use sqlx::SqlitePool;

/// Registry repository for database operations
#[derive(Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

/// Database row for a device
#[derive(Debug, sqlx::FromRow)]
struct DbDevice {
    identity: String,
    ip: String,
    build_time: String,
    status: String,
    region: String,
}

impl DbDevice {
    fn into_device(self) -> Device {
        Device {
            identity: self.identity,
            ip: self.ip,
            build_time: self.build_time,
            status: DeviceStatus::from_store_str(&self.status),
            region: self.region,
        }
    }
}

impl DeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the registry table if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                identity   TEXT PRIMARY KEY,
                ip         TEXT NOT NULL,
                build_time TEXT NOT NULL DEFAULT '',
                status     TEXT NOT NULL DEFAULT 'offline',
                region     TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DbDevice>(
            "SELECT identity, ip, build_time, status, region FROM devices ORDER BY ip",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DbDevice::into_device).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Insert or overwrite by identity.
    pub async fn upsert(&self, device: &Device) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (identity, ip, build_time, status, region)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                ip = excluded.ip,
                build_time = excluded.build_time,
                status = excluded.status,
                region = excluded.region
            "#,
        )
        .bind(&device.identity)
        .bind(&device.ip)
        .bind(&device.build_time)
        .bind(device.status.as_store_str())
        .bind(&device.region)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bulk insert in one transaction (legacy import path).
    pub async fn upsert_many(&self, devices: &[Device]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for device in devices {
            sqlx::query(
                r#"
                INSERT INTO devices (identity, ip, build_time, status, region)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(identity) DO UPDATE SET
                    ip = excluded.ip,
                    build_time = excluded.build_time,
                    status = excluded.status,
                    region = excluded.region
                "#,
            )
            .bind(&device.identity)
            .bind(&device.ip)
            .bind(&device.build_time)
            .bind(device.status.as_store_str())
            .bind(&device.region)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, identity: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM devices WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_region(&self, identity: &str, region: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE devices SET region = ? WHERE identity = ?")
            .bind(region)
            .bind(identity)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_region_bulk(&self, identities: &[String], region: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for identity in identities {
            sqlx::query("UPDATE devices SET region = ? WHERE identity = ?")
                .bind(region)
                .bind(identity)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM devices").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
