#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The relational store: device rows (created lazily on first ingest),
//! device-data rows (the persisted measurement history), and client
//! session rows (connect/disconnect bookkeeping for the interactive
//! endpoint).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::Record;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to establish or use the connection pool.
    #[error("store connection error: {0}")]
    Connection(#[from] sqlx::Error),
}

/// A device-data row ready to be written, distinct from [`Record`] in that
/// the timestamp has already been validated as parseable.
#[derive(Debug, Clone)]
pub struct DeviceDataRow {
    /// Owning device.
    pub device_id: String,
    /// Measurement instant.
    pub timestamp: DateTime<Utc>,
    /// Displacement reading.
    pub displacement: f64,
    /// Force reading.
    pub force: f64,
}

impl DeviceDataRow {
    /// Converts a wire `Record` into a storage row, parsing its raw
    /// `timestamp` strictly as ISO-8601 (a trailing `Z` is accepted as
    /// UTC). Returns `None` if the instant does not parse; the caller is
    /// responsible for counting the record as a `db_errors` loss and
    /// excluding it from the write. The record is still broadcast
    /// regardless, since broadcasting never goes through this conversion.
    pub fn from_record(record: &Record) -> Option<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp).ok()?.with_timezone(&Utc);
        Some(Self {
            device_id: record.device_id.clone(),
            timestamp,
            displacement: record.displacement,
            force: record.force,
        })
    }
}

/// Persistence operations required by the per-device persistence pipeline
/// and the interactive-connection endpoint. Kept as a trait so the
/// pipeline and endpoint crates can be tested against an in-memory fake
/// without a real database.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Ensures a device row exists, creating it with synthesized defaults
    /// if this is the first time `device_id` has been observed.
    async fn ensure_device(&self, device_id: &str, device_token: Option<&str>) -> Result<(), Error>;

    /// Inserts every row in one bulk statement. On failure the whole
    /// batch is rolled back; the caller is responsible for counting the
    /// batch as failed.
    async fn insert_device_data_batch(&self, rows: &[DeviceDataRow]) -> Result<(), Error>;

    /// Records that `client_id` is now connected via `websocket_id`.
    async fn save_client_session(&self, client_id: &str, websocket_id: &str) -> Result<(), Error>;

    /// Marks `client_id` as disconnected.
    async fn mark_client_disconnected(&self, client_id: &str) -> Result<(), Error>;
}

/// A [`Store`] backed by a `sqlx` connection pool, generic over the
/// database driver via `sqlx::Any`.
pub struct SqlxStore {
    pool: AnyPool,
}

impl SqlxStore {
    /// Connects to `database_url`, sizing the pool the way the original
    /// service's single async engine was sized (generous headroom for one
    /// connection per device worker).
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the schema if it does not already exist. Intended for
    /// local/dev use and integration tests; production deployments are
    /// expected to migrate the schema out of band.
    pub async fn init_schema(&self) -> Result<(), Error> {
        let _ = sqlx::query(
            "CREATE TABLE IF NOT EXISTS iot_devices (\
                id TEXT PRIMARY KEY, \
                device_name TEXT NOT NULL, \
                device_type TEXT NOT NULL, \
                status TEXT NOT NULL, \
                created_at TEXT NOT NULL, \
                device_token TEXT UNIQUE, \
                user_id TEXT\
            )",
        )
        .execute(&self.pool)
        .await?;

        let _ = sqlx::query(
            "CREATE TABLE IF NOT EXISTS device_data (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                device_id TEXT NOT NULL, \
                timestamp TEXT NOT NULL, \
                displacement DOUBLE PRECISION NOT NULL, \
                force DOUBLE PRECISION NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS device_data_device_id_idx ON device_data (device_id)")
            .execute(&self.pool)
            .await?;

        let _ = sqlx::query(
            "CREATE TABLE IF NOT EXISTS client_sessions (\
                client_id TEXT PRIMARY KEY, \
                websocket_id TEXT NOT NULL, \
                connected BOOLEAN NOT NULL, \
                last_connected_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqlxStore {
    async fn ensure_device(&self, device_id: &str, device_token: Option<&str>) -> Result<(), Error> {
        let existing: Option<AnyRow> = sqlx::query("SELECT id FROM iot_devices WHERE id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Ok(());
        }

        let device_name = format!("Device {device_id}");
        let created_at = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO iot_devices (id, device_name, device_type, status, created_at, device_token, user_id) \
             VALUES (?, ?, 'sensor', 'online', ?, ?, NULL)",
        )
        .bind(device_id)
        .bind(device_name)
        .bind(created_at)
        .bind(device_token)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Another worker won the race and created the row first; the
            // outcome this caller wanted (a device row exists) still holds.
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_device_data_batch(&self, rows: &[DeviceDataRow]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            if let Err(err) = sqlx::query(
                "INSERT INTO device_data (device_id, timestamp, displacement, force) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.device_id)
            .bind(row.timestamp.to_rfc3339())
            .bind(row.displacement)
            .bind(row.force)
            .execute(&mut *tx)
            .await
            {
                tx.rollback().await?;
                return Err(err.into());
            }
        }
        tx.commit().await?;

        Ok(())
    }

    async fn save_client_session(&self, client_id: &str, websocket_id: &str) -> Result<(), Error> {
        let now = Utc::now().to_rfc3339();
        let existing: Option<AnyRow> = sqlx::query("SELECT client_id FROM client_sessions WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            let _ = sqlx::query(
                "UPDATE client_sessions SET websocket_id = ?, connected = true, last_connected_at = ? \
                 WHERE client_id = ?",
            )
            .bind(websocket_id)
            .bind(now)
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        } else {
            let _ = sqlx::query(
                "INSERT INTO client_sessions (client_id, websocket_id, connected, last_connected_at) \
                 VALUES (?, ?, true, ?)",
            )
            .bind(client_id)
            .bind(websocket_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn mark_client_disconnected(&self, client_id: &str) -> Result<(), Error> {
        let _ = sqlx::query("UPDATE client_sessions SET connected = false WHERE client_id = ?")
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
