//! Device info cache
//!
//! Snapshot of sensor rows and sensor-type protocols, rebuilt wholesale on
//! reload and swapped in under a short write lock. Readers clone the `Arc`
//! and never see a half-built snapshot.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{Protocol, SensorInfo};
use crate::error::Result;

/// Raw `sensor_types` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorTypeRecord {
    pub id: String,
    /// Protocol name, e.g. `LA6_POE`
    pub name: String,
}

/// Source of sensor configuration
#[async_trait]
pub trait SensorStore: Send + Sync {
    async fn load_sensors(&self) -> Result<Vec<SensorInfo>>;
    async fn load_sensor_types(&self) -> Result<Vec<SensorTypeRecord>>;
}

/// Sensor store backed by the shared SQLite configuration database
pub struct SqliteSensorStore {
    pool: SqlitePool,
}

impl SqliteSensorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the two tables when running against a fresh database
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_types (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                type_id TEXT NOT NULL,
                ip TEXT NOT NULL DEFAULT '',
                port INTEGER NOT NULL DEFAULT 0,
                max_time INTEGER,
                pause_time INTEGER,
                is_time_restricted INTEGER NOT NULL DEFAULT 0,
                time_restricted_start INTEGER NOT NULL DEFAULT 0,
                time_restricted_end INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SensorStore for SqliteSensorStore {
    async fn load_sensors(&self) -> Result<Vec<SensorInfo>> {
        let rows = sqlx::query(
            "SELECT id, name, type_id, ip, port, max_time, pause_time, \
             is_time_restricted, time_restricted_start, time_restricted_end FROM sensors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sensors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let port: i64 = row.try_get("port")?;
            let Ok(port) = u16::try_from(port) else {
                warn!("Sensor {} has invalid port {}, skipped", id, port);
                continue;
            };

            let mut sensor = SensorInfo::new(
                id,
                row.try_get::<String, _>("name")?,
                row.try_get::<String, _>("type_id")?,
                row.try_get::<String, _>("ip")?,
                port,
            );
            if let Some(max_time) = row.try_get::<Option<i64>, _>("max_time")? {
                sensor.max_time_secs = max_time;
            }
            if let Some(pause_time) = row.try_get::<Option<i64>, _>("pause_time")? {
                sensor.pause_time_secs = pause_time;
            }
            if row.try_get::<bool, _>("is_time_restricted")? {
                let start: i64 = row.try_get("time_restricted_start")?;
                let end: i64 = row.try_get("time_restricted_end")?;
                sensor = sensor.with_restriction(start.max(0) as u32, end.max(0) as u32);
            }
            sensors.push(sensor);
        }
        Ok(sensors)
    }

    async fn load_sensor_types(&self) -> Result<Vec<SensorTypeRecord>> {
        let rows = sqlx::query("SELECT id, name FROM sensor_types")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(SensorTypeRecord {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }
}

/// In-memory store for tests and embedded use
#[derive(Default)]
pub struct MemorySensorStore {
    sensors: Mutex<Vec<SensorInfo>>,
    types: Mutex<Vec<SensorTypeRecord>>,
}

impl MemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_sensor(&self, sensor: SensorInfo) {
        let mut sensors = self.sensors.lock();
        sensors.retain(|s| s.id != sensor.id);
        sensors.push(sensor);
    }

    pub fn remove_sensor(&self, id: &str) {
        self.sensors.lock().retain(|s| s.id != id);
    }

    pub fn upsert_type(&self, id: impl Into<String>, name: impl Into<String>) {
        let record = SensorTypeRecord {
            id: id.into(),
            name: name.into(),
        };
        let mut types = self.types.lock();
        types.retain(|t| t.id != record.id);
        types.push(record);
    }
}

#[async_trait]
impl SensorStore for MemorySensorStore {
    async fn load_sensors(&self) -> Result<Vec<SensorInfo>> {
        Ok(self.sensors.lock().clone())
    }

    async fn load_sensor_types(&self) -> Result<Vec<SensorTypeRecord>> {
        Ok(self.types.lock().clone())
    }
}

/// Immutable mapping set produced by one reload
#[derive(Debug, Default)]
pub struct DeviceSnapshot {
    sensors: HashMap<String, Arc<SensorInfo>>,
    /// type id -> protocol name as stored
    sensor_types: HashMap<String, String>,
}

impl DeviceSnapshot {
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn type_count(&self) -> usize {
        self.sensor_types.len()
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.sensors.contains_key(sensor_id)
    }
}

/// Read-mostly sensor lookup shared by the dispatch task and the admin API
pub struct DeviceCache {
    store: Arc<dyn SensorStore>,
    snapshot: RwLock<Arc<DeviceSnapshot>>,
}

impl DeviceCache {
    /// Empty cache; call [`reload`](Self::reload) before use
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(DeviceSnapshot::default())),
        }
    }

    /// Re-read every row and replace the snapshot in one swap
    ///
    /// On a store error the previous snapshot stays in place.
    pub async fn reload(&self) -> Result<()> {
        let sensors = self.store.load_sensors().await?;
        let types = self.store.load_sensor_types().await?;

        let snapshot = DeviceSnapshot {
            sensors: sensors
                .into_iter()
                .map(|s| (s.id.clone(), Arc::new(s)))
                .collect(),
            sensor_types: types.into_iter().map(|t| (t.id, t.name)).collect(),
        };

        info!(
            "Device cache loaded: {} sensors, {} types",
            snapshot.sensor_count(),
            snapshot.type_count()
        );
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Resolve a sensor and its protocol; misses are logged, never fatal
    pub fn lookup(&self, sensor_id: &str) -> Option<(Arc<SensorInfo>, Protocol)> {
        let snapshot = self.snapshot();

        let Some(sensor) = snapshot.sensors.get(sensor_id) else {
            error!("Unregistered sensor id: {}", sensor_id);
            return None;
        };
        let Some(type_name) = snapshot.sensor_types.get(&sensor.type_id) else {
            error!(
                "Unregistered sensor type id: {} (sensor {})",
                sensor.type_id, sensor_id
            );
            return None;
        };
        match type_name.parse::<Protocol>() {
            Ok(protocol) => Some((Arc::clone(sensor), protocol)),
            Err(e) => {
                error!("No alarm driver for sensor {}: {}", sensor_id, e);
                None
            },
        }
    }
}
