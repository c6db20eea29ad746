//! Persistence layer for sensor data.
//!
//! Each sensor lives in its own directory under the storage root:
//!
//! ```text
//! <base_dir>/<sensor id>/properties.json   settings, replaced atomically
//! <base_dir>/<sensor id>/readings.log      append-only reading log
//! ```

mod log;
mod writer;

pub use log::{encode_record, ReadingLog, RECORD_DELIMITER};
pub use writer::PendingWrite;

use crate::{Reading, Settings, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use writer::{SensorWriter, WriteOp};

/// Settings artifact name inside a sensor directory.
pub const SETTINGS_FILE: &str = "properties.json";

/// Reading log name inside a sensor directory.
pub const LOG_FILE: &str = "readings.log";

/// Storage options.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Directory holding one subdirectory per sensor
    pub base_dir: PathBuf,
    /// Whether every write is synced to disk before it is acknowledged
    pub durable: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data").join("sensors"),
            durable: true,
        }
    }
}

/// One sensor as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSensor {
    pub id: String,
    pub settings: Settings,
    pub readings: Vec<Reading>,
}

/// Check that a sensor id can be used as a single directory name.
pub fn validate_sensor_id(id: &str) -> Result<(), StorageError> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| c == '/' || c == '\\' || c == '\0');

    if invalid {
        Err(StorageError::InvalidSensorId(id.to_string()))
    } else {
        Ok(())
    }
}

/// Manages on-disk state for all sensors.
pub struct Storage {
    options: StorageOptions,
    /// Writer task per sensor id, spawned on first write
    writers: Mutex<HashMap<String, SensorWriter>>,
}

impl Storage {
    /// Open storage rooted at `base_dir` with default options.
    pub async fn open(base_dir: PathBuf) -> Result<Self, StorageError> {
        Self::open_with(StorageOptions {
            base_dir,
            ..Default::default()
        })
        .await
    }

    /// Open storage with custom options, creating the root if needed.
    pub async fn open_with(options: StorageOptions) -> Result<Self, StorageError> {
        let base_dir = options.base_dir.clone();
        let unavailable = |source: std::io::Error| StorageError::StorageUnavailable {
            path: base_dir.clone(),
            source,
        };

        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(unavailable)?;
        // Probe that the root is a listable directory
        tokio::fs::read_dir(&base_dir).await.map_err(unavailable)?;

        info!(path = ?base_dir, durable = options.durable, "Opened sensor storage");

        Ok(Self {
            options,
            writers: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the storage.
    pub fn base_dir(&self) -> &Path {
        &self.options.base_dir
    }

    /// Directory for one sensor.
    pub fn sensor_dir(&self, id: &str) -> PathBuf {
        self.options.base_dir.join(id)
    }

    /// Settings artifact path for one sensor.
    pub fn settings_path(&self, id: &str) -> PathBuf {
        self.sensor_dir(id).join(SETTINGS_FILE)
    }

    /// Reading log for one sensor.
    pub fn reading_log(&self, id: &str) -> ReadingLog {
        ReadingLog::new(self.sensor_dir(id).join(LOG_FILE))
    }

    /// Check if a sensor has a directory on disk.
    pub async fn exists(&self, id: &str) -> bool {
        tokio::fs::metadata(self.sensor_dir(id))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    /// Load every sensor found under the root.
    ///
    /// A sensor whose artifacts cannot be read is logged and left out; only
    /// an unreadable root fails the whole load.
    pub async fn load_all(&self) -> Result<Vec<LoadedSensor>, StorageError> {
        let base_dir = &self.options.base_dir;
        let mut entries = tokio::fs::read_dir(base_dir).await.map_err(|source| {
            StorageError::StorageUnavailable {
                path: base_dir.clone(),
                source,
            }
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(id) if validate_sensor_id(&id).is_ok() => ids.push(id),
                Ok(id) => warn!(sensor = %id, "Skipping directory with invalid sensor id"),
                Err(name) => warn!(name = ?name, "Skipping non UTF-8 sensor directory"),
            }
        }
        ids.sort();

        let mut sensors = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load_sensor(&id).await {
                Ok(sensor) => sensors.push(sensor),
                Err(e) => warn!(sensor = %id, error = %e, "Failed to load sensor, skipping"),
            }
        }

        info!(path = ?base_dir, sensors = sensors.len(), "Loaded saved sensor data");

        Ok(sensors)
    }

    /// Load one sensor's settings and readings.
    pub async fn load_sensor(&self, id: &str) -> Result<LoadedSensor, StorageError> {
        validate_sensor_id(id)?;

        let log = self.reading_log(id);
        let (settings, readings) = tokio::join!(self.load_settings(id), log.load());
        let settings = settings?;
        let readings = readings?;

        if readings.is_empty() {
            return Err(StorageError::corrupt(
                log.path(),
                "log holds no complete readings",
            ));
        }

        debug!(sensor = %id, readings = readings.len(), "Loaded sensor");

        Ok(LoadedSensor {
            id: id.to_string(),
            settings,
            readings,
        })
    }

    /// Load one sensor's settings artifact.
    pub async fn load_settings(&self, id: &str) -> Result<Settings, StorageError> {
        let path = self.settings_path(id);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::corrupt(&path, e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| StorageError::corrupt(&path, e.to_string()))
    }

    /// Queue a reading append without waiting for it.
    ///
    /// Appends queued for the same id reach disk in the order they were
    /// queued.
    pub fn enqueue_append(&self, id: &str, reading: &Reading) -> Result<PendingWrite, StorageError> {
        validate_sensor_id(id)?;
        let (op, rx) = WriteOp::append(encode_record(reading)?);
        self.submit(id, op)?;
        Ok(PendingWrite::new(id, rx))
    }

    /// Queue a full settings replacement without waiting for it.
    pub fn enqueue_settings(
        &self,
        id: &str,
        settings: &Settings,
    ) -> Result<PendingWrite, StorageError> {
        validate_sensor_id(id)?;
        let (op, rx) = WriteOp::replace_settings(serde_json::to_string(settings)?);
        self.submit(id, op)?;
        Ok(PendingWrite::new(id, rx))
    }

    /// Durably append one reading to a sensor's log.
    pub async fn append_reading(&self, id: &str, reading: &Reading) -> Result<(), StorageError> {
        self.enqueue_append(id, reading)?.wait().await
    }

    /// Durably replace a sensor's settings.
    pub async fn write_settings(&self, id: &str, settings: &Settings) -> Result<(), StorageError> {
        self.enqueue_settings(id, settings)?.wait().await
    }

    /// Number of sensors with a live writer task.
    pub fn active_writers(&self) -> usize {
        self.writers.lock().len()
    }

    fn submit(&self, id: &str, op: WriteOp) -> Result<(), StorageError> {
        let mut writers = self.writers.lock();

        let writer = match writers.get(id) {
            Some(writer) if !writer.is_closed() => writer.clone(),
            _ => {
                let writer =
                    SensorWriter::spawn(id.to_string(), self.sensor_dir(id), self.options.durable);
                writers.insert(id.to_string(), writer.clone());
                writer
            }
        };

        writer
            .submit(op)
            .map_err(|_| StorageError::WriterClosed(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn test_options(base_dir: &Path) -> StorageOptions {
        StorageOptions {
            base_dir: base_dir.to_path_buf(),
            durable: false,
        }
    }

    fn readings(n: usize) -> Vec<Reading> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Reading::new(20.0 + i as f64 * 0.1, start + Duration::minutes(i as i64)))
            .collect()
    }

    #[test]
    fn test_validate_sensor_id() {
        assert!(validate_sensor_id("esp32-kitchen").is_ok());
        assert!(validate_sensor_id("").is_err());
        assert!(validate_sensor_id("..").is_err());
        assert!(validate_sensor_id("a/b").is_err());
        assert!(validate_sensor_id("a\\b").is_err());
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("nested").join("sensors");

        let storage = Storage::open_with(test_options(&root)).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.base_dir(), root.as_path());
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_a_file() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("sensors");
        std::fs::write(&root, "not a directory").unwrap();

        let result = Storage::open_with(test_options(&root)).await;
        assert!(matches!(
            result,
            Err(StorageError::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_append_and_reload_round_trip() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();
        let settings = Settings::new("New sensor", "#112233", 0);
        let expected = readings(25);

        storage.write_settings("s1", &settings).await.unwrap();
        for reading in &expected {
            storage.append_reading("s1", reading).await.unwrap();
        }

        let loaded = storage.load_sensor("s1").await.unwrap();
        assert_eq!(loaded.settings, settings);
        assert_eq!(loaded.readings, expected);
    }

    #[tokio::test]
    async fn test_queued_appends_keep_fifo_order() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();
        let expected = readings(200);

        let pending: Vec<_> = expected
            .iter()
            .map(|r| storage.enqueue_append("s1", r).unwrap())
            .collect();
        for write in pending {
            write.wait().await.unwrap();
        }

        let loaded = storage.reading_log("s1").load().await.unwrap();
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_sensors_get_independent_writers() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();

        let a = storage.enqueue_append("a", &readings(1)[0]).unwrap();
        let b = storage.enqueue_append("b", &readings(1)[0]).unwrap();
        b.wait().await.unwrap();
        a.wait().await.unwrap();

        assert_eq!(storage.active_writers(), 2);
        assert_eq!(storage.reading_log("a").count().await.unwrap(), 1);
        assert_eq!(storage.reading_log("b").count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_settings_replaces() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();

        storage
            .write_settings("s1", &Settings::new("New sensor", "#000000", 0))
            .await
            .unwrap();
        storage
            .write_settings("s1", &Settings::new("Kitchen", "#ff8800", 3))
            .await
            .unwrap();

        let on_disk = std::fs::read_to_string(storage.settings_path("s1")).unwrap();
        assert_eq!(on_disk, r##"{"name":"Kitchen","color":"#ff8800","order":3}"##);
    }

    #[tokio::test]
    async fn test_load_all_isolates_corrupt_sensor() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();

        for (i, id) in ["good", "broken"].iter().enumerate() {
            storage
                .write_settings(id, &Settings::new(*id, "#123456", i as u32))
                .await
                .unwrap();
            storage.append_reading(id, &readings(1)[0]).await.unwrap();
        }
        std::fs::write(storage.settings_path("broken"), "{\"name\":").unwrap();
        // Stray files at the root are not sensors
        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "good");
    }

    #[tokio::test]
    async fn test_load_all_skips_sensor_without_log() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();

        storage
            .write_settings("orphan", &Settings::new("New sensor", "#123456", 0))
            .await
            .unwrap();

        assert!(storage.exists("orphan").await);
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_id() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::open_with(test_options(temp_dir.path()))
            .await
            .unwrap();

        let result = storage.enqueue_append("..", &readings(1)[0]);
        assert!(matches!(result, Err(StorageError::InvalidSensorId(_))));
    }
}
