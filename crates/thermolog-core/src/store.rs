//! In-memory index of every sensor, backed by write-through persistence.
//!
//! All mutations take the write lock, so sensor creation is globally
//! serialized and each new sensor receives a distinct `order`. Disk writes are
//! queued while the lock is held and awaited after it is released, which keeps
//! the on-disk order of each sensor's log equal to its in-memory order.

use crate::error::CoreError;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thermolog_storage::{
    validate_sensor_id, LoadedSensor, PendingWrite, Reading, Settings, Storage, StorageError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name given to sensors that report before anyone has named them
pub const DEFAULT_SENSOR_NAME: &str = "New sensor";

/// A sensor with its settings and full reading history.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: String,
    pub settings: Settings,
    /// Readings in arrival order
    pub readings: Vec<Reading>,
}

impl From<LoadedSensor> for Sensor {
    fn from(loaded: LoadedSensor) -> Self {
        Self {
            id: loaded.id,
            settings: loaded.settings,
            readings: loaded.readings,
        }
    }
}

/// Result of recording one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Settings in effect after the reading was recorded
    pub settings: Settings,
    /// The reading created the sensor
    pub created: bool,
}

/// Shared, lock-protected map of sensors.
pub struct SensorStore {
    storage: Arc<Storage>,
    sensors: RwLock<HashMap<String, Sensor>>,
}

impl SensorStore {
    /// Create an empty store.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self::with_sensors(storage, Vec::new())
    }

    /// Create a store from sensors loaded at startup.
    pub fn with_sensors(storage: Arc<Storage>, loaded: Vec<LoadedSensor>) -> Self {
        let sensors = loaded
            .into_iter()
            .map(|sensor| (sensor.id.clone(), Sensor::from(sensor)))
            .collect();

        Self {
            storage,
            sensors: RwLock::new(sensors),
        }
    }

    /// Load every persisted sensor and build a store from them.
    pub async fn load(storage: Arc<Storage>) -> Result<Self, CoreError> {
        let loaded = storage.load_all().await?;
        info!(sensors = loaded.len(), "Sensor store loaded");
        Ok(Self::with_sensors(storage, loaded))
    }

    /// Backing storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Snapshot of one sensor.
    pub fn get(&self, id: &str) -> Option<Sensor> {
        self.sensors.read().get(id).cloned()
    }

    /// Current settings of one sensor.
    pub fn settings(&self, id: &str) -> Option<Settings> {
        self.sensors.read().get(id).map(|s| s.settings.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sensors.read().contains_key(id)
    }

    /// Ids of all known sensors.
    pub fn list_ids(&self) -> BTreeSet<String> {
        self.sensors.read().keys().cloned().collect()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.read().len()
    }

    /// Total readings held in memory.
    pub fn reading_count(&self) -> usize {
        self.sensors.read().values().map(|s| s.readings.len()).sum()
    }

    /// Run `f` against one sensor under the read lock.
    pub fn with_sensor<T>(&self, id: &str, f: impl FnOnce(&Sensor) -> T) -> Option<T> {
        self.sensors.read().get(id).map(f)
    }

    /// Run `f` against every sensor under the read lock, collecting results.
    pub fn with_each_sensor<T>(&self, f: impl FnMut(&Sensor) -> T) -> Vec<T> {
        self.sensors.read().values().map(f).collect()
    }

    /// Last reading of every sensor that has one.
    pub fn latest_readings(&self) -> Vec<(String, Settings, Reading)> {
        self.sensors
            .read()
            .values()
            .filter_map(|sensor| {
                sensor
                    .readings
                    .last()
                    .map(|reading| (sensor.id.clone(), sensor.settings.clone(), *reading))
            })
            .collect()
    }

    /// Record a reading, creating the sensor with default settings on first
    /// contact.
    ///
    /// Returns once every write has reached disk. A failed write is reported
    /// as [`CoreError::Storage`]; the reading stays in memory.
    pub async fn record_reading(
        &self,
        id: &str,
        reading: Reading,
    ) -> Result<RecordOutcome, CoreError> {
        let (outcome, writes) = self.queue_reading(id, reading)?;
        writes.wait().await?;
        Ok(outcome)
    }

    /// Record a reading in memory and queue its disk writes without waiting
    /// for them.
    ///
    /// The writes are queued under the write lock, so each sensor's log
    /// receives records in the order they were accepted here.
    pub fn queue_reading(
        &self,
        id: &str,
        reading: Reading,
    ) -> Result<(RecordOutcome, QueuedWrites), CoreError> {
        validate_sensor_id(id).map_err(|_| CoreError::InvalidSensorId(id.to_string()))?;

        let (outcome, pending) = {
            let mut sensors = self.sensors.write();
            let mut pending = Vec::with_capacity(2);

            let outcome = match sensors.get_mut(id) {
                Some(sensor) => {
                    sensor.readings.push(reading);
                    pending.push(self.storage.enqueue_append(id, &reading));
                    RecordOutcome {
                        settings: sensor.settings.clone(),
                        created: false,
                    }
                }
                None => {
                    let settings = default_settings(sensors.len() as u32);
                    pending.push(self.storage.enqueue_settings(id, &settings));
                    pending.push(self.storage.enqueue_append(id, &reading));
                    sensors.insert(
                        id.to_string(),
                        Sensor {
                            id: id.to_string(),
                            settings: settings.clone(),
                            readings: vec![reading],
                        },
                    );
                    RecordOutcome {
                        settings,
                        created: true,
                    }
                }
            };

            (outcome, pending)
        };

        if outcome.created {
            info!(sensor = %id, order = outcome.settings.order, "New sensor registered");
        } else {
            debug!(sensor = %id, temperature = reading.temperature, "Reading recorded");
        }

        Ok((outcome, QueuedWrites::new(id, pending)))
    }

    /// Replace the settings of an existing sensor.
    pub async fn update_settings(
        &self,
        id: &str,
        settings: Settings,
    ) -> Result<Settings, CoreError> {
        let pending = {
            let mut sensors = self.sensors.write();
            let sensor = sensors
                .get_mut(id)
                .ok_or_else(|| CoreError::UnknownSensor(id.to_string()))?;
            sensor.settings = settings.clone();
            self.storage.enqueue_settings(id, &settings)
        };

        debug!(sensor = %id, name = %settings.name, "Settings updated");
        QueuedWrites::new(id, vec![pending]).wait().await?;
        Ok(settings)
    }
}

/// Disk writes queued for one sensor.
#[must_use = "queued writes are only reported when awaited"]
pub struct QueuedWrites {
    sensor_id: String,
    pending: Vec<Result<PendingWrite, StorageError>>,
}

impl QueuedWrites {
    fn new(id: &str, pending: Vec<Result<PendingWrite, StorageError>>) -> Self {
        Self {
            sensor_id: id.to_string(),
            pending,
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Await every write, reporting the first failure.
    pub async fn wait(self) -> Result<(), CoreError> {
        let mut first_error = None;

        for write in self.pending {
            let result = match write {
                Ok(write) => write.wait().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(sensor = %self.sensor_id, error = %e, "Write not persisted");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(CoreError::Storage(e)),
            None => Ok(()),
        }
    }
}

fn default_settings(order: u32) -> Settings {
    Settings::new(DEFAULT_SENSOR_NAME, random_color(), order)
}

/// Random `#rrggbb` color.
pub fn random_color() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("#{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2])
}
