//! Batch settings edits from the settings form.

use crate::error::CoreError;
use crate::store::SensorStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use thermolog_ipc::{SensorSettings, SettingsResult};
use thermolog_storage::Settings;
use tracing::{info, warn};

/// Result of one edit within a batch.
#[derive(Debug)]
pub struct SettingsOutcome {
    pub id: String,
    pub result: Result<Settings, CoreError>,
}

impl SettingsOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl From<SettingsOutcome> for SettingsResult {
    fn from(outcome: SettingsOutcome) -> Self {
        match outcome.result {
            Ok(_) => SettingsResult::applied(outcome.id),
            Err(e) => SettingsResult::failed(outcome.id, e.code(), e.to_string()),
        }
    }
}

/// Reads and edits sensor settings.
pub struct SettingsService {
    store: Arc<SensorStore>,
}

impl SettingsService {
    pub fn new(store: Arc<SensorStore>) -> Self {
        Self { store }
    }

    /// Apply every edit in the batch, in id order.
    ///
    /// A failed edit does not stop the ones after it.
    pub async fn apply(&self, batch: BTreeMap<String, Settings>) -> Vec<SettingsOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());

        for (id, settings) in batch {
            let result = self.store.update_settings(&id, settings).await;
            if let Err(e) = &result {
                warn!(sensor = %id, error = %e, "Settings edit failed");
            }
            outcomes.push(SettingsOutcome { id, result });
        }

        let applied = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(applied, total = outcomes.len(), "Settings batch applied");
        outcomes
    }

    /// Settings of every sensor, sorted by order then id.
    pub fn list(&self) -> Vec<SensorSettings> {
        let mut sensors = self
            .store
            .with_each_sensor(|sensor| SensorSettings::new(sensor.id.clone(), sensor.settings.clone()));
        sensors.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        sensors
    }
}
