//! Chart queries over the sensor store.

mod range;
mod sampling;

pub use range::TimeRange;
pub use sampling::{downsample, nearest_index, select_range};

use crate::config::ThermologConfig;
use crate::store::{Sensor, SensorStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thermolog_ipc::{ChartData, ChartOptions, ChartPoint, CurrentTemperature, Dataset};
use thermolog_storage::Settings;

/// Builds chart views from the in-memory sensor histories.
pub struct QueryEngine {
    store: Arc<SensorStore>,
    sampling_interval: Duration,
    default_max_points: usize,
}

impl QueryEngine {
    pub fn new(store: Arc<SensorStore>, sampling_interval: Duration, default_max_points: usize) -> Self {
        Self {
            store,
            sampling_interval,
            default_max_points,
        }
    }

    pub fn from_config(store: Arc<SensorStore>, config: &ThermologConfig) -> Self {
        Self::new(store, config.sampling_interval(), config.default_max_points)
    }

    /// Chart of every sensor over `range`, ending now.
    pub fn chart(&self, range: TimeRange, max_points: Option<usize>) -> ChartData {
        self.chart_at(range, max_points, Utc::now())
    }

    /// Chart of every sensor over `range`, ending at `now`.
    ///
    /// Datasets are ordered by each sensor's `order`, ties broken by id.
    pub fn chart_at(
        &self,
        range: TimeRange,
        max_points: Option<usize>,
        now: DateTime<Utc>,
    ) -> ChartData {
        let start = range.start(now);
        let max_points = max_points.unwrap_or(self.default_max_points);

        let mut series = self.store.with_each_sensor(|sensor| {
            (
                sensor.settings.order,
                sensor.id.clone(),
                self.series(sensor, start, now, max_points),
            )
        });
        series.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let datasets = series
            .into_iter()
            .map(|(_, _, (settings, points))| dataset(&settings, points))
            .collect();

        ChartData::line(datasets, ChartOptions::titled(range.title()))
    }

    /// Series of one sensor over `range`, ending now.
    pub fn sensor_series(
        &self,
        id: &str,
        range: TimeRange,
        max_points: Option<usize>,
    ) -> Option<Dataset> {
        self.sensor_series_at(id, range, max_points, Utc::now())
    }

    /// Series of one sensor over `range`, ending at `now`.
    pub fn sensor_series_at(
        &self,
        id: &str,
        range: TimeRange,
        max_points: Option<usize>,
        now: DateTime<Utc>,
    ) -> Option<Dataset> {
        let start = range.start(now);
        let max_points = max_points.unwrap_or(self.default_max_points);

        let (settings, points) = self
            .store
            .with_sensor(id, |sensor| self.series(sensor, start, now, max_points))?;
        Some(dataset(&settings, points))
    }

    /// Latest reading of every sensor, ordered like the chart datasets.
    pub fn current_temperatures(&self) -> Vec<CurrentTemperature> {
        let mut latest = self.store.latest_readings();
        latest.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(&b.0)));

        latest
            .into_iter()
            .map(|(id, settings, reading)| CurrentTemperature {
                id,
                name: capitalize(&settings.name),
                temperature: reading.temperature,
                time: reading.timestamp,
            })
            .collect()
    }

    // Runs under the store's read lock; keep it to slicing and copying points.
    fn series(
        &self,
        sensor: &Sensor,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: usize,
    ) -> (Settings, Vec<ChartPoint>) {
        let selected = select_range(&sensor.readings, start, end, self.sampling_interval);
        let points = downsample(selected, max_points)
            .into_iter()
            .map(|reading| ChartPoint {
                x: reading.timestamp,
                y: reading.temperature,
            })
            .collect();
        (sensor.settings.clone(), points)
    }
}

fn dataset(settings: &Settings, points: Vec<ChartPoint>) -> Dataset {
    Dataset {
        label: settings.name.clone(),
        data: points,
        border_color: settings.color.clone(),
        background_color: settings.color.clone(),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;
    use thermolog_storage::{LoadedSensor, Reading, Storage};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// One reading per minute for the last `count` minutes, newest at `now()`.
    fn history(count: i64) -> Vec<Reading> {
        (0..count)
            .rev()
            .map(|i| Reading::new(20.0 + (i % 5) as f64, now() - Duration::minutes(i)))
            .collect()
    }

    async fn engine(sensors: Vec<LoadedSensor>) -> (tempfile::TempDir, QueryEngine) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path().to_path_buf()).await.unwrap();
        let store = Arc::new(SensorStore::with_sensors(Arc::new(storage), sensors));
        (dir, QueryEngine::new(store, Duration::minutes(1), 500))
    }

    fn loaded(id: &str, name: &str, order: u32, readings: Vec<Reading>) -> LoadedSensor {
        LoadedSensor {
            id: id.to_string(),
            settings: Settings::new(name, "#112233", order),
            readings,
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("kitchen"), "Kitchen");
        assert_eq!(capitalize("éte"), "Éte");
        assert_eq!(capitalize(""), "");
    }

    #[tokio::test]
    async fn test_hour_chart_downsampled() {
        let (_dir, engine) = engine(vec![loaded("s1", "Kitchen", 0, history(24 * 60))]).await;

        let chart = engine.chart_at(TimeRange::Hour, Some(60), now());
        assert_eq!(chart.chart_type, "line");
        assert_eq!(chart.datasets.len(), 1);

        let data = &chart.datasets[0].data;
        assert!(!data.is_empty());
        assert!(data.len() <= 60);
        let hour_ago = now() - Duration::hours(1);
        assert!(data.iter().all(|p| p.x >= hour_ago && p.x <= now()));
        assert_eq!(data[0].x, hour_ago);
        assert_eq!(chart.datasets[0].label, "Kitchen");
        assert_eq!(chart.datasets[0].border_color, "#112233");
    }

    #[tokio::test]
    async fn test_all_range_returns_full_history() {
        let readings = history(90);
        let (_dir, engine) = engine(vec![loaded("s1", "Kitchen", 0, readings.clone())]).await;

        let dataset = engine
            .sensor_series_at("s1", TimeRange::All, Some(1000), now())
            .unwrap();
        assert_eq!(dataset.data.len(), readings.len());
        assert_eq!(dataset.data[0].x, readings[0].timestamp);
    }

    #[tokio::test]
    async fn test_datasets_sorted_by_order_then_id() {
        let (_dir, engine) = engine(vec![
            loaded("c", "Third", 1, history(5)),
            loaded("b", "Second", 0, history(5)),
            loaded("a", "First", 0, history(5)),
            loaded("d", "Empty", 2, Vec::new()),
        ])
        .await;

        let chart = engine.chart_at(TimeRange::Day, None, now());
        let labels: Vec<&str> = chart.datasets.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["First", "Second", "Third", "Empty"]);
        assert!(chart.datasets[3].data.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sensor_series() {
        let (_dir, engine) = engine(Vec::new()).await;
        assert!(engine
            .sensor_series_at("s9", TimeRange::Hour, None, now())
            .is_none());
        assert!(engine.chart_at(TimeRange::Hour, None, now()).datasets.is_empty());
    }

    #[tokio::test]
    async fn test_current_temperatures() {
        let (_dir, engine) = engine(vec![
            loaded("s2", "garage", 1, vec![Reading::new(12.5, now())]),
            loaded("s1", "kitchen", 0, history(3)),
            loaded("s3", "attic", 2, Vec::new()),
        ])
        .await;

        let current = engine.current_temperatures();
        assert_eq!(current.len(), 2);
        assert_eq!(current[0].name, "Kitchen");
        assert_eq!(current[0].time, now());
        assert_eq!(current[1].name, "Garage");
        assert_eq!(current[1].temperature, 12.5);
    }
}
