//! Thermolog Core Components
//!
//! This crate provides the core functionality for the Thermolog daemon:
//! the in-memory sensor index, the ingestion write path, the range and
//! downsampling query engine, and settings management.

mod config;
mod error;
pub mod ingest;
mod metrics;
pub mod query;
mod settings;
mod store;

pub use config::{ThermologConfig, CONFIG_ENV};
pub use error::CoreError;
pub use ingest::{
    parse_temperature, sensor_id_from_topic, Accepted, Admission, InboundMessage, IngestOutcome,
    IngestionWorker, Ingestor, TOPIC_FILTER,
};
pub use metrics::Metrics;
pub use query::{QueryEngine, TimeRange};
pub use settings::{SettingsOutcome, SettingsService};
pub use store::{
    random_color, QueuedWrites, RecordOutcome, Sensor, SensorStore, DEFAULT_SENSOR_NAME,
};
