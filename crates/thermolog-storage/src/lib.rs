//! Thermolog Storage
//!
//! This crate provides the persistence layer for Thermolog, including:
//! - Per-sensor settings artifacts with atomic full replacement
//! - Append-only reading logs that tolerate torn trailing records
//! - One ordered write channel per sensor so slow disks never couple sensors

mod error;
mod record;
pub mod storage;

pub use error::StorageError;
pub use record::{Reading, Settings};
pub use storage::{
    validate_sensor_id, LoadedSensor, PendingWrite, ReadingLog, Storage, StorageOptions,
};
