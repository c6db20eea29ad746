//! Thermolog Daemon
//!
//! Background process that owns the sensor data directory, ingests readings
//! delivered over the control socket and answers chart and settings queries.

mod daemon;
mod handler;
mod signals;

pub use daemon::Daemon;
pub use handler::DaemonHandler;
