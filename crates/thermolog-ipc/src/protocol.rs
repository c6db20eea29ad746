//! IPC Protocol definitions for Thermolog daemon communication.
//!
//! Uses MessagePack for efficient serialization over Unix sockets.

use crate::chart::{ChartData, Dataset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thermolog_storage::Settings;

/// Request from client (web front-end, MQTT bridge, CLI) to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Deliver a message received by the transport (async, fire-and-forget)
    Publish { topic: String, payload: Vec<u8> },

    /// Chart of every sensor over a symbolic range
    Chart {
        #[serde(default = "default_range")]
        range: String,
        /// Point budget per sensor (daemon default when absent)
        #[serde(default)]
        max_points: Option<usize>,
    },

    /// Chart of a single sensor
    SensorChart {
        id: String,
        #[serde(default = "default_range")]
        range: String,
        #[serde(default)]
        max_points: Option<usize>,
    },

    /// Latest reading of every sensor
    CurrentTemperatures,

    /// Settings of every sensor
    ListSettings,

    /// Apply a batch of settings edits keyed by sensor id
    UpdateSettings { updates: BTreeMap<String, Settings> },

    /// Get daemon status
    Status,

    /// Graceful shutdown
    Shutdown,

    /// Ping for health check
    Ping,
}

impl Request {
    /// Publish request for a reading in the sensor topic layout.
    pub fn reading(sensor_id: &str, temperature: f64) -> Self {
        Request::Publish {
            topic: format!("temperature/{}/reading", sensor_id),
            payload: format!("{{\"temperature\":{}}}", temperature).into_bytes(),
        }
    }
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with optional data
    Ok {
        #[serde(default)]
        data: Option<ResponseData>,
    },

    /// Acknowledgment for fire-and-forget requests
    Ack,

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Create a success response with no data
    pub fn ok() -> Self {
        Response::Ok { data: None }
    }

    /// Create a success response with data
    pub fn ok_with(data: ResponseData) -> Self {
        Response::Ok { data: Some(data) }
    }

    /// Create an acknowledgment response
    pub fn ack() -> Self {
        Response::Ack
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Daemon status
    Status {
        version: String,
        uptime_secs: u64,
        sensors: usize,
        /// Readings held in memory across all sensors
        readings_stored: usize,
        /// Readings accepted since start
        #[serde(default)]
        readings_ingested: u64,
        /// Payloads dropped by validation since start
        #[serde(default)]
        payloads_rejected: u64,
        /// Total requests handled
        #[serde(default)]
        requests_total: u64,
        /// Average request latency in milliseconds
        #[serde(default)]
        avg_latency_ms: u64,
    },

    /// Pong response
    Pong { timestamp: i64 },

    /// Chart of every sensor
    Chart { chart: ChartData },

    /// Chart series of one sensor
    Series { dataset: Dataset },

    /// Latest reading per sensor, in display order
    CurrentTemperatures { sensors: Vec<CurrentTemperature> },

    /// Settings per sensor, in display order
    Settings { sensors: Vec<SensorSettings> },

    /// Per-id results of a settings batch
    SettingsApplied { results: Vec<SettingsResult> },
}

/// Latest reading of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTemperature {
    pub id: String,
    /// Display name with its first letter capitalized
    pub name: String,
    pub temperature: f64,
    pub time: DateTime<Utc>,
}

/// Settings of one sensor together with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSettings {
    pub id: String,
    pub name: String,
    pub color: String,
    pub order: u32,
}

impl SensorSettings {
    pub fn new(id: impl Into<String>, settings: Settings) -> Self {
        Self {
            id: id.into(),
            name: settings.name,
            color: settings.color,
            order: settings.order,
        }
    }
}

/// Outcome of one settings edit within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsResult {
    pub id: String,
    pub ok: bool,
    pub code: Option<ErrorCode>,
    pub message: Option<String>,
}

impl SettingsResult {
    pub fn applied(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            code: None,
            message: None,
        }
    }

    pub fn failed(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            code: Some(code),
            message: Some(message.into()),
        }
    }
}

/// Error codes for error responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request format is invalid
    InvalidRequest,
    /// Sensor id does not exist
    UnknownSensor,
    /// Durable write failed
    StorageError,
    /// Internal daemon error
    InternalError,
    /// Operation timed out
    Timeout,
    /// Daemon is shutting down
    ShuttingDown,
}

fn default_range() -> String {
    "all".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::Chart {
            range: "day".to_string(),
            max_points: Some(200),
        };

        // Test JSON serialization (for debugging)
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"action\":\"chart\""));
        assert!(json.contains("day"));

        // Test MessagePack round-trip
        let msgpack = rmp_serde::to_vec(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&msgpack).unwrap();

        if let Request::Chart { range, max_points } = decoded {
            assert_eq!(range, "day");
            assert_eq!(max_points, Some(200));
        } else {
            panic!("Decoded wrong variant");
        }
    }

    #[test]
    fn test_chart_request_defaults() {
        let req: Request = serde_json::from_str(r#"{"action":"chart"}"#).unwrap();
        if let Request::Chart { range, max_points } = req {
            assert_eq!(range, "all");
            assert_eq!(max_points, None);
        } else {
            panic!("Decoded wrong variant");
        }
    }

    #[test]
    fn test_reading_request_layout() {
        let req = Request::reading("s1", 21.5);
        if let Request::Publish { topic, payload } = req {
            assert_eq!(topic, "temperature/s1/reading");
            let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(body["temperature"], 21.5);
        } else {
            panic!("Expected publish request");
        }
    }

    #[test]
    fn test_update_settings_roundtrip() {
        let mut updates = BTreeMap::new();
        updates.insert("s1".to_string(), Settings::new("Kitchen", "#ff0000", 0));
        updates.insert("s2".to_string(), Settings::new("Garage", "#00ff00", 1));
        let req = Request::UpdateSettings { updates };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("update_settings"));
        assert!(json.contains("Kitchen"));

        let msgpack = rmp_serde::to_vec(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&msgpack).unwrap();
        if let Request::UpdateSettings { updates } = decoded {
            assert_eq!(updates.len(), 2);
            assert_eq!(updates["s2"].name, "Garage");
        } else {
            panic!("Decoded wrong variant");
        }
    }

    #[test]
    fn test_settings_applied_response() {
        let resp = Response::ok_with(ResponseData::SettingsApplied {
            results: vec![
                SettingsResult::applied("s1"),
                SettingsResult::failed("ghost", ErrorCode::UnknownSensor, "Unknown sensor: ghost"),
            ],
        });

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("settings_applied"));
        assert!(json.contains("unknown_sensor"));

        let msgpack = rmp_serde::to_vec(&resp).unwrap();
        let decoded: Response = rmp_serde::from_slice(&msgpack).unwrap();
        if let Response::Ok {
            data: Some(ResponseData::SettingsApplied { results }),
        } = decoded
        {
            assert!(results[0].ok);
            assert_eq!(results[1].code, Some(ErrorCode::UnknownSensor));
        } else {
            panic!("Decoded wrong response variant");
        }
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(ErrorCode::UnknownSensor, "Unknown sensor: s9");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("s9"));
    }
}
