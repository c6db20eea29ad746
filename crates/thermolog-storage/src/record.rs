//! Records persisted for each sensor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One timestamped temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// When the reading was received
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a reading with an explicit timestamp.
    pub fn new(temperature: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature,
            timestamp,
        }
    }

    /// Create a reading stamped with the current time.
    pub fn now(temperature: f64) -> Self {
        Self::new(temperature, Utc::now())
    }
}

/// Display metadata for a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Human readable label
    pub name: String,
    /// CSS color, `#rrggbb` when generated
    pub color: String,
    /// Display position across sensors
    #[serde(deserialize_with = "order_from_number_or_string")]
    pub order: u32,
}

impl Settings {
    pub fn new(name: impl Into<String>, color: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            order,
        }
    }
}

// Settings saved from the web form carry `order` as a string.
fn order_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOrder {
        Number(u32),
        Text(String),
    }

    match RawOrder::deserialize(deserializer)? {
        RawOrder::Number(n) => Ok(n),
        RawOrder::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
