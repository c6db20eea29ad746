//! Chart payloads handed to the rendering front-end.
//!
//! Field names follow the line-chart configuration the dashboard feeds to
//! Chart.js, so a response can be passed through without reshaping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FONT_COLOR: &str = "#c1d4df";
const GRID_COLOR: &str = "#929ba1";

/// Complete chart description: one dataset per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub datasets: Vec<Dataset>,
    pub options: ChartOptions,
}

impl ChartData {
    /// Line chart with the dashboard options.
    pub fn line(datasets: Vec<Dataset>, options: ChartOptions) -> Self {
        Self {
            chart_type: "line".to_string(),
            datasets,
            options,
        }
    }
}

/// Series for a single sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<ChartPoint>,
    pub border_color: String,
    pub background_color: String,
}

/// One plotted reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: DateTime<Utc>,
    pub y: f64,
}

/// Chart options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    pub color: String,
    pub point_radius: u32,
    pub point_hit_radius: u32,
    pub responsive: bool,
    pub plugins: ChartPlugins,
    pub scales: ChartScales,
}

impl ChartOptions {
    /// Dashboard options with a custom title.
    pub fn titled(text: impl Into<String>) -> Self {
        let mut options = Self::default();
        options.plugins.title.text = text.into();
        options
    }
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            color: FONT_COLOR.to_string(),
            point_radius: 0,
            point_hit_radius: 5,
            responsive: true,
            plugins: ChartPlugins {
                title: AxisTitle::new("Temperature"),
            },
            scales: ChartScales {
                x: TimeAxis::default(),
                y: ValueAxis::default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPlugins {
    pub title: AxisTitle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTitle {
    pub color: String,
    pub display: bool,
    pub text: String,
}

impl AxisTitle {
    fn new(text: &str) -> Self {
        Self {
            color: FONT_COLOR.to_string(),
            display: true,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartScales {
    pub x: TimeAxis,
    pub y: ValueAxis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStyle {
    pub border_color: String,
    pub color: String,
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            border_color: GRID_COLOR.to_string(),
            color: GRID_COLOR.to_string(),
        }
    }
}

/// Time based x axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    #[serde(rename = "type")]
    pub axis_type: String,
    pub grid: GridStyle,
    pub time: TimeUnits,
    pub ticks: TimeTicks,
    pub title: AxisTitle,
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self {
            axis_type: "time".to_string(),
            grid: GridStyle::default(),
            time: TimeUnits::default(),
            ticks: TimeTicks::default(),
            title: AxisTitle::new("Date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUnits {
    pub min_unit: String,
    pub display_formats: DisplayFormats,
}

impl Default for TimeUnits {
    fn default() -> Self {
        Self {
            min_unit: "second".to_string(),
            display_formats: DisplayFormats::default(),
        }
    }
}

/// Luxon format strings per time unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayFormats {
    pub second: String,
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub week: String,
    pub month: String,
}

impl Default for DisplayFormats {
    fn default() -> Self {
        Self {
            second: "HH:mm:ss".to_string(),
            minute: "yyyy-MM-dd, HH:mm".to_string(),
            hour: "yyyy-MM-dd, HH:mm".to_string(),
            day: "yyyy-MM-dd, HH:mm".to_string(),
            week: "yyyy-MM-dd".to_string(),
            month: "yyyy-MM".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTicks {
    pub max_rotation: u32,
    pub min_rotation: u32,
    pub max_ticks_limit: u32,
    pub major: MajorTicks,
    pub color: String,
}

impl Default for TimeTicks {
    fn default() -> Self {
        Self {
            max_rotation: 0,
            min_rotation: 0,
            max_ticks_limit: 10,
            major: MajorTicks { enabled: true },
            color: FONT_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorTicks {
    pub enabled: bool,
}

/// Temperature y axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAxis {
    pub grid: GridStyle,
    pub ticks: ValueTicks,
    pub title: AxisTitle,
}

impl Default for ValueAxis {
    fn default() -> Self {
        Self {
            grid: GridStyle::default(),
            ticks: ValueTicks {
                color: FONT_COLOR.to_string(),
            },
            title: AxisTitle::new("Temperature °C"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTicks {
    pub color: String,
}
