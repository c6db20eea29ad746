//! Configuration for the Thermolog daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thermolog_storage::StorageOptions;

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "THERMOLOG_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermologConfig {
    /// Unix socket path for IPC
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Data directory; sensors live under `<data_dir>/sensors`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// PID file path
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Expected spacing between two readings of one sensor, in seconds
    #[serde(default = "default_sampling_interval_secs")]
    pub sampling_interval_secs: u64,

    /// Point budget per sensor when a chart request names none
    #[serde(default = "default_max_points")]
    pub default_max_points: usize,

    /// fsync every append and settings write
    #[serde(default = "default_durable_writes")]
    pub durable_writes: bool,

    /// Capacity of the inbound message queue feeding the ingestion worker
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/thermolog.sock")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".thermolog")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/thermolog.pid")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sampling_interval_secs() -> u64 {
    60
}

fn default_max_points() -> usize {
    500
}

fn default_durable_writes() -> bool {
    true
}

fn default_ingest_queue_capacity() -> usize {
    1024
}

impl Default for ThermologConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
            pid_file: default_pid_file(),
            log_level: default_log_level(),
            sampling_interval_secs: default_sampling_interval_secs(),
            default_max_points: default_max_points(),
            durable_writes: default_durable_writes(),
            ingest_queue_capacity: default_ingest_queue_capacity(),
        }
    }
}

impl ThermologConfig {
    /// Load configuration from `$THERMOLOG_CONFIG` or `~/.thermolog/config.yaml`,
    /// falling back to defaults
    pub fn load() -> Self {
        let config_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("config.yaml"));

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config file {}: {}", config_path.display(), e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Get the sensors directory
    pub fn sensors_dir(&self) -> PathBuf {
        self.data_dir.join("sensors")
    }

    /// Storage options derived from this config
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            base_dir: self.sensors_dir(),
            durable: self.durable_writes,
        }
    }

    /// Sampling interval as a chrono duration, never shorter than one second
    pub fn sampling_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sampling_interval_secs.max(1) as i64)
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.sensors_dir())?;
        Ok(())
    }
}
