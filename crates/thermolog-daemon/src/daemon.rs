//! Daemon lifecycle management.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use thermolog_core::{ingest, IngestionWorker, Ingestor, Metrics, SensorStore, ThermologConfig};
use thermolog_ipc::IpcServer;
use thermolog_storage::Storage;
use tokio::sync::broadcast;

use crate::handler::DaemonHandler;
use crate::signals;

/// How long shutdown waits for the ingestion worker to stop
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The main daemon process
pub struct Daemon {
    config: ThermologConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    /// Create a daemon from the user's config file
    pub fn new() -> Result<Self> {
        Self::with_config(ThermologConfig::load())
    }

    /// Create a daemon from an explicit config
    pub fn with_config(config: ThermologConfig) -> Result<Self> {
        config
            .ensure_dirs()
            .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &ThermologConfig {
        &self.config
    }

    /// Sender that stops a running daemon when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the daemon until a shutdown signal or request
    pub async fn run(&self) -> Result<()> {
        self.acquire_pid_lock()?;

        let result = self.serve().await;
        self.cleanup();
        result
    }

    async fn serve(&self) -> Result<()> {
        tracing::info!(
            socket = %self.config.socket_path.display(),
            data_dir = %self.config.data_dir.display(),
            "Daemon starting"
        );

        let storage = Storage::open_with(self.config.storage_options())
            .await
            .context("Sensor data directory is unavailable")?;
        let store = Arc::new(
            SensorStore::load(Arc::new(storage))
                .await
                .context("Failed to load sensors")?,
        );

        tracing::info!(
            sensors = store.sensor_count(),
            readings = store.reading_count(),
            "Sensor data loaded"
        );

        let metrics = Arc::new(Metrics::new());
        let ingestor = Arc::new(Ingestor::new(store.clone(), metrics.clone()));
        let (inbound_tx, inbound_rx) = ingest::channel(self.config.ingest_queue_capacity);
        let worker = tokio::spawn(
            IngestionWorker::new(ingestor, inbound_rx).run(self.shutdown_tx.subscribe()),
        );

        let handler = Arc::new(DaemonHandler::new(
            store,
            &self.config,
            metrics,
            inbound_tx,
            self.shutdown_tx.clone(),
        ));

        let ipc_server = IpcServer::new(&self.config.socket_path, handler)
            .await
            .context("Failed to create IPC server")?;

        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::select! {
            result = ipc_server.run() => {
                if let Err(e) = result {
                    tracing::error!("IPC server error: {}", e);
                }
            }
            _ = signals::wait_for_shutdown(shutdown_rx) => {
                tracing::info!("Shutdown signal received");
            }
        }

        // Wakes the worker when the stop came from a signal rather than a request
        let _ = self.shutdown_tx.send(());
        drop(ipc_server);

        match tokio::time::timeout(WORKER_STOP_TIMEOUT, worker).await {
            Ok(Ok(handled)) => tracing::debug!(handled, "Ingestion worker joined"),
            Ok(Err(e)) => tracing::warn!("Ingestion worker failed: {}", e),
            Err(_) => tracing::warn!("Ingestion worker did not stop in time"),
        }

        Ok(())
    }

    /// Acquire PID lock to ensure single instance
    fn acquire_pid_lock(&self) -> Result<()> {
        let pid_file = &self.config.pid_file;

        if pid_file.exists() {
            if let Ok(pid_str) = std::fs::read_to_string(pid_file) {
                if let Ok(pid) = pid_str.trim().parse::<u32>() {
                    if is_process_running(pid) {
                        anyhow::bail!("Daemon already running (PID: {})", pid);
                    }
                }
            }
            tracing::warn!(path = %pid_file.display(), "Removing stale PID file");
            std::fs::remove_file(pid_file).context("Failed to remove stale PID file")?;
        }

        if let Some(parent) = pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(pid_file, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file {}", pid_file.display()))?;

        tracing::debug!(pid = std::process::id(), "PID lock acquired");

        Ok(())
    }

    fn cleanup(&self) {
        tracing::info!("Cleaning up...");

        if self.config.socket_path.exists() {
            let _ = std::fs::remove_file(&self.config.socket_path);
        }

        if self.config.pid_file.exists() {
            let _ = std::fs::remove_file(&self.config.pid_file);
        }

        tracing::info!("Cleanup complete");
    }
}

/// Check if a process is running by PID
fn is_process_running(pid: u32) -> bool {
    // kill(pid, 0) only probes for existence
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> ThermologConfig {
        ThermologConfig {
            socket_path: dir.join("thermolog.sock"),
            data_dir: dir.join("data"),
            pid_file: dir.join("thermolog.pid"),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_process_running() {
        assert!(is_process_running(std::process::id()));
        assert!(!is_process_running(999999999));
    }

    #[test]
    fn test_with_config_creates_dirs() {
        let dir = tempdir().unwrap();
        let daemon = Daemon::with_config(test_config(dir.path())).unwrap();
        assert!(daemon.config().sensors_dir().is_dir());
    }

    #[test]
    fn test_pid_lock_rejects_live_owner() {
        let dir = tempdir().unwrap();
        let daemon = Daemon::with_config(test_config(dir.path())).unwrap();

        std::fs::write(&daemon.config().pid_file, std::process::id().to_string()).unwrap();
        assert!(daemon.acquire_pid_lock().is_err());
    }

    #[test]
    fn test_pid_lock_replaces_stale_file() {
        let dir = tempdir().unwrap();
        let daemon = Daemon::with_config(test_config(dir.path())).unwrap();

        std::fs::write(&daemon.config().pid_file, "999999999").unwrap();
        daemon.acquire_pid_lock().unwrap();

        let pid = std::fs::read_to_string(&daemon.config().pid_file).unwrap();
        assert_eq!(pid, std::process::id().to_string());
        daemon.cleanup();
        assert!(!daemon.config().pid_file.exists());
    }
}
