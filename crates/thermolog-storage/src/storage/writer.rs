//! Per-sensor write channels.
//!
//! Every sensor id owns one writer task. Operations on the same id complete
//! in submission order; operations on different ids never wait on each other.

use super::log::{inspect_tail, TailFix, RECORD_DELIMITER};
use super::{LOG_FILE, SETTINGS_FILE};
use crate::StorageError;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Ack = oneshot::Sender<Result<(), StorageError>>;

/// A queued write.
pub(crate) enum WriteOp {
    /// Append an encoded record to the reading log
    Append { record: String, ack: Ack },
    /// Replace the settings artifact
    ReplaceSettings { json: String, ack: Ack },
}

impl WriteOp {
    pub(crate) fn append(record: String) -> (Self, oneshot::Receiver<Result<(), StorageError>>) {
        let (ack, rx) = oneshot::channel();
        (WriteOp::Append { record, ack }, rx)
    }

    pub(crate) fn replace_settings(
        json: String,
    ) -> (Self, oneshot::Receiver<Result<(), StorageError>>) {
        let (ack, rx) = oneshot::channel();
        (WriteOp::ReplaceSettings { json, ack }, rx)
    }
}

/// Completion handle for a queued write.
#[must_use = "a pending write does nothing unless awaited"]
pub struct PendingWrite {
    sensor_id: String,
    rx: oneshot::Receiver<Result<(), StorageError>>,
}

impl PendingWrite {
    pub(crate) fn new(sensor_id: &str, rx: oneshot::Receiver<Result<(), StorageError>>) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            rx,
        }
    }

    /// Wait until the write has reached disk (or failed).
    pub async fn wait(self) -> Result<(), StorageError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(StorageError::WriterClosed(self.sensor_id)),
        }
    }
}

/// Sending half of one sensor's write channel.
#[derive(Clone)]
pub(crate) struct SensorWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl SensorWriter {
    /// Spawn the writer task for a sensor directory.
    pub(crate) fn spawn(sensor_id: String, dir: PathBuf, durable: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = WriterState {
            log_path: dir.join(LOG_FILE),
            settings_path: dir.join(SETTINGS_FILE),
            sensor_id,
            dir,
            durable,
            log: None,
        };
        tokio::spawn(state.run(rx));
        Self { tx }
    }

    /// Queue an operation. Returns the operation back if the task is gone.
    pub(crate) fn submit(&self, op: WriteOp) -> Result<(), WriteOp> {
        self.tx.send(op).map_err(|e| e.0)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct WriterState {
    sensor_id: String,
    dir: PathBuf,
    log_path: PathBuf,
    settings_path: PathBuf,
    durable: bool,
    /// Log handle kept open between appends
    log: Option<OpenLog>,
}

/// An open reading log and the length this writer left it at.
struct OpenLog {
    file: File,
    len: u64,
}

impl WriterState {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Append { record, ack } => {
                    let result = self.append(&record).await;
                    if let Err(e) = &result {
                        warn!(sensor = %self.sensor_id, error = %e, "Failed to append reading");
                    }
                    let _ = ack.send(result);
                }
                WriteOp::ReplaceSettings { json, ack } => {
                    let result = self.replace_settings(&json).await;
                    if let Err(e) = &result {
                        warn!(sensor = %self.sensor_id, error = %e, "Failed to write settings");
                    }
                    let _ = ack.send(result);
                }
            }
        }

        debug!(sensor = %self.sensor_id, "Writer stopped");
    }

    /// Append one record. The log always ends on a record boundary
    /// afterwards, whether the write succeeded or not.
    async fn append(&mut self, record: &str) -> Result<(), StorageError> {
        let mut log = match self.log.take() {
            Some(log) => log,
            None => self.open_log().await?,
        };

        if log.file.metadata().await?.len() != log.len {
            warn!(
                sensor = %self.sensor_id,
                expected = log.len,
                "Reading log changed under its writer"
            );
            drop(log);
            log = self.open_log().await?;
        }

        match self.write_record(&mut log.file, record).await {
            Ok(()) => {
                log.len += record.len() as u64;
                self.log = Some(log);
                debug!(sensor = %self.sensor_id, "Appended reading");
                Ok(())
            }
            Err(e) => {
                self.roll_back(log).await;
                Err(e)
            }
        }
    }

    async fn write_record(&self, file: &mut File, record: &str) -> Result<(), StorageError> {
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        if self.durable {
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Cut a partially written record. The handle is dropped either way, so
    /// a failed cut is retried by the tail check on the next open.
    async fn roll_back(&self, log: OpenLog) {
        let result = async {
            log.file.set_len(log.len).await?;
            if self.durable {
                log.file.sync_data().await?;
            }
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            warn!(sensor = %self.sensor_id, error = %e, "Failed to cut partial record");
        }
    }

    /// Open the log for appending, first bringing its tail back to a record
    /// boundary.
    async fn open_log(&self) -> Result<OpenLog, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        let content = tokio::fs::read(&self.log_path).await?;
        let len = match inspect_tail(&content) {
            TailFix::Clean => content.len() as u64,
            TailFix::AddDelimiter => {
                file.write_all(RECORD_DELIMITER.as_bytes()).await?;
                file.flush().await?;
                (content.len() + RECORD_DELIMITER.len()) as u64
            }
            TailFix::Truncate(len) => {
                warn!(
                    sensor = %self.sensor_id,
                    dropped_bytes = content.len() as u64 - len,
                    "Cutting incomplete record from reading log"
                );
                file.set_len(len).await?;
                len
            }
        };
        if self.durable && len != content.len() as u64 {
            file.sync_data().await?;
        }

        Ok(OpenLog { file, len })
    }

    async fn replace_settings(&self, json: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.dir.join(format!(".{}.tmp", SETTINGS_FILE));
        let mut file = File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        if self.durable {
            file.sync_all().await?;
        }
        drop(file);
        tokio::fs::rename(&temp_path, &self.settings_path).await?;

        debug!(sensor = %self.sensor_id, path = ?self.settings_path, "Saved settings");

        Ok(())
    }
}
