//! Append-only reading log.
//!
//! Each record is the JSON encoding of a [`Reading`] followed by `",\n"`, so
//! the whole file becomes a JSON array once the final delimiter is stripped
//! and the content is wrapped in brackets. A writer interrupted mid-append
//! leaves a torn trailing record, which is dropped on load.

use crate::{Reading, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Separator written after every record.
pub const RECORD_DELIMITER: &str = ",\n";

/// Encode one reading as a log record, delimiter included.
pub fn encode_record(reading: &Reading) -> Result<String, StorageError> {
    let mut line = serde_json::to_string(reading)?;
    line.push_str(RECORD_DELIMITER);
    Ok(line)
}

/// Result of parsing log content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedLog {
    pub readings: Vec<Reading>,
    /// Byte length of the prefix made of complete records
    pub valid_len: usize,
    /// The last complete record was not followed by a delimiter
    pub missing_delimiter: bool,
    /// A torn trailing record was discarded
    pub torn_tail: bool,
}

impl ParsedLog {
    fn needs_repair(&self, content_len: usize) -> bool {
        self.missing_delimiter || self.valid_len != content_len
    }
}

/// Parse the full content of a reading log.
///
/// Returns the reason string when a record other than the last is malformed.
pub(crate) fn parse_log(content: &str) -> Result<ParsedLog, String> {
    if content.trim().is_empty() {
        return Ok(ParsedLog {
            readings: Vec::new(),
            valid_len: 0,
            missing_delimiter: false,
            torn_tail: !content.is_empty(),
        });
    }

    // Fast path: the whole file is well formed.
    let (body, delimited) = match content.strip_suffix(RECORD_DELIMITER) {
        Some(body) => (body, true),
        None => (content, false),
    };
    if let Ok(readings) = serde_json::from_str::<Vec<Reading>>(&format!("[{}]", body)) {
        return Ok(ParsedLog {
            readings,
            valid_len: content.len(),
            missing_delimiter: !delimited,
            torn_tail: false,
        });
    }

    parse_records(content)
}

fn parse_records(content: &str) -> Result<ParsedLog, String> {
    let pieces: Vec<&str> = content.split(RECORD_DELIMITER).collect();
    let last = pieces.len() - 1;

    let mut readings = Vec::new();
    let mut offset = 0;
    let mut valid_len = 0;
    let mut missing_delimiter = false;
    let mut torn_tail = false;

    for (i, piece) in pieces.iter().enumerate() {
        let has_delimiter = i < last;
        let end = offset + piece.len() + if has_delimiter { RECORD_DELIMITER.len() } else { 0 };

        if piece.trim().is_empty() {
            if has_delimiter {
                valid_len = end;
            }
            offset = end;
            continue;
        }

        match serde_json::from_str::<Reading>(piece) {
            Ok(reading) => {
                readings.push(reading);
                valid_len = end;
                missing_delimiter = !has_delimiter;
            }
            Err(e) if !has_delimiter => {
                debug!(error = %e, bytes = piece.len(), "Dropping torn trailing record");
                torn_tail = true;
            }
            Err(e) => return Err(format!("record {} is malformed: {}", i + 1, e)),
        }
        offset = end;
    }

    Ok(ParsedLog {
        readings,
        valid_len,
        missing_delimiter,
        torn_tail,
    })
}

/// Change needed at the end of a log before another record is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TailFix {
    /// Ends on a record boundary
    Clean,
    /// The last record is complete but lacks its delimiter
    AddDelimiter,
    /// Bytes after the last boundary are not a record; cut back to this length
    Truncate(u64),
}

/// Inspect only what follows the last record boundary.
///
/// Records before the boundary are left alone, so a log with damage further
/// back still accepts appends.
pub(crate) fn inspect_tail(content: &[u8]) -> TailFix {
    let delimiter = RECORD_DELIMITER.as_bytes();
    let boundary = content
        .windows(delimiter.len())
        .rposition(|window| window == delimiter)
        .map(|i| i + delimiter.len())
        .unwrap_or(0);

    let tail = &content[boundary..];
    if tail.is_empty() {
        TailFix::Clean
    } else if serde_json::from_slice::<Reading>(tail).is_ok() {
        TailFix::AddDelimiter
    } else {
        TailFix::Truncate(boundary as u64)
    }
}

/// File-level access to one sensor's reading log.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    path: PathBuf,
}

impl ReadingLog {
    /// Create a handle for the log at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every complete record, oldest first.
    ///
    /// A torn tail is discarded and the file is cut back to the last complete
    /// record so that later appends stay parseable.
    pub async fn load(&self) -> Result<Vec<Reading>, StorageError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::corrupt(&self.path, e.to_string()))?;

        let parsed =
            parse_log(&content).map_err(|reason| StorageError::corrupt(&self.path, reason))?;

        if parsed.needs_repair(content.len()) {
            self.repair(&parsed).await?;
        }

        debug!(path = ?self.path, readings = parsed.readings.len(), "Loaded reading log");

        Ok(parsed.readings)
    }

    /// Count complete records without keeping them.
    pub async fn count(&self) -> Result<usize, StorageError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(0);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_log(&content)
            .map(|parsed| parsed.readings.len())
            .map_err(|reason| StorageError::corrupt(&self.path, reason))
    }

    async fn repair(&self, parsed: &ParsedLog) -> Result<(), StorageError> {
        let file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(parsed.valid_len as u64).await?;
        file.sync_all().await?;
        drop(file);

        if parsed.missing_delimiter {
            let mut file = OpenOptions::new().append(true).open(&self.path).await?;
            file.write_all(RECORD_DELIMITER.as_bytes()).await?;
            file.sync_all().await?;
        }

        warn!(
            path = ?self.path,
            kept_bytes = parsed.valid_len,
            torn_tail = parsed.torn_tail,
            "Repaired reading log tail"
        );

        Ok(())
    }
}
