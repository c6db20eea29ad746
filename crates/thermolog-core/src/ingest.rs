//! Ingestion of sensor messages into the store.
//!
//! The transport (an MQTT bridge in production) delivers raw topic/payload
//! pairs. Nothing here ever fails across the boundary: every message ends in
//! an [`IngestOutcome`] and the ingestion worker keeps running.

use crate::error::CoreError;
use crate::metrics::Metrics;
use crate::store::{QueuedWrites, SensorStore};
use std::sync::Arc;
use thermolog_storage::Reading;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Topic filter the transport subscribes to
pub const TOPIC_FILTER: &str = "temperature/+/reading";

/// A message received by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Reading stored in memory and on disk
    Recorded { sensor_id: String, created: bool },
    /// Payload failed validation; nothing changed
    Rejected { reason: String },
    /// Reading stored in memory but the disk write failed
    NotPersisted { sensor_id: String, reason: String },
    /// Topic outside the reading layout
    Ignored { topic: String },
}

impl IngestOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, IngestOutcome::Recorded { .. })
    }
}

/// Sensor id of a `temperature/{sensorId}/reading` topic.
pub fn sensor_id_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("temperature"), Some(id), Some("reading"), None) if !id.is_empty() => Some(id),
        _ => None,
    }
}

/// Extract a finite numeric `temperature` from a JSON payload.
pub fn parse_temperature(payload: &[u8]) -> Result<f64, CoreError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| CoreError::InvalidPayload(format!("not JSON: {}", e)))?;

    let temperature = value
        .get("temperature")
        .ok_or_else(|| CoreError::InvalidPayload("missing temperature".to_string()))?;

    match temperature.as_f64() {
        Some(t) if t.is_finite() => Ok(t),
        _ => Err(CoreError::InvalidPayload(format!(
            "temperature is not a finite number: {}",
            temperature
        ))),
    }
}

/// A reading held in memory whose disk writes may still be in flight.
pub struct Accepted {
    created: bool,
    writes: QueuedWrites,
    metrics: Arc<Metrics>,
}

impl Accepted {
    /// Wait for the disk writes and report the final outcome.
    pub async fn persisted(self) -> IngestOutcome {
        let sensor_id = self.writes.sensor_id().to_string();
        match self.writes.wait().await {
            Ok(()) => IngestOutcome::Recorded {
                sensor_id,
                created: self.created,
            },
            Err(e) => {
                self.metrics.record_write_failure();
                warn!(sensor = %sensor_id, error = %e, "Reading kept in memory only");
                IngestOutcome::NotPersisted {
                    sensor_id,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// First stage of ingesting a message.
pub enum Admission {
    /// In memory, persistence pending
    Accepted(Accepted),
    /// Nothing to persist; the outcome is final
    Done(IngestOutcome),
}

impl Admission {
    /// Drive the admission to its final outcome.
    pub async fn finish(self) -> IngestOutcome {
        match self {
            Admission::Accepted(accepted) => accepted.persisted().await,
            Admission::Done(outcome) => outcome,
        }
    }
}

/// Turns payloads into readings on the sensor store.
pub struct Ingestor {
    store: Arc<SensorStore>,
    metrics: Arc<Metrics>,
}

impl Ingestor {
    pub fn new(store: Arc<SensorStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Route a transport message by topic.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        self.admit_message(topic, payload).finish().await
    }

    /// Validate a reading payload and record it, stamped with the current time.
    pub async fn ingest(&self, sensor_id: &str, payload: &[u8]) -> IngestOutcome {
        self.admit(sensor_id, payload).finish().await
    }

    /// Route a transport message by topic without waiting for disk.
    pub fn admit_message(&self, topic: &str, payload: &[u8]) -> Admission {
        match sensor_id_from_topic(topic) {
            Some(sensor_id) => self.admit(sensor_id, payload),
            None => {
                info!(topic = %topic, "Ignoring message outside the reading topic");
                Admission::Done(IngestOutcome::Ignored {
                    topic: topic.to_string(),
                })
            }
        }
    }

    /// Validate a payload and record the reading in memory, queueing its
    /// disk writes.
    pub fn admit(&self, sensor_id: &str, payload: &[u8]) -> Admission {
        let temperature = match parse_temperature(payload) {
            Ok(t) => t,
            Err(e) => return Admission::Done(self.reject(sensor_id, e)),
        };

        match self
            .store
            .queue_reading(sensor_id, Reading::now(temperature))
        {
            Ok((outcome, writes)) => {
                self.metrics.record_ingested();
                debug!(sensor = %sensor_id, temperature, "Reading ingested");
                Admission::Accepted(Accepted {
                    created: outcome.created,
                    writes,
                    metrics: self.metrics.clone(),
                })
            }
            Err(e) => Admission::Done(self.reject(sensor_id, e)),
        }
    }

    fn reject(&self, sensor_id: &str, error: CoreError) -> IngestOutcome {
        self.metrics.record_rejected();
        warn!(sensor = %sensor_id, error = %error, "Dropping payload");
        IngestOutcome::Rejected {
            reason: error.to_string(),
        }
    }
}

/// Bounded queue between the transport and the ingestion worker.
pub fn channel(capacity: usize) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Drains inbound messages into the store.
///
/// Messages are admitted one at a time; their disk writes complete in the
/// background so a slow sensor never holds up the others.
pub struct IngestionWorker {
    ingestor: Arc<Ingestor>,
    rx: mpsc::Receiver<InboundMessage>,
    in_flight: JoinSet<IngestOutcome>,
}

impl IngestionWorker {
    pub fn new(ingestor: Arc<Ingestor>, rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            ingestor,
            rx,
            in_flight: JoinSet::new(),
        }
    }

    /// Run until the channel closes or shutdown is signalled.
    ///
    /// On shutdown the queue is closed to new messages, everything already
    /// queued is still admitted, and all pending writes are awaited.
    /// Returns the number of messages handled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        let mut handled = 0u64;

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(message) => {
                        self.admit(message);
                        handled += 1;
                    }
                    None => {
                        debug!("Inbound channel closed");
                        break;
                    }
                },
                Some(_) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {}
                _ = shutdown.recv() => {
                    debug!("Ingestion worker shutting down");
                    break;
                }
            }
        }

        self.rx.close();
        while let Some(message) = self.rx.recv().await {
            self.admit(message);
            handled += 1;
        }
        while self.in_flight.join_next().await.is_some() {}

        info!(handled, "Ingestion worker stopped");
        handled
    }

    fn admit(&mut self, message: InboundMessage) {
        if let Admission::Accepted(accepted) = self
            .ingestor
            .admit_message(&message.topic, &message.payload)
        {
            self.in_flight.spawn(accepted.persisted());
        }
    }
}
