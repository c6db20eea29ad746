//! Request handler for daemon IPC.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thermolog_core::{
    InboundMessage, Metrics, QueryEngine, SensorStore, SettingsService, ThermologConfig, TimeRange,
};
use thermolog_ipc::{ErrorCode, Request, RequestHandler, Response, ResponseData, SettingsResult};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc};

/// How long a publish may wait for room in the ingestion queue
const PUBLISH_TIMEOUT: Duration = Duration::from_millis(250);

/// Handles incoming IPC requests
pub struct DaemonHandler {
    store: Arc<SensorStore>,
    queries: QueryEngine,
    settings: SettingsService,
    metrics: Arc<Metrics>,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

impl DaemonHandler {
    pub fn new(
        store: Arc<SensorStore>,
        config: &ThermologConfig,
        metrics: Arc<Metrics>,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            queries: QueryEngine::from_config(store.clone(), config),
            settings: SettingsService::new(store.clone()),
            store,
            metrics,
            inbound,
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),

            Request::Status => Response::ok_with(ResponseData::Status {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.metrics.uptime_secs(),
                sensors: self.store.sensor_count(),
                readings_stored: self.store.reading_count(),
                readings_ingested: self.metrics.ingested(),
                payloads_rejected: self.metrics.rejected(),
                requests_total: self.metrics.requests_total.load(Ordering::Relaxed),
                avg_latency_ms: self.metrics.avg_latency().as_millis() as u64,
            }),

            Request::Publish { topic, payload } => self.publish(topic, payload).await,

            Request::Chart { range, max_points } => {
                let chart = self.queries.chart(TimeRange::parse(&range), max_points);
                Response::ok_with(ResponseData::Chart { chart })
            }

            Request::SensorChart {
                id,
                range,
                max_points,
            } => match self
                .queries
                .sensor_series(&id, TimeRange::parse(&range), max_points)
            {
                Some(dataset) => Response::ok_with(ResponseData::Series { dataset }),
                None => Response::error(
                    ErrorCode::UnknownSensor,
                    format!("Unknown sensor: {}", id),
                ),
            },

            Request::CurrentTemperatures => Response::ok_with(ResponseData::CurrentTemperatures {
                sensors: self.queries.current_temperatures(),
            }),

            Request::ListSettings => Response::ok_with(ResponseData::Settings {
                sensors: self.settings.list(),
            }),

            Request::UpdateSettings { updates } => {
                if updates.is_empty() {
                    return Response::error(ErrorCode::InvalidRequest, "No settings to update");
                }
                let results = self
                    .settings
                    .apply(updates)
                    .await
                    .into_iter()
                    .map(SettingsResult::from)
                    .collect();
                Response::ok_with(ResponseData::SettingsApplied { results })
            }

            Request::Shutdown => {
                tracing::info!("Shutdown requested");
                self.shutting_down.store(true, Ordering::SeqCst);
                let _ = self.shutdown_tx.send(());
                Response::ok()
            }
        }
    }

    /// Queue a transport message for the ingestion worker.
    async fn publish(&self, topic: String, payload: Vec<u8>) -> Response {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Response::error(ErrorCode::ShuttingDown, "Daemon is shutting down");
        }

        let message = InboundMessage { topic, payload };
        match self.inbound.send_timeout(message, PUBLISH_TIMEOUT).await {
            Ok(()) => Response::ack(),
            Err(SendTimeoutError::Timeout(message)) => {
                tracing::warn!(topic = %message.topic, "Ingestion queue full, dropping message");
                Response::error(ErrorCode::Timeout, "Ingestion queue is full")
            }
            Err(SendTimeoutError::Closed(_)) => {
                Response::error(ErrorCode::ShuttingDown, "Ingestion has stopped")
            }
        }
    }
}

#[async_trait]
impl RequestHandler for DaemonHandler {
    async fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        let response = self.dispatch(request).await;
        self.metrics.record_request(started.elapsed());
        response
    }
}
