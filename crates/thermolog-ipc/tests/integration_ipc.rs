//! Integration tests for Thermolog IPC communication.
//!
//! These tests verify end-to-end communication between client and server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, RwLock};

use async_trait::async_trait;
use tempfile::tempdir;
use thermolog_ipc::{
    ErrorCode, IpcClient, IpcServer, Request, RequestHandler, Response, ResponseData,
    SensorSettings, Settings, SettingsResult,
};

/// Test handler that keeps settings in-process, like a tiny daemon
struct SettingsHandler {
    sensors: RwLock<BTreeMap<String, Settings>>,
    published: RwLock<Vec<String>>,
}

impl SettingsHandler {
    fn with_sensors(ids: &[&str]) -> Self {
        let sensors = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), Settings::new("New sensor", "#000000", i as u32)))
            .collect();
        Self {
            sensors: RwLock::new(sensors),
            published: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RequestHandler for SettingsHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong { timestamp: 0 }),
            Request::Publish { topic, .. } => {
                self.published.write().await.push(topic);
                Response::ack()
            }
            Request::ListSettings => {
                let sensors = self
                    .sensors
                    .read()
                    .await
                    .iter()
                    .map(|(id, settings)| SensorSettings::new(id.clone(), settings.clone()))
                    .collect();
                Response::ok_with(ResponseData::Settings { sensors })
            }
            Request::UpdateSettings { updates } => {
                let mut sensors = self.sensors.write().await;
                let results = updates
                    .into_iter()
                    .map(|(id, settings)| match sensors.get_mut(&id) {
                        Some(current) => {
                            *current = settings;
                            SettingsResult::applied(id)
                        }
                        None => {
                            let message = format!("Unknown sensor: {}", id);
                            SettingsResult::failed(id, ErrorCode::UnknownSensor, message)
                        }
                    })
                    .collect();
                Response::ok_with(ResponseData::SettingsApplied { results })
            }
            _ => Response::error(ErrorCode::InvalidRequest, "unsupported"),
        }
    }
}

async fn start(handler: Arc<SettingsHandler>, name: &str) -> (tempfile::TempDir, IpcClient) {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join(name);

    let server = IpcServer::new(&socket_path, handler).await.unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = IpcClient::with_socket_path(&socket_path);
    (temp_dir, client)
}

#[tokio::test]
async fn test_settings_batch_over_socket() {
    let handler = Arc::new(SettingsHandler::with_sensors(&["s1", "s2"]));
    let (_temp_dir, client) = start(handler.clone(), "settings.sock").await;

    let mut updates = BTreeMap::new();
    updates.insert("s1".to_string(), Settings::new("Kitchen", "#ff0000", 1));
    updates.insert("s2".to_string(), Settings::new("Garage", "#00ff00", 0));
    updates.insert("ghost".to_string(), Settings::new("Nobody", "#0000ff", 2));

    let results = client.update_settings(updates).await.unwrap();
    assert_eq!(results.len(), 3);
    let ghost = results.iter().find(|r| r.id == "ghost").unwrap();
    assert!(!ghost.ok);
    assert_eq!(ghost.code, Some(ErrorCode::UnknownSensor));
    assert!(results.iter().filter(|r| r.id != "ghost").all(|r| r.ok));

    let listed = client.list_settings().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "Kitchen");
    assert_eq!(listed[1].name, "Garage");
}

#[tokio::test]
async fn test_concurrent_publishers() {
    let handler = Arc::new(SettingsHandler::with_sensors(&[]));
    let (_temp_dir, client) = start(handler.clone(), "publish.sock").await;
    let socket_path = client.socket_path().to_path_buf();

    // Spawn 10 concurrent publishers
    let barrier = Arc::new(Barrier::new(10));
    let mut handles = Vec::new();

    for i in 0..10 {
        let path = socket_path.clone();
        let barrier = barrier.clone();

        handles.push(tokio::spawn(async move {
            // Wait for all clients to be ready
            barrier.wait().await;

            let client = IpcClient::with_socket_path(&path);
            client
                .publish_reading(&format!("sensor-{}", i), 20.0 + i as f64)
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 10, "All 10 concurrent publishers should succeed");
    assert_eq!(handler.published.read().await.len(), 10);
}

#[tokio::test]
async fn test_unsupported_request_is_rejected() {
    let handler = Arc::new(SettingsHandler::with_sensors(&[]));
    let (_temp_dir, client) = start(handler, "reject.sock").await;

    let response = client.request(Request::CurrentTemperatures).await.unwrap();
    assert!(matches!(
        response,
        Response::Error {
            code: ErrorCode::InvalidRequest,
            ..
        }
    ));
}
