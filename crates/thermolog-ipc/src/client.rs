//! IPC client for communicating with the Thermolog daemon.

use crate::server::{read_frame_bytes, write_frame};
use crate::{
    ChartData, CurrentTemperature, Dataset, IpcError, Request, Response, ResponseData,
    SensorSettings, Settings, SettingsResult,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// Default socket path
const DEFAULT_SOCKET_PATH: &str = "/tmp/thermolog.sock";

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Request/response timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// IPC client for communicating with the daemon
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a client with default socket path
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    /// Create a client with custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Connect to the daemon and return a connected client
    pub async fn connect() -> Result<ConnectedClient, IpcError> {
        Self::new().do_connect().await
    }

    /// Connect with custom socket path
    pub async fn connect_to<P: AsRef<Path>>(socket_path: P) -> Result<ConnectedClient, IpcError> {
        Self::with_socket_path(socket_path).do_connect().await
    }

    async fn do_connect(&self) -> Result<ConnectedClient, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Connection timed out".to_string()))??;

        Ok(ConnectedClient { stream })
    }

    /// Send a fire-and-forget request (don't wait for response)
    pub async fn send_async(&self, request: &Request) -> Result<(), IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let mut stream = UnixStream::connect(&self.socket_path).await?;
        write_frame(&mut stream, request).await?;
        stream.shutdown().await?;

        Ok(())
    }

    /// Check if daemon is running
    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists()
    }

    /// Socket this client talks to
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected IPC client that can send requests and receive responses
pub struct ConnectedClient {
    stream: UnixStream,
}

impl ConnectedClient {
    /// Send a request and wait for response
    pub async fn send(&mut self, request: Request) -> Result<Response, IpcError> {
        tokio::time::timeout(REQUEST_TIMEOUT, self.do_send(request))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Request timed out".to_string()))?
    }

    async fn do_send(&mut self, request: Request) -> Result<Response, IpcError> {
        write_frame(&mut self.stream, &request).await?;
        let body = read_frame_bytes(&mut self.stream).await?;
        let response: Response = rmp_serde::from_slice(&body)?;
        Ok(response)
    }
}

/// Convenience functions for one-off requests
impl IpcClient {
    /// Send a request and wait for response (opens new connection)
    pub async fn request(&self, request: Request) -> Result<Response, IpcError> {
        let mut client = self.do_connect().await?;
        client.send(request).await
    }

    /// Send a request and unwrap the data of a successful response
    async fn request_data(&self, request: Request) -> Result<ResponseData, IpcError> {
        match self.request(request).await? {
            Response::Ok { data: Some(data) } => Ok(data),
            Response::Error { code, message } => Err(IpcError::Rejected { code, message }),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Get daemon status
    pub async fn get_status(&self) -> Result<ResponseData, IpcError> {
        match self.request_data(Request::Status).await? {
            status @ ResponseData::Status { .. } => Ok(status),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Publish one reading in the sensor topic layout and wait for the ack
    pub async fn publish_reading(&self, sensor_id: &str, temperature: f64) -> Result<(), IpcError> {
        match self.request(Request::reading(sensor_id, temperature)).await? {
            Response::Ack | Response::Ok { .. } => Ok(()),
            Response::Error { code, message } => Err(IpcError::Rejected { code, message }),
        }
    }

    /// Fetch the chart of every sensor
    pub async fn chart(
        &self,
        range: &str,
        max_points: Option<usize>,
    ) -> Result<ChartData, IpcError> {
        let request = Request::Chart {
            range: range.to_string(),
            max_points,
        };
        match self.request_data(request).await? {
            ResponseData::Chart { chart } => Ok(chart),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Fetch the series of one sensor
    pub async fn sensor_chart(
        &self,
        id: &str,
        range: &str,
        max_points: Option<usize>,
    ) -> Result<Dataset, IpcError> {
        let request = Request::SensorChart {
            id: id.to_string(),
            range: range.to_string(),
            max_points,
        };
        match self.request_data(request).await? {
            ResponseData::Series { dataset } => Ok(dataset),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Fetch the latest reading of every sensor
    pub async fn current_temperatures(&self) -> Result<Vec<CurrentTemperature>, IpcError> {
        match self.request_data(Request::CurrentTemperatures).await? {
            ResponseData::CurrentTemperatures { sensors } => Ok(sensors),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Fetch the settings of every sensor
    pub async fn list_settings(&self) -> Result<Vec<SensorSettings>, IpcError> {
        match self.request_data(Request::ListSettings).await? {
            ResponseData::Settings { sensors } => Ok(sensors),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Apply a batch of settings edits
    pub async fn update_settings(
        &self,
        updates: BTreeMap<String, Settings>,
    ) -> Result<Vec<SettingsResult>, IpcError> {
        match self.request_data(Request::UpdateSettings { updates }).await? {
            ResponseData::SettingsApplied { results } => Ok(results),
            other => Err(IpcError::UnexpectedResponse(format!("{:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChartOptions, ErrorCode, IpcServer, RequestHandler};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct TestHandler;

    #[async_trait]
    impl RequestHandler for TestHandler {
        async fn handle(&self, request: Request) -> Response {
            match request {
                Request::Ping => Response::ok_with(ResponseData::Pong { timestamp: 0 }),
                Request::Status => Response::ok_with(ResponseData::Status {
                    version: "test".to_string(),
                    uptime_secs: 0,
                    sensors: 0,
                    readings_stored: 0,
                    readings_ingested: 0,
                    payloads_rejected: 0,
                    requests_total: 0,
                    avg_latency_ms: 0,
                }),
                Request::Chart { .. } => Response::ok_with(ResponseData::Chart {
                    chart: ChartData::line(Vec::new(), ChartOptions::default()),
                }),
                Request::SensorChart { id, .. } => Response::error(
                    ErrorCode::UnknownSensor,
                    format!("Unknown sensor: {}", id),
                ),
                _ => Response::ack(),
            }
        }
    }

    async fn start_server(socket_path: &Path) {
        let handler = Arc::new(TestHandler);
        let server = IpcServer::new(socket_path, handler).await.unwrap();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_client_connect_no_daemon() {
        let client = IpcClient::with_socket_path("/tmp/nonexistent_thermolog_12345.sock");
        let result = client.do_connect().await;
        assert!(matches!(result, Err(IpcError::DaemonNotRunning)));
    }

    #[tokio::test]
    async fn test_client_default() {
        let client = IpcClient::default();
        assert_eq!(client.socket_path(), Path::new(DEFAULT_SOCKET_PATH));
    }

    #[tokio::test]
    async fn test_client_connect_and_ping() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let client = IpcClient::with_socket_path(&socket_path);
        let response = client.request(Request::Ping).await.unwrap();

        assert!(matches!(
            response,
            Response::Ok {
                data: Some(ResponseData::Pong { .. })
            }
        ));
    }

    #[tokio::test]
    async fn test_client_get_status() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let client = IpcClient::with_socket_path(&socket_path);
        let status = client.get_status().await.unwrap();

        assert!(matches!(status, ResponseData::Status { .. }));
    }

    #[tokio::test]
    async fn test_client_chart_and_rejection() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let client = IpcClient::with_socket_path(&socket_path);
        let chart = client.chart("hour", Some(60)).await.unwrap();
        assert_eq!(chart.chart_type, "line");

        let result = client.sensor_chart("ghost", "hour", None).await;
        assert!(matches!(
            result,
            Err(IpcError::Rejected {
                code: ErrorCode::UnknownSensor,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_client_publish_reading() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        start_server(&socket_path).await;

        let client = IpcClient::with_socket_path(&socket_path);
        assert!(client.publish_reading("s1", 21.5).await.is_ok());
        assert!(client.send_async(&Request::reading("s1", 22.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_client_send_async_no_daemon() {
        let client = IpcClient::with_socket_path("/tmp/nonexistent_thermolog_12345.sock");
        let result = client.send_async(&Request::Ping).await;
        assert!(matches!(result, Err(IpcError::DaemonNotRunning)));
    }
}
