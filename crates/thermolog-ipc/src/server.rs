//! Unix socket IPC server for the Thermolog daemon.
//!
//! Frames are a 4-byte little-endian length followed by a MessagePack body.
//! Requests may also be sent as JSON bodies, which keeps `socat` debugging
//! sessions simple.

use crate::{ErrorCode, IpcError, Request, Response};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum frame size (4MB); full-history charts are the largest payloads
pub(crate) const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Request timeout for reading from socket
const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    handler: Arc<dyn RequestHandler>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path
    pub async fn new<P: AsRef<Path>>(
        socket_path: P,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, IpcError> {
        let socket_path = socket_path.as_ref();

        // Remove stale socket file if it exists
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        // Set socket permissions (user only - 0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("IPC server listening on {}", socket_path.display());

        Ok(Self { listener, handler })
    }

    /// Run the server, accepting connections until shutdown
    pub async fn run(&self) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            tracing::debug!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Handle a single connection
    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), IpcError> {
        let request = tokio::time::timeout(REQUEST_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(IpcError::Timeout)?;

        let request = match request {
            Ok(req) => req,
            Err(e) => {
                let response = Response::error(
                    ErrorCode::InvalidRequest,
                    format!("Failed to parse request: {}", e),
                );
                write_frame(&mut stream, &response).await?;
                return Err(e);
            }
        };

        tracing::debug!("Received request: {:?}", request);

        let response = handler.handle(request).await;

        write_frame(&mut stream, &response).await?;

        Ok(())
    }

    /// Read a request from the stream
    async fn read_request(stream: &mut UnixStream) -> Result<Request, IpcError> {
        let buf = read_frame_bytes(stream).await?;

        // Try MessagePack first, fall back to JSON for easier debugging
        match rmp_serde::from_slice(&buf) {
            Ok(request) => Ok(request),
            Err(msgpack_err) => {
                serde_json::from_slice(&buf).map_err(|_| IpcError::Deserialize(msgpack_err))
            }
        }
    }
}

/// Read one length-prefixed frame body.
pub(crate) async fn read_frame_bytes<R>(reader: &mut R) -> Result<Vec<u8>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge);
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Serialize a message and write it as one length-prefixed frame.
pub(crate) async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let bytes = rmp_serde::to_vec(message)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge);
    }
    let len_bytes = (bytes.len() as u32).to_le_bytes();

    writer.write_all(&len_bytes).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Trait for handling incoming requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    async fn handle(&self, request: Request) -> Response;
}
