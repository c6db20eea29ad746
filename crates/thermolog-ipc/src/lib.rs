//! Thermolog IPC Protocol and Client/Server
//!
//! This crate provides the IPC protocol definitions and Unix socket
//! client/server implementations used by the web front-end, the MQTT bridge
//! and the CLI to talk to the Thermolog daemon.

mod chart;
mod client;
mod error;
mod protocol;
mod server;

pub use chart::*;
pub use client::IpcClient;
pub use error::IpcError;
pub use protocol::*;
pub use server::{IpcServer, RequestHandler};
pub use thermolog_storage::Settings;
