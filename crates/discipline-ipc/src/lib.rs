//! IPC layer for disciplined
//!
//! Provides:
//! - Unix domain socket server
//! - NDJSON (newline-delimited JSON) protocol
//! - Peer UID based roles (admin vs. observer)
//! - Event fan-out to subscribed clients

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server not started")]
    NotStarted,

    #[error("Daemon returned an error: {0}")]
    Remote(String),
}

pub type IpcResult<T> = Result<T, IpcError>;
