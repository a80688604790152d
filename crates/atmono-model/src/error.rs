//! Error types for the command channel.
//!
//! Outcomes the controller reports (`#OUR`, `#BUSY`, ...) are not errors;
//! they come back as [`atmono_protocol::Reply`] values. Everything here means
//! the conversation itself failed.

use std::time::Duration;

use atmono_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur when talking to the controller.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on an open channel.
    #[error("already connected")]
    AlreadyConnected,

    /// Opening the TCP connection failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Opening the TCP connection did not finish in time.
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// I/O error on an open connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived before the deadline.
    #[error("no reply to {request:?} within {timeout:?}")]
    Timeout { request: String, timeout: Duration },

    /// The connection was closed while a request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The reply could not be decoded or did not match the request.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The controller did not report READY in time.
    #[error("waiting for {label} timed out after {timeout:?}")]
    WaitTimeout { label: String, timeout: Duration },

    /// The controller reported FAULT while waiting.
    #[error("controller in FAULT state while waiting for {label}")]
    DeviceFault { label: String },

    /// The controller reported OFFLINE while waiting.
    #[error("controller OFFLINE while waiting for {label}")]
    DeviceOffline { label: String },

    /// The YAML configuration could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    /// Whether the error means the link to the controller is gone or
    /// unusable, as opposed to a bad reply on a healthy link.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ModelError::NotConnected
                | ModelError::Connect { .. }
                | ModelError::ConnectTimeout { .. }
                | ModelError::Io(_)
                | ModelError::Timeout { .. }
                | ModelError::ConnectionClosed
        )
    }
}

/// Result type alias for command channel operations.
pub type ModelResult<T> = Result<T, ModelError>;
