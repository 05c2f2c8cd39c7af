use crate::error::protocol::ProtocolError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io::Error as IoError;
use std::panic::Location;
use std::time::Duration;

use thiserror::Error as ThisError;

/// Which half of an exchange ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOperation {
    Connect,
    Receive,
}

impl TimeoutOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutOperation::Connect => "connect",
            TimeoutOperation::Receive => "receive",
        }
    }
}

impl Display for TimeoutOperation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}

/// Errors surfaced to callers of the bridge transport and client.
///
/// Connection variants mean the caller may reconnect. `Framing` means the
/// connection is unusable and must be discarded. `Execution` is the expected
/// trigger for the retry/fix loop.
#[derive(Debug, ThisError)]
pub enum BridgeError {
    #[error("Connection Refused Error: {host}:{port}: {message} {location}")]
    ConnectionRefused {
        host: String,
        port: u16,
        message: String,
        location: ErrorLocation,
    },

    #[error("Connection Timeout Error: operation '{operation}' timed out after {timeout:?} {location}")]
    ConnectionTimeout {
        operation: TimeoutOperation,
        timeout: Duration,
        location: ErrorLocation,
    },

    #[error("Connection Closed Error: {reason} {location}")]
    ConnectionClosed {
        reason: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Execution Error: {message} {location}")]
    Execution {
        message: String,
        traceback: Option<String>,
        stdout: String,
        stderr: String,
        location: ErrorLocation,
    },

    #[error("Message Framing Error: expected {expected} bytes, got {actual} bytes {location}")]
    Framing {
        expected: usize,
        actual: usize,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl BridgeError {
    /// True for the transport-level failures after which a reconnect may help.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionRefused { .. }
                | BridgeError::ConnectionTimeout { .. }
                | BridgeError::ConnectionClosed { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::ConnectionTimeout { .. })
    }
}

impl From<IoError> for BridgeError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        BridgeError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
