use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// A message that does not follow the bridge's JSON-RPC schema.
///
/// Always a bug or a desynchronized stream on one side; the bridge never
/// retries these on its own.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
    #[error("Invalid Version Error: expected jsonrpc {expected}, got {found} {location}")]
    InvalidVersion {
        expected: &'static str,
        found: String,
        location: ErrorLocation,
    },

    #[error("Missing Field Error: {field} {location}")]
    MissingField {
        field: &'static str,
        location: ErrorLocation,
    },

    #[error("Unknown Method Error: {method} {location}")]
    UnknownMethod {
        method: String,
        location: ErrorLocation,
    },

    #[error("Invalid Status Error: {status} {location}")]
    InvalidStatus {
        status: String,
        location: ErrorLocation,
    },

    #[error("Invalid Message Error: {message} {location}")]
    InvalidMessage {
        message: String,
        location: ErrorLocation,
    },

    #[error("Message Too Large Error: {size} bytes (max {max}) {location}")]
    MessageTooLarge {
        size: usize,
        max: usize,
        location: ErrorLocation,
    },

    #[error("Response Id Mismatch Error: expected {expected}, got {actual} {location}")]
    IdMismatch {
        expected: String,
        actual: String,
        location: ErrorLocation,
    },
}

impl From<serde_json::Error> for ProtocolError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        ProtocolError::InvalidMessage {
            message: format!("Invalid JSON: {error}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
