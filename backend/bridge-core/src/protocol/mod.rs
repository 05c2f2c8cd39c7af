//! JSON-RPC 2.0 message schema spoken between the external client and the host.
//!
//! Requests and responses are plain values: immutable once built, encoded
//! with [`Request::to_bytes`] / [`Response::to_bytes`] and validated on the
//! way in by `from_bytes`, which reports every schema violation as a
//! [`ProtocolError`](crate::error::ProtocolError) instead of panicking.
//!
//! # Wire shape
//!
//! ```text
//! {"jsonrpc":"2.0","id":"…","method":"execute_code","params":{"code":"…","timeout":5000}}
//! {"jsonrpc":"2.0","id":"…","result":{"status":"success","data":{},"logs":"…"}}
//! ```

mod request;
mod response;

pub use request::{Method, Request, RequestParams, peek_request_id};
pub use response::{Response, ResponseResult, ResponseStatus};

use crate::error::ProtocolError;

use common::ErrorLocation;

use std::panic::Location;

use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Opaque JSON object carried in `data`, `params.extra` and scene queries.
pub type JsonMap = Map<String, Value>;

const UNKNOWN_ID: &str = "unknown";

/// Parses raw bytes into a JSON object, the first step of every decode.
#[track_caller]
fn parse_object(bytes: &[u8]) -> Result<JsonMap, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidMessage {
        message: format!("Message is not valid UTF-8: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Ok(object),
        other => Err(ProtocolError::InvalidMessage {
            message: format!("Expected a JSON object, got {}", json_kind(&other)),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

#[track_caller]
fn check_version(object: &JsonMap) -> Result<(), ProtocolError> {
    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => Ok(()),
        Some(other) => Err(ProtocolError::InvalidVersion {
            expected: JSONRPC_VERSION,
            found: other.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
        None => Err(ProtocolError::MissingField {
            field: "jsonrpc",
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

#[track_caller]
fn required_str<'a>(object: &'a JsonMap, field: &'static str) -> Result<&'a str, ProtocolError> {
    match object.get(field) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ProtocolError::InvalidMessage {
            message: format!("Field '{field}' must be a string, got {}", json_kind(other)),
            location: ErrorLocation::from(Location::caller()),
        }),
        None => Err(ProtocolError::MissingField {
            field,
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
