use crate::error::ProtocolError;
use crate::protocol::{
    DEFAULT_TIMEOUT_MS, JSONRPC_VERSION, JsonMap, UNKNOWN_ID, check_version, parse_object,
    required_str,
};

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// The closed set of operations the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ping,
    ExecuteCode,
    QueryScene,
    GetObjects,
    Shutdown,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Ping,
        Method::ExecuteCode,
        Method::QueryScene,
        Method::GetObjects,
        Method::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Ping => "ping",
            Method::ExecuteCode => "execute_code",
            Method::QueryScene => "query_scene",
            Method::GetObjects => "get_objects",
            Method::Shutdown => "shutdown",
        }
    }
}

impl Display for Method {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    #[track_caller]
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == name)
            .ok_or_else(|| ProtocolError::UnknownMethod {
                method: name.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

/// Method-specific parameters. Fields a method does not use stay at their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub code: Option<String>,

    /// Execution timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,

    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub extra: JsonMap,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            code: None,
            timeout: DEFAULT_TIMEOUT_MS,
            query: None,
            extra: JsonMap::new(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// A single call from the client. The `id` is generated by the caller and
/// echoed back in exactly one [`Response`](crate::protocol::Response).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: Method,
    pub params: RequestParams,
}

impl Request {
    pub fn new(method: Method, params: RequestParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }

    pub fn ping() -> Self {
        debug!("Creating ping request");
        Self::new(Method::Ping, RequestParams::default())
    }

    pub fn execute(code: impl Into<String>, timeout_ms: u64) -> Self {
        let code = code.into();
        debug!(
            "Creating execute request: code_length={}, timeout_ms={timeout_ms}",
            code.len()
        );
        Self::new(
            Method::ExecuteCode,
            RequestParams {
                code: Some(code),
                timeout: timeout_ms,
                ..RequestParams::default()
            },
        )
    }

    pub fn query(query: impl Into<String>) -> Self {
        let query = query.into();
        debug!("Creating query request: {query}");
        Self::new(
            Method::QueryScene,
            RequestParams {
                query: Some(query),
                ..RequestParams::default()
            },
        )
    }

    pub fn get_objects() -> Self {
        Self::new(Method::GetObjects, RequestParams::default())
    }

    pub fn shutdown() -> Self {
        Self::new(Method::Shutdown, RequestParams::default())
    }

    /// Execution timeout requested by the caller.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.params.timeout)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": self.id,
            "method": self.method.as_str(),
            "params": self.params,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        debug!("Serializing request {} ({})", self.id, self.method);
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    /// Decodes and validates a request.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidVersion`] if `jsonrpc` is not `"2.0"`
    /// - [`ProtocolError::MissingField`] if `jsonrpc`, `id` or `method` is absent
    /// - [`ProtocolError::UnknownMethod`] for a method outside [`Method::ALL`]
    /// - [`ProtocolError::InvalidMessage`] for anything that is not a
    ///   well-typed JSON object
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let object = parse_object(bytes)?;
        check_version(&object)?;

        let id = required_str(&object, "id")?.to_string();
        let method = required_str(&object, "method")?.parse::<Method>()?;

        let params = match object.get("params") {
            None | Some(Value::Null) => RequestParams::default(),
            Some(value) => RequestParams::deserialize(value)?,
        };

        debug!("Parsed request {id} ({method})");
        Ok(Self { id, method, params })
    }
}

/// Best-effort id lookup for a request that failed validation, so the
/// error response can still be correlated by the caller.
pub fn peek_request_id(bytes: &[u8]) -> String {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|value| value.get("id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_ID.to_string())
}
