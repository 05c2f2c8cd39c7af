use crate::error::ProtocolError;
use crate::protocol::{JSONRPC_VERSION, JsonMap, check_version, parse_object, required_str};

use common::ErrorLocation;

use std::panic::Location;

use log::debug;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
        }
    }

    #[track_caller]
    fn parse(status: &str) -> Result<Self, ProtocolError> {
        match status {
            "success" => Ok(ResponseStatus::Success),
            "error" => Ok(ResponseStatus::Error),
            other => Err(ProtocolError::InvalidStatus {
                status: other.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseResult {
    pub status: ResponseStatus,
    pub data: JsonMap,
    /// Captured stdout of the operation.
    pub logs: String,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(id: impl Into<String>, data: JsonMap, logs: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: ResponseResult {
                status: ResponseStatus::Success,
                data,
                logs: logs.into(),
                error: None,
                traceback: None,
            },
        }
    }

    pub fn error(
        id: impl Into<String>,
        error: impl Into<String>,
        traceback: Option<String>,
        logs: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            result: ResponseResult {
                status: ResponseStatus::Error,
                data: JsonMap::new(),
                logs: logs.into(),
                error: Some(error.into()),
                traceback,
            },
        }
    }

    /// Adds one entry to `data`, replacing any previous value for `key`.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.result.data.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result.status == ResponseStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.result.status == ResponseStatus::Error
    }

    pub fn to_value(&self) -> Value {
        let mut result = JsonMap::new();
        result.insert("status".into(), json!(self.result.status.as_str()));
        result.insert("data".into(), Value::Object(self.result.data.clone()));
        result.insert("logs".into(), json!(self.result.logs));
        if let Some(error) = &self.result.error {
            result.insert("error".into(), json!(error));
        }
        if let Some(traceback) = &self.result.traceback {
            result.insert("traceback".into(), json!(traceback));
        }

        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": self.id,
            "result": result,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        debug!(
            "Serializing response {} ({})",
            self.id,
            self.result.status.as_str()
        );
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    /// Decodes and validates a response.
    ///
    /// A missing `status` is read as `error`; any other value outside
    /// `success`/`error` is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let object = parse_object(bytes)?;
        check_version(&object)?;

        let id = required_str(&object, "id")?.to_string();
        let result = match object.get("result") {
            Some(Value::Object(result)) => result,
            Some(_) => {
                return Err(ProtocolError::InvalidMessage {
                    message: "Field 'result' must be an object".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            None => {
                return Err(ProtocolError::MissingField {
                    field: "result",
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let status = match result.get("status") {
            None => ResponseStatus::Error,
            Some(Value::String(status)) => ResponseStatus::parse(status)?,
            Some(other) => {
                return Err(ProtocolError::InvalidStatus {
                    status: other.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let data = match result.get("data") {
            None | Some(Value::Null) => JsonMap::new(),
            Some(Value::Object(data)) => data.clone(),
            Some(_) => {
                return Err(ProtocolError::InvalidMessage {
                    message: "Field 'result.data' must be an object".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        debug!("Parsed response {id} ({})", status.as_str());
        Ok(Self {
            id,
            result: ResponseResult {
                status,
                data,
                logs: optional_str(result, "logs")?.unwrap_or_default(),
                error: optional_str(result, "error")?,
                traceback: optional_str(result, "traceback")?,
            },
        })
    }
}

#[track_caller]
fn optional_str(object: &JsonMap, field: &'static str) -> Result<Option<String>, ProtocolError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(ProtocolError::InvalidMessage {
            message: format!("Field 'result.{field}' must be a string, got {other}"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}
