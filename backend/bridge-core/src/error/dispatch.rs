use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Failure of a single dispatch handler; the pump turns it into an error
/// response for that message only.
#[derive(Debug, ThisError)]
pub enum HandlerError {
    #[error("Missing Parameter Error: {param} {location}")]
    MissingParam {
        param: &'static str,
        location: ErrorLocation,
    },

    #[error("Host Error: {message} {location}")]
    Host {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handler Panic Error: {message} {location}")]
    Panicked {
        message: String,
        location: ErrorLocation,
    },
}

impl HandlerError {
    /// Text placed in the `error` field of the response.
    pub fn response_message(&self) -> String {
        match self {
            HandlerError::MissingParam { param, .. } => match *param {
                "code" => "No code provided".to_string(),
                other => format!("Missing parameter: {other}"),
            },
            HandlerError::Host { message, .. } => message.clone(),
            HandlerError::Panicked { message, .. } => format!("Handler panicked: {message}"),
        }
    }
}
