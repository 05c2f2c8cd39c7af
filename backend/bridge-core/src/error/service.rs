use crate::error::bridge::BridgeError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ServiceError {
    #[error("Runtime Error: {message} {location}")]
    Runtime {
        message: String,
        location: ErrorLocation,
    },

    #[error("Server Start Error: {message} {location}")]
    ServerStart {
        message: String,
        location: ErrorLocation,
        #[source]
        source: BridgeError,
    },
}
