use crate::error::bridge::BridgeError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error("Generation Error: {message} {location}")]
    Generation {
        message: String,
        location: ErrorLocation,
    },

    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
