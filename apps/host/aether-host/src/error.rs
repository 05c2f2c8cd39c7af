use bridge_core::error::{ConfigError, ServiceError};

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error;

/// Errors that stop the standalone host from starting.
#[derive(Debug, Error)]
pub enum HostError {
    /// Logging could not be set up
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    /// Configuration could not be loaded
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// The bridge service failed to come up
    #[error("Service Error: {message} {location}")]
    Service {
        message: String,
        location: ErrorLocation,
    },
}

impl From<ConfigError> for HostError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        HostError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ServiceError> for HostError {
    #[track_caller]
    fn from(error: ServiceError) -> Self {
        HostError::Service {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
