use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum RetryError {
    /// Every attempt failed. `errors` holds one entry per attempt, in order.
    #[error("Retry Exhausted Error: failed after {attempts} attempts, last error: {} {location}", last_error(.errors))]
    Exhausted {
        attempts: u32,
        errors: Vec<String>,
        last_code: String,
        location: ErrorLocation,
    },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            RetryError::Exhausted { errors, .. } => errors,
        }
    }

    pub fn last_code(&self) -> &str {
        match self {
            RetryError::Exhausted { last_code, .. } => last_code,
        }
    }
}

fn last_error(errors: &[String]) -> &str {
    errors.last().map(String::as_str).unwrap_or("Unknown error")
}
