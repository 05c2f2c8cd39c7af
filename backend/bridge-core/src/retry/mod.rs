//! Bounded retries with exponential backoff and an optional fixer.
//!
//! Every attempt reports an explicit [`Outcome`].
//! Between failed attempts the manager sleeps for
//! [`RetryConfig::get_delay`] and, when a fixer is supplied, asks it for
//! replacement code. A fixer failure is logged and the unmodified code is
//! retried.

use crate::error::RetryError;

use common::ErrorLocation;

use std::future::{Future, Ready};
use std::panic::Location;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::Rng;
use tokio::time::sleep as TokioSleep;

/// Upper bound of the random jitter, as a fraction of the computed delay.
const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed `attempt` (1-based).
    ///
    /// `min(max_delay, initial_delay * base^(attempt - 1))`, plus up to 25%
    /// uniform jitter when enabled.
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };

        let delay = if self.jitter {
            capped + capped * JITTER_FRACTION * rand::thread_rng().gen_range(0.0..1.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Result of one attempt, as judged by the attempt itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl<T, E: ToString> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Failure(e.to_string()),
        }
    }
}

/// A successful retry session.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySuccess<T> {
    pub value: T,
    /// Attempts used, `1` meaning first-try success.
    pub attempts: u32,
    /// The code that finally succeeded.
    pub code: String,
}

type NoFix = fn(String, String) -> Ready<Result<String, String>>;

#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        debug!(
            "RetryManager initialized: max_attempts={}, initial_delay={:?}",
            config.max_attempts, config.initial_delay
        );
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `execute` up to `max_attempts` times on the same code.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        code: &str,
        execute: F,
    ) -> Result<RetrySuccess<T>, RetryError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(code, execute, None::<NoFix>).await
    }

    /// Runs `execute` up to `max_attempts` times, calling
    /// `fix(code, error)` between failures for the next attempt's code.
    pub async fn execute_with_fixes<T, F, Fut, X, XFut>(
        &self,
        code: &str,
        execute: F,
        fix: X,
    ) -> Result<RetrySuccess<T>, RetryError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Outcome<T>>,
        X: FnMut(String, String) -> XFut,
        XFut: Future<Output = Result<String, String>>,
    {
        self.run(code, execute, Some(fix)).await
    }

    async fn run<T, F, Fut, X, XFut>(
        &self,
        code: &str,
        mut execute: F,
        mut fix: Option<X>,
    ) -> Result<RetrySuccess<T>, RetryError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Outcome<T>>,
        X: FnMut(String, String) -> XFut,
        XFut: Future<Output = Result<String, String>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut errors: Vec<String> = Vec::new();
        let mut current_code = code.to_string();

        for attempt in 1..=max_attempts {
            debug!(
                "Execution attempt {attempt}/{max_attempts}: code_length={}",
                current_code.len()
            );

            let error_message = match execute(current_code.clone()).await {
                Outcome::Success(value) => {
                    info!("Execution succeeded on attempt {attempt}");
                    return Ok(RetrySuccess {
                        value,
                        attempts: attempt,
                        code: current_code,
                    });
                }
                Outcome::Failure(message) => message,
            };

            warn!("Execution failed on attempt {attempt}: {error_message}");
            errors.push(error_message.clone());

            if attempt == max_attempts {
                break;
            }

            let delay = self.config.get_delay(attempt);
            debug!("Waiting {delay:?} before retry");
            TokioSleep(delay).await;

            if let Some(fix) = fix.as_mut() {
                debug!("Attempting to fix code");
                match fix(current_code.clone(), error_message).await {
                    Ok(fixed) => {
                        debug!("Code fixed: new_code_length={}", fixed.len());
                        current_code = fixed;
                    }
                    Err(e) => warn!("Failed to fix code, retrying unchanged: {e}"),
                }
            }
        }

        error!("All {max_attempts} retry attempts exhausted");
        Err(RetryError::Exhausted {
            attempts: max_attempts,
            errors,
            last_code: current_code,
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
