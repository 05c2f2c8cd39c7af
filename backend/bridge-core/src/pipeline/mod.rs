//! Request-to-result orchestration: generate code, run it through the
//! bridge with retries and fixes, and record the outcome.
//!
//! ```text
//! request ─► CodeGenerator::generate ─► validate ─► inspect
//!                                                     │
//!            history ◄── record ◄── RetryManager ◄────┘
//!                                    │      ▲
//!                       BridgeClient::execute │ CodeGenerator::fix
//! ```

mod generator;
mod result;

pub use generator::CodeGenerator;
pub use result::PipelineResult;

use crate::client::{BridgeClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, PipelineError};
use crate::executor::CodeInspector;
use crate::history::{ExecutionHistory, ExecutionStatus, NewRecord};
use crate::protocol::{DEFAULT_TIMEOUT_MS, JsonMap};
use crate::retry::{Outcome, RetryConfig, RetryManager};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use tokio::sync::Mutex;

/// Context key under which the history summary is handed to the generator.
pub const HISTORY_CONTEXT_KEY: &str = "history";

const DEFAULT_CONTEXT_EXAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub retry: RetryConfig,
    pub max_history: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Timeout sent with every `execute_code` request.
    pub execution_timeout_ms: u64,
    /// Successes and failures of each kind included in the history context.
    pub context_examples: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_history: crate::history::DEFAULT_MAX_RECORDS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            execution_timeout_ms: DEFAULT_TIMEOUT_MS,
            context_examples: DEFAULT_CONTEXT_EXAMPLES,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            retry: config.retry.to_retry_config(),
            max_history: config.history.max_records,
            connect_timeout: config.client.connect_timeout(),
            read_timeout: config.client.read_timeout(),
            execution_timeout_ms: config.executor.default_timeout_ms,
            context_examples: DEFAULT_CONTEXT_EXAMPLES,
        }
    }
}

pub struct Pipeline<G: CodeGenerator> {
    generator: G,
    client: Option<BridgeClient>,
    retry: RetryManager,
    history: ExecutionHistory,
    inspector: CodeInspector,
    options: PipelineOptions,
}

impl<G: CodeGenerator> Pipeline<G> {
    pub fn new(generator: G, options: PipelineOptions) -> Self {
        debug!(
            "Initializing pipeline: max_attempts={}, max_history={}",
            options.retry.max_attempts, options.max_history
        );
        Self {
            generator,
            client: None,
            retry: RetryManager::new(options.retry.clone()),
            history: ExecutionHistory::new(options.max_history),
            inspector: CodeInspector::new(),
            options,
        }
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ExecutionHistory {
        &mut self.history
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Connects to the host bridge, replacing any previous connection.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), PipelineError> {
        self.disconnect().await;

        let client = BridgeClient::new(host, port)
            .with_timeouts(self.options.connect_timeout, self.options.read_timeout);
        if let Err(e) = client.connect().await {
            error!("Failed to connect to host at {host}:{port}: {e}");
            return Err(e.into());
        }

        info!("Pipeline connected to {host}:{port}");
        self.client = Some(client);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            client.disconnect().await;
            info!("Pipeline disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        match &self.client {
            Some(client) => client.is_connected().await,
            None => false,
        }
    }

    /// Generates and validates code without running it.
    pub async fn generate_only(
        &self,
        request: &str,
        context: Option<JsonMap>,
    ) -> Result<String, PipelineError> {
        debug!("Generate only: request_length={}", request.len());
        let context = self.generation_context(context);
        self.generate(request, &context).await
    }

    /// Runs `request` end to end. Failures are reported in the result, never
    /// as an error.
    pub async fn execute(&mut self, request: &str, context: Option<JsonMap>) -> PipelineResult {
        info!(
            "Starting pipeline execution: request_length={}, has_context={}",
            request.len(),
            context.is_some()
        );
        let started = Instant::now();

        let connected = self.is_connected().await;
        let client = match (&self.client, connected) {
            (Some(client), true) => client,
            _ => {
                error!("Host not connected");
                return PipelineResult::failure(
                    request,
                    "Host is not connected. Call connect() first.",
                    started.elapsed(),
                );
            }
        };

        let context = self.generation_context(context);
        let code = match self.generate(request, &context).await {
            Ok(code) => code,
            Err(e) => {
                error!("Pipeline failed before execution: {e}");
                let message = e.to_string();
                let mut record = NewRecord::new(request, "", ExecutionStatus::Skipped);
                record.error_message = Some(message.clone());
                record.execution_time = started.elapsed();
                record.attempts = 0;
                self.history.add_record(record);
                return PipelineResult::failure(request, message, started.elapsed());
            }
        };

        let warnings: Vec<String> = self
            .inspector
            .inspect(&code)
            .iter()
            .map(|finding| finding.describe())
            .collect();

        let timeout_ms = self.options.execution_timeout_ms;
        let generator = &self.generator;
        let last_timed_out = AtomicBool::new(false);
        let fixes = Mutex::new(Vec::<String>::new());

        let timed_out = &last_timed_out;
        let fixed_errors = &fixes;

        // A timed-out exchange drops the socket, so each attempt reconnects first.
        let execute = move |code: String| async move {
            let result = match client.connect().await {
                Ok(()) => client.execute(&code, timeout_ms).await,
                Err(e) => Err(e),
            };
            timed_out.store(
                matches!(&result, Err(e) if e.is_timeout()),
                Ordering::SeqCst,
            );
            match result {
                Ok(output) => Outcome::Success(output),
                Err(e) => Outcome::Failure(failure_message(&e)),
            }
        };

        let fix = move |code: String, error: String| async move {
            let fixed = generator.fix(&code, &error, request).await?;
            if fixed.trim().is_empty() {
                return Err("Fixer returned empty code".to_string());
            }
            fixed_errors.lock().await.push(error);
            Ok(fixed)
        };

        let outcome = self.retry.execute_with_fixes(&code, execute, fix).await;
        let execution_time = started.elapsed();
        let fixes_applied = fixes.into_inner();

        match outcome {
            Ok(success) => {
                let status = if success.attempts == 1 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Fixed
                };
                info!(
                    "Pipeline execution {status}: attempts={}, execution_time={execution_time:?}",
                    success.attempts
                );

                let mut record = NewRecord::new(request, success.code.clone(), status);
                record.stdout = success.value.logs.clone();
                record.execution_time = execution_time;
                record.attempts = success.attempts;
                record.fixes_applied = fixes_applied;
                self.history.add_record(record);

                PipelineResult {
                    success: true,
                    code: Some(success.code),
                    output: Some(success.value),
                    error: None,
                    attempts: success.attempts,
                    execution_time,
                    original_request: request.to_string(),
                    warnings,
                }
            }
            Err(e) => {
                error!(
                    "Pipeline failed: retries exhausted after {} attempts",
                    e.attempts()
                );
                let status = if last_timed_out.load(Ordering::SeqCst) {
                    ExecutionStatus::Timeout
                } else {
                    ExecutionStatus::Failed
                };

                let mut record = NewRecord::new(request, e.last_code(), status);
                record.error_message = e.errors().last().cloned();
                record.execution_time = execution_time;
                record.attempts = e.attempts();
                record.fixes_applied = fixes_applied;
                self.history.add_record(record);

                PipelineResult {
                    success: false,
                    code: Some(e.last_code().to_string()),
                    output: None,
                    error: Some(format!("Execution failed after {} attempts", e.attempts())),
                    attempts: e.attempts(),
                    execution_time,
                    original_request: request.to_string(),
                    warnings,
                }
            }
        }
    }

    fn generation_context(&self, context: Option<JsonMap>) -> JsonMap {
        let mut context = context.unwrap_or_default();
        context.insert(
            HISTORY_CONTEXT_KEY.to_string(),
            self.history
                .context_for_prompt(self.options.context_examples),
        );
        context
    }

    async fn generate(&self, request: &str, context: &JsonMap) -> Result<String, PipelineError> {
        debug!("Generating code: request_length={}", request.len());

        let code = self
            .generator
            .generate(request, context)
            .await
            .map_err(|message| PipelineError::Generation {
                message,
                location: ErrorLocation::from(Location::caller()),
            })?;

        if code.trim().is_empty() {
            return Err(PipelineError::Validation {
                message: "Generated code is empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        debug!("Code generated: code_length={}", code.len());
        Ok(code)
    }
}

/// Text handed to the fixer: the host's error plus its traceback, without
/// source locations of this crate.
fn failure_message(error: &BridgeError) -> String {
    match error {
        BridgeError::Execution {
            message,
            traceback: Some(traceback),
            ..
        } => format!("{message}\n{traceback}"),
        BridgeError::Execution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
