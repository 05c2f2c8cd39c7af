//! Host-side execution contract.
//!
//! A [`HostExecutor`] is the only thing allowed to touch host state. It is
//! owned by the [`Dispatcher`](crate::dispatch::Dispatcher) and called
//! exclusively from the host's own thread, so implementations need not be
//! `Send` or `Sync`.

mod inspector;
mod outcome;

pub use inspector::{CodeInspector, Finding};
pub use outcome::ExecutionOutcome;

use crate::protocol::JsonMap;

use common::truncate_with_marker;

use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

/// Default cap on captured stdout/stderr (characters).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const EMPTY_CODE_MESSAGE: &str = "Empty code provided";

/// Effectful operations the host exposes to the bridge.
pub trait HostExecutor {
    /// Runs `code` inside the host, capturing output. Failures of the code
    /// itself are reported in the outcome, never as a panic.
    fn execute(&mut self, code: &str, timeout: Duration) -> ExecutionOutcome;

    /// Read-only summary of the current scene.
    fn scene_info(&mut self) -> Result<JsonMap, String>;

    /// Read-only list of objects in the scene.
    fn object_list(&mut self) -> Result<Vec<Value>, String>;
}

/// Runs `code` through `executor` with the bridge's guards applied.
///
/// Blank code is rejected without calling the host, and captured output is
/// capped at `max_output` characters.
pub fn run_code<E>(
    executor: &mut E,
    code: &str,
    timeout: Duration,
    max_output: usize,
) -> ExecutionOutcome
where
    E: HostExecutor + ?Sized,
{
    if code.trim().is_empty() {
        warn!("Empty code received");
        return ExecutionOutcome::failed(EMPTY_CODE_MESSAGE, None, "", "");
    }

    debug!(
        "Executing code: code_length={}, timeout={timeout:?}",
        code.len()
    );
    let mut outcome = executor.execute(code, timeout);

    outcome.stdout = truncate_with_marker(&outcome.stdout, max_output);
    outcome.stderr = truncate_with_marker(&outcome.stderr, max_output);

    debug!(
        "Execution finished: success={}, stdout_length={}, stderr_length={}",
        outcome.success,
        outcome.stdout.len(),
        outcome.stderr.len()
    );
    outcome
}
