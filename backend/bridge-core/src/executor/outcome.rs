use crate::protocol::{JsonMap, Response};

use serde_json::Value;

/// What the host reports after running a code string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: None,
            traceback: None,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        traceback: Option<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: Some(error.into()),
            traceback,
        }
    }

    /// Maps the outcome onto the response for request `id`: stdout becomes
    /// `logs`, non-empty stderr lands in `data.stderr`.
    pub fn into_response(self, id: &str) -> Response {
        let response = if self.success {
            Response::success(id, JsonMap::new(), self.stdout)
        } else {
            Response::error(
                id,
                self.error.unwrap_or_else(|| "Execution failed".to_string()),
                self.traceback,
                self.stdout,
            )
        };

        if self.stderr.is_empty() {
            response
        } else {
            response.with_data("stderr", Value::String(self.stderr))
        }
    }
}
