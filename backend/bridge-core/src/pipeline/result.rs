use crate::client::ExecuteOutput;

use std::time::Duration;

/// Everything a caller learns from one [`Pipeline::execute`](crate::pipeline::Pipeline::execute).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub success: bool,
    /// Last code sent to the host, or the generated code if none was sent.
    pub code: Option<String>,
    pub output: Option<ExecuteOutput>,
    pub error: Option<String>,
    pub attempts: u32,
    pub execution_time: Duration,
    pub original_request: String,
    /// Risky constructs spotted in the generated code.
    pub warnings: Vec<String>,
}

impl PipelineResult {
    pub(crate) fn failure(
        request: &str,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            success: false,
            code: None,
            output: None,
            error: Some(error.into()),
            attempts: 0,
            execution_time,
            original_request: request.to_string(),
            warnings: Vec::new(),
        }
    }
}
