use crate::helpers::{LOOPBACK, ZERO_DIVISION, start_test_bridge};

use bridge_core::history::ExecutionStatus;
use bridge_core::pipeline::{CodeGenerator, HISTORY_CONTEXT_KEY, Pipeline, PipelineOptions};
use bridge_core::protocol::JsonMap;
use bridge_core::retry::RetryConfig;

use std::future::{Future, ready};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

/// Generator returning fixed code and a fixed repair, recording what it saw.
struct ScriptedGenerator {
    code: Result<String, String>,
    fix: Result<String, String>,
    contexts: Mutex<Vec<JsonMap>>,
    fix_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    fn new(code: &str, fix: &str) -> Self {
        Self {
            code: Ok(code.to_string()),
            fix: Ok(fix.to_string()),
            contexts: Mutex::new(Vec::new()),
            fix_calls: Mutex::new(Vec::new()),
        }
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(
        &self,
        _request: &str,
        context: &JsonMap,
    ) -> impl Future<Output = Result<String, String>> + Send {
        self.contexts.lock().unwrap().push(context.clone());
        ready(self.code.clone())
    }

    fn fix(
        &self,
        code: &str,
        error: &str,
        _original_request: &str,
    ) -> impl Future<Output = Result<String, String>> + Send {
        self.fix_calls
            .lock()
            .unwrap()
            .push((code.to_string(), error.to_string()));
        ready(self.fix.clone())
    }
}

fn fast_options() -> PipelineOptions {
    PipelineOptions {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
            jitter: false,
        },
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn given_no_connection_when_executing_then_failure_without_record() {
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("print('x')", ""), fast_options());

    let result = pipeline.execute("add a cube", None).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("not connected"));
    assert_eq!(pipeline.history().count(), 0);
}

#[tokio::test]
async fn given_working_code_when_executing_then_success_on_first_attempt() {
    // GIVEN: A connected pipeline whose generator writes working code
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("print('cube')", ""), fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();
    assert!(pipeline.is_connected().await);

    // WHEN: Executing a request
    let result = pipeline.execute("add a cube", None).await;

    // THEN: One attempt, output captured, recorded as success
    assert!(result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.output.unwrap().logs, "cube\n");
    assert_eq!(result.original_request, "add a cube");
    let record = pipeline.history().recent(1)[0];
    assert_eq!(record.status, ExecutionStatus::Success);
    assert!(pipeline.generator().fix_calls.lock().unwrap().is_empty());
}

/// **VALUE**: Verifies that a failing first attempt is repaired and recorded as fixed.
///
/// **WHY THIS MATTERS**: This is the point of the pipeline. The fixer must see the
/// host's actual error and its replacement must be what runs next.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The fixer receives a wrapped error instead of the host's message
/// - The original code is re-run after a successful fix
/// - A repaired run is recorded as a first-try success
#[tokio::test]
async fn given_broken_code_when_fixer_repairs_it_then_fixed_on_second_attempt() {
    // GIVEN: Generated code that divides by zero, and a fixer that repairs it
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("1/0", "print('fixed')"), fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    // WHEN: Executing
    let result = pipeline.execute("divide things", None).await;

    // THEN: Success on attempt 2 with the repaired code
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.code.as_deref(), Some("print('fixed')"));
    let fix_calls = pipeline.generator().fix_calls.lock().unwrap().clone();
    assert_eq!(fix_calls.len(), 1);
    assert_eq!(fix_calls[0].0, "1/0");
    assert!(fix_calls[0].1.starts_with(ZERO_DIVISION));

    let record = pipeline.history().recent(1)[0];
    assert_eq!(record.status, ExecutionStatus::Fixed);
    assert_eq!(record.fixes_applied.len(), 1);
}

#[tokio::test]
async fn given_unfixable_code_when_executing_then_failed_after_all_attempts() {
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("1/0", "1/0 + 1"), fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    let result = pipeline.execute("divide things", None).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(
        result.error.as_deref(),
        Some("Execution failed after 3 attempts")
    );
    let record = pipeline.history().recent(1)[0];
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("ZeroDivisionError"));
    assert_eq!(pipeline.history().success_rate(), 0.0);
}

#[tokio::test]
async fn given_slow_host_when_every_attempt_times_out_then_recorded_as_timeout() {
    // GIVEN: A host that takes longer than the client's read timeout
    let bridge = start_test_bridge().await;
    let options = PipelineOptions {
        read_timeout: Duration::from_millis(100),
        ..fast_options()
    };
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("slow()", "slow()"), options);
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    // WHEN: Executing
    let result = pipeline.execute("wait a bit", None).await;

    // THEN: Failed, and the history says why
    assert!(!result.success);
    assert_eq!(
        pipeline.history().recent(1)[0].status,
        ExecutionStatus::Timeout
    );
}

#[tokio::test]
async fn given_generator_failure_when_executing_then_skipped_record() {
    let bridge = start_test_bridge().await;
    let generator = ScriptedGenerator {
        code: Err("rate limited".to_string()),
        ..ScriptedGenerator::new("", "")
    };
    let mut pipeline = Pipeline::new(generator, fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    let result = pipeline.execute("add a cube", None).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("rate limited"));
    assert_eq!(result.attempts, 0);
    assert_eq!(
        pipeline.history().recent(1)[0].status,
        ExecutionStatus::Skipped
    );
}

#[tokio::test]
async fn given_earlier_run_when_generating_again_then_history_in_context() {
    // GIVEN: One completed run
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("print('a')", ""), fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();
    pipeline.execute("first", None).await;

    // WHEN: Running again with caller context
    let mut context = JsonMap::new();
    context.insert("selected".to_string(), json!("Cube"));
    pipeline.execute("second", Some(context)).await;

    // THEN: The generator saw both the caller's context and the history summary
    let contexts = pipeline.generator().contexts.lock().unwrap().clone();
    let latest = &contexts[1];
    assert_eq!(latest["selected"], json!("Cube"));
    assert_eq!(latest[HISTORY_CONTEXT_KEY]["history"], json!(["first → ✓"]));
}

#[tokio::test]
async fn given_risky_code_when_executing_then_warnings_attached() {
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(
        ScriptedGenerator::new("import os\nprint('x')", ""),
        fast_options(),
    );
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    let result = pipeline.execute("list files", None).await;

    assert_eq!(result.warnings, vec!["os module import (line 1)".to_string()]);
}

#[tokio::test]
async fn given_empty_generation_when_generating_only_then_validation_error() {
    let pipeline = Pipeline::new(ScriptedGenerator::new("  ", ""), fast_options());

    let result = pipeline.generate_only("anything", None).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn given_connected_pipeline_when_disconnected_then_not_connected() {
    let bridge = start_test_bridge().await;
    let mut pipeline = Pipeline::new(ScriptedGenerator::new("print('a')", ""), fast_options());
    pipeline.connect(LOOPBACK, bridge.addr.port()).await.unwrap();

    pipeline.disconnect().await;

    assert!(!pipeline.is_connected().await);
}
