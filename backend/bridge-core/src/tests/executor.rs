use crate::executor::{CodeInspector, ExecutionOutcome, run_code};
use crate::tests::FakeExecutor;

use std::time::Duration;

use serde_json::json;

#[test]
fn given_safe_code_when_inspected_then_no_findings() {
    let findings = CodeInspector::new().inspect("import bpy\nbpy.ops.mesh.primitive_cube_add()");

    assert!(findings.is_empty());
}

/// **VALUE**: Verifies that risky constructs are reported with their line.
///
/// **WHY THIS MATTERS**: Generated code runs with the host's full privileges. The
/// findings are the only signal a user gets that code touches files or processes.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A pattern stops matching after a regex edit
/// - Line numbers are off by one
#[test]
fn given_risky_code_when_inspected_then_findings_with_lines() {
    // GIVEN: Code importing os on line 2 and calling eval on line 3
    let code = "import bpy\nimport os\nvalue = eval('1 + 1')";

    // WHEN: Inspecting
    let findings = CodeInspector::new().inspect(code);

    // THEN: Both are reported at the right lines
    let described: Vec<String> = findings.iter().map(|f| f.describe()).collect();
    assert_eq!(
        described,
        vec![
            "os module import (line 2)".to_string(),
            "eval call (line 3)".to_string(),
        ]
    );
}

#[test]
fn given_identifier_containing_pattern_when_inspected_then_not_flagged() {
    // `reopen(` and `evaluate(` only contain the watched words
    let findings = CodeInspector::new().inspect("reopen(x)\nevaluate(y)");

    assert!(findings.is_empty());
}

#[test]
fn given_success_outcome_with_stderr_when_converted_then_stderr_in_data() {
    let response = ExecutionOutcome::succeeded("out", "err").into_response("id-1");

    assert!(response.is_success());
    assert_eq!(response.id, "id-1");
    assert_eq!(response.result.logs, "out");
    assert_eq!(response.result.data["stderr"], json!("err"));
}

#[test]
fn given_failure_without_message_when_converted_then_generic_error() {
    let outcome = ExecutionOutcome {
        success: false,
        ..ExecutionOutcome::default()
    };

    let response = outcome.into_response("id-2");

    assert_eq!(response.result.error.as_deref(), Some("Execution failed"));
    assert!(response.result.data.get("stderr").is_none());
}

#[test]
fn given_long_stderr_when_run_then_both_streams_capped() {
    let mut executor = FakeExecutor {
        outcome: ExecutionOutcome::succeeded("a".repeat(20), "b".repeat(20)),
        ..FakeExecutor::default()
    };

    let outcome = run_code(&mut executor, "noisy()", Duration::from_secs(1), 5);

    assert!(outcome.stdout.starts_with("aaaaa\n"));
    assert!(outcome.stderr.starts_with("bbbbb\n"));
    assert_eq!(executor.calls.len(), 1);
}
