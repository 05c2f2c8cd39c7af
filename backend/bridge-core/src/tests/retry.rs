use crate::retry::{Outcome, RetryConfig, RetryManager};

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
        jitter: false,
    }
}

/// **VALUE**: Verifies that an always-failing call runs exactly N times and keeps
/// every error.
///
/// **WHY THIS MATTERS**: The error list is the only record of what went wrong on
/// each attempt. Losing earlier entries hides the root cause behind later fixes.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The loop runs one attempt too many or too few
/// - Only the last error is kept
/// - Errors are reordered
#[tokio::test]
async fn given_always_failing_call_when_retried_then_exhausted_with_all_errors() {
    // GIVEN: A call that fails with a numbered message
    let manager = RetryManager::new(fast_config(4));
    let calls = AtomicU32::new(0);

    // WHEN: Retrying
    let result = manager
        .execute_with_retry("bad()", |_code| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Outcome::<()>::Failure(format!("boom {n}")) }
        })
        .await;

    // THEN: Four calls, four errors, in order
    let error = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(error.attempts(), 4);
    assert_eq!(error.errors(), ["boom 1", "boom 2", "boom 3", "boom 4"]);
    assert_eq!(error.last_code(), "bad()");
    assert!(error.to_string().contains("failed after 4 attempts"));
}

/// **VALUE**: Verifies that success on attempt k returns k and stops fixing.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The fixer is called after a success
/// - The attempt count is off, which would mislabel fixed runs as first-try
/// - The fixed code is not the code that is executed next
#[tokio::test]
async fn given_success_on_second_attempt_when_fixing_then_one_fix_and_two_attempts() {
    // GIVEN: A call that only succeeds on fixed code
    let manager = RetryManager::new(fast_config(5));
    let fixes = AtomicU32::new(0);

    // WHEN: Retrying with a fixer
    let result = manager
        .execute_with_fixes(
            "broken()",
            |code| async move {
                if code == "fixed()" {
                    Outcome::Success(42)
                } else {
                    Outcome::Failure("NameError: broken".to_string())
                }
            },
            |_code, error| {
                fixes.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(error, "NameError: broken");
                    Ok("fixed()".to_string())
                }
            },
        )
        .await
        .unwrap();

    // THEN: Second attempt wins, fixer ran once
    assert_eq!(result.value, 42);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.code, "fixed()");
    assert_eq!(fixes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_failing_fixer_when_retrying_then_original_code_retried() {
    let manager = RetryManager::new(fast_config(3));
    let calls = AtomicU32::new(0);

    let result = manager
        .execute_with_fixes(
            "flaky()",
            |code| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    assert_eq!(code, "flaky()");
                    if n == 2 {
                        Outcome::Success(())
                    } else {
                        Outcome::Failure("transient".to_string())
                    }
                }
            },
            |_code, _error| async { Err::<String, String>("fixer offline".to_string()) },
        )
        .await
        .unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.code, "flaky()");
}

#[tokio::test]
async fn given_first_try_success_when_retrying_then_one_attempt() {
    let manager = RetryManager::new(fast_config(3));

    let result = manager
        .execute_with_retry("ok()", |_code| async { Outcome::Success("done") })
        .await
        .unwrap();

    assert_eq!(result.attempts, 1);
    assert_eq!(result.value, "done");
}

#[test]
fn given_no_jitter_when_computing_delays_then_non_decreasing_and_capped() {
    // GIVEN: 100ms doubling up to 1s
    let config = RetryConfig {
        max_attempts: 10,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        exponential_base: 2.0,
        jitter: false,
    };

    // WHEN: Computing delays for attempts 1..=10
    let delays: Vec<Duration> = (1..=10).map(|attempt| config.get_delay(attempt)).collect();

    // THEN: Exponential growth, never decreasing, never above the cap
    assert!((delays[0].as_secs_f64() - 0.1).abs() < 1e-6);
    assert!((delays[2].as_secs_f64() - 0.4).abs() < 1e-6);
    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(delays.iter().all(|delay| *delay <= config.max_delay));
    assert_eq!(delays[9], config.max_delay);
}

#[test]
fn given_jitter_when_computing_delay_then_within_quarter_above_base() {
    let config = RetryConfig {
        initial_delay: Duration::from_millis(200),
        ..RetryConfig::default()
    };

    for _ in 0..100 {
        let delay = config.get_delay(1).as_secs_f64();
        assert!((0.2 - 1e-9..=0.25 + 1e-9).contains(&delay), "delay {delay}");
    }
}

#[test]
fn given_result_when_converted_then_outcome_matches() {
    let ok: Outcome<u8> = Ok::<u8, String>(1).into();
    let err: Outcome<u8> = Err::<u8, &str>("bad").into();

    assert_eq!(ok, Outcome::Success(1));
    assert_eq!(err, Outcome::Failure("bad".to_string()));
    assert!(ok.is_success());
}
