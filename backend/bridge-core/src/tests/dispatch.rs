use crate::dispatch::{
    DispatchOptions, Dispatcher, NOT_RUNNING_MESSAGE, QueuedMessage, SHUTTING_DOWN_MESSAGE,
};
use crate::executor::ExecutionOutcome;
use crate::protocol::{Request, Response};
use crate::tests::{FakeExecutor, capture};

use common::TRUNCATION_MARKER;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

fn started(executor: FakeExecutor) -> Dispatcher<FakeExecutor> {
    let mut dispatcher = Dispatcher::new(executor, DispatchOptions::default());
    dispatcher.start();
    dispatcher
}

fn send(dispatcher: &Dispatcher<FakeExecutor>, request: Request) -> Arc<Mutex<Vec<Response>>> {
    let store = Arc::new(Mutex::new(Vec::new()));
    dispatcher
        .sender()
        .enqueue(QueuedMessage::new(request, capture(&store)));
    store
}

/// Runs one request through a started dispatcher and returns its response.
fn roundtrip(dispatcher: &mut Dispatcher<FakeExecutor>, request: Request) -> Response {
    let store = send(dispatcher, request);
    dispatcher.pump();
    let mut responses = store.lock().unwrap();
    assert_eq!(responses.len(), 1, "exactly one response per request");
    responses.remove(0)
}

/// **VALUE**: Verifies that one pump handles at most `max_per_tick` messages.
///
/// **WHY THIS MATTERS**: The pump runs on the host's own thread. Draining an
/// unbounded backlog in one tick would freeze the host for as long as it takes.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The pump drains the whole queue
/// - Leftover messages are lost instead of waiting for the next tick
#[test]
fn given_more_messages_than_limit_when_pumped_once_then_limit_processed() {
    // GIVEN: 15 queued pings and a per-tick limit of 10
    let mut dispatcher = started(FakeExecutor::default());
    let store = Arc::new(Mutex::new(Vec::new()));
    let sender = dispatcher.sender();
    for _ in 0..15 {
        sender.enqueue(QueuedMessage::new(Request::ping(), capture(&store)));
    }

    // WHEN: Pumping once
    let processed = dispatcher.pump();

    // THEN: Exactly 10 handled, 5 left for later
    assert_eq!(processed, 10);
    assert_eq!(dispatcher.queue_len(), 5);
    assert_eq!(store.lock().unwrap().len(), 10);

    // WHEN: Pumping again
    assert_eq!(dispatcher.pump(), 5);
    assert_eq!(store.lock().unwrap().len(), 15);
}

#[test]
fn given_ping_when_processed_then_pong() {
    let mut dispatcher = started(FakeExecutor::default());
    let request = Request::ping();
    let id = request.id.clone();

    let response = roundtrip(&mut dispatcher, request);

    assert!(response.is_success());
    assert_eq!(response.id, id);
    assert_eq!(response.result.data["pong"], json!(true));
}

#[test]
fn given_successful_code_when_executed_then_stdout_in_logs() {
    let executor = FakeExecutor {
        outcome: ExecutionOutcome::succeeded("Created Cube\n", ""),
        ..FakeExecutor::default()
    };
    let mut dispatcher = started(executor);

    let response = roundtrip(&mut dispatcher, Request::execute("make_cube()", 1000));

    assert!(response.is_success());
    assert_eq!(response.result.logs, "Created Cube\n");
    assert_eq!(dispatcher.executor().calls, vec!["make_cube()".to_string()]);
}

#[test]
fn given_failing_code_when_executed_then_error_traceback_and_stderr_returned() {
    let executor = FakeExecutor {
        outcome: ExecutionOutcome::failed(
            "ZeroDivisionError: division by zero",
            Some("Traceback ...".to_string()),
            "before\n",
            "warning\n",
        ),
        ..FakeExecutor::default()
    };
    let mut dispatcher = started(executor);

    let response = roundtrip(&mut dispatcher, Request::execute("1/0", 1000));

    assert!(response.is_error());
    assert_eq!(
        response.result.error.as_deref(),
        Some("ZeroDivisionError: division by zero")
    );
    assert_eq!(response.result.traceback.as_deref(), Some("Traceback ..."));
    assert_eq!(response.result.logs, "before\n");
    assert_eq!(response.result.data["stderr"], json!("warning\n"));
}

/// **VALUE**: Verifies that a failing handler only affects its own message.
///
/// **WHY THIS MATTERS**: Every client shares the one pump. A bad request must not
/// stall or poison the requests queued behind it.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A handler error aborts the rest of the tick
/// - The error response goes to the wrong callback
#[test]
fn given_bad_request_before_good_one_when_pumped_then_both_answered_independently() {
    // GIVEN: An execute_code without code, followed by a ping
    let dispatcher = started(FakeExecutor::default());
    let bad = send(&dispatcher, Request::execute("", 1000));
    let good = send(&dispatcher, Request::ping());
    let mut dispatcher = dispatcher;

    // WHEN: Pumping once
    let processed = dispatcher.pump();

    // THEN: The first gets an error, the second still succeeds
    assert_eq!(processed, 2);
    let bad = bad.lock().unwrap();
    assert_eq!(bad[0].result.error.as_deref(), Some("No code provided"));
    assert!(good.lock().unwrap()[0].is_success());
    assert!(dispatcher.executor().calls.is_empty());
}

/// **VALUE**: Verifies a panicking host call is contained to its own message.
///
/// **WHY THIS MATTERS**: The pump runs on the host's main thread. An unwinding
/// handler would take the host down and leave every other caller waiting.
///
/// **BUG THIS CATCHES**: Would catch if the pump stops catching panics, or if the
/// panicking message gets no response at all.
#[test]
fn given_panicking_host_when_pumped_then_error_response_and_pump_continues() {
    // GIVEN: A host that panics on execute, with a ping queued behind it
    let executor = FakeExecutor {
        panic_with: Some("host exploded"),
        ..FakeExecutor::default()
    };
    let dispatcher = started(executor);
    let exploding = send(&dispatcher, Request::execute("boom()", 1000));
    let ping = send(&dispatcher, Request::ping());
    let mut dispatcher = dispatcher;

    // WHEN: Pumping once
    let processed = dispatcher.pump();

    // THEN: The panic becomes an error response and the ping is still answered
    assert_eq!(processed, 2);
    let exploding = exploding.lock().unwrap();
    assert_eq!(
        exploding[0].result.error.as_deref(),
        Some("Handler panicked: host exploded")
    );
    assert!(ping.lock().unwrap()[0].is_success());
    assert!(dispatcher.is_running());
}

#[test]
fn given_whitespace_code_when_executed_then_rejected_without_host_call() {
    let mut dispatcher = started(FakeExecutor::default());

    let response = roundtrip(&mut dispatcher, Request::execute("   \n", 1000));

    assert!(response.is_error());
    assert_eq!(response.result.error.as_deref(), Some("Empty code provided"));
    assert!(dispatcher.executor().calls.is_empty());
}

#[test]
fn given_huge_output_when_executed_then_logs_truncated() {
    let executor = FakeExecutor {
        outcome: ExecutionOutcome::succeeded("y".repeat(100), ""),
        ..FakeExecutor::default()
    };
    let options = DispatchOptions {
        max_output: 10,
        ..DispatchOptions::default()
    };
    let mut dispatcher = Dispatcher::new(executor, options);
    dispatcher.start();

    let response = roundtrip(&mut dispatcher, Request::execute("spam()", 1000));

    assert_eq!(
        response.result.logs,
        format!("{}{TRUNCATION_MARKER}", "y".repeat(10))
    );
}

#[test]
fn given_scene_query_when_processed_then_scene_info_returned() {
    let mut dispatcher = started(FakeExecutor::default());

    let response = roundtrip(&mut dispatcher, Request::query("summary"));

    assert!(response.is_success());
    assert_eq!(response.result.data["name"], json!("Scene"));
}

#[test]
fn given_introspection_failure_when_queried_then_error_response() {
    let executor = FakeExecutor {
        scene: Err("No active scene".to_string()),
        ..FakeExecutor::default()
    };
    let mut dispatcher = started(executor);

    let response = roundtrip(&mut dispatcher, Request::query("summary"));

    assert!(response.is_error());
    assert_eq!(response.result.error.as_deref(), Some("No active scene"));
}

#[test]
fn given_get_objects_when_processed_then_objects_listed() {
    let mut dispatcher = started(FakeExecutor::default());

    let response = roundtrip(&mut dispatcher, Request::get_objects());

    assert_eq!(
        response.result.data["objects"],
        json!([{"name": "Cube", "type": "MESH"}])
    );
}

#[test]
fn given_shutdown_when_processed_then_acknowledged_and_still_running() {
    let mut dispatcher = started(FakeExecutor::default());

    let response = roundtrip(&mut dispatcher, Request::shutdown());

    assert_eq!(response.result.data["shutdown"], json!(true));
    assert!(dispatcher.is_running());
}

/// **VALUE**: Verifies that stopping answers every queued request instead of
/// leaving callers to time out.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Queued work still runs on the host after stop
/// - Dropped requests vanish without a response
#[test]
fn given_queued_messages_when_stopped_then_each_rejected_and_none_executed() {
    // GIVEN: Three queued execute requests
    let dispatcher = started(FakeExecutor::default());
    let stores: Vec<_> = (0..3)
        .map(|i| send(&dispatcher, Request::execute(format!("x = {i}"), 1000)))
        .collect();
    let mut dispatcher = dispatcher;

    // WHEN: Stopping
    let dropped = dispatcher.stop();

    // THEN: All three get a shutdown error and the host never ran them
    assert_eq!(dropped, 3);
    for store in stores {
        let responses = store.lock().unwrap();
        assert_eq!(
            responses[0].result.error.as_deref(),
            Some(SHUTTING_DOWN_MESSAGE)
        );
    }
    assert!(dispatcher.executor().calls.is_empty());
    assert_eq!(dispatcher.stop(), 0, "stop is idempotent");
}

#[test]
fn given_not_started_when_enqueued_then_rejected_immediately() {
    let dispatcher = Dispatcher::new(FakeExecutor::default(), DispatchOptions::default());

    let store = send(&dispatcher, Request::ping());

    let responses = store.lock().unwrap();
    assert_eq!(responses[0].result.error.as_deref(), Some(NOT_RUNNING_MESSAGE));
    assert_eq!(dispatcher.queue_len(), 0);
}

#[test]
fn given_running_dispatcher_when_ticked_then_interval_until_stopped() {
    let options = DispatchOptions {
        tick_interval: Duration::from_millis(50),
        ..DispatchOptions::default()
    };
    let mut dispatcher = Dispatcher::new(FakeExecutor::default(), options);
    dispatcher.start();

    assert_eq!(dispatcher.tick(), Some(Duration::from_millis(50)));
    assert!(dispatcher.is_hook_registered());

    dispatcher.stop();

    assert_eq!(dispatcher.tick(), None);
    assert!(!dispatcher.is_hook_registered());
}

#[test]
fn given_stopped_dispatcher_when_enqueued_then_rejected() {
    let mut dispatcher = started(FakeExecutor::default());
    dispatcher.stop();

    let store = send(&dispatcher, Request::ping());

    assert_eq!(
        store.lock().unwrap()[0].result.error.as_deref(),
        Some(NOT_RUNNING_MESSAGE)
    );
}
