use aether_host::host_loop::run_until_stopped;
use aether_host::python_executor::PythonExecutor;

use bridge_core::client::BridgeClient;
use bridge_core::config::BridgeConfig;
use bridge_core::error::BridgeError;
use bridge_core::service::BridgeService;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::spawn;

use tokio::runtime::Runtime;

const LOOPBACK: &str = "127.0.0.1";

fn loopback_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.server.host = LOOPBACK.to_string();
    config.server.port = 0;
    config.dispatch.tick_interval_ms = 5;
    config.executor.interpreter = "aether-no-such-interpreter".to_string();
    config
}

/// **VALUE**: Verifies the standalone host serves clients from its own loop and
/// leaves it when asked.
///
/// **WHY THIS MATTERS**: This is what `main` does: enable, pump until interrupted,
/// disable. Every request must be answered by the loop thread.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - the loop ignores the stop flag
/// - executor failures escape as transport errors instead of `Execution`
/// - introspection does not see runs made through the bridge
#[test]
fn given_running_host_loop_when_client_talks_then_served_until_stop_flag() {
    // GIVEN: An enabled service whose interpreter is missing
    let config = loopback_config();
    let mut service =
        BridgeService::enable(&config, PythonExecutor::from_settings(&config.executor)).unwrap();
    let port = service.local_addr().unwrap().port();
    let stop = Arc::new(AtomicBool::new(false));

    // WHEN: A client pings, executes, inspects, then raises the stop flag
    let client_stop = Arc::clone(&stop);
    let client_thread = spawn(move || {
        let result = Runtime::new().unwrap().block_on(async move {
            let client = BridgeClient::new(LOOPBACK, port);
            client.connect().await.unwrap();
            client.ping().await.unwrap();
            let executed = client.execute("print(1)", 1000).await;
            let scene = client.query("summary").await.unwrap();
            let objects = client.get_objects().await.unwrap();
            (executed, scene, objects)
        });
        client_stop.store(true, Ordering::SeqCst);
        result
    });
    let ticks = run_until_stopped(&mut service, &stop);

    // THEN: The loop ran and every call was answered
    let (executed, scene, objects) = client_thread.join().unwrap();
    assert!(ticks > 0);
    match executed {
        Err(BridgeError::Execution { message, .. }) => {
            assert!(message.contains("Failed to start interpreter"), "{message}");
        }
        other => panic!("expected Execution error, got {other:?}"),
    }
    assert_eq!(scene["runs"], 1);
    assert_eq!(objects.len(), 1);

    service.disable();
}

#[test]
fn given_stopped_dispatcher_when_host_loop_runs_then_returns_immediately() {
    let config = loopback_config();
    let mut service =
        BridgeService::enable(&config, PythonExecutor::from_settings(&config.executor)).unwrap();
    service.dispatcher_mut().stop();

    let ticks = run_until_stopped(&mut service, &AtomicBool::new(false));

    assert_eq!(ticks, 0);
    assert!(!service.is_enabled());
}
