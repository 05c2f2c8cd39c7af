use crate::helpers::{LOOPBACK, ScriptedExecutor};

use bridge_core::client::BridgeClient;
use bridge_core::config::BridgeConfig;
use bridge_core::error::{BridgeError, ServiceError};
use bridge_core::service::BridgeService;

use std::net::TcpListener as StdTcpListener;
use std::thread::{sleep, spawn};
use std::time::Duration;

use tokio::runtime::Runtime;

fn loopback_config(port: u16) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.server.host = LOOPBACK.to_string();
    config.server.port = port;
    config.dispatch.tick_interval_ms = 5;
    config
}

/// Ticks `service` on this thread until `done` reports true.
fn tick_until(service: &mut BridgeService<ScriptedExecutor>, done: impl Fn() -> bool) {
    while !done() {
        match service.tick() {
            Some(interval) => sleep(interval),
            None => break,
        }
    }
}

/// **VALUE**: Verifies the enable → tick → disable lifecycle a host goes through.
///
/// **WHY THIS MATTERS**: This is the only way a real host drives the bridge. The
/// host thread ticks while a client on another thread talks to the server.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `enable` returns before the listener is bound
/// - `tick` does not pump the queue
/// - `disable` leaves the port open
#[test]
fn given_enabled_service_when_host_ticks_then_client_is_served_until_disabled() {
    // GIVEN: An enabled service on an ephemeral port
    let mut service = BridgeService::enable(&loopback_config(0), ScriptedExecutor).unwrap();
    let addr = service.local_addr().unwrap();
    assert!(service.is_enabled());

    // WHEN: A client on another thread pings and executes while the host ticks
    let client_thread = spawn(move || {
        Runtime::new().unwrap().block_on(async move {
            let client = BridgeClient::new(LOOPBACK, addr.port());
            client.connect().await.unwrap();
            client.ping().await.unwrap();
            client.execute("print('from host')", 5000).await.unwrap().logs
        })
    });
    tick_until(&mut service, || client_thread.is_finished());

    // THEN: The client got the host's output
    assert_eq!(client_thread.join().unwrap(), "from host\n");

    // WHEN: Disabling
    service.disable();

    // THEN: Nothing listens on the port any more
    let refused = Runtime::new().unwrap().block_on(async {
        BridgeClient::new(LOOPBACK, addr.port()).connect().await
    });
    assert!(matches!(refused, Err(BridgeError::ConnectionRefused { .. })));
}

#[test]
fn given_port_in_use_when_enabling_then_server_start_error() {
    let occupied = StdTcpListener::bind(format!("{LOOPBACK}:0")).unwrap();
    let port = occupied.local_addr().unwrap().port();

    let result = BridgeService::enable(&loopback_config(port), ScriptedExecutor);

    assert!(matches!(result, Err(ServiceError::ServerStart { .. })));
}

#[test]
fn given_stopped_dispatcher_when_ticking_then_hook_deregisters() {
    let mut service = BridgeService::enable(&loopback_config(0), ScriptedExecutor).unwrap();
    assert_eq!(service.tick(), Some(Duration::from_millis(5)));

    service.dispatcher_mut().stop();

    assert_eq!(service.tick(), None);
    assert!(!service.is_enabled());
}

#[test]
fn given_enabled_service_when_dropped_then_port_released() {
    let service = BridgeService::enable(&loopback_config(0), ScriptedExecutor).unwrap();
    let port = service.local_addr().unwrap().port();

    drop(service);

    assert!(StdTcpListener::bind(format!("{LOOPBACK}:{port}")).is_ok());
}
