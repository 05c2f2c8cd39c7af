use crate::helpers::{
    LOOPBACK, ScriptedExecutor, connected_client, dispatch_options, start_test_bridge,
};

use bridge_core::client::BridgeClient;
use bridge_core::dispatch::{Dispatcher, SHUTTING_DOWN_MESSAGE};
use bridge_core::error::{BridgeError, ProtocolError, TimeoutOperation};
use bridge_core::protocol::{Request, Response};
use bridge_core::server::start_bridge_server;
use bridge_core::transport::{MAX_MESSAGE_SIZE, read_frame, write_frame};

use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep as TokioSleep;

/// **VALUE**: Verifies the full path client → server → host thread → client.
///
/// **WHY THIS MATTERS**: Ping is how every caller checks that the bridge is alive.
/// It crosses the transport task, the dispatch queue and the host pump.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The server never enqueues decoded requests
/// - The reply callback is not wired back to the socket
/// - The response id is not the request id
#[tokio::test]
async fn given_running_bridge_when_ping_then_pong() {
    // GIVEN: A running bridge and a connected client
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;

    // WHEN: Sending a ping
    let request = Request::ping();
    let response = client.send_request(&request).await.unwrap();

    // THEN: Success with pong, correlated to the request
    assert_eq!(response.id, request.id);
    assert!(response.is_success());
    assert_eq!(response.result.data["pong"], json!(true));
}

/// **VALUE**: Verifies that host-side failures surface as typed execution errors.
///
/// **WHY THIS MATTERS**: The retry loop reacts to execution errors only. If a failed
/// run came back as a success, nothing would ever be fixed.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Error responses are reported as successes
/// - The traceback is dropped on the way back
#[tokio::test]
async fn given_division_by_zero_when_executed_then_execution_error() {
    // GIVEN: A running bridge
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;

    // WHEN: Executing 1/0
    let result = client.execute("1/0", 5000).await;

    // THEN: An execution error naming ZeroDivisionError, with traceback
    match result {
        Err(BridgeError::Execution {
            message, traceback, ..
        }) => {
            assert!(message.contains("ZeroDivisionError"));
            assert!(traceback.unwrap().contains("Traceback"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn given_print_when_executed_then_stdout_returned_as_logs() {
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;

    let output = client.execute("print('hello')", 5000).await.unwrap();

    assert_eq!(output.logs, "hello\n");
}

#[tokio::test]
async fn given_running_bridge_when_introspecting_then_scene_and_objects_returned() {
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;

    let scene = client.query("summary").await.unwrap();
    let objects = client.get_objects().await.unwrap();
    client.shutdown().await.unwrap();

    assert_eq!(scene["name"], json!("Scene"));
    assert_eq!(objects, vec![json!({"name": "Cube", "type": "MESH"})]);
}

#[tokio::test]
async fn given_many_clients_when_requesting_concurrently_then_all_answered() {
    // GIVEN: Five connected clients
    let bridge = start_test_bridge().await;
    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(connected_client(&bridge).await);
    }
    while bridge.server.client_count() < 5 {
        TokioSleep(Duration::from_millis(5)).await;
    }

    // WHEN: All of them execute at once
    let calls: Vec<_> = clients
        .into_iter()
        .enumerate()
        .map(|(i, client)| {
            tokio::spawn(async move { client.execute(&format!("print('{i}')"), 5000).await })
        })
        .collect();

    // THEN: Each gets its own output back
    for (i, call) in calls.into_iter().enumerate() {
        let output = call.await.unwrap().unwrap();
        assert_eq!(output.logs, format!("{i}\n"));
    }
}

/// **VALUE**: Verifies that a response for another request is refused.
///
/// **WHY THIS MATTERS**: A stream that answers the wrong request is desynchronized.
/// Accepting its data would hand one caller another caller's result.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The id check is skipped
/// - The suspect connection is kept for the next call
#[tokio::test]
async fn given_server_replying_with_wrong_id_when_sending_then_protocol_error() {
    // GIVEN: A fake server answering every request with id "someone-else"
    let listener = TcpListener::bind(format!("{LOOPBACK}:0")).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await.unwrap();
        let reply = Response::success("someone-else", Default::default(), "");
        write_frame(&mut stream, &reply.to_bytes().unwrap())
            .await
            .unwrap();
        TokioSleep(Duration::from_secs(1)).await;
    });
    let client = BridgeClient::new(LOOPBACK, port);
    client.connect().await.unwrap();

    // WHEN: Sending a ping
    let result = client.send_request(&Request::ping()).await;

    // THEN: Id mismatch, and the connection was dropped
    assert!(matches!(
        result,
        Err(BridgeError::Protocol(ProtocolError::IdMismatch { ref actual, .. }))
            if actual == "someone-else"
    ));
    assert!(!client.is_connected().await);
}

/// **VALUE**: Verifies that `ping` reports an error response as an error.
///
/// **WHY THIS MATTERS**: Callers use ping as a health check. A host that answers
/// with an error is not healthy, and a bare round-trip time would say it is.
///
/// **BUG THIS CATCHES**: Would catch if `ping` only logs the error status and
/// still returns `Ok`.
#[tokio::test]
async fn given_server_answering_ping_with_error_when_pinging_then_execution_error() {
    // GIVEN: A fake server answering the ping with a correlated error response
    let listener = TcpListener::bind(format!("{LOOPBACK}:0")).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let body = read_frame(&mut stream).await.unwrap();
        let request = Request::from_bytes(&body).unwrap();
        let reply = Response::error(request.id, "host refused ping", None, "");
        write_frame(&mut stream, &reply.to_bytes().unwrap())
            .await
            .unwrap();
        TokioSleep(Duration::from_secs(1)).await;
    });
    let client = BridgeClient::new(LOOPBACK, port);
    client.connect().await.unwrap();

    // WHEN: Pinging
    let result = client.ping().await;

    // THEN: The error text comes back as an Execution error
    match result {
        Err(BridgeError::Execution { message, .. }) => assert_eq!(message, "host refused ping"),
        other => panic!("expected Execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn given_silent_server_when_sending_then_receive_timeout_and_disconnected() {
    // GIVEN: A server that reads but never answers
    let listener = TcpListener::bind(format!("{LOOPBACK}:0")).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await;
        TokioSleep(Duration::from_secs(5)).await;
    });
    let client = BridgeClient::new(LOOPBACK, port)
        .with_timeouts(Duration::from_secs(1), Duration::from_millis(100));
    client.connect().await.unwrap();

    // WHEN: Sending a ping
    let result = client.send_request(&Request::ping()).await;

    // THEN: A receive timeout, and the suspect stream is gone
    assert!(matches!(
        result,
        Err(BridgeError::ConnectionTimeout {
            operation: TimeoutOperation::Receive,
            ..
        })
    ));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn given_nothing_listening_when_connecting_then_refused() {
    let port = {
        let listener = TcpListener::bind(format!("{LOOPBACK}:0")).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = BridgeClient::new(LOOPBACK, port);

    let result = client.connect().await;

    assert!(matches!(
        result,
        Err(BridgeError::ConnectionRefused { port: p, .. }) if p == port
    ));
}

#[tokio::test]
async fn given_unconnected_client_when_sending_then_connection_closed() {
    let client = BridgeClient::new(LOOPBACK, 1);

    let result = client.send_request(&Request::ping()).await;

    assert!(matches!(result, Err(BridgeError::ConnectionClosed { .. })));
}

#[tokio::test]
async fn given_connected_client_when_connecting_again_then_no_op() {
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;

    client.connect().await.unwrap();
    client.ping().await.unwrap();
    client.disconnect().await;
    client.disconnect().await;

    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn given_host_not_yet_listening_when_connecting_with_backoff_then_eventually_connects() {
    // GIVEN: A port that only starts listening after a short delay
    let port = {
        let listener = TcpListener::bind(format!("{LOOPBACK}:0")).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    tokio::spawn(async move {
        TokioSleep(Duration::from_millis(300)).await;
        let listener = TcpListener::bind(format!("{LOOPBACK}:{port}")).await.unwrap();
        let _ = listener.accept().await;
        TokioSleep(Duration::from_secs(2)).await;
    });
    let client = BridgeClient::new(LOOPBACK, port);

    // WHEN: Connecting with backoff
    let result = client.connect_with_backoff(Duration::from_secs(10)).await;

    // THEN: Connected once the listener is up
    assert!(result.is_ok());
    assert!(client.is_connected().await);
}

/// **VALUE**: Verifies that malformed requests are answered by the transport with
/// a correlated error.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Invalid requests are silently ignored, leaving the caller to time out
/// - The error response loses the caller's id
#[tokio::test]
async fn given_unknown_method_on_wire_when_sent_then_error_response_with_same_id() {
    // GIVEN: A raw connection to the bridge
    let bridge = start_test_bridge().await;
    let mut stream = TcpStream::connect(bridge.addr).await.unwrap();

    // WHEN: Sending a request with an unknown method
    let raw = json!({"jsonrpc": "2.0", "id": "raw-1", "method": "format_disk"});
    write_frame(&mut stream, &serde_json::to_vec(&raw).unwrap())
        .await
        .unwrap();
    let response = Response::from_bytes(&read_frame(&mut stream).await.unwrap()).unwrap();

    // THEN: An error response for raw-1
    assert_eq!(response.id, "raw-1");
    assert!(response.is_error());
    assert!(response.result.error.unwrap().contains("format_disk"));
}

/// **VALUE**: Verifies that an oversized frame closes only the offending connection.
///
/// **WHY THIS MATTERS**: One misbehaving client must not take the bridge down for
/// the others.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The server tries to read the huge body
/// - A framing error stops the accept loop
#[tokio::test]
async fn given_oversize_frame_when_sent_then_only_that_connection_closed() {
    // GIVEN: A raw connection and a well-behaved client
    let bridge = start_test_bridge().await;
    let good = connected_client(&bridge).await;
    let mut bad = TcpStream::connect(bridge.addr).await.unwrap();

    // WHEN: The raw connection declares a body over the limit
    bad.write_all(&((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes())
        .await
        .unwrap();

    // THEN: The raw connection is closed by the server
    let result = read_frame(&mut bad).await;
    assert!(matches!(result, Err(BridgeError::ConnectionClosed { .. })));

    // THEN: The other client keeps working
    assert!(good.ping().await.is_ok());
}

#[tokio::test]
async fn given_stopped_server_when_pinging_then_connection_error() {
    // GIVEN: A connected client
    let bridge = start_test_bridge().await;
    let client = connected_client(&bridge).await;
    client.ping().await.unwrap();

    // WHEN: The server stops
    bridge.server.stop();
    bridge.server.stop();
    TokioSleep(Duration::from_millis(100)).await;

    // THEN: The next exchange fails at the transport level
    let result = client.ping().await;
    assert!(matches!(result, Err(ref e) if e.is_connection_error()));
    assert!(!bridge.server.is_running());
}

/// **VALUE**: Verifies that requests dropped by a stopping dispatcher are answered
/// with an explicit error.
///
/// **WHY THIS MATTERS**: Without the reply, callers only see a timeout and cannot
/// tell a shutdown from a hung host.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `stop()` discards queued messages without calling their callbacks
/// - Queued work runs on the host after stop
#[tokio::test]
async fn given_request_queued_when_dispatcher_stops_then_caller_told_it_was_dropped() {
    // GIVEN: A server whose dispatcher is started but never pumped
    let mut dispatcher = Dispatcher::new(ScriptedExecutor, dispatch_options());
    dispatcher.start();
    let server = start_bridge_server(&format!("{LOOPBACK}:0"), dispatcher.sender())
        .await
        .unwrap();
    let client = BridgeClient::new(LOOPBACK, server.local_addr().port());
    client.connect().await.unwrap();

    // GIVEN: A request waiting in the queue
    let call = tokio::spawn(async move { client.execute("print('never')", 5000).await });
    while dispatcher.queue_len() == 0 {
        TokioSleep(Duration::from_millis(5)).await;
    }

    // WHEN: The dispatcher stops
    let dropped = dispatcher.stop();

    // THEN: The caller receives the shutdown error
    assert_eq!(dropped, 1);
    match call.await.unwrap() {
        Err(BridgeError::Execution { message, .. }) => assert_eq!(message, SHUTTING_DOWN_MESSAGE),
        other => panic!("expected shutdown error, got {other:?}"),
    }
    server.shutdown().await;
}
