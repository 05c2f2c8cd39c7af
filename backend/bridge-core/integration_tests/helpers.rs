//! Test helpers for bridge integration tests.
//!
//! - A scripted host executor that understands a few tiny code strings
//! - A host thread pumping a dispatcher the way a real host tick would
//! - A bridge server on an ephemeral loopback port

use bridge_core::client::BridgeClient;
use bridge_core::dispatch::{DispatchOptions, Dispatcher};
use bridge_core::executor::{ExecutionOutcome, HostExecutor};
use bridge_core::protocol::JsonMap;
use bridge_core::server::{BridgeServerHandle, start_bridge_server};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, sleep, spawn};
use std::time::Duration;

use serde_json::{Value, json};

pub const LOOPBACK: &str = "127.0.0.1";
pub const HOST_TICK: Duration = Duration::from_millis(5);
pub const ZERO_DIVISION: &str = "ZeroDivisionError: division by zero";

/// Host stand-in:
/// - code containing `1/0` fails with a ZeroDivisionError
/// - `print('text')` succeeds with `text\n` on stdout
/// - `slow()` blocks the host thread for 300ms, then succeeds
/// - anything else succeeds silently
#[derive(Default)]
pub struct ScriptedExecutor;

impl HostExecutor for ScriptedExecutor {
    fn execute(&mut self, code: &str, _timeout: Duration) -> ExecutionOutcome {
        if code.contains("1/0") {
            return ExecutionOutcome::failed(
                ZERO_DIVISION,
                Some("Traceback (most recent call last):\n  File \"<string>\", line 1\nZeroDivisionError: division by zero".to_string()),
                "",
                "",
            );
        }
        if code.contains("slow()") {
            sleep(Duration::from_millis(300));
            return ExecutionOutcome::succeeded("", "");
        }
        if let Some(text) = code
            .strip_prefix("print('")
            .and_then(|rest| rest.strip_suffix("')"))
        {
            return ExecutionOutcome::succeeded(format!("{text}\n"), "");
        }
        ExecutionOutcome::succeeded("", "")
    }

    fn scene_info(&mut self) -> Result<JsonMap, String> {
        let mut info = JsonMap::new();
        info.insert("name".to_string(), json!("Scene"));
        info.insert("object_count".to_string(), json!(1));
        Ok(info)
    }

    fn object_list(&mut self) -> Result<Vec<Value>, String> {
        Ok(vec![json!({"name": "Cube", "type": "MESH"})])
    }
}

/// Owns a dispatcher on its own OS thread and ticks it until dropped.
pub struct HostThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HostThread {
    pub fn spawn(mut dispatcher: Dispatcher<ScriptedExecutor>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                match dispatcher.tick() {
                    Some(interval) => sleep(interval),
                    None => break,
                }
            }
            dispatcher.stop();
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A running server plus the host thread serving it.
pub struct TestBridge {
    pub server: BridgeServerHandle,
    pub addr: SocketAddr,
    _host: HostThread,
}

impl TestBridge {
    pub fn client(&self) -> BridgeClient {
        BridgeClient::new(LOOPBACK, self.addr.port())
    }
}

pub fn dispatch_options() -> DispatchOptions {
    DispatchOptions {
        tick_interval: HOST_TICK,
        ..DispatchOptions::default()
    }
}

/// Starts a server on an ephemeral loopback port with a pumping host thread.
pub async fn start_test_bridge() -> TestBridge {
    let mut dispatcher = Dispatcher::new(ScriptedExecutor, dispatch_options());
    dispatcher.start();

    let server = start_bridge_server(&format!("{LOOPBACK}:0"), dispatcher.sender())
        .await
        .expect("Failed to start bridge server");
    let addr = server.local_addr();

    TestBridge {
        server,
        addr,
        _host: HostThread::spawn(dispatcher),
    }
}

/// Connected client for `bridge`.
pub async fn connected_client(bridge: &TestBridge) -> BridgeClient {
    let client = bridge.client();
    client.connect().await.expect("Failed to connect to bridge");
    client
}
