mod config;
mod dispatch;
mod executor;
mod protocol;
mod retry;
mod transport;

use crate::dispatch::ResponseCallback;
use crate::executor::{ExecutionOutcome, HostExecutor};
use crate::protocol::{JsonMap, Response};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

/// Scriptable stand-in for the host.
pub(crate) struct FakeExecutor {
    pub calls: Vec<String>,
    pub outcome: ExecutionOutcome,
    pub scene: Result<JsonMap, String>,
    pub objects: Result<Vec<Value>, String>,
    /// Panic inside `execute` with this message.
    pub panic_with: Option<&'static str>,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        let mut scene = JsonMap::new();
        scene.insert("name".to_string(), json!("Scene"));
        Self {
            calls: Vec::new(),
            outcome: ExecutionOutcome::succeeded("ok\n", ""),
            scene: Ok(scene),
            objects: Ok(vec![json!({"name": "Cube", "type": "MESH"})]),
            panic_with: None,
        }
    }
}

impl HostExecutor for FakeExecutor {
    fn execute(&mut self, code: &str, _timeout: Duration) -> ExecutionOutcome {
        self.calls.push(code.to_string());
        if let Some(message) = self.panic_with {
            panic!("{message}");
        }
        self.outcome.clone()
    }

    fn scene_info(&mut self) -> Result<JsonMap, String> {
        self.scene.clone()
    }

    fn object_list(&mut self) -> Result<Vec<Value>, String> {
        self.objects.clone()
    }
}

/// Callback that appends every response to `store`.
pub(crate) fn capture(store: &Arc<Mutex<Vec<Response>>>) -> ResponseCallback {
    let store = Arc::clone(store);
    Box::new(move |response| store.lock().unwrap().push(response))
}
