//! Host executor backed by an external Python interpreter.
//!
//! Each `execute_code` request runs as `<interpreter> -c <code>` in a fresh
//! child process, killed when it outlives its timeout. The "scene" is the
//! executor's own bookkeeping: what it runs and how each run ended.

use bridge_core::config::ExecutorSettings;
use bridge_core::executor::{ExecutionOutcome, HostExecutor};
use bridge_core::protocol::JsonMap;

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use serde_json::{Value, json};
use wait_timeout::ChildExt;

pub const DEFAULT_INTERPRETER: &str = "python3";

const READ_CHUNK_SIZE: usize = 8192;

/// How long the output readers may lag behind the interpreter's exit. A
/// grandchild holding the pipes open would otherwise stall the host thread.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One finished run, exposed through `get_objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    pub index: usize,
    pub success: bool,
    pub duration: Duration,
}

impl RunEntry {
    fn to_json(&self) -> Value {
        json!({
            "name": format!("run-{:04}", self.index),
            "type": "execution",
            "success": self.success,
            "duration_ms": self.duration.as_millis() as u64,
        })
    }
}

#[derive(Debug)]
pub struct PythonExecutor {
    interpreter: String,
    output_limit: usize,
    runs: Vec<RunEntry>,
}

impl PythonExecutor {
    pub fn new(interpreter: impl Into<String>, output_limit: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            output_limit,
            runs: Vec::new(),
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Self {
        Self::new(settings.interpreter.clone(), settings.max_output)
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn runs(&self) -> &[RunEntry] {
        &self.runs
    }

    fn run(&self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start interpreter '{}': {e}", self.interpreter);
                return ExecutionOutcome::failed(
                    format!("Failed to start interpreter '{}': {e}", self.interpreter),
                    None,
                    "",
                    "",
                );
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return ExecutionOutcome::failed("Interpreter output was not piped", None, "", "");
        };

        let stdout_reader = OutputReader::spawn(stdout, self.output_limit);
        let stderr_reader = OutputReader::spawn(stderr, self.output_limit);

        let (status, timed_out) = match child.wait_timeout(timeout) {
            Ok(Some(status)) => (Some(status), false),
            Ok(None) => {
                warn!("Execution exceeded {timeout:?}, killing interpreter");
                (kill_and_reap(&mut child), true)
            }
            Err(e) => {
                error!("Failed to wait for interpreter: {e}");
                (kill_and_reap(&mut child), false)
            }
        };

        let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
        let stdout = stdout_reader.collect(drain_deadline);
        let stderr = stderr_reader.collect(drain_deadline);

        debug!(
            "Interpreter finished: exit_code={:?}, timed_out={timed_out}",
            status.and_then(|s| s.code())
        );

        match status {
            _ if timed_out => ExecutionOutcome::failed(
                format!("Execution timed out after {}ms", timeout.as_millis()),
                None,
                stdout,
                stderr,
            ),
            Some(status) if status.success() => ExecutionOutcome::succeeded(stdout, stderr),
            Some(status) => {
                let message = last_error_line(&stderr)
                    .unwrap_or_else(|| format!("Interpreter exited with {status}"));
                let traceback = (!stderr.trim().is_empty()).then(|| stderr.clone());
                ExecutionOutcome::failed(message, traceback, stdout, stderr)
            }
            None => {
                ExecutionOutcome::failed("Interpreter exit status unavailable", None, stdout, stderr)
            }
        }
    }
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self::from_settings(&ExecutorSettings::default())
    }
}

impl HostExecutor for PythonExecutor {
    fn execute(&mut self, code: &str, timeout: Duration) -> ExecutionOutcome {
        let started = Instant::now();
        let outcome = self.run(code, timeout);
        self.runs.push(RunEntry {
            index: self.runs.len() + 1,
            success: outcome.success,
            duration: started.elapsed(),
        });
        outcome
    }

    fn scene_info(&mut self) -> Result<JsonMap, String> {
        let failed = self.runs.iter().filter(|run| !run.success).count();
        let mut info = JsonMap::new();
        info.insert("host".into(), json!("aether-host"));
        info.insert("interpreter".into(), json!(self.interpreter));
        info.insert("runs".into(), json!(self.runs.len()));
        info.insert("failed_runs".into(), json!(failed));
        Ok(info)
    }

    fn object_list(&mut self) -> Result<Vec<Value>, String> {
        Ok(self.runs.iter().map(RunEntry::to_json).collect())
    }
}

/// Kills `child` and waits for it, logging either failure.
pub(crate) fn kill_and_reap(child: &mut Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill() {
        warn!("Failed to kill interpreter: {e}");
    }
    match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            error!("Failed to reap interpreter: {e}");
            None
        }
    }
}

/// One interpreter pipe drained on its own thread into a shared buffer.
///
/// The thread is detached rather than joined; [`OutputReader::collect`]
/// waits for it only until a deadline and then takes what was read so far.
struct OutputReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    finished: Receiver<()>,
}

impl OutputReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, finished) = channel();

        let shared = Arc::clone(&buffer);
        thread::spawn(move || {
            read_limited(reader, limit, &shared);
            let _ = done_tx.send(());
        });

        Self { buffer, finished }
    }

    fn collect(self, deadline: Instant) -> String {
        let wait = deadline.saturating_duration_since(Instant::now());
        if let Err(RecvTimeoutError::Timeout) = self.finished.recv_timeout(wait) {
            warn!("Interpreter output still open after exit, keeping partial output");
        }

        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Reads the whole stream into `buffer`, keeping at most `limit` bytes.
fn read_limited<R: Read>(mut reader: R, limit: usize, buffer: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut dropped = 0usize;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                let keep = n.min(limit.saturating_sub(buf.len()));
                buf.extend_from_slice(&chunk[..keep]);
                dropped += n - keep;
            }
            Err(e) => {
                warn!("Failed to read interpreter output: {e}");
                break;
            }
        }
    }

    if dropped > 0 {
        debug!("Interpreter output over limit, {dropped} bytes dropped");
    }
}

/// `ZeroDivisionError: division by zero` out of a Python traceback.
pub(crate) fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
