use crate::dispatch::handlers::handle_request;
use crate::dispatch::{NOT_RUNNING_MESSAGE, SHUTTING_DOWN_MESSAGE};
use crate::error::HandlerError;
use crate::executor::{HostExecutor, MAX_OUTPUT_SIZE};
use crate::protocol::{Request, Response};

use common::ErrorLocation;

use std::any::Any;
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Default interval between pump ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default cap on messages handled per tick.
pub const DEFAULT_MAX_PER_TICK: usize = 10;

/// Delivers the response for one request back to its origin.
pub type ResponseCallback = Box<dyn FnOnce(Response) + Send + 'static>;

/// A request together with the callback that answers it.
pub struct QueuedMessage {
    pub request: Request,
    reply: ResponseCallback,
}

impl QueuedMessage {
    pub fn new(request: Request, reply: ResponseCallback) -> Self {
        Self { request, reply }
    }

    /// Consumes the message, handing `response` to its origin.
    pub fn respond(self, response: Response) {
        (self.reply)(response);
    }

    /// Answers with an error response correlated to this request.
    pub fn reject(self, error: &str) {
        let response = Response::error(self.request.id.clone(), error, None, "");
        self.respond(response);
    }
}

/// Tuning knobs for the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub tick_interval: Duration,
    pub max_per_tick: usize,
    /// Cap on captured stdout/stderr, in characters.
    pub max_output: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_per_tick: DEFAULT_MAX_PER_TICK,
            max_output: MAX_OUTPUT_SIZE,
        }
    }
}

/// Thread-safe producer side of the dispatch queue.
///
/// This type is `Clone`; every clone feeds the same dispatcher.
#[derive(Clone)]
pub struct DispatchSender {
    tx: UnboundedSender<QueuedMessage>,
    running: Arc<AtomicBool>,
}

impl DispatchSender {
    /// Queues `message` for the host thread.
    ///
    /// Never blocks. If the dispatcher is stopped the message is answered
    /// immediately with an error instead of being queued.
    pub fn enqueue(&self, message: QueuedMessage) {
        debug!(
            "Enqueuing message {} ({})",
            message.request.id, message.request.method
        );

        if !self.running.load(Ordering::SeqCst) {
            warn!(
                "Rejecting message {}: dispatcher not running",
                message.request.id
            );
            message.reject(NOT_RUNNING_MESSAGE);
            return;
        }

        if let Err(rejected) = self.tx.send(message) {
            warn!(
                "Rejecting message {}: dispatch queue closed",
                rejected.0.request.id
            );
            rejected.0.reject(NOT_RUNNING_MESSAGE);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Host-thread consumer of the dispatch queue.
///
/// Owns the executor. Not `Sync`, and meant to stay on the thread that
/// created it.
pub struct Dispatcher<E: HostExecutor> {
    rx: UnboundedReceiver<QueuedMessage>,
    tx: UnboundedSender<QueuedMessage>,
    running: Arc<AtomicBool>,
    hook_registered: bool,
    executor: E,
    options: DispatchOptions,
}

impl<E: HostExecutor> Dispatcher<E> {
    pub fn new(executor: E, options: DispatchOptions) -> Self {
        debug!(
            "Initializing dispatcher: tick_interval={:?}, max_per_tick={}",
            options.tick_interval, options.max_per_tick
        );
        let (tx, rx) = unbounded_channel();
        Self {
            rx,
            tx,
            running: Arc::new(AtomicBool::new(false)),
            hook_registered: false,
            executor,
            options,
        }
    }

    /// Producer handle for transport tasks.
    pub fn sender(&self) -> DispatchSender {
        DispatchSender {
            tx: self.tx.clone(),
            running: Arc::clone(&self.running),
        }
    }

    /// Starts accepting and processing messages; the host should begin
    /// calling [`tick`](Self::tick) every `tick_interval`.
    pub fn start(&mut self) {
        info!("Starting dispatcher");
        self.running.store(true, Ordering::SeqCst);
        self.hook_registered = true;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the host should keep calling [`tick`](Self::tick).
    pub fn is_hook_registered(&self) -> bool {
        self.hook_registered
    }

    pub fn queue_len(&self) -> usize {
        self.rx.len()
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Periodic hook body. Returns the delay until the next call, or `None`
    /// once the dispatcher is stopped and the hook should be dropped.
    pub fn tick(&mut self) -> Option<Duration> {
        if !self.is_running() {
            debug!("Dispatcher tick after stop, deregistering hook");
            self.hook_registered = false;
            return None;
        }

        self.pump();
        Some(self.options.tick_interval)
    }

    /// Processes up to `max_per_tick` queued messages and returns how many
    /// were handled. Leftovers wait for the next call.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;

        while processed < self.options.max_per_tick {
            let Ok(message) = self.rx.try_recv() else {
                break;
            };
            self.process(message);
            processed += 1;
        }

        if processed > 0 {
            debug!(
                "Processed {processed} messages, {} still queued",
                self.rx.len()
            );
        }
        processed
    }

    /// Stops processing. Idempotent.
    ///
    /// Anything still queued is not executed; each origin is told the
    /// request was dropped. Returns the number of dropped messages.
    pub fn stop(&mut self) -> usize {
        if self.is_running() {
            info!("Stopping dispatcher");
        }
        self.running.store(false, Ordering::SeqCst);
        self.hook_registered = false;
        self.rx.close();

        let mut dropped = 0;
        while let Ok(message) = self.rx.try_recv() {
            debug!("Dropping queued message {}", message.request.id);
            message.reject(SHUTTING_DOWN_MESSAGE);
            dropped += 1;
        }

        if dropped > 0 {
            warn!("Dispatcher stopped with {dropped} unprocessed messages");
        }
        dropped
    }

    fn process(&mut self, message: QueuedMessage) {
        let QueuedMessage { request, reply } = message;
        debug!("Processing message {} ({})", request.id, request.method);

        // A panicking host call fails this message only; the pump keeps going.
        let handled = catch_unwind(AssertUnwindSafe(|| {
            handle_request(&mut self.executor, &request, &self.options)
        }))
        .unwrap_or_else(|payload| {
            Err(HandlerError::Panicked {
                message: panic_message(payload.as_ref()),
                location: ErrorLocation::from(Location::caller()),
            })
        });

        let response = match handled {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing message {}: {e}", request.id);
                Response::error(request.id.clone(), e.response_message(), None, "")
            }
        };

        reply(response);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<E: HostExecutor> Drop for Dispatcher<E> {
    fn drop(&mut self) {
        self.stop();
    }
}
