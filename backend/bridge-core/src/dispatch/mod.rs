//! Hand-off of requests from transport tasks to the host's single thread.
//!
//! # Architecture
//!
//! - Connection tasks call [`DispatchSender::enqueue`] from any thread; it
//!   never blocks and never touches host state.
//! - The host drives [`Dispatcher::tick`] from its own periodic scheduler.
//!   Each tick drains at most `max_per_tick` messages and runs them through
//!   the [`HostExecutor`](crate::executor::HostExecutor) it owns.
//! - Every [`QueuedMessage`] carries its own reply callback, so results find
//!   their way back without this module knowing about sockets.
//!
//! A message moves from the enqueuing thread to the host thread by value;
//! neither side ever holds it at the same time.

mod handlers;
mod queue;

pub use queue::{DispatchOptions, DispatchSender, Dispatcher, QueuedMessage, ResponseCallback};

/// Error text sent to callers whose queued request is dropped by `stop()`.
pub const SHUTTING_DOWN_MESSAGE: &str = "Bridge shutting down; request dropped";

/// Error text sent to callers that enqueue after the dispatcher stopped.
pub const NOT_RUNNING_MESSAGE: &str = "Bridge is not running";
