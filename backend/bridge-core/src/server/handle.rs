use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

/// How long [`BridgeServerHandle::shutdown`] waits for connections to flush
/// their last replies.
const CONNECTION_DRAIN_GRACE: Duration = Duration::from_secs(1);
const CONNECTION_DRAIN_POLL: Duration = Duration::from_millis(10);

/// Handle to a running bridge server.
///
/// Returned by [`start_bridge_server`](crate::server::start_bridge_server).
/// Dropping the handle stops the server.
pub struct BridgeServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    clients: Arc<AtomicUsize>,
    accept_task: Option<JoinHandle<()>>,
}

impl BridgeServerHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown_tx: watch::Sender<bool>,
        clients: Arc<AtomicUsize>,
        accept_task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_addr,
            shutdown_tx,
            clients,
            accept_task: Some(accept_task),
        }
    }

    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Number of connections currently being served.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Signals the accept loop and every connection task to finish. Idempotent.
    pub fn stop(&self) {
        if self.is_running() {
            info!("Stopping bridge server on {}", self.local_addr);
        }
        self.shutdown_tx.send_replace(true);
    }

    /// Stops the server, waits for the accept loop to exit and gives open
    /// connections a short grace period to flush queued replies.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!("Accept loop ended abnormally: {e}");
            }
        }

        let deadline = Instant::now() + CONNECTION_DRAIN_GRACE;
        while self.client_count() > 0 && Instant::now() < deadline {
            TokioSleep(CONNECTION_DRAIN_POLL).await;
        }
        if self.client_count() > 0 {
            warn!(
                "{} connections still open after {CONNECTION_DRAIN_GRACE:?}",
                self.client_count()
            );
        }

        info!("Bridge server stopped");
    }
}

impl Drop for BridgeServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
