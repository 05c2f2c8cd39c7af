//! Per-connection task: read frames, decode, enqueue, write replies.

use crate::dispatch::{DispatchSender, QueuedMessage};
use crate::error::BridgeError;
use crate::protocol::{Request, Response, peek_request_id};
use crate::transport::{read_frame, write_frame};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{Mutex, watch};

/// Keeps the live-connection counter accurate however the task ends.
pub(crate) struct ConnectionGuard {
    clients: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub(crate) fn new(clients: Arc<AtomicUsize>) -> Self {
        clients.fetch_add(1, Ordering::SeqCst);
        Self { clients }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Write half shared by everything that answers on one connection.
type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Serves one client until it disconnects, sends an unusable frame, or the
/// server shuts down.
///
/// Replies produced on the host thread travel through an unbounded channel
/// to a writer task, preserving their order; every write takes the
/// connection's writer lock.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatch: DispatchSender,
    mut shutdown: watch::Receiver<bool>,
    _guard: ConnectionGuard,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {addr}: {e}");
    }

    let (mut reader, writer) = stream.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let (reply_tx, reply_rx) = unbounded_channel::<Response>();

    let writer_task = TokioSpawn(write_replies(
        reply_rx,
        Arc::clone(&writer),
        addr,
        shutdown.clone(),
    ));

    info!("Handling client {addr}");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                debug!("Server shutdown, closing {addr}");
                break;
            }
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(body) => {
                debug!("Received message from {addr}");
                route_message(&body, &dispatch, &reply_tx, &writer, addr).await;
            }
            Err(BridgeError::ConnectionClosed { .. }) => break,
            Err(e) => {
                warn!("Discarding connection {addr}: {e}");
                break;
            }
        }
    }

    drop(reply_tx);
    if let Err(e) = writer_task.await {
        error!("Reply writer for {addr} ended abnormally: {e}");
    }

    info!("Client {addr} disconnected");
}

async fn route_message(
    body: &[u8],
    dispatch: &DispatchSender,
    reply_tx: &UnboundedSender<Response>,
    writer: &SharedWriter,
    addr: SocketAddr,
) {
    match Request::from_bytes(body) {
        Ok(request) => {
            let reply_tx = reply_tx.clone();
            let request_id = request.id.clone();
            let reply = Box::new(move |response: Response| {
                if reply_tx.send(response).is_err() {
                    warn!("Client for request {request_id} is gone, dropping response");
                }
            });
            dispatch.enqueue(QueuedMessage::new(request, reply));
        }
        Err(e) => {
            warn!("Invalid request from {addr}: {e}");
            let response = Response::error(peek_request_id(body), e.to_string(), None, "");
            send_response(writer, &response, addr).await;
        }
    }
}

async fn write_replies(
    mut replies: UnboundedReceiver<Response>,
    writer: SharedWriter,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            reply = replies.recv() => match reply {
                Some(response) => send_response(&writer, &response, addr).await,
                None => break,
            },
            _ = shutdown.changed() => {
                // Flush what is already queued, then stop.
                replies.close();
                while let Ok(response) = replies.try_recv() {
                    send_response(&writer, &response, addr).await;
                }
                break;
            }
        }
    }

    let mut writer = writer.lock().await;
    if let Err(e) = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await {
        debug!("Shutdown of {addr} write half failed: {e}");
    }
}

/// Encodes and writes one response under the connection's writer lock.
async fn send_response(writer: &SharedWriter, response: &Response, addr: SocketAddr) {
    let body = match response.to_bytes() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode response {}: {e}", response.id);
            return;
        }
    };

    let mut writer = writer.lock().await;
    if let Err(e) = write_frame(&mut *writer, &body).await {
        error!("Failed to send response {} to {addr}: {e}", response.id);
    }
}
