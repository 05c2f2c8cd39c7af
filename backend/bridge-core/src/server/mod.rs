//! TCP server accepting bridge clients on the host side.
//!
//! The accept loop runs as its own task and hands every connection to a
//! dedicated task, so it never waits on client I/O. Connection tasks decode
//! requests and pass them to the [`DispatchSender`]; they never call into the
//! host.
//!
//! # Security
//!
//! - Intended for a single trusted local peer: no TLS, no authentication
//! - Non-loopback peers are dropped on accept

mod connection;
mod handle;

pub use handle::BridgeServerHandle;

use crate::dispatch::DispatchSender;
use crate::error::BridgeError;
use crate::server::connection::{ConnectionGuard, handle_connection};

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::spawn as TokioSpawn;
use tokio::sync::watch;

/// Binds `address` and starts accepting clients in the background.
///
/// Must be called from within a tokio runtime; all spawned tasks live on it.
///
/// # Errors
///
/// Returns [`BridgeError::Io`] if the address cannot be bound (port in use,
/// insufficient permissions, unresolvable host).
pub async fn start_bridge_server(
    address: &str,
    dispatch: DispatchSender,
) -> Result<BridgeServerHandle, BridgeError> {
    let listener = TcpListener::bind(address).await?;
    let local_addr = listener.local_addr()?;

    info!("Bridge server listening on {local_addr}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clients = Arc::new(AtomicUsize::new(0));
    let accept_clients = Arc::clone(&clients);

    let accept_task = TokioSpawn(async move {
        let mut shutdown = shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if !addr.ip().is_loopback() {
                            warn!("Rejected non-loopback connection from {addr}");
                            continue;
                        }
                        info!("New connection from {addr}");
                        let guard = ConnectionGuard::new(Arc::clone(&accept_clients));
                        TokioSpawn(handle_connection(
                            stream,
                            addr,
                            dispatch.clone(),
                            shutdown_rx.clone(),
                            guard,
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {e}");
                    }
                },
            }
        }
        info!("Accept loop ended");
    });

    Ok(BridgeServerHandle::new(
        local_addr,
        shutdown_tx,
        clients,
        accept_task,
    ))
}
