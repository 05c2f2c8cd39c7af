//! Owned bridge lifecycle for a host process.
//!
//! A [`BridgeService`] is created when the host enables the bridge and
//! dropped when it disables it. It owns the transport runtime, the server
//! and the dispatcher; the host keeps it on its mutation thread and calls
//! [`BridgeService::tick`] from its own scheduler.
//!
//! The host thread must not itself be inside a tokio runtime: the service
//! blocks on its own runtime while starting and stopping.

use crate::config::BridgeConfig;
use crate::dispatch::{DispatchSender, Dispatcher};
use crate::error::ServiceError;
use crate::executor::HostExecutor;
use crate::server::{BridgeServerHandle, start_bridge_server};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::{Builder as RuntimeBuilder, Handle, Runtime};

const RUNTIME_THREAD_NAME: &str = "aether-bridge";

pub struct BridgeService<E: HostExecutor> {
    runtime: Option<Runtime>,
    server: Option<BridgeServerHandle>,
    dispatcher: Dispatcher<E>,
}

impl<E: HostExecutor> BridgeService<E> {
    /// Starts the dispatcher, then the server on `config.server`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Runtime`] if the transport runtime cannot be built
    /// - [`ServiceError::ServerStart`] if the listener cannot bind
    pub fn enable(config: &BridgeConfig, executor: E) -> Result<Self, ServiceError> {
        let address = config.server.address();
        info!("Enabling bridge on {address}");

        let runtime = RuntimeBuilder::new_multi_thread()
            .enable_all()
            .thread_name(RUNTIME_THREAD_NAME)
            .build()
            .map_err(|e| ServiceError::Runtime {
                message: format!("Failed to build transport runtime: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut dispatcher = Dispatcher::new(executor, config.dispatch_options());
        dispatcher.start();

        let server = runtime
            .block_on(start_bridge_server(&address, dispatcher.sender()))
            .map_err(|source| ServiceError::ServerStart {
                message: format!("Failed to start bridge server on {address}"),
                location: ErrorLocation::from(Location::caller()),
                source,
            })?;

        info!("Bridge enabled on {}", server.local_addr());
        Ok(Self {
            runtime: Some(runtime),
            server: Some(server),
            dispatcher,
        })
    }

    /// Host periodic hook. Returns the delay until the next call, or `None`
    /// once the bridge is stopped.
    pub fn tick(&mut self) -> Option<Duration> {
        self.dispatcher.tick()
    }

    pub fn is_enabled(&self) -> bool {
        self.server.as_ref().is_some_and(BridgeServerHandle::is_running)
            && self.dispatcher.is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(BridgeServerHandle::local_addr)
    }

    pub fn client_count(&self) -> usize {
        self.server
            .as_ref()
            .map_or(0, BridgeServerHandle::client_count)
    }

    pub fn sender(&self) -> DispatchSender {
        self.dispatcher.sender()
    }

    pub fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<E> {
        &mut self.dispatcher
    }

    /// Handle to the transport runtime, for host-side background work such
    /// as signal listeners.
    pub fn runtime_handle(&self) -> Option<Handle> {
        self.runtime.as_ref().map(|runtime| runtime.handle().clone())
    }

    /// Stops the dispatcher, then the server, then the runtime.
    pub fn disable(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.runtime.is_none() {
            return;
        }
        info!("Disabling bridge");

        // Dropped requests are answered while their connections are still open.
        let dropped = self.dispatcher.stop();
        debug!("Dispatcher stopped, {dropped} requests dropped");

        if let (Some(server), Some(runtime)) = (self.server.take(), self.runtime.as_ref()) {
            if Handle::try_current().is_ok() {
                warn!("Bridge disabled from inside an async context, not waiting for connections");
                server.stop();
            } else {
                runtime.block_on(server.shutdown());
            }
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("Bridge disabled");
    }
}

impl<E: HostExecutor> Drop for BridgeService<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
