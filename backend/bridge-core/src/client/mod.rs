//! External-side client for the bridge.
//!
//! One TCP connection, one exchange at a time: [`BridgeClient::send_request`]
//! holds the connection lock for the full send + receive round trip, so
//! concurrent callers serialize instead of interleaving frames.
//!
//! The stream is moved out of the client for the duration of an exchange and
//! only put back once a well-formed, correctly correlated response arrived.
//! A timeout, a framing error, a cancelled call or a mismatched id therefore
//! leaves the client disconnected rather than holding a suspect stream.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ProtocolError, TimeoutOperation};
use crate::protocol::{JsonMap, Request, Response};
use crate::transport::{read_frame, write_frame};
use crate::{DEFAULT_HOST, DEFAULT_PORT};

use common::ErrorLocation;

use std::panic::Location;
use std::time::{Duration, Instant};

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

const NOT_CONNECTED: &str = "Not connected";

/// Payload of a successful `execute_code` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutput {
    pub data: JsonMap,
    /// Captured stdout.
    pub logs: String,
}

pub struct BridgeClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl Default for BridgeClient {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl BridgeClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        debug!("Initializing BridgeClient for {host}:{port}");
        Self {
            host,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.server.host.clone(), config.server.port).with_timeouts(
            config.client.connect_timeout(),
            config.client.read_timeout(),
        )
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for any in-flight exchange to finish.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Opens the connection. No-op when already connected.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ConnectionTimeout`] (`connect`) when the connect
    ///   timeout elapses
    /// - [`BridgeError::ConnectionRefused`] for any other connect failure
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let mut slot = self.stream.lock().await;
        if slot.is_some() {
            debug!("Already connected");
            return Ok(());
        }

        debug!("Attempting to connect to {}:{}", self.host, self.port);
        let connecting = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match TokioTimeout(self.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Connection to {}:{} refused: {e}", self.host, self.port);
                return Err(BridgeError::ConnectionRefused {
                    host: self.host.clone(),
                    port: self.port,
                    message: e.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Err(_) => {
                error!("Connection to {}:{} timed out", self.host, self.port);
                return Err(BridgeError::ConnectionTimeout {
                    operation: TimeoutOperation::Connect,
                    timeout: self.connect_timeout,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {e}");
        }

        info!("Connected to {}:{}", self.host, self.port);
        *slot = Some(stream);
        Ok(())
    }

    /// Connects, retrying refused or timed-out attempts with exponential
    /// backoff until `max_elapsed` has passed. Meant for a host that is
    /// still starting up.
    pub async fn connect_with_backoff(&self, max_elapsed: Duration) -> Result<(), BridgeError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };

        loop {
            let error = match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_connection_error() => e,
                Err(e) => return Err(e),
            };

            match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Host not ready, retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    warn!("Giving up connecting after {max_elapsed:?}");
                    return Err(error);
                }
            }
        }
    }

    /// Closes the connection. No-op when not connected.
    pub async fn disconnect(&self) {
        debug!("Disconnecting");
        let stream = self.stream.lock().await.take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.shutdown().await {
                debug!("Socket shutdown failed: {e}");
            }
            info!("Disconnected from {}:{}", self.host, self.port);
        }
    }

    /// Sends `request` and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ConnectionClosed`] when not connected or the peer
    ///   closes mid-exchange
    /// - [`BridgeError::ConnectionTimeout`] (`receive`) when no response
    ///   arrives within the read timeout
    /// - [`ProtocolError::IdMismatch`] when the response answers a different
    ///   request
    pub async fn send_request(&self, request: &Request) -> Result<Response, BridgeError> {
        debug!("Sending request {} ({})", request.id, request.method);
        let body = request.to_bytes()?;

        let mut slot = self.stream.lock().await;
        let mut stream = slot.take().ok_or_else(|| BridgeError::ConnectionClosed {
            reason: NOT_CONNECTED.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let response = self.exchange(&mut stream, request, &body).await?;

        *slot = Some(stream);
        Ok(response)
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        request: &Request,
        body: &[u8],
    ) -> Result<Response, BridgeError> {
        write_frame(stream, body).await?;

        let frame = TokioTimeout(self.read_timeout, read_frame(stream))
            .await
            .map_err(|_| {
                error!("Receive timeout for request {}", request.id);
                BridgeError::ConnectionTimeout {
                    operation: TimeoutOperation::Receive,
                    timeout: self.read_timeout,
                    location: ErrorLocation::from(Location::caller()),
                }
            })??;

        let response = Response::from_bytes(&frame)?;
        if response.id != request.id {
            error!(
                "Response id mismatch: expected {}, got {}",
                request.id, response.id
            );
            return Err(ProtocolError::IdMismatch {
                expected: request.id.clone(),
                actual: response.id,
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }

        debug!(
            "Received response {} ({})",
            response.id,
            response.result.status.as_str()
        );
        Ok(response)
    }

    /// Round-trip time of a `ping`.
    ///
    /// # Errors
    ///
    /// An error response becomes [`BridgeError::Execution`].
    pub async fn ping(&self) -> Result<Duration, BridgeError> {
        let started = Instant::now();
        let response = self.send_request(&Request::ping()).await?;
        let elapsed = started.elapsed();

        if response.is_error() {
            warn!(
                "Ping returned error: {}",
                response.result.error.as_deref().unwrap_or_default()
            );
            return Err(execution_error(response, "Ping failed"));
        }
        debug!("Ping successful in {elapsed:?}");
        Ok(elapsed)
    }

    /// Runs `code` in the host.
    ///
    /// # Errors
    ///
    /// An error response becomes [`BridgeError::Execution`] carrying the
    /// error text, traceback, stdout and stderr.
    pub async fn execute(&self, code: &str, timeout_ms: u64) -> Result<ExecuteOutput, BridgeError> {
        debug!(
            "Executing code: code_length={}, timeout_ms={timeout_ms}",
            code.len()
        );
        let response = self
            .send_request(&Request::execute(code, timeout_ms))
            .await?;

        if response.is_error() {
            error!(
                "Execution failed: {}",
                response.result.error.as_deref().unwrap_or_default()
            );
            return Err(execution_error(response, "Unknown error"));
        }

        Ok(ExecuteOutput {
            data: response.result.data,
            logs: response.result.logs,
        })
    }

    pub async fn query(&self, query: &str) -> Result<JsonMap, BridgeError> {
        debug!("Querying scene: {query}");
        let response = self.send_request(&Request::query(query)).await?;

        if response.is_error() {
            return Err(execution_error(response, "Query failed"));
        }
        Ok(response.result.data)
    }

    pub async fn get_objects(&self) -> Result<Vec<Value>, BridgeError> {
        let response = self.send_request(&Request::get_objects()).await?;

        if response.is_error() {
            return Err(execution_error(response, "Object listing failed"));
        }

        match response.result.data.get("objects") {
            Some(Value::Array(objects)) => Ok(objects.clone()),
            None => Ok(Vec::new()),
            Some(_) => Err(ProtocolError::InvalidMessage {
                message: "Field 'data.objects' must be an array".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
            .into()),
        }
    }

    /// Asks the host to acknowledge a shutdown; the host decides when to
    /// tear the bridge down.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        let response = self.send_request(&Request::shutdown()).await?;
        if response.is_error() {
            return Err(execution_error(response, "Shutdown refused"));
        }
        Ok(())
    }
}

#[track_caller]
fn execution_error(response: Response, fallback: &str) -> BridgeError {
    let result = response.result;
    let stderr = result
        .data
        .get("stderr")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    BridgeError::Execution {
        message: result.error.unwrap_or_else(|| fallback.to_string()),
        traceback: result.traceback,
        stdout: result.logs,
        stderr,
        location: ErrorLocation::from(Location::caller()),
    }
}
