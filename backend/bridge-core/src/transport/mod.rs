//! Length-prefixed framing over any async byte stream.
//!
//! ```text
//! [4-byte big-endian length N][N bytes UTF-8 JSON]
//! ```
//!
//! Writers emit header and body with a single `write_all` so that, under the
//! caller's per-connection lock, two senders can never interleave partial
//! frames. Readers loop until the exact byte counts arrive; a zero-byte read
//! always means the peer closed the stream.

use crate::error::{BridgeError, ProtocolError};

use common::ErrorLocation;

use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_SIZE: usize = 4;

/// Largest body either side will send or accept (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Builds header + body as one contiguous buffer.
///
/// # Errors
///
/// Returns [`ProtocolError::MessageTooLarge`] when `body` exceeds
/// [`MAX_MESSAGE_SIZE`]; nothing is produced in that case.
#[track_caller]
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Writes one frame. Callers sharing a stream must hold its lock.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(body)?;
    debug!(
        "Sending frame: body_length={}, total_length={}",
        body.len(),
        frame.len()
    );

    writer
        .write_all(&frame)
        .await
        .map_err(|e| BridgeError::ConnectionClosed {
            reason: format!("Send failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame and returns its body.
///
/// # Errors
///
/// - [`BridgeError::ConnectionClosed`] if the peer closes the stream, before
///   or in the middle of a frame
/// - [`ProtocolError::MessageTooLarge`] if the header declares more than
///   [`MAX_MESSAGE_SIZE`]; no body bytes are read
/// - [`BridgeError::Framing`] if the header declares an empty body
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, BridgeError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_closed(reader, &mut header).await?;

    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: length,
            max: MAX_MESSAGE_SIZE,
            location: ErrorLocation::from(Location::caller()),
        }
        .into());
    }
    if length == 0 {
        return Err(BridgeError::Framing {
            expected: 1,
            actual: 0,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    debug!("Receiving frame: expected_length={length}");
    let mut body = vec![0u8; length];
    read_exact_or_closed(reader, &mut body).await?;
    debug!("Received frame: actual_length={}", body.len());

    Ok(body)
}

/// Fills `buffer` completely, one `read` at a time.
async fn read_exact_or_closed<R>(reader: &mut R, buffer: &mut [u8]) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader
            .read(&mut buffer[filled..])
            .await
            .map_err(lost_or_io)?;
        if read == 0 {
            return Err(BridgeError::ConnectionClosed {
                reason: format!(
                    "Connection closed by remote after {filled} of {} bytes",
                    buffer.len()
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        trace!("Read {read} bytes ({}/{})", filled + read, buffer.len());
        filled += read;
    }
    Ok(())
}

/// A reset or aborted stream is the peer going away, not a local I/O fault.
#[track_caller]
fn lost_or_io(error: IoError) -> BridgeError {
    match error.kind() {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            BridgeError::ConnectionClosed {
                reason: format!("Connection lost: {error}"),
                location: ErrorLocation::from(Location::caller()),
            }
        }
        _ => BridgeError::from(error),
    }
}
