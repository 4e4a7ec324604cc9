//! # Transport Layer
//!
//! Message transport for a session.
//!
//! ## Design
//!
//! - [`MessageTransport`] is what the session loop sees: text in, text out
//! - Reads take a timeout so the session can interleave its broadcast tick
//! - [`WsTransport`] implements it over a blocking tungstenite socket

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use tungstenite::protocol::Message;
use tungstenite::{Error as WsError, WebSocket};

use crate::error::{ServerError, ServerResult};

/// What a read produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// Nothing arrived before the timeout.
    Idle,
    /// The client closed the connection.
    Closed,
}

/// A bidirectional text message channel.
pub trait MessageTransport {
    /// Waits up to `timeout` for the next frame.
    ///
    /// # Errors
    ///
    /// Socket or framing failure.
    fn recv(&mut self, timeout: Duration) -> ServerResult<Incoming>;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Socket or framing failure.
    fn send_text(&mut self, text: String) -> ServerResult<()>;

    /// Closes the channel. Best effort.
    fn close(&mut self);
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames sent.
    pub frames_sent: u64,
    /// Frames received.
    pub frames_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
}

/// [`MessageTransport`] over an accepted WebSocket.
pub struct WsTransport {
    socket: WebSocket<TcpStream>,
    stats: TransportStats,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").field("stats", &self.stats).finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Wraps an accepted socket.
    #[must_use]
    pub fn new(socket: WebSocket<TcpStream>) -> Self {
        Self { socket, stats: TransportStats::default() }
    }

    /// Returns transport statistics.
    #[must_use]
    pub const fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl MessageTransport for WsTransport {
    fn recv(&mut self, timeout: Duration) -> ServerResult<Incoming> {
        // A zero timeout would mean "block forever".
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.get_ref().set_read_timeout(Some(timeout))?;

        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => {
                    self.stats.frames_received += 1;
                    self.stats.bytes_received += text.len() as u64;
                    return Ok(Incoming::Text(text));
                }
                Ok(Message::Binary(bytes)) => {
                    self.stats.frames_received += 1;
                    self.stats.bytes_received += bytes.len() as u64;
                    return String::from_utf8(bytes)
                        .map(Incoming::Text)
                        .map_err(|_| ServerError::UnexpectedFrame("binary frame is not UTF-8"));
                }
                // Pongs are queued by tungstenite and flushed on the next write.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(_)) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Ok(Incoming::Closed);
                }
                Err(WsError::Io(err))
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Ok(Incoming::Idle);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn send_text(&mut self, text: String) -> ServerResult<()> {
        let len = text.len() as u64;
        self.socket.send(Message::Text(text))?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += len;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.socket.close(None) {
            tracing::debug!(error = %err, "close handshake failed");
        }
        // Drain until the peer acknowledges, or the socket gives up.
        while self.socket.flush().is_ok() {
            if self.socket.read().is_err() {
                break;
            }
        }
    }
}
