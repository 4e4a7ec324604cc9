//! # Server Error Types
//!
//! Any of these ends the session it occurred in. None of them stops the
//! process or touches other rooms.

use thiserror::Error;

use tapworks_economy::EconomyError;

/// Errors raised by the room server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket layer failed (handshake, framing, closed socket).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame was not a valid request.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// A client sent a frame the session cannot use.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    /// The economy could not produce a status.
    #[error("economy error: {0}")]
    Economy(#[from] EconomyError),

    /// Invalid server configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
