//! # Connection Handling
//!
//! WebSocket handshake and room routing for one accepted TCP stream.
//!
//! Only `GET /ws/<room>` is upgraded; any other path gets a 404 during the
//! handshake.

use std::net::TcpStream;

use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::handshake::HandshakeError;
use tungstenite::http::StatusCode;
use tungstenite::{accept_hdr, WebSocket};

use tapworks_shared::WS_PATH_PREFIX;

use crate::error::{ServerError, ServerResult};

/// Room name carried by a request path, if the path is a room socket path.
#[must_use]
pub fn room_from_path(path: &str) -> Option<&str> {
    let room = path.strip_prefix(WS_PATH_PREFIX)?;
    if room.is_empty() || room.contains('/') {
        return None;
    }
    Some(room)
}

/// Performs the server handshake, returning the socket and its room.
///
/// # Errors
///
/// [`ServerError::WebSocket`] when the handshake fails or the path names no room.
pub fn accept_room(stream: TcpStream) -> ServerResult<(WebSocket<TcpStream>, String)> {
    let mut room = None;
    let callback = |request: &Request, response: Response| {
        match room_from_path(request.uri().path()) {
            Some(name) => {
                room = Some(name.to_string());
                Ok(response)
            }
            None => {
                let mut error = ErrorResponse::new(Some(format!(
                    "expected {WS_PATH_PREFIX}<room>, got {}",
                    request.uri().path()
                )));
                *error.status_mut() = StatusCode::NOT_FOUND;
                Err(error)
            }
        }
    };

    let socket = accept_hdr(stream, callback).map_err(map_handshake_error)?;
    let room = room.ok_or(ServerError::UnexpectedFrame("handshake carried no room"))?;
    Ok((socket, room))
}

fn map_handshake_error<S>(err: HandshakeError<S>) -> ServerError
where
    S: tungstenite::handshake::HandshakeRole,
{
    match err {
        HandshakeError::Failure(error) => ServerError::WebSocket(error),
        HandshakeError::Interrupted(_) => ServerError::Io(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "websocket handshake interrupted",
        )),
    }
}
