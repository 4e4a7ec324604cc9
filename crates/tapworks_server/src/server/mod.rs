//! # Room Server
//!
//! Accepts WebSocket connections and runs one [`Session`] per connection on
//! its own thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ROOM SERVER                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  accept loop ──► thread per connection ──► Session           │
//! │       ▲                │                      │              │
//! │  shutdown rx      HostDirectory            Economy           │
//! │                 (member counters)   (room locks, ledger)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions share the [`Economy`] and the [`HostDirectory`]; nothing else is
//! shared between connections.

mod connection;
mod tick;

pub use connection::{accept_room, room_from_path};
pub use tick::{BroadcastTicker, TickStats};

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use tapworks_economy::Economy;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::hosts::HostDirectory;
use crate::session::{Session, SessionEnd};
use crate::transport::WsTransport;

/// How often the accept loop checks for shutdown when idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stops a running [`RoomServer`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Sender<()>,
}

impl ShutdownHandle {
    /// Asks the accept loop to stop. Open sessions run until their client leaves.
    pub fn shutdown(&self) {
        // The receiver is gone only if the server already stopped.
        let _ = self.tx.try_send(());
    }
}

/// State every connection thread needs.
struct Shared {
    config: ServerConfig,
    economy: Arc<Economy>,
    hosts: Arc<dyn HostDirectory>,
}

/// The room server.
pub struct RoomServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
}

impl std::fmt::Debug for RoomServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomServer")
            .field("listener", &self.listener)
            .field("host_name", &self.shared.config.host_name)
            .finish_non_exhaustive()
    }
}

impl RoomServer {
    /// Binds the listener. Connections are accepted once [`RoomServer::run`] is called.
    ///
    /// # Errors
    ///
    /// [`crate::ServerError::Io`] if the address cannot be bound.
    pub fn bind(
        config: ServerConfig,
        economy: Arc<Economy>,
        hosts: Arc<dyn HostDirectory>,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(&config.bind_address)?;
        listener.set_nonblocking(true)?;
        let (shutdown_tx, shutdown_rx) = bounded(1);

        Ok(Self { listener, shared: Arc::new(Shared { config, economy, hosts }), shutdown_tx, shutdown_rx })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Socket failure.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`RoomServer::run`].
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.shutdown_tx.clone() }
    }

    /// Accepts connections until shut down.
    ///
    /// # Errors
    ///
    /// A listener failure other than "no connection pending".
    pub fn run(&self) -> ServerResult<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            host = %self.shared.config.host_name,
            "room server listening"
        );

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    thread::Builder::new()
                        .name(format!("session-{peer}"))
                        .spawn(move || serve_connection(&shared, stream, peer))?;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!("room server stopped");
        Ok(())
    }
}

fn serve_connection(shared: &Shared, stream: TcpStream, peer: SocketAddr) {
    if let Err(err) = stream.set_nonblocking(false).and_then(|()| stream.set_nodelay(true)) {
        tracing::warn!(%peer, error = %err, "failed to configure stream");
        return;
    }

    let (socket, room) = match accept_room(stream) {
        Ok(accepted) => accepted,
        Err(err) => {
            tracing::warn!(%peer, error = %err, "handshake failed");
            return;
        }
    };
    tracing::info!(%peer, room = %room, "session opened");

    match shared.hosts.host_for_room(&room) {
        Ok(host) if host != shared.config.host_name => {
            tracing::warn!(room = %room, assigned = %host, "room is assigned to another host");
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(room = %room, error = %err, "host lookup failed"),
    }
    if let Err(err) = shared.hosts.add_member(&room) {
        tracing::warn!(room = %room, error = %err, "failed to count member");
    }

    let ticker = BroadcastTicker::new(shared.config.broadcast_interval());
    let mut session = Session::new(&room, &shared.economy, WsTransport::new(socket), ticker);
    match session.run() {
        Ok(SessionEnd::ClientClosed) => tracing::info!(%peer, room = %room, "session closed"),
        Err(err) => tracing::warn!(%peer, room = %room, error = %err, "session failed"),
    }

    if let Err(err) = shared.hosts.leave_member(&room) {
        tracing::warn!(room = %room, error = %err, "failed to uncount member");
    }
}
