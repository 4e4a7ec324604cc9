//! # TAPWORKS Server
//!
//! WebSocket front end for the room economy.
//!
//! ## Architecture
//!
//! - **Server**: accept loop, one thread per connection, `/ws/<room>` routing
//! - **Session**: status on connect, requests answered in order, 500ms broadcast
//! - **Hosts**: room-to-host assignment with per-host member counters
//! - **Config**: TOML file with command-line overrides
//!
//! ## Message Flow
//!
//! ```text
//! CLIENT                              SERVER
//!   |                                   |
//!   |<-- status ------------------------| on connect
//!   |--- {"action":"buy_item",...} ---->|
//!   |<-- status ------------------------| only if applied
//!   |<-- {"request_id":..,"is_success"}-|
//!   |<-- status ------------------------| every 500ms
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tapworks_server::{LocalHostDirectory, RoomServer, ServerConfig};
//!
//! let config = ServerConfig::load("config/server.toml")?;
//! let hosts = Arc::new(LocalHostDirectory::new(config.hosts.clone()));
//! let server = RoomServer::bind(config, economy, hosts)?;
//! server.run()?; // Blocks until shut down
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod hosts;
pub mod server;
pub mod session;
pub mod transport;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use hosts::{HostDirectory, LocalHostDirectory};
pub use server::{BroadcastTicker, RoomServer, ShutdownHandle, TickStats};
pub use session::{apply_increment, apply_purchase, Session, SessionEnd, SessionStats};
pub use transport::{Incoming, MessageTransport, TransportStats, WsTransport};
