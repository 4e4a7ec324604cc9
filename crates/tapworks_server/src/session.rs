//! # Room Session
//!
//! One client connection bound to one room.
//!
//! ```text
//! connect -> status
//! loop:
//!   request      -> apply -> [status if applied] -> response
//!   tick (500ms) -> status
//!   close        -> end
//! ```
//!
//! Requests and ticks run on the same thread, so a status write never
//! interleaves with a response write. A malformed frame, an unknown action,
//! a failed status, or a failed write ends the session.

use tapworks_economy::{parse_amount, Economy};
use tapworks_shared::{GameAction, GameRequest, GameResponse, GameStatus, ServerMessage};

use crate::error::ServerResult;
use crate::server::BroadcastTicker;
use crate::transport::{Incoming, MessageTransport};

/// Why a session ended without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
}

/// Statistics for one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Requests handled.
    pub requests: u64,
    /// Requests applied.
    pub applied: u64,
    /// Status frames sent.
    pub statuses: u64,
}

/// Applies an `add_currency` request. Any failure is logged and reported as `false`.
pub fn apply_increment(economy: &Economy, room: &str, amount: &str, time: i64) -> bool {
    let amount = match parse_amount(amount) {
        Ok(amount) => amount,
        Err(err) => {
            tracing::warn!(room, error = %err, "increment refused");
            return false;
        }
    };
    match economy.apply_increment(room, &amount, time) {
        Ok(outcome) => outcome.is_applied(),
        Err(err) => {
            tracing::warn!(room, error = %err, "increment failed");
            false
        }
    }
}

/// Applies a `buy_item` request. Any failure is logged and reported as `false`.
pub fn apply_purchase(
    economy: &Economy,
    room: &str,
    item_id: u32,
    owned_count: u32,
    time: i64,
) -> bool {
    match economy.apply_purchase(room, item_id, owned_count, time) {
        Ok(outcome) => outcome.is_applied(),
        Err(err) => {
            tracing::warn!(room, item_id, error = %err, "purchase failed");
            false
        }
    }
}

/// A client session on one room.
pub struct Session<'a, T: MessageTransport> {
    room: &'a str,
    economy: &'a Economy,
    transport: T,
    ticker: BroadcastTicker,
    stats: SessionStats,
}

impl<'a, T: MessageTransport> Session<'a, T> {
    /// Creates a session; nothing is sent until [`Session::run`].
    pub fn new(room: &'a str, economy: &'a Economy, transport: T, ticker: BroadcastTicker) -> Self {
        Self { room, economy, transport, ticker, stats: SessionStats::default() }
    }

    /// Returns session statistics.
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Serves the client until it leaves or something fails.
    ///
    /// # Errors
    ///
    /// The failure that ended the session. The transport is closed either way.
    pub fn run(&mut self) -> ServerResult<SessionEnd> {
        let result = self.serve();
        self.transport.close();
        tracing::debug!(room = self.room, stats = ?self.stats, "session ended");
        result
    }

    fn serve(&mut self) -> ServerResult<SessionEnd> {
        self.send_status()?;

        loop {
            if self.ticker.is_due() {
                self.ticker.fire();
                self.send_status()?;
                continue;
            }

            match self.transport.recv(self.ticker.time_until_due())? {
                Incoming::Idle => {}
                Incoming::Closed => return Ok(SessionEnd::ClientClosed),
                Incoming::Text(text) => {
                    let request: GameRequest = serde_json::from_str(&text)?;
                    self.handle(request)?;
                }
            }
        }
    }

    fn handle(&mut self, request: GameRequest) -> ServerResult<()> {
        tracing::debug!(room = self.room, ?request, "request");
        self.stats.requests += 1;

        let is_success = match request.action {
            GameAction::AddCurrency { ref amount } => {
                apply_increment(self.economy, self.room, amount, request.time)
            }
            GameAction::BuyItem { item_id, owned_count } => {
                apply_purchase(self.economy, self.room, item_id, owned_count, request.time)
            }
        };

        if is_success {
            self.stats.applied += 1;
            self.send_status()?;
        }

        let response = GameResponse { request_id: request.request_id, is_success };
        self.send(&ServerMessage::Response(response))
    }

    fn send_status(&mut self) -> ServerResult<()> {
        let status: GameStatus = self.economy.get_status(self.room)?;
        self.stats.statuses += 1;
        self.send(&ServerMessage::Status(status))
    }

    fn send(&mut self, message: &ServerMessage) -> ServerResult<()> {
        let text = serde_json::to_string(message)?;
        self.transport.send_text(text)
    }
}
