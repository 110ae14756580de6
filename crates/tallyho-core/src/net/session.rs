//! Network session: connection lifecycle, line framing and ping deadline.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!      ▲                          │                 │
//!      └──────────── error ───────┘                 │
//!      └─── transport error / ping deadline passed ─┘
//! ```
//!
//! The transport gives no signal when a Wi-Fi link silently dies, so the
//! session requires the server to send a `PING` at least every
//! [`PING_PERIOD`]. The deadline is armed on connect, re-armed by each ping,
//! and disarmed when it expires so that one dead link produces exactly one
//! expiry.

use alloc::string::String;

use embassy_time::Instant;
use log::{debug, info, warn};

use super::{Connection, Connector, LineFramer, TransportError};
use crate::config::ServerAddress;
use crate::constants::{MAX_LINE_LEN, PING_PERIOD, READ_CHUNK_LEN, READ_TIMEOUT};
use crate::error::Fault;
use crate::platform::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the server connection. The only writer of [`SessionState`].
pub struct NetworkSession<C: Connector> {
    connector: C,
    server: ServerAddress,
    connection: Option<C::Connection>,
    state: SessionState,
    ping_deadline: Option<Instant>,
    framer: LineFramer,
}

impl<C: Connector> NetworkSession<C> {
    pub fn new(connector: C, server: ServerAddress) -> Self {
        Self {
            connector,
            server,
            connection: None,
            state: SessionState::Disconnected,
            ping_deadline: None,
            framer: LineFramer::new(MAX_LINE_LEN),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    /// When the next ping is due, if the deadline is armed.
    pub fn ping_deadline(&self) -> Option<Instant> {
        self.ping_deadline
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Push the ping deadline out to `now + PING_PERIOD`.
    pub fn arm_ping(&mut self, now: Instant) {
        self.ping_deadline = Some(now + PING_PERIOD);
    }

    /// Fail with [`TransportError::PingExceeded`] if the deadline has passed.
    ///
    /// Expiry drops the connection and disarms the deadline, so it fires once.
    pub fn check_ping(&mut self, now: Instant) -> Result<(), TransportError> {
        match self.ping_deadline {
            Some(deadline) if now > deadline => {
                warn!(
                    "No ping for {} ms, dropping connection",
                    (now - deadline + PING_PERIOD).as_millis()
                );
                self.disconnect();
                Err(TransportError::PingExceeded)
            }
            _ => Ok(()),
        }
    }

    /// Connect if not connected. Returns `true` when a new connection was
    /// made, in which case the ping deadline has been armed.
    ///
    /// The deadline counts from when the connection is established, read
    /// from `clock` after the connect returns.
    pub fn ensure_connected<K: Clock>(&mut self, clock: &K) -> Result<bool, TransportError> {
        if self.state == SessionState::Connected {
            return Ok(false);
        }

        self.state = SessionState::Connecting;
        info!("Connecting to {}", self.server);

        match self.connector.connect(&self.server, READ_TIMEOUT) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.framer.clear();
                self.state = SessionState::Connected;
                self.arm_ping(clock.now());
                info!("Connected to {}", self.server);
                Ok(true)
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.server, e);
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Drop the connection, if any, and disarm the ping deadline.
    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            info!("Disconnected from {}", self.server);
        }
        self.ping_deadline = None;
        self.framer.clear();
        self.state = SessionState::Disconnected;
    }

    /// Return the next complete line from the server.
    ///
    /// Performs at most one bounded read. [`Fault::Transient`] means no
    /// complete line is available yet; the session stays connected. Any
    /// other transport failure disconnects before it is returned.
    pub fn poll_line(&mut self) -> Result<String, Fault> {
        if let Some(line) = self.framer.next_line() {
            return line.map_err(Fault::from);
        }

        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::NotConnected.into());
        };

        let mut chunk = [0u8; READ_CHUNK_LEN];
        match connection.read(&mut chunk) {
            Ok(0) => {
                self.disconnect();
                Err(TransportError::Closed.into())
            }
            Ok(n) => {
                debug!("Read {} bytes", n);
                self.framer.extend(&chunk[..n]);
                match self.framer.next_line() {
                    Some(line) => line.map_err(Fault::from),
                    None => Err(Fault::Transient),
                }
            }
            Err(TransportError::NoData) => Err(Fault::Transient),
            Err(e) => {
                self.disconnect();
                Err(e.into())
            }
        }
    }
}
