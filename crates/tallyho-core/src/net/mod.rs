//! Network transport and link abstractions.
//!
//! The core never touches sockets or radios directly. A platform supplies a
//! [`Connector`] that opens stream connections to the switcher-feed server
//! and a [`NetworkLink`] that brings the Wi-Fi interface up.

mod framer;
mod session;

pub use framer::*;
pub use session::*;

use core::net::Ipv4Addr;

use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::config::{ServerAddress, WifiCredentials};
use crate::error::ErrorText;
use crate::identity::MacAddress;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The read timed out or would block; not a failure.
    #[error("no data yet")]
    NoData,
    #[error("connection refused")]
    Refused,
    #[error("connection reset")]
    Reset,
    #[error("connection closed by server")]
    Closed,
    #[error("server unreachable")]
    Unreachable,
    #[error("server address could not be resolved")]
    Unresolved,
    #[error("not connected")]
    NotConnected,
    /// No ping from the server within the ping period.
    #[error("Ping exceeded")]
    PingExceeded,
    #[error("transport error: {0}")]
    Other(ErrorText),
}

/// An open stream connection.
pub trait Connection {
    /// Read available bytes into `buf`.
    ///
    /// Blocks for at most the read timeout given to [`Connector::connect`].
    /// Returns [`TransportError::NoData`] when nothing arrived in time and
    /// `Ok(0)` when the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Opens connections to the switcher-feed server.
pub trait Connector {
    type Connection: Connection;

    fn connect(
        &mut self,
        server: &ServerAddress,
        read_timeout: Duration,
    ) -> Result<Self::Connection, TransportError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("No WiFi Details!")]
    NoCredentials,
    #[error("Invalid WiFi Details!")]
    InvalidCredentials,
    #[error("WiFi join failed: {0}")]
    JoinFailed(ErrorText),
    #[error("WiFi connection timed out")]
    Timeout,
}

/// The device's network interface; also the source of its identity.
pub trait NetworkLink {
    /// Start joining the network. Completion is observed via [`Self::is_up`].
    fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError>;

    fn is_up(&mut self) -> bool;

    /// Hardware address of the interface.
    fn mac_address(&self) -> MacAddress;

    /// Current IPv4 address, once the link is up.
    fn ip_address(&self) -> Option<Ipv4Addr>;
}
