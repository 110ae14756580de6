//! TCP transport to the switcher-feed server.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration as StdDuration;

use embassy_time::Duration;
use log::{debug, info};
use tallyho_core::config::ServerAddress;
use tallyho_core::error::error_text;
use tallyho_core::net::{Connection, Connector, TransportError};

/// Upper bound on a single TCP connect attempt.
const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(3);

fn transport_error(e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::NoData,
        io::ErrorKind::ConnectionRefused => TransportError::Refused,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Reset,
        io::ErrorKind::NotConnected => TransportError::NotConnected,
        io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Other(error_text(&e.to_string())),
    }
}

pub struct TcpConnector {
    connect_timeout: StdDuration,
}

impl TcpConnector {
    pub fn new(connect_timeout: StdDuration) -> Self {
        Self { connect_timeout }
    }

    fn resolve(server: &ServerAddress) -> Result<SocketAddr, TransportError> {
        (server.host.as_str(), server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(TransportError::Unresolved)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT)
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(
        &mut self,
        server: &ServerAddress,
        read_timeout: Duration,
    ) -> Result<TcpConnection, TransportError> {
        let addr = Self::resolve(server)?;
        debug!("Connecting to {} ({})", server, addr);

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            match transport_error(&e) {
                TransportError::NoData => TransportError::Unreachable,
                other => other,
            }
        })?;

        // A zero read timeout means "block forever" to std
        let timeout = StdDuration::from_micros(read_timeout.as_micros().max(1_000));
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| transport_error(&e))?;
        let _ = stream.set_nodelay(true);

        info!("Connected to {}", server);
        Ok(TcpConnection { stream })
    }
}

pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(transport_error(&e)),
            }
        }
    }
}
