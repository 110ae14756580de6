//! Fault taxonomy for the runtime loop.
//!
//! Every failure that reaches the loop is folded into a [`Fault`], and each
//! fault maps to exactly one [`Recovery`] policy. The loop never decides
//! retry-vs-reset by catching "anything"; it asks the fault.

use thiserror_no_std::Error;

use crate::config::StorageError;
use crate::net::{LinkError, TransportError};
use crate::protocol::ProtocolError;
use crate::tally::TallyError;

/// Short, stack-allocated error text for error variants that carry a message.
pub type ErrorText = heapless::String<64>;

/// Copy as much of `text` as fits into an [`ErrorText`].
pub fn error_text(text: &str) -> ErrorText {
    let mut out = ErrorText::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// What the loop does about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Nothing happened yet; carry on with the next iteration.
    Continue,
    /// Drop the connection, tell the user, back off, then reconnect.
    Reconnect,
    /// Log and discard the offending input.
    Drop,
    /// Log and keep using the in-memory or default value.
    UseDefault,
    /// Give up: render the error and let the device reset.
    Reset,
}

/// A failure observed by the runtime loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No data yet (read timeout / partial line).
    #[error("no data yet")]
    Transient,
    /// Transport failure or dead link.
    #[error("{0}")]
    Transport(TransportError),
    /// Network link (Wi-Fi) failure.
    #[error("{0}")]
    Link(LinkError),
    /// Malformed or rejected protocol data.
    #[error("{0}")]
    Protocol(ProtocolError),
    /// Missing, corrupt or unwritable configuration.
    #[error("config: {0}")]
    Config(StorageError),
}

impl Fault {
    /// The recovery policy for this fault.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Transient => Recovery::Continue,
            Self::Transport(TransportError::NoData) => Recovery::Continue,
            Self::Transport(_) => Recovery::Reconnect,
            Self::Link(LinkError::NoCredentials | LinkError::InvalidCredentials) => {
                Recovery::Reset
            }
            Self::Link(_) => Recovery::Reconnect,
            Self::Protocol(_) => Recovery::Drop,
            Self::Config(_) => Recovery::UseDefault,
        }
    }
}

impl From<TransportError> for Fault {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::NoData => Self::Transient,
            other => Self::Transport(other),
        }
    }
}

impl From<LinkError> for Fault {
    fn from(value: LinkError) -> Self {
        Self::Link(value)
    }
}

impl From<ProtocolError> for Fault {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<StorageError> for Fault {
    fn from(value: StorageError) -> Self {
        Self::Config(value)
    }
}

impl From<TallyError> for Fault {
    fn from(value: TallyError) -> Self {
        match value {
            TallyError::OutOfRange(camera) => Self::Protocol(ProtocolError::OutOfRange {
                field: "SET_CAM",
                value: camera,
            }),
            TallyError::Persist(e) => Self::Config(e),
        }
    }
}

/// An error the loop cannot recover from; the device resets after showing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("network link unavailable: {0}")]
    Link(LinkError),
    #[error("unrecoverable fault: {0}")]
    Unrecoverable(ErrorText),
}

impl From<Fault> for FatalError {
    fn from(value: Fault) -> Self {
        match value {
            Fault::Link(e) => Self::Link(e),
            other => {
                let mut text = ErrorText::new();
                let _ = core::fmt::write(&mut text, format_args!("{}", other));
                Self::Unrecoverable(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_timeout_is_transient() {
        let fault = Fault::from(TransportError::NoData);
        assert_eq!(fault, Fault::Transient);
        assert_eq!(fault.recovery(), Recovery::Continue);
    }

    #[test]
    fn test_transport_errors_reconnect() {
        for e in [
            TransportError::Reset,
            TransportError::Refused,
            TransportError::Closed,
            TransportError::PingExceeded,
        ] {
            assert_eq!(Fault::from(e).recovery(), Recovery::Reconnect);
        }
    }

    #[test]
    fn test_missing_credentials_reset() {
        assert_eq!(
            Fault::from(LinkError::NoCredentials).recovery(),
            Recovery::Reset
        );
        assert_eq!(Fault::from(LinkError::Timeout).recovery(), Recovery::Reconnect);
    }

    #[test]
    fn test_protocol_and_config_faults_are_absorbed() {
        let bad = Fault::from(ProtocolError::InvalidUtf8);
        assert_eq!(bad.recovery(), Recovery::Drop);

        let cfg = Fault::from(StorageError::NotFound);
        assert_eq!(cfg.recovery(), Recovery::UseDefault);
    }

    #[test]
    fn test_out_of_range_camera_is_protocol_fault() {
        let fault = Fault::from(TallyError::OutOfRange(150));
        assert_eq!(
            fault,
            Fault::Protocol(ProtocolError::OutOfRange {
                field: "SET_CAM",
                value: 150
            })
        );
    }

    #[test]
    fn test_error_text_truncates() {
        let long = "x".repeat(100);
        let text = error_text(&long);
        assert_eq!(text.len(), 64);
    }
}
