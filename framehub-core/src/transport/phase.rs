//! Lifecycle of a producer's link to the consumer.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Handshaking ──► Connected
//!       ▲               │               │              │
//!       └───────────────┴───────────────┴──────────────┘
//!                                       │
//!                                       ▼
//!                                   Rejected        (any) ──► Closed
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::LinkError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// No TCP connection. Initial state, and the state between retries.
    #[default]
    Disconnected,

    /// TCP connect in progress.
    Connecting,

    /// TCP is up; waiting for the consumer's answer to `Hello`.
    Handshaking,

    /// Frames can flow.
    Connected {
        /// When the handshake completed.
        since: Instant,
    },

    /// The consumer refused this producer. Terminal until closed.
    Rejected { reason: String },

    /// The channel was closed locally. Terminal.
    Closed,
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Rejected { .. } => write!(f, "Rejected"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl LinkPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// `Rejected` and `Closed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Closed)
    }

    /// How long the link has been up, `None` unless connected.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(LinkError::ProtocolMisuse(
                "cannot connect: link not disconnected",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn begin_handshake(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(LinkError::ProtocolMisuse(
                "cannot handshake: link not connecting",
            )),
        }
    }

    /// Valid from: `Handshaking`.
    pub fn complete_handshake(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Handshaking => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(LinkError::ProtocolMisuse(
                "cannot complete handshake: link not handshaking",
            )),
        }
    }

    /// Valid from: `Handshaking`.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), LinkError> {
        match self {
            Self::Handshaking => {
                *self = Self::Rejected {
                    reason: reason.into(),
                };
                Ok(())
            }
            _ => Err(LinkError::ProtocolMisuse(
                "cannot reject: link not handshaking",
            )),
        }
    }

    /// Connection attempt failed or an established link broke.
    ///
    /// Valid from: `Connecting`, `Handshaking`, `Connected`.
    pub fn lose(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connecting | Self::Handshaking | Self::Connected { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(LinkError::ProtocolMisuse(
                "cannot lose a link that is not up",
            )),
        }
    }

    /// Valid from any state.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = LinkPhase::default();

        phase.begin_connect().unwrap();
        assert_eq!(phase, LinkPhase::Connecting);

        phase.begin_handshake().unwrap();
        assert_eq!(phase, LinkPhase::Handshaking);

        phase.complete_handshake().unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());

        phase.lose().unwrap();
        assert_eq!(phase, LinkPhase::Disconnected);
    }

    #[test]
    fn reject_is_terminal() {
        let mut phase = LinkPhase::Handshaking;
        phase.reject("consumer uses publish-subscribe").unwrap();
        assert!(phase.is_terminal());
        assert!(phase.begin_connect().is_err());
        assert!(phase.lose().is_err());
    }

    #[test]
    fn invalid_transitions() {
        assert!(LinkPhase::Disconnected.clone().begin_handshake().is_err());
        assert!(LinkPhase::Connecting.clone().complete_handshake().is_err());
        assert!(LinkPhase::Disconnected.clone().lose().is_err());
        assert!(LinkPhase::Connecting.clone().reject("no").is_err());
    }

    #[test]
    fn close_from_any_state() {
        let mut phase = LinkPhase::Connected {
            since: Instant::now(),
        };
        phase.close();
        assert_eq!(phase, LinkPhase::Closed);
        assert_eq!(phase.to_string(), "Closed");
    }
}
