//! Message kinds and their bodies.
//!
//! ```text
//! Producer ──[Hello]─────────────────────► Consumer
//!   Payload: Hello (bincode)
//! Consumer ──[Welcome | Reject]──────────► Producer
//!   Payload: empty | Reject (bincode)
//!
//! Producer ──[Frame]─────────────────────► Consumer   (repeated)
//!   Payload: FrameBody (bincode)
//! Consumer ──[Ack]───────────────────────► Producer   (request/reply only)
//!   Payload: raw acknowledgment token
//!
//! Producer ──[Goodbye]───────────────────► Consumer   (on close)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::transport::Discipline;

/// Version carried in [`Hello`]; bumped on incompatible wire changes.
pub const PROTOCOL_VERSION: u32 = 1;

// ── MessageKind ──────────────────────────────────────────────────

/// Discriminant stored in the packet header.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Producer announces itself and its discipline.
    Hello = 0x1,
    /// Consumer accepts the producer.
    Welcome = 0x2,
    /// Consumer refuses the producer; the connection closes.
    Reject = 0x3,
    /// One frame envelope.
    Frame = 0x4,
    /// Request/reply acknowledgment of the last frame.
    Ack = 0x5,
    /// Producer is closing its channel.
    Goodbye = 0x6,
}

impl TryFrom<u32> for MessageKind {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(MessageKind::Hello),
            0x2 => Ok(MessageKind::Welcome),
            0x3 => Ok(MessageKind::Reject),
            0x4 => Ok(MessageKind::Frame),
            0x5 => Ok(MessageKind::Ack),
            0x6 => Ok(MessageKind::Goodbye),
            _ => Err(LinkError::UnknownVariant {
                type_name: "MessageKind",
                value: u64::from(value),
            }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Bodies ───────────────────────────────────────────────────────

/// First message on every producer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    pub version: u32,
    pub discipline: Discipline,
}

impl Hello {
    pub fn new(discipline: Discipline) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            discipline,
        }
    }
}

/// Why a consumer refused a producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reject {
    pub reason: String,
}

/// The logical envelope `((sender_id, sent_at), image)` as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameBody {
    pub sender_id: String,
    /// `DD/MM/YY HH:MM:SS.ffffff`
    pub sent_at: String,
    pub image: Vec<u8>,
}

/// Serialize a body with bincode.
pub fn to_bytes<T: Serialize>(body: &T) -> Result<Vec<u8>, LinkError> {
    Ok(bincode::serialize(body)?)
}

/// Deserialize a body with bincode.
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, LinkError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in [
            MessageKind::Hello,
            MessageKind::Welcome,
            MessageKind::Reject,
            MessageKind::Frame,
            MessageKind::Ack,
            MessageKind::Goodbye,
        ] {
            assert_eq!(MessageKind::try_from(kind as u32).unwrap(), kind);
        }
    }

    #[test]
    fn kind_invalid() {
        assert!(matches!(
            MessageKind::try_from(0xFF),
            Err(LinkError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn hello_carries_discipline() {
        let bytes = to_bytes(&Hello::new(Discipline::PublishSubscribe)).unwrap();
        let hello: Hello = from_bytes(&bytes).unwrap();
        assert_eq!(hello.version, PROTOCOL_VERSION);
        assert_eq!(hello.discipline, Discipline::PublishSubscribe);
    }

    #[test]
    fn truncated_body_is_encoding_error() {
        let bytes = to_bytes(&FrameBody {
            sender_id: "nodeA".into(),
            sent_at: "18/10/26 09:05:07.000042".into(),
            image: vec![1; 32],
        })
        .unwrap();
        let err = from_bytes::<FrameBody>(&bytes[..bytes.len() - 8]).unwrap_err();
        assert!(matches!(err, LinkError::Encoding(_)));
    }
}
