use std::fmt;

use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::transport::Discipline;
use crate::wire::header::{HEADER_SIZE, PacketHeader, PacketHeaderBytes};
use crate::wire::message::{self, Hello, MessageKind, Reject};

/// Largest accepted payload (one encoded image plus metadata).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Largest accepted frame on the wire.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// A header plus its payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, computing the payload checksum.
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Result<Self, LinkError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header = PacketHeader::new(checksum(&payload), kind as u32, payload.len() as u64);
        Ok(Self { header, payload })
    }

    /// A packet with no payload.
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            header: PacketHeader::new(0, kind as u32, 0),
            payload: Vec::new(),
        }
    }

    pub fn hello(discipline: Discipline) -> Result<Self, LinkError> {
        Self::new(MessageKind::Hello, message::to_bytes(&Hello::new(discipline))?)
    }

    pub fn reject(reason: impl Into<String>) -> Result<Self, LinkError> {
        let body = Reject {
            reason: reason.into(),
        };
        Self::new(MessageKind::Reject, message::to_bytes(&body)?)
    }

    pub fn frame(envelope: &Envelope) -> Result<Self, LinkError> {
        Self::new(MessageKind::Frame, message::to_bytes(&envelope.to_body())?)
    }

    pub fn ack(payload: Vec<u8>) -> Result<Self, LinkError> {
        Self::new(MessageKind::Ack, payload)
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn kind(&self) -> Result<MessageKind, LinkError> {
        MessageKind::try_from(self.header.kind())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total encoded length on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Returns `true` when the payload matches the header checksum.
    pub fn validate(&self) -> bool {
        self.header.checksum() == checksum(&self.payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LinkError::Encoding(format!(
                "packet shorter than header: {} < {HEADER_SIZE}",
                bytes.len()
            )));
        }
        let mut raw: PacketHeaderBytes = [0; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = PacketHeader::from_bytes(&raw)?;

        let declared = header.payload_length();
        if declared > MAX_PAYLOAD_SIZE as u64 {
            return Err(LinkError::PayloadTooLarge {
                size: declared as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if (bytes.len() - HEADER_SIZE) as u64 != declared {
            return Err(LinkError::Encoding(format!(
                "payload length mismatch: header says {declared}, got {}",
                bytes.len() - HEADER_SIZE
            )));
        }

        let packet = Self {
            header,
            payload: bytes[HEADER_SIZE..].to_vec(),
        };
        if !packet.validate() {
            return Err(LinkError::ChecksumMismatch);
        }
        Ok(packet)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// First four bytes (LE) of the blake3 hash; 0 for an empty payload.
pub fn checksum(payload: &[u8]) -> u32 {
    if payload.is_empty() {
        return 0;
    }
    let hash = blake3::hash(payload);
    let mut head = [0u8; 4];
    head.copy_from_slice(&hash.as_bytes()[0..4]);
    u32::from_le_bytes(head)
}
