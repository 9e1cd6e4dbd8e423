//! Fixed-size packet header.

use crate::error::LinkError;

/// Magic bytes opening every framehub packet.
pub const MAGIC: [u8; 4] = *b"FHB1";

/// Encoded size of [`PacketHeader`] on the wire.
pub const HEADER_SIZE: usize = 20;

pub type PacketHeaderBytes = [u8; HEADER_SIZE];

/// Packet header, little-endian on the wire:
///
/// ```text
/// magic:          [u8; 4]
/// checksum:       u32   blake3(payload)[0..4], 0 for empty payloads
/// kind:           u32   MessageKind discriminant
/// payload_length: u64
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    checksum: u32,
    kind: u32,
    payload_length: u64,
}

impl PacketHeader {
    pub fn new(checksum: u32, kind: u32, payload_length: u64) -> Self {
        Self {
            checksum,
            kind,
            payload_length,
        }
    }

    pub fn to_bytes(&self) -> PacketHeaderBytes {
        let mut buf: PacketHeaderBytes = [0; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.kind.to_le_bytes());
        buf[12..20].copy_from_slice(&self.payload_length.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &PacketHeaderBytes) -> Result<Self, LinkError> {
        if bytes[0..4] != MAGIC {
            return Err(LinkError::InvalidMagic);
        }
        let mut checksum = [0u8; 4];
        let mut kind = [0u8; 4];
        let mut payload_length = [0u8; 8];
        checksum.copy_from_slice(&bytes[4..8]);
        kind.copy_from_slice(&bytes[8..12]);
        payload_length.copy_from_slice(&bytes[12..20]);
        Ok(Self {
            checksum: u32::from_le_bytes(checksum),
            kind: u32::from_le_bytes(kind),
            payload_length: u64::from_le_bytes(payload_length),
        })
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub fn payload_length(&self) -> u64 {
        self.payload_length
    }
}
