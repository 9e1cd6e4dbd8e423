use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::wire::header::{HEADER_SIZE, PacketHeader, PacketHeaderBytes};
use crate::wire::packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};

/// Length-delimited framing of [`Packet`]s for `tokio_util::codec::Framed`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut raw: PacketHeaderBytes = [0; HEADER_SIZE];
        raw.copy_from_slice(&src[..HEADER_SIZE]);
        let header = PacketHeader::from_bytes(&raw)?;

        let declared = header.payload_length();
        if declared > MAX_PAYLOAD_SIZE as u64 {
            return Err(LinkError::FrameTooLarge {
                size: HEADER_SIZE.saturating_add(declared as usize),
                max: MAX_FRAME_SIZE,
            });
        }

        let total = HEADER_SIZE + declared as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        Packet::from_bytes(&frame).map(Some)
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = LinkError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.wire_len());
        dst.put_slice(&item.header().to_bytes());
        dst.put_slice(item.payload());
        Ok(())
    }
}
