//! Wire format: packet header, message bodies and the framing codec.

pub mod codec;
pub mod header;
pub mod message;
pub mod packet;

pub use codec::FrameCodec;
pub use header::{HEADER_SIZE, MAGIC, PacketHeader};
pub use message::{FrameBody, Hello, MessageKind, PROTOCOL_VERSION, Reject};
pub use packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Packet};

/// Fixed acknowledgment token sent under request/reply.
pub const ACK_TOKEN: &[u8] = b"OK";
