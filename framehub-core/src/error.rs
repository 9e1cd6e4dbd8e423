//! Domain-specific error types for the framehub exchange.
//!
//! All fallible operations return `Result<T, LinkError>`.
//! Setup errors are fatal, per-envelope errors are isolated to the
//! envelope that caused them, and transport hiccups are recoverable.

use std::time::Duration;
use thiserror::Error;

use crate::transport::Discipline;

/// The canonical error type for framehub.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// The consumer could not bind its endpoint.
    #[error("cannot bind {endpoint} ({discipline}): {source}")]
    Bind {
        endpoint: String,
        discipline: Discipline,
        #[source]
        source: std::io::Error,
    },

    /// The producer could not set up its endpoint.
    #[error("cannot connect to {endpoint} ({discipline}): {reason}")]
    Connect {
        endpoint: String,
        discipline: Discipline,
        reason: String,
    },

    /// An endpoint string could not be parsed.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// A discipline name was not recognised.
    #[error("unknown discipline {0:?} (expected request-reply or publish-subscribe)")]
    UnknownDiscipline(String),

    // ── Envelope Errors ──────────────────────────────────────────
    /// A `sent_at` field did not match `DD/MM/YY HH:MM:SS.ffffff`.
    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// An envelope violated a structural rule (e.g. empty sender id).
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Encoding or decoding of a message body failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Capture ──────────────────────────────────────────────────
    /// The frame source has no more frames. Not a failure.
    #[error("capture source exhausted")]
    CaptureExhausted,

    /// The frame source failed to produce a frame.
    #[error("capture error: {0}")]
    Capture(String),

    // ── Contract Violations ──────────────────────────────────────
    /// An operation was called in a state or role that forbids it.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(&'static str),

    // ── Wire Errors ──────────────────────────────────────────────
    /// Received bytes that do not start with the framehub magic.
    #[error("invalid magic bytes: expected FHB1")]
    InvalidMagic,

    /// The packet payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The payload exceeds the maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame on the wire announced more bytes than the codec accepts.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The connection handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The consumer refused this producer; retrying will not help.
    #[error("rejected by consumer: {0}")]
    Rejected(String),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The channel's internal plumbing has shut down.
    #[error("channel closed")]
    ChannelClosed,
}

impl LinkError {
    /// Returns `true` for transient conditions a loop may retry past.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(_) | LinkError::Timeout(_) | LinkError::Handshake(_)
        )
    }

    /// Returns `true` for errors confined to a single envelope.
    ///
    /// The envelope is dropped; accumulated statistics are untouched.
    pub fn is_per_envelope(&self) -> bool {
        matches!(
            self,
            LinkError::MalformedTimestamp { .. }
                | LinkError::InvalidEnvelope(_)
                | LinkError::Encoding(_)
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LinkError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for LinkError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        LinkError::Encoding(e.to_string())
    }
}
