//! # framehub-core
//!
//! Telemetry-tagged image exchange between producer nodes and one consumer.
//!
//! This crate contains:
//! - **Envelope**: `Envelope` (sender id, send timestamp, opaque image) and
//!   the strict wire timestamp codec
//! - **Wire**: `PacketHeader`, `Packet`, `MessageKind` and the
//!   `FrameCodec` for framed TCP I/O via `tokio_util`
//! - **Transport**: `Channel` over the request/reply and
//!   publish/subscribe disciplines
//! - **Statistics**: `StatsEngine`, per-sender latency and frame rate
//! - **Loops**: `Producer` and `Consumer`, with the `FrameSource` and
//!   `FrameDisplay` collaborators they drive
//! - **Error**: `LinkError`, typed and `thiserror`-based

pub mod capture;
pub mod consumer;
pub mod display;
pub mod envelope;
pub mod error;
pub mod producer;
pub mod stats;
pub mod throughput;
pub mod timestamp;
pub mod transport;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{DirectorySource, FrameSource, SyntheticSource};
pub use consumer::{Consumer, ConsumerOutcome};
pub use display::{FrameDisplay, LogDisplay, NullDisplay, SaveDisplay};
pub use envelope::Envelope;
pub use error::LinkError;
pub use producer::{Producer, ProducerConfig, ProducerSummary, StopReason};
pub use stats::{EngineState, Report, SenderSummary, SharedStats, Snapshot, StatsEngine, Summary};
pub use throughput::ThroughputMeter;
pub use transport::{
    Channel, ChannelOptions, DEFAULT_PORT, Discipline, Endpoint, LinkPhase, WILDCARD_HOST,
};
pub use wire::{ACK_TOKEN, FrameCodec, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MessageKind, Packet};
