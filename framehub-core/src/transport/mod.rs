//! TCP transport behind a single [`Channel`] type.
//!
//! - [`Discipline`]: request/reply or publish/subscribe
//! - [`Endpoint`]: `tcp://host:port` descriptor
//! - [`Channel`]: bind (consumer) or connect (producer), then
//!   receive/acknowledge or send
//! - [`LinkPhase`]: producer link lifecycle

mod channel;
mod client;
pub mod discipline;
pub mod endpoint;
pub mod phase;
mod server;

use std::time::Duration;

pub use channel::Channel;
pub use discipline::Discipline;
pub use endpoint::{DEFAULT_PORT, Endpoint, WILDCARD_HOST};
pub use phase::LinkPhase;

/// Tuning knobs shared by both sides of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Bound of the publish/subscribe queues (inbound on the consumer,
    /// outbound on the producer). Overflow drops frames.
    pub queue_depth: usize,
    /// How long a request/reply send waits for its acknowledgment.
    /// `None` waits indefinitely.
    pub reply_timeout: Option<Duration>,
    /// Pause between producer reconnect attempts.
    pub reconnect_interval: Duration,
    /// How long a producer's `close` lets queued frames drain.
    pub linger: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            reply_timeout: None,
            reconnect_interval: Duration::from_millis(500),
            linger: Duration::from_secs(1),
        }
    }
}
