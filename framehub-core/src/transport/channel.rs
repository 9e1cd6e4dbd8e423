use std::net::SocketAddr;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::transport::client::Client;
use crate::transport::server::Server;
use crate::transport::{ChannelOptions, Discipline, Endpoint, LinkPhase};

enum Side {
    Server(Server),
    Client(Client),
}

/// One end of a framehub link, consumer (bound) or producer (connected).
///
/// The discipline is fixed at construction; the loops never branch on it
/// except to decide whether to acknowledge.
pub struct Channel {
    side: Side,
}

impl Channel {
    /// Bind a consumer endpoint with default options.
    pub async fn bind(endpoint: &Endpoint, discipline: Discipline) -> Result<Self, LinkError> {
        Self::bind_with(endpoint, discipline, &ChannelOptions::default()).await
    }

    pub async fn bind_with(
        endpoint: &Endpoint,
        discipline: Discipline,
        options: &ChannelOptions,
    ) -> Result<Self, LinkError> {
        let server = Server::bind(endpoint, discipline, options).await?;
        Ok(Self {
            side: Side::Server(server),
        })
    }

    /// Open a producer channel with default options.
    ///
    /// Succeeds as soon as the endpoint is valid; the TCP link comes up in
    /// the background.
    pub fn connect(endpoint: &Endpoint, discipline: Discipline) -> Result<Self, LinkError> {
        Self::connect_with(endpoint, discipline, &ChannelOptions::default())
    }

    pub fn connect_with(
        endpoint: &Endpoint,
        discipline: Discipline,
        options: &ChannelOptions,
    ) -> Result<Self, LinkError> {
        let client = Client::connect(endpoint, discipline, options)?;
        Ok(Self {
            side: Side::Client(client),
        })
    }

    pub fn discipline(&self) -> Discipline {
        match &self.side {
            Side::Server(s) => s.discipline(),
            Side::Client(c) => c.discipline(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match &self.side {
            Side::Server(s) => s.endpoint(),
            Side::Client(c) => c.endpoint(),
        }
    }

    /// The bound address; `None` on a producer channel.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.side {
            Side::Server(s) => Some(s.local_addr()),
            Side::Client(_) => None,
        }
    }

    /// Frames this side discarded because a publish/subscribe queue was full.
    pub fn dropped(&self) -> u64 {
        match &self.side {
            Side::Server(s) => s.dropped(),
            Side::Client(c) => c.dropped(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.side {
            Side::Server(s) => s.is_closed(),
            Side::Client(c) => c.is_closed(),
        }
    }

    /// Current link phase of a producer channel; `None` on a consumer.
    pub fn link_phase(&self) -> Option<LinkPhase> {
        match &self.side {
            Side::Server(_) => None,
            Side::Client(c) => Some(c.phase()),
        }
    }

    /// Wait for a producer channel to finish its handshake.
    pub async fn wait_connected(&mut self, limit: Duration) -> Result<(), LinkError> {
        match &mut self.side {
            Side::Server(_) => Err(LinkError::ProtocolMisuse("wait_connected on a consumer")),
            Side::Client(c) => c.wait_connected(limit).await,
        }
    }

    /// Block until the next envelope arrives.
    ///
    /// Under request/reply the producer stays parked until
    /// [`acknowledge`](Self::acknowledge). An envelope that fails to decode
    /// is returned as a per-envelope error and still needs acknowledging.
    pub async fn receive(&mut self) -> Result<Envelope, LinkError> {
        match &mut self.side {
            Side::Server(s) => s.receive().await,
            Side::Client(_) => Err(LinkError::ProtocolMisuse("receive on a producer")),
        }
    }

    pub fn acknowledge(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        match &mut self.side {
            Side::Server(s) => s.acknowledge(payload),
            Side::Client(_) => Err(LinkError::ProtocolMisuse("acknowledge on a producer")),
        }
    }

    /// Transmit one envelope.
    ///
    /// Request/reply returns the consumer's acknowledgment. Publish/subscribe
    /// returns `None` at once, even when the frame had to be dropped.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<Option<Vec<u8>>, LinkError> {
        match &mut self.side {
            Side::Server(_) => Err(LinkError::ProtocolMisuse("send on a consumer")),
            Side::Client(c) => c.send(envelope).await,
        }
    }

    /// Release the endpoint and stop background tasks. Idempotent.
    pub async fn close(&mut self) {
        match &mut self.side {
            Side::Server(s) => s.close(),
            Side::Client(c) => c.close().await,
        }
    }
}
