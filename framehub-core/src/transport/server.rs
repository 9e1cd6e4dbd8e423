//! Consumer side of a [`Channel`](super::Channel).
//!
//! One accept loop, one task per producer connection. Connection tasks
//! only hand raw frame bodies to the owner through a bounded queue, so
//! everything that touches statistics stays on the owner's task.
//!
//! Under request/reply a connection task parks after forwarding a frame
//! until the owner acknowledges it; that is the backpressure. Under
//! publish/subscribe it never waits: a full queue drops the frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::transport::{ChannelOptions, Discipline, Endpoint};
use crate::wire::message::{self, FrameBody, Hello, MessageKind, PROTOCOL_VERSION};
use crate::wire::{FrameCodec, Packet};

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

type FramedStream = Framed<TcpStream, FrameCodec>;

/// A frame handed from a connection task to the owner.
struct Inbound {
    peer: SocketAddr,
    body: Vec<u8>,
    reply: Option<oneshot::Sender<Vec<u8>>>,
}

/// The round trip the owner still has to complete.
struct PendingAck {
    peer: SocketAddr,
    reply: oneshot::Sender<Vec<u8>>,
}

pub(crate) struct Server {
    discipline: Discipline,
    endpoint: Endpoint,
    local_addr: SocketAddr,
    inbound: mpsc::Receiver<Inbound>,
    pending: Option<PendingAck>,
    shutdown: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    closed: bool,
}

impl Server {
    pub(crate) async fn bind(
        endpoint: &Endpoint,
        discipline: Discipline,
        options: &ChannelOptions,
    ) -> Result<Self, LinkError> {
        let bind_error = |source: std::io::Error| LinkError::Bind {
            endpoint: endpoint.to_string(),
            discipline,
            source,
        };

        let addr = endpoint.bind_addr().map_err(|e| {
            bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
        })?;
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!(%local_addr, %discipline, "consumer bound");

        let (tx, inbound) = mpsc::channel(options.queue_depth.max(1));
        let shutdown = CancellationToken::new();
        let dropped = Arc::new(AtomicU64::new(0));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            discipline,
            tx,
            shutdown.clone(),
            Arc::clone(&dropped),
        ));

        Ok(Self {
            discipline,
            endpoint: endpoint.clone(),
            local_addr,
            inbound,
            pending: None,
            shutdown,
            accept_task: Some(accept_task),
            dropped,
            closed: false,
        })
    }

    pub(crate) fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next complete frame.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    /// A frame whose body fails to decode still leaves its round trip
    /// outstanding under request/reply.
    pub(crate) async fn receive(&mut self) -> Result<Envelope, LinkError> {
        if self.closed {
            return Err(LinkError::ProtocolMisuse("receive on a closed channel"));
        }
        if self.pending.is_some() {
            return Err(LinkError::ProtocolMisuse(
                "receive before acknowledging the previous frame",
            ));
        }

        let Inbound { peer, body, reply } =
            self.inbound.recv().await.ok_or(LinkError::ChannelClosed)?;
        trace!(%peer, bytes = body.len(), "frame received");
        if let Some(reply) = reply {
            self.pending = Some(PendingAck { peer, reply });
        }

        let body: FrameBody = message::from_bytes(&body)?;
        Envelope::from_body(body)
    }

    pub(crate) fn acknowledge(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::ProtocolMisuse("acknowledge on a closed channel"));
        }
        if !self.discipline.acknowledges() {
            return Err(LinkError::ProtocolMisuse(
                "acknowledge under publish-subscribe",
            ));
        }
        let PendingAck { peer, reply } = self
            .pending
            .take()
            .ok_or(LinkError::ProtocolMisuse("nothing to acknowledge"))?;
        if reply.send(payload.to_vec()).is_err() {
            debug!(%peer, "producer left before its acknowledgment");
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending = None;
        self.shutdown.cancel();
        self.inbound.close();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        info!(local_addr = %self.local_addr, "consumer closed");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Tasks ────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    discipline: Discipline,
    tx: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, "set_nodelay failed: {e}");
                }
                tokio::spawn(serve_connection(
                    Framed::new(stream, FrameCodec),
                    peer,
                    discipline,
                    tx.clone(),
                    shutdown.child_token(),
                    Arc::clone(&dropped),
                ));
            }
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(
    mut framed: FramedStream,
    peer: SocketAddr,
    discipline: Discipline,
    tx: mpsc::Sender<Inbound>,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
) {
    let result = tokio::select! {
        _ = shutdown.cancelled() => Ok(()),
        r = drive_connection(&mut framed, peer, discipline, &tx, &dropped) => r,
    };
    match result {
        Ok(()) => debug!(%peer, "producer disconnected"),
        Err(LinkError::ChannelClosed) => debug!(%peer, "consumer gone, dropping producer"),
        Err(e) => warn!(%peer, "producer connection closed: {e}"),
    }
}

async fn drive_connection(
    framed: &mut FramedStream,
    peer: SocketAddr,
    discipline: Discipline,
    tx: &mpsc::Sender<Inbound>,
    dropped: &AtomicU64,
) -> Result<(), LinkError> {
    if !handshake(framed, peer, discipline).await? {
        return Ok(());
    }

    while let Some(packet) = framed.next().await {
        let packet = packet?;
        match packet.kind()? {
            MessageKind::Frame => {
                let body = packet.into_payload();
                match discipline {
                    Discipline::RequestReply => {
                        let (reply_tx, reply_rx) = oneshot::channel();
                        tx.send(Inbound {
                            peer,
                            body,
                            reply: Some(reply_tx),
                        })
                        .await?;
                        let reply = reply_rx.await.map_err(|_| LinkError::ChannelClosed)?;
                        framed.send(Packet::ack(reply)?).await?;
                    }
                    Discipline::PublishSubscribe => {
                        let inbound = Inbound {
                            peer,
                            body,
                            reply: None,
                        };
                        match tx.try_send(inbound) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                dropped.fetch_add(1, Ordering::Relaxed);
                                trace!(%peer, "inbound queue full, frame dropped");
                            }
                            Err(TrySendError::Closed(_)) => return Err(LinkError::ChannelClosed),
                        }
                    }
                }
            }
            MessageKind::Goodbye => return Ok(()),
            other => {
                warn!(%peer, "unexpected {other} from producer");
                return Err(LinkError::ProtocolMisuse("unexpected message from producer"));
            }
        }
    }
    Ok(())
}

/// Returns `false` when the producer left before saying hello.
async fn handshake(
    framed: &mut FramedStream,
    peer: SocketAddr,
    discipline: Discipline,
) -> Result<bool, LinkError> {
    let packet = match framed.next().await {
        Some(packet) => packet?,
        None => return Ok(false),
    };

    let refusal = match packet.kind()? {
        MessageKind::Hello => {
            let hello: Hello = message::from_bytes(packet.payload())?;
            if hello.version != PROTOCOL_VERSION {
                Some(format!(
                    "protocol version {} unsupported (consumer speaks {PROTOCOL_VERSION})",
                    hello.version
                ))
            } else if hello.discipline != discipline {
                Some(format!(
                    "consumer uses {discipline}, producer asked for {}",
                    hello.discipline
                ))
            } else {
                None
            }
        }
        other => Some(format!("expected Hello, got {other}")),
    };

    match refusal {
        None => {
            framed.send(Packet::empty(MessageKind::Welcome)).await?;
            info!(%peer, %discipline, "producer joined");
            Ok(true)
        }
        Some(reason) => {
            warn!(%peer, "rejecting producer: {reason}");
            framed.send(Packet::reject(reason.clone())?).await?;
            Err(LinkError::Rejected(reason))
        }
    }
}
