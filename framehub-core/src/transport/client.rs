//! Producer side of a [`Channel`](super::Channel).
//!
//! A background link task owns the TCP connection: it dials, says hello,
//! re-dials after failures and pushes queued frames out. The owner only
//! talks to it through a bounded queue, so `connect` succeeds before the
//! consumer is reachable and frames wait (or drop) until it is.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::transport::{ChannelOptions, Discipline, Endpoint, LinkPhase};
use crate::wire::message::{self, MessageKind, Reject};
use crate::wire::{FrameCodec, Packet};

type FramedStream = Framed<TcpStream, FrameCodec>;
type ReplySlot = oneshot::Sender<Result<Vec<u8>, LinkError>>;

/// A frame queued for the link task.
struct Outbound {
    packet: Packet,
    reply: Option<ReplySlot>,
}

pub(crate) struct Client {
    discipline: Discipline,
    endpoint: Endpoint,
    outbound: Option<mpsc::Sender<Outbound>>,
    phase: watch::Receiver<LinkPhase>,
    shutdown: CancellationToken,
    link_task: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    reply_timeout: Option<Duration>,
    linger: Duration,
}

impl Client {
    pub(crate) fn connect(
        endpoint: &Endpoint,
        discipline: Discipline,
        options: &ChannelOptions,
    ) -> Result<Self, LinkError> {
        let addr = endpoint
            .connect_addr()
            .map_err(|e| LinkError::Connect {
                endpoint: endpoint.to_string(),
                discipline,
                reason: e.to_string(),
            })?;

        // Request/reply keeps exactly one frame in flight.
        let depth = match discipline {
            Discipline::RequestReply => 1,
            Discipline::PublishSubscribe => options.queue_depth.max(1),
        };
        let (tx, rx) = mpsc::channel(depth);
        let (phase_tx, phase_rx) = watch::channel(LinkPhase::default());
        let shutdown = CancellationToken::new();
        let dropped = Arc::new(AtomicU64::new(0));

        let link = Link {
            addr,
            discipline,
            rx,
            phase: phase_tx,
            dropped: Arc::clone(&dropped),
            reconnect_interval: options.reconnect_interval,
        };
        let link_task = tokio::spawn(link.run(shutdown.clone()));
        info!(%endpoint, %discipline, "producer connecting");

        Ok(Self {
            discipline,
            endpoint: endpoint.clone(),
            outbound: Some(tx),
            phase: phase_rx,
            shutdown,
            link_task: Some(link_task),
            dropped,
            reply_timeout: options.reply_timeout,
            linger: options.linger,
        })
    }

    pub(crate) fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.link_task.is_none()
    }

    pub(crate) fn phase(&self) -> LinkPhase {
        self.phase.borrow().clone()
    }

    /// Wait until the handshake with the consumer has completed.
    pub(crate) async fn wait_connected(&mut self, limit: Duration) -> Result<(), LinkError> {
        let settled = tokio::time::timeout(
            limit,
            self.phase
                .wait_for(|phase| phase.is_connected() || phase.is_terminal()),
        )
        .await
        .map_err(|_| LinkError::Timeout(limit))?
        .map_err(|_| LinkError::ChannelClosed)?;

        match &*settled {
            LinkPhase::Connected { .. } => Ok(()),
            LinkPhase::Rejected { reason } => Err(LinkError::Rejected(reason.clone())),
            _ => Err(LinkError::ChannelClosed),
        }
    }

    pub(crate) async fn send(&mut self, envelope: &Envelope) -> Result<Option<Vec<u8>>, LinkError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(LinkError::ProtocolMisuse("send on a closed channel"))?;
        if let LinkPhase::Rejected { reason } = &*self.phase.borrow() {
            return Err(LinkError::Rejected(reason.clone()));
        }

        let packet = Packet::frame(envelope)?;
        match self.discipline {
            Discipline::PublishSubscribe => {
                let queued = Outbound {
                    packet,
                    reply: None,
                };
                match outbound.try_send(queued) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!("outbound queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => return Err(LinkError::ChannelClosed),
                }
                Ok(None)
            }
            Discipline::RequestReply => {
                // One deadline covers waiting for queue space and for the ack.
                let ack = match self.reply_timeout {
                    Some(limit) => tokio::time::timeout(limit, request(outbound, packet))
                        .await
                        .map_err(|_| LinkError::Timeout(limit))??,
                    None => request(outbound, packet).await?,
                };
                Ok(Some(ack))
            }
        }
    }

    /// Flush what is queued (bounded by the linger time), say goodbye and
    /// stop the link task. Idempotent.
    pub(crate) async fn close(&mut self) {
        let Some(mut task) = self.link_task.take() else {
            return;
        };
        self.outbound = None;
        if tokio::time::timeout(self.linger, &mut task).await.is_err() {
            debug!(linger = ?self.linger, "link did not drain in time");
            self.shutdown.cancel();
            task.abort();
        }
        info!(endpoint = %self.endpoint, "producer closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Link task ────────────────────────────────────────────────────

enum Served {
    /// The owner closed the queue or shutdown fired.
    Finished,
    /// The connection failed; reconnect.
    Broken(String),
}

struct Link {
    addr: String,
    discipline: Discipline,
    rx: mpsc::Receiver<Outbound>,
    phase: watch::Sender<LinkPhase>,
    dropped: Arc<AtomicU64>,
    reconnect_interval: Duration,
}

impl Link {
    async fn run(mut self, shutdown: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            let established = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.establish() => r,
            };

            match established {
                Ok(mut framed) => {
                    failures = 0;
                    match self.serve(&mut framed, &shutdown).await {
                        Served::Finished => {
                            let _ = framed.send(Packet::empty(MessageKind::Goodbye)).await;
                            let _ = framed.close().await;
                            break;
                        }
                        Served::Broken(reason) => {
                            warn!(addr = %self.addr, "link lost: {reason}");
                            self.update(LinkPhase::lose);
                        }
                    }
                }
                Err(LinkError::Rejected(reason)) => {
                    self.refuse_all(reason, &shutdown).await;
                    break;
                }
                Err(e) => {
                    self.update(LinkPhase::lose);
                    if failures == 0 {
                        warn!(addr = %self.addr, "cannot reach consumer: {e}; retrying");
                    } else {
                        debug!(addr = %self.addr, failures, "reconnect failed: {e}");
                    }
                    failures = failures.saturating_add(1);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_interval) => {}
                    }
                }
            }
        }
        self.phase.send_modify(LinkPhase::close);
    }

    async fn establish(&mut self) -> Result<FramedStream, LinkError> {
        self.update(LinkPhase::begin_connect);
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, FrameCodec);

        self.update(LinkPhase::begin_handshake);
        framed.send(Packet::hello(self.discipline)?).await?;
        let answer = match framed.next().await {
            Some(answer) => answer?,
            None => {
                return Err(LinkError::Handshake(
                    "consumer closed during handshake".into(),
                ));
            }
        };

        match answer.kind()? {
            MessageKind::Welcome => {
                self.update(LinkPhase::complete_handshake);
                info!(addr = %self.addr, discipline = %self.discipline, "linked to consumer");
                Ok(framed)
            }
            MessageKind::Reject => {
                let Reject { reason } = message::from_bytes(answer.payload())?;
                self.update(|phase| phase.reject(reason.clone()));
                Err(LinkError::Rejected(reason))
            }
            other => Err(LinkError::Handshake(format!(
                "expected Welcome, got {other}"
            ))),
        }
    }

    async fn serve(&mut self, framed: &mut FramedStream, shutdown: &CancellationToken) -> Served {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return Served::Finished,
                next = self.rx.recv() => next,
            };
            let Some(Outbound { packet, reply }) = next else {
                return Served::Finished;
            };

            match reply {
                None => {
                    if let Err(e) = framed.send(packet).await {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return Served::Broken(e.to_string());
                    }
                }
                Some(reply) if reply.is_closed() => {
                    debug!("skipping a request its sender gave up on");
                }
                Some(reply) => {
                    let result = tokio::select! {
                        _ = shutdown.cancelled() => Err(LinkError::ChannelClosed),
                        r = round_trip(framed, packet) => r,
                    };
                    match result {
                        Ok(ack) => {
                            let _ = reply.send(Ok(ack));
                        }
                        Err(LinkError::ChannelClosed) => {
                            let _ = reply.send(Err(LinkError::ChannelClosed));
                            return Served::Finished;
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = reply.send(Err(e));
                            return Served::Broken(reason);
                        }
                    }
                }
            }
        }
    }

    /// After a rejection: fail every request until the owner closes.
    async fn refuse_all(&mut self, reason: String, shutdown: &CancellationToken) {
        error!(addr = %self.addr, "consumer rejected this producer: {reason}");
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return,
                next = self.rx.recv() => next,
            };
            match next {
                None => return,
                Some(Outbound {
                    reply: Some(reply), ..
                }) => {
                    let _ = reply.send(Err(LinkError::Rejected(reason.clone())));
                }
                Some(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn update(&self, transition: impl FnOnce(&mut LinkPhase) -> Result<(), LinkError>) {
        self.phase.send_modify(|phase| {
            if let Err(e) = transition(&mut *phase) {
                debug!(%phase, "ignored link transition: {e}");
            }
        });
    }
}

/// Queue one frame for the link task and wait for its acknowledgment.
async fn request(outbound: &mpsc::Sender<Outbound>, packet: Packet) -> Result<Vec<u8>, LinkError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    outbound
        .send(Outbound {
            packet,
            reply: Some(reply_tx),
        })
        .await?;
    reply_rx.await.map_err(|_| LinkError::ChannelClosed)?
}

/// Send one frame and wait for its acknowledgment.
async fn round_trip(framed: &mut FramedStream, packet: Packet) -> Result<Vec<u8>, LinkError> {
    framed.send(packet).await?;
    let answer = match framed.next().await {
        Some(answer) => answer?,
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "consumer closed the connection",
            )
            .into());
        }
    };
    match answer.kind()? {
        MessageKind::Ack => Ok(answer.into_payload()),
        _ => Err(LinkError::ProtocolMisuse("expected Ack from consumer")),
    }
}
