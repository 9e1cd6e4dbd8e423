//! Producer loop: capture, stamp, send, repeat.
//!
//! Runs until the cancellation token fires, the source runs dry or a
//! fatal error occurs. The channel is closed exactly once on the way out.

use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::FrameSource;
use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::throughput::ThroughputMeter;
use crate::transport::Channel;
use crate::wire::ACK_TOKEN;

/// How often the loop logs its send rate.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

// ── ProducerConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Identity stamped on every envelope. Must not be empty.
    pub sender_id: String,
    /// Frames per second to aim for; 0 sends as fast as the channel allows.
    pub target_fps: u32,
    /// Pause before the first frame.
    pub warmup: Duration,
    /// Give up after this many recoverable send errors in a row.
    pub max_consecutive_errors: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            sender_id: String::new(),
            target_fps: 0,
            warmup: Duration::ZERO,
            max_consecutive_errors: 10,
        }
    }
}

// ── ProducerSummary ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The frame source had nothing left.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerSummary {
    pub stop: StopReason,
    /// Frames handed to the channel.
    pub frames_sent: u64,
    /// Acknowledgments received (request/reply only).
    pub replies: u64,
    /// Frames the channel had to drop (publish/subscribe only).
    pub dropped: u64,
    /// Recoverable send failures that were skipped over.
    pub recoverable_errors: u64,
    /// Frames too large for the wire, skipped without sending.
    pub oversized: u64,
    pub bytes_sent: u64,
    /// Smoothed send-to-acknowledgment time.
    pub round_trip: Option<Duration>,
    /// Send rate over the last window.
    pub bytes_per_sec: f64,
}

impl fmt::Display for ProducerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames sent ({} bytes), {} replies, {} dropped, {} errors",
            self.frames_sent, self.bytes_sent, self.replies, self.dropped, self.recoverable_errors
        )?;
        if self.oversized > 0 {
            write!(f, ", {} oversized", self.oversized)?;
        }
        if let Some(rtt) = self.round_trip {
            write!(f, ", round trip {:.3} ms", rtt.as_secs_f64() * 1e3)?;
        }
        Ok(())
    }
}

// ── Producer ─────────────────────────────────────────────────────

pub struct Producer<S> {
    channel: Channel,
    source: S,
    config: ProducerConfig,
    meter: ThroughputMeter,
    frames_sent: u64,
    replies: u64,
    recoverable_errors: u64,
    oversized: u64,
    bytes_sent: u64,
}

impl<S: FrameSource> Producer<S> {
    /// `channel` must be a connected (producer) channel.
    pub fn new(channel: Channel, source: S, config: ProducerConfig) -> Result<Self, LinkError> {
        if config.sender_id.is_empty() {
            return Err(LinkError::InvalidEnvelope("empty sender id"));
        }
        Ok(Self {
            channel,
            source,
            config,
            meter: ThroughputMeter::new(),
            frames_sent: 0,
            replies: 0,
            recoverable_errors: 0,
            oversized: 0,
            bytes_sent: 0,
        })
    }

    /// Drive the loop to completion.
    ///
    /// Fatal errors are returned after the channel has been closed.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ProducerSummary, LinkError> {
        info!(
            sender = %self.config.sender_id,
            source = %self.source.describe(),
            discipline = %self.channel.discipline(),
            endpoint = %self.channel.endpoint(),
            "producer started"
        );

        let outcome = self.pump(&cancel).await;
        self.channel.close().await;

        let stop = outcome?;
        let summary = ProducerSummary {
            stop,
            frames_sent: self.frames_sent,
            replies: self.replies,
            dropped: self.channel.dropped(),
            recoverable_errors: self.recoverable_errors,
            oversized: self.oversized,
            bytes_sent: self.bytes_sent,
            round_trip: self.meter.round_trip(),
            bytes_per_sec: self.meter.bytes_per_sec(),
        };
        info!(sender = %self.config.sender_id, ?stop, "producer stopped: {summary}");
        Ok(summary)
    }

    async fn pump(&mut self, cancel: &CancellationToken) -> Result<StopReason, LinkError> {
        if !self.config.warmup.is_zero() {
            debug!(warmup = ?self.config.warmup, "warming up");
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                _ = tokio::time::sleep(self.config.warmup) => {}
            }
        }

        let interval = (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / f64::from(self.config.target_fps)));
        let mut consecutive_errors: u32 = 0;
        let mut last_report = Instant::now();

        loop {
            let started = Instant::now();

            let captured = tokio::select! {
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                frame = self.source.next_frame() => frame,
            };
            let frame = match captured {
                Ok(frame) => frame,
                Err(LinkError::CaptureExhausted) => return Ok(StopReason::Exhausted),
                Err(e) => return Err(e),
            };

            let envelope = Envelope::now(self.config.sender_id.as_str(), frame)?;
            let size = envelope.payload_len() as u64;

            let sent_at = Instant::now();
            let sent = tokio::select! {
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                sent = self.channel.send(&envelope) => sent,
            };

            match sent {
                Ok(reply) => {
                    consecutive_errors = 0;
                    self.frames_sent += 1;
                    self.bytes_sent += size;
                    self.meter.record(size);
                    if let Some(ack) = reply {
                        self.replies += 1;
                        self.meter.record_round_trip(sent_at.elapsed());
                        if ack != ACK_TOKEN {
                            debug!(len = ack.len(), "unexpected acknowledgment payload");
                        }
                    }
                }
                Err(LinkError::PayloadTooLarge { size, max }) => {
                    self.oversized += 1;
                    warn!(size, max, "frame too large for the wire, skipped");
                }
                Err(e) if e.is_recoverable() => {
                    self.recoverable_errors += 1;
                    consecutive_errors += 1;
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        error!(consecutive_errors, "giving up after repeated send failures");
                        return Err(e);
                    }
                    warn!(consecutive_errors, "send failed: {e}");
                }
                Err(e) => return Err(e),
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                info!(
                    frames = self.frames_sent,
                    fps = format_args!("{:.1}", self.meter.frames_per_sec()),
                    kib_per_sec = format_args!("{:.1}", self.meter.bytes_per_sec() / 1024.0),
                    "sending"
                );
                last_report = Instant::now();
            }

            if let Some(interval) = interval {
                let spent = started.elapsed();
                if spent < interval {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                        _ = tokio::time::sleep(interval - spent) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::capture::SyntheticSource;
    use crate::transport::{Discipline, Endpoint};
    use crate::wire::MAX_PAYLOAD_SIZE;

    /// Plays back a fixed list of frames, then runs dry.
    struct Scripted(VecDeque<Vec<u8>>);

    #[async_trait]
    impl FrameSource for Scripted {
        async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError> {
            self.0.pop_front().ok_or(LinkError::CaptureExhausted)
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[tokio::test]
    async fn empty_sender_id_is_refused() {
        let channel =
            Channel::connect(&Endpoint::new("127.0.0.1", 9), Discipline::PublishSubscribe)
                .unwrap();
        let result = Producer::new(channel, SyntheticSource::new(2, 2), ProducerConfig::default());
        assert!(matches!(result, Err(LinkError::InvalidEnvelope(_))));
    }

    #[tokio::test]
    async fn exhausted_source_stops_gracefully() {
        // Publish/subscribe never waits for a consumer, so nothing needs
        // to listen.
        let channel =
            Channel::connect(&Endpoint::new("127.0.0.1", 9), Discipline::PublishSubscribe)
                .unwrap();
        let config = ProducerConfig {
            sender_id: "nodeA".into(),
            ..ProducerConfig::default()
        };
        let producer =
            Producer::new(channel, SyntheticSource::new(4, 4).with_limit(3), config).unwrap();
        let summary = producer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert_eq!(summary.frames_sent, 3);
        assert_eq!(summary.replies, 0);
    }

    #[tokio::test]
    async fn oversized_frame_is_skipped() {
        let channel =
            Channel::connect(&Endpoint::new("127.0.0.1", 9), Discipline::PublishSubscribe)
                .unwrap();
        let config = ProducerConfig {
            sender_id: "nodeA".into(),
            ..ProducerConfig::default()
        };
        let frames = VecDeque::from([vec![0; MAX_PAYLOAD_SIZE + 1], vec![1; 16]]);
        let producer = Producer::new(channel, Scripted(frames), config).unwrap();

        let summary = producer.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert_eq!(summary.oversized, 1);
        assert_eq!(summary.frames_sent, 1);
        assert_eq!(summary.bytes_sent, 16);
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocked_send() {
        // Request/reply with no consumer blocks in send until cancelled.
        let channel =
            Channel::connect(&Endpoint::new("127.0.0.1", 9), Discipline::RequestReply).unwrap();
        let config = ProducerConfig {
            sender_id: "nodeA".into(),
            ..ProducerConfig::default()
        };
        let producer = Producer::new(channel, SyntheticSource::new(4, 4), config).unwrap();

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), producer.run(cancel))
            .await
            .expect("producer did not stop")
            .unwrap();
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(summary.frames_sent, 0);
    }

    #[test]
    fn summary_display() {
        let summary = ProducerSummary {
            stop: StopReason::Cancelled,
            frames_sent: 10,
            replies: 10,
            dropped: 0,
            recoverable_errors: 1,
            oversized: 0,
            bytes_sent: 2048,
            round_trip: Some(Duration::from_micros(1500)),
            bytes_per_sec: 0.0,
        };
        let text = summary.to_string();
        assert!(text.starts_with("10 frames sent (2048 bytes), 10 replies"));
        assert!(text.contains("round trip 1.500 ms"));
    }
}
