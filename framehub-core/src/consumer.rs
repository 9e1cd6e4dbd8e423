//! Consumer loop: receive, timestamp, record, display, acknowledge.
//!
//! Everything that touches the statistics engine happens on the task
//! that calls [`Consumer::run`]. On cancellation the loop finalizes the
//! engine, closes the channel and returns the report; a receive that was
//! still waiting records nothing.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::display::FrameDisplay;
use crate::error::LinkError;
use crate::stats::{Report, StatsEngine};
use crate::timestamp;
use crate::transport::Channel;
use crate::wire::ACK_TOKEN;

/// What a finished consumer run produced.
#[derive(Debug)]
pub struct ConsumerOutcome {
    pub report: Report,
    /// Envelopes dropped because they failed to decode or validate.
    pub malformed: u64,
    /// Frames the consumer's publish/subscribe queue had to drop.
    pub dropped: u64,
    /// The fatal error that ended the loop, if it was not cancelled.
    pub fault: Option<LinkError>,
}

pub struct Consumer<D> {
    channel: Channel,
    stats: StatsEngine,
    display: D,
    malformed: u64,
}

impl<D: FrameDisplay> Consumer<D> {
    /// `channel` must be a bound (consumer) channel.
    pub fn new(channel: Channel, display: D) -> Self {
        Self {
            channel,
            stats: StatsEngine::new(),
            display,
            malformed: 0,
        }
    }

    pub fn stats(&self) -> &StatsEngine {
        &self.stats
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerOutcome {
        info!(
            endpoint = %self.channel.endpoint(),
            discipline = %self.channel.discipline(),
            "consumer started"
        );

        let fault = self.pump(&cancel).await.err();
        if let Some(e) = &fault {
            error!("consumer stopped: {e}");
        }

        let report = self.stats.finalize();
        let dropped = self.channel.dropped();
        self.channel.close().await;
        info!(
            frames = report.total_frames(),
            malformed = self.malformed,
            dropped,
            "consumer finished"
        );

        ConsumerOutcome {
            report,
            malformed: self.malformed,
            dropped,
            fault,
        }
    }

    async fn pump(&mut self, cancel: &CancellationToken) -> Result<(), LinkError> {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                r = self.channel.receive() => r,
            };

            match received {
                Ok(envelope) => {
                    let received_at = timestamp::now();
                    let snapshot = self.stats.record(&envelope, received_at);
                    if let Err(e) = self.display.show(&envelope, &snapshot).await {
                        warn!(sender = envelope.sender_id(), "display failed: {e}");
                    }
                    self.acknowledge()?;
                }
                Err(e) if e.is_per_envelope() => {
                    self.malformed += 1;
                    warn!(malformed = self.malformed, "dropping envelope: {e}");
                    self.acknowledge()?;
                }
                Err(e) if e.is_recoverable() => {
                    debug!("receive failed, continuing: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn acknowledge(&mut self) -> Result<(), LinkError> {
        if self.channel.discipline().acknowledges() {
            self.channel.acknowledge(ACK_TOKEN)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::display::NullDisplay;
    use crate::transport::{Discipline, Endpoint};

    #[tokio::test]
    async fn cancel_with_no_frames_reports_no_data() {
        let channel = Channel::bind(&Endpoint::new("127.0.0.1", 0), Discipline::RequestReply)
            .await
            .unwrap();
        let consumer = Consumer::new(channel, NullDisplay);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let outcome = consumer.run(cancel).await;
        assert_eq!(outcome.report, Report::NoData);
        assert_eq!(outcome.malformed, 0);
        assert!(outcome.fault.is_none());
    }

    #[tokio::test]
    async fn already_cancelled_token_stops_immediately() {
        let channel =
            Channel::bind(&Endpoint::new("127.0.0.1", 0), Discipline::PublishSubscribe)
                .await
                .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = Consumer::new(channel, NullDisplay).run(cancel).await;
        assert!(!outcome.report.has_data());
    }
}
