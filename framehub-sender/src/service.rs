//! Sender service: wires the config to a channel, a frame source and the
//! producer loop.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use framehub_core::{
    Channel, DirectorySource, FrameSource, LinkError, Producer, ProducerSummary, SyntheticSource,
};

use crate::config::{SenderConfig, SourceKind};

pub struct SenderService {
    config: SenderConfig,
}

impl SenderService {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Build the configured frame source.
    pub fn open_source(&self) -> Result<Box<dyn FrameSource>, LinkError> {
        let capture = &self.config.capture;
        let limit = (capture.max_frames > 0).then_some(capture.max_frames);
        match capture.source {
            SourceKind::Synthetic => {
                let source = SyntheticSource::new(capture.width, capture.height);
                Ok(Box::new(match limit {
                    Some(n) => source.with_limit(n),
                    None => source,
                }))
            }
            SourceKind::Directory => {
                let source = DirectorySource::open(&capture.directory, capture.repeat)?;
                let source: Box<dyn FrameSource> = match limit {
                    Some(n) => Box::new(Limited::new(source, n)),
                    None => Box::new(source),
                };
                Ok(source)
            }
        }
    }

    /// Run until `cancel` fires or the source is exhausted.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ProducerSummary, LinkError> {
        let endpoint = self.config.endpoint()?;
        let discipline = self.config.network.discipline;
        let channel =
            Channel::connect_with(&endpoint, discipline, &self.config.channel_options())?;
        let source = self.open_source()?;
        let producer = Producer::new(channel, source, self.config.producer_config())?;

        info!(%endpoint, %discipline, "sending");
        producer.run(cancel).await
    }
}

/// Caps any source at a fixed number of frames.
struct Limited<S> {
    inner: S,
    remaining: u64,
}

impl<S> Limited<S> {
    fn new(inner: S, frames: u64) -> Self {
        Self {
            inner,
            remaining: frames,
        }
    }
}

#[async_trait]
impl<S: FrameSource> FrameSource for Limited<S> {
    async fn next_frame(&mut self) -> Result<Vec<u8>, LinkError> {
        if self.remaining == 0 {
            return Err(LinkError::CaptureExhausted);
        }
        let frame = self.inner.next_frame().await?;
        self.remaining -= 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("{} (limit {})", self.inner.describe(), self.remaining)
    }
}

// ── Tests ────────────────────────────────────────────────────────
