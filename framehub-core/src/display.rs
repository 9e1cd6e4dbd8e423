//! Where received frames go after they are counted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::envelope::Envelope;
use crate::error::LinkError;
use crate::stats::Snapshot;
use crate::timestamp;

#[async_trait]
pub trait FrameDisplay: Send {
    /// Present one frame with the statistics it produced.
    ///
    /// Errors are logged by the consumer and never stop the loop.
    async fn show(&mut self, envelope: &Envelope, snapshot: &Snapshot) -> Result<(), LinkError>;
}

#[async_trait]
impl FrameDisplay for Box<dyn FrameDisplay> {
    async fn show(&mut self, envelope: &Envelope, snapshot: &Snapshot) -> Result<(), LinkError> {
        (**self).show(envelope, snapshot).await
    }
}

/// Discards frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

#[async_trait]
impl FrameDisplay for NullDisplay {
    async fn show(&mut self, _: &Envelope, _: &Snapshot) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Emits the per-frame overlay as a debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

#[async_trait]
impl FrameDisplay for LogDisplay {
    async fn show(&mut self, envelope: &Envelope, snapshot: &Snapshot) -> Result<(), LinkError> {
        let fps = snapshot
            .running_fps
            .map(|f| format!("{f:.2}"))
            .unwrap_or_else(|| "n/a".into());
        debug!(
            sender = envelope.sender_id(),
            sent = %timestamp::encode(&envelope.sent_at()),
            received = %timestamp::encode(&snapshot.received_at),
            delta = %format_seconds(snapshot.latency),
            image = snapshot.frame_index,
            elapsed = %format_seconds(snapshot.elapsed),
            fps = %fps,
            bytes = envelope.payload_len(),
            "frame"
        );
        Ok(())
    }
}

/// Keeps the latest frame of every sender at `<dir>/<sender>.img`.
#[derive(Debug, Clone)]
pub struct SaveDisplay {
    dir: PathBuf,
}

impl SaveDisplay {
    /// Creates `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// File holding the latest frame of `sender_id`.
    pub fn path_for(&self, sender_id: &str) -> PathBuf {
        let name: String = sender_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                c => c,
            })
            .collect();
        let name = if name.starts_with('.') {
            format!("_{name}")
        } else {
            name
        };
        self.dir.join(format!("{name}.img"))
    }
}

#[async_trait]
impl FrameDisplay for SaveDisplay {
    async fn show(&mut self, envelope: &Envelope, _: &Snapshot) -> Result<(), LinkError> {
        let path = self.path_for(envelope.sender_id());
        tokio::fs::write(&path, envelope.payload()).await?;
        Ok(())
    }
}

fn format_seconds(delta: chrono::TimeDelta) -> String {
    match delta.num_microseconds() {
        Some(us) => format!("{:.6}s", us as f64 / 1e6),
        None => format!("{}ms", delta.num_milliseconds()),
    }
}
