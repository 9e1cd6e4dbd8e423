//! Configuration for the sender node.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framehub_core::{ChannelOptions, DEFAULT_PORT, Discipline, Endpoint, LinkError, ProducerConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `request-reply` or `publish-subscribe`; must match the receiver.
    pub discipline: Discipline,
    /// Receiver host name or IP address.
    pub address: String,
    pub port: u16,
    /// Outbound buffer under publish-subscribe.
    pub queue_depth: usize,
    /// Acknowledgment deadline in milliseconds, 0 waits forever.
    pub reply_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated test pattern.
    Synthetic,
    /// Image files from `capture.directory`.
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    pub directory: String,
    /// Loop over the directory instead of stopping at its end.
    pub repeat: bool,
    /// Synthetic frame size in pixels.
    pub width: u32,
    pub height: u32,
    /// 0 sends as fast as the channel allows.
    pub target_fps: u32,
    /// 0 means unlimited.
    pub max_frames: u64,
    /// Delay before the first frame, in milliseconds.
    pub warmup_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Sender id stamped on every frame. Empty uses the host name.
    pub sender_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::RequestReply,
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            queue_depth: 64,
            reply_timeout_ms: 0,
            reconnect_interval_ms: 500,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            directory: "frames".into(),
            repeat: false,
            width: 320,
            height: 240,
            target_fps: 30,
            max_frames: 0,
            warmup_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The configured id, or this machine's host name.
    pub fn sender_id(&self) -> String {
        let id = self.identity.sender_id.trim();
        if id.is_empty() {
            gethostname::gethostname().to_string_lossy().into_owned()
        } else {
            id.to_string()
        }
    }

    /// Receiver to dial. A port inside `address` wins over `network.port`.
    pub fn endpoint(&self) -> Result<Endpoint, LinkError> {
        Endpoint::parse(&self.network.address, self.network.port)
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            queue_depth: self.network.queue_depth.max(1),
            reply_timeout: (self.network.reply_timeout_ms > 0)
                .then(|| Duration::from_millis(self.network.reply_timeout_ms)),
            reconnect_interval: Duration::from_millis(self.network.reconnect_interval_ms.max(10)),
            ..ChannelOptions::default()
        }
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            sender_id: self.sender_id(),
            target_fps: self.capture.target_fps,
            warmup: Duration::from_millis(self.capture.warmup_ms),
            ..ProducerConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
