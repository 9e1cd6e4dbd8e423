//! Receiver configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use framehub_core::{ChannelOptions, DEFAULT_PORT, Discipline, Endpoint, LinkError};

/// Top-level configuration for the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub network: NetworkConfig,
    pub display: DisplayConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `request-reply` or `publish-subscribe`; senders must match.
    pub discipline: Discipline,
    /// Interface to bind. Empty binds every interface when
    /// `wildcard_bind` is set, loopback otherwise.
    pub address: String,
    pub port: u16,
    pub wildcard_bind: bool,
    /// Inbound buffer under publish-subscribe.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Per-frame overlay as debug log events.
    Log,
    /// Count only.
    None,
    /// Keep each sender's latest frame on disk.
    Save,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    /// Directory used by `save` mode.
    pub save_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Print the final report as JSON instead of text.
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::RequestReply,
            address: String::new(),
            port: DEFAULT_PORT,
            wildcard_bind: true,
            queue_depth: 64,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Log,
            save_dir: "frames".into(),
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

impl ReceiverConfig {
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

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Where to bind. A port inside `address` wins over `network.port`.
    pub fn endpoint(&self) -> Result<Endpoint, LinkError> {
        let address = self.network.address.trim();
        match (address.is_empty(), self.network.wildcard_bind) {
            (true, true) => Ok(Endpoint::wildcard(self.network.port)),
            (true, false) => Ok(Endpoint::new("127.0.0.1", self.network.port)),
            (false, _) => Endpoint::parse(address, self.network.port),
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            queue_depth: self.network.queue_depth.max(1),
            ..ChannelOptions::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
