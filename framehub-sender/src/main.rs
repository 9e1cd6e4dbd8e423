//! framehub sender: entry point.
//!
//! ```text
//! framehub-sender                        Stream to 127.0.0.1:6666
//! framehub-sender --address 10.0.0.5     Stream to another receiver
//! framehub-sender --discipline pub-sub   Fire-and-forget instead of request/reply
//! framehub-sender --config <path>        Load a custom config TOML
//! framehub-sender --gen-config           Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framehub_core::Discipline;
use framehub_sender::config::{SenderConfig, SourceKind};
use framehub_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framehub-sender", about = "Stream timestamped frames to a framehub receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framehub-sender.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Messaging discipline: request-reply (1) or publish-subscribe (2).
    #[arg(short, long)]
    discipline: Option<Discipline>,

    /// Receiver address, `host` or `host:port` (overrides config).
    #[arg(short, long)]
    address: Option<String>,

    /// Receiver port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Sender id (defaults to the host name).
    #[arg(long)]
    id: Option<String>,

    /// Target frames per second, 0 for unpaced.
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Stream the files of this directory instead of a test pattern.
    #[arg(long)]
    directory: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut SenderConfig) {
        if let Some(discipline) = self.discipline {
            config.network.discipline = discipline;
        }
        if let Some(address) = self.address {
            config.network.address = address;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(id) = self.id {
            config.identity.sender_id = id;
        }
        if let Some(fps) = self.fps {
            config.capture.target_fps = fps;
        }
        if let Some(frames) = self.frames {
            config.capture.max_frames = frames;
        }
        if let Some(dir) = self.directory {
            config.capture.source = SourceKind::Directory;
            config.capture.directory = dir.to_string_lossy().into_owned();
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framehub-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("discipline: {}", config.network.discipline);
    info!("sender id: {}", config.sender_id());
    info!("target FPS: {}", config.capture.target_fps);

    let service = SenderService::new(config);
    let cancel = CancellationToken::new();

    // Ctrl-C handler.
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    match service.run(cancel).await {
        Ok(summary) => {
            info!("{summary}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
