//! framehub receiver: entry point.
//!
//! ```text
//! framehub-receiver                        Bind tcp://*:6666, request/reply
//! framehub-receiver --discipline 2         Publish/subscribe fan-in
//! framehub-receiver --address 10.0.0.5     Bind one interface only
//! framehub-receiver --json                 Final report as JSON
//! framehub-receiver --gen-config           Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use framehub_core::Discipline;
use framehub_receiver::config::{DisplayMode, ReceiverConfig};
use framehub_receiver::service::ReceiverService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framehub-receiver", about = "Receive framehub frames and report FPS statistics")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framehub-receiver.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Messaging discipline: request-reply (1) or publish-subscribe (2).
    #[arg(short, long)]
    discipline: Option<Discipline>,

    /// Interface to bind, `host` or `host:port` (overrides config; default all interfaces).
    #[arg(short, long)]
    address: Option<String>,

    /// Port to bind (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// What to do with each frame.
    #[arg(long, value_enum)]
    display: Option<DisplayMode>,

    /// Print the final report as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(self, config: &mut ReceiverConfig) {
        if let Some(discipline) = self.discipline {
            config.network.discipline = discipline;
        }
        if let Some(address) = self.address {
            config.network.address = address;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(mode) = self.display {
            config.display.mode = mode;
        }
        if self.json {
            config.report.json = true;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ReceiverConfig::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framehub-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("discipline: {}", config.network.discipline);

    let service = ReceiverService::new(config);
    let cancel = CancellationToken::new();

    // Ctrl-C handler.
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    let outcome = match service.run(cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };
    if let Some(fault) = &outcome.fault {
        warn!("receive loop ended early: {fault}");
    }

    let report = service.render(&outcome)?;
    println!();
    println!("{}", report.trim_end());
    Ok(())
}
