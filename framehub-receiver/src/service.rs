//! Receiver service: binds the channel, picks a display and runs the
//! consumer loop until cancelled.

use tokio_util::sync::CancellationToken;
use tracing::info;

use framehub_core::{
    Channel, Consumer, ConsumerOutcome, FrameDisplay, LinkError, LogDisplay, NullDisplay, SaveDisplay,
};

use crate::config::{DisplayMode, ReceiverConfig};

pub struct ReceiverService {
    config: ReceiverConfig,
}

impl ReceiverService {
    pub fn new(config: ReceiverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn open_display(&self) -> Result<Box<dyn FrameDisplay>, LinkError> {
        let display: Box<dyn FrameDisplay> = match self.config.display.mode {
            DisplayMode::Log => Box::new(LogDisplay),
            DisplayMode::None => Box::new(NullDisplay),
            DisplayMode::Save => Box::new(SaveDisplay::new(&self.config.display.save_dir)?),
        };
        Ok(display)
    }

    /// Bind and receive until `cancel` fires.
    ///
    /// Setup failures are returned as errors; anything after the bind
    /// still ends in an outcome with a report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ConsumerOutcome, LinkError> {
        let endpoint = self.config.endpoint()?;
        let discipline = self.config.network.discipline;
        let channel =
            Channel::bind_with(&endpoint, discipline, &self.config.channel_options()).await?;
        let display = self.open_display()?;

        info!(%endpoint, %discipline, "receiving");
        Ok(Consumer::new(channel, display).run(cancel).await)
    }

    /// Final report in the configured format.
    pub fn render(&self, outcome: &ConsumerOutcome) -> Result<String, serde_json::Error> {
        if self.config.report.json {
            return serde_json::to_string_pretty(&outcome.report);
        }
        let mut text = outcome.report.to_string();
        if outcome.malformed > 0 {
            text.push_str(&format!("Malformed envelopes dropped: {}\n", outcome.malformed));
        }
        if outcome.dropped > 0 {
            text.push_str(&format!("Frames dropped on overflow: {}\n", outcome.dropped));
        }
        Ok(text)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiverConfig;

    fn loopback_config() -> ReceiverConfig {
        let mut config = ReceiverConfig::default();
        config.network.address = "127.0.0.1".into();
        config.network.port = 0;
        config.display.mode = DisplayMode::None;
        config
    }

    #[tokio::test]
    async fn cancelled_run_reports_no_data() {
        let service = ReceiverService::new(loopback_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = service.run(cancel).await.unwrap();
        assert!(!outcome.report.has_data());
        assert!(service.render(&outcome).unwrap().contains("No frames received"));
    }

    #[tokio::test]
    async fn json_report() {
        let mut config = loopback_config();
        config.report.json = true;
        let service = ReceiverService::new(config);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = service.run(cancel).await.unwrap();
        let text = service.render(&outcome).unwrap();
        assert!(text.contains("\"status\": \"no_data\""));
    }

    #[tokio::test]
    async fn bind_failure_is_a_setup_error() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = loopback_config();
        config.network.port = holder.local_addr().unwrap().port();
        let service = ReceiverService::new(config);
        let err = service.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, LinkError::Bind { .. }));
        assert!(err.to_string().contains("request-reply"));
    }
}
