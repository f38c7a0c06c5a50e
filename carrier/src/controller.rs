use std::{path::Path, sync::LazyLock};

use carrier_common::{Signal, internal, logging};
use carrier_delivery::{
    DeliveryProvider, EmailRepository, QueueProcessor, SparkPostConfig, SparkPostProvider,
};
use carrier_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level service configuration
///
/// ```ron
/// Carrier (
///     store: File(path: "/var/lib/carrier/emails"),
///     provider: (api_key: "..."),
///     processor: (interval_secs: 60, batch_limit: 25),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Carrier {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub provider: SparkPostConfig,
    #[serde(default)]
    pub processor: QueueProcessor,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    // The processor finishes its current invocation and returns first,
    // unless a second CTRL+C forces the issue.
    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Carrier {
    /// Read and parse a RON configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    /// Open the configured store with the queue index declared
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened
    pub fn repository(&self) -> anyhow::Result<EmailRepository> {
        let store = self
            .store
            .clone()
            .into_store([EmailRepository::queue_index()])?;
        Ok(EmailRepository::new(store))
    }

    /// A fresh, uninitialised SparkPost provider
    #[must_use]
    pub fn provider(&self) -> SparkPostProvider {
        SparkPostProvider::new(self.provider.clone())
    }

    /// Run the queue processor until a shutdown signal
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid or
    /// the store cannot be opened.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        self.processor.validate()?;
        let repository = self.repository()?;

        internal!(level = INFO, store = ?self.store, provider = ?self.provider, "Controller running");

        let provider = self.provider;
        let make_provider =
            move || -> Box<dyn DeliveryProvider> { Box::new(SparkPostProvider::new(provider.clone())) };

        let ret = tokio::select! {
            r = self.processor.serve(&repository, make_provider, SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let carrier: Carrier = ron::from_str("Carrier ()").expect("Failed to parse");
        assert_eq!(carrier.store, StoreConfig::default());
        assert_eq!(carrier.provider, SparkPostConfig::default());
        assert_eq!(carrier.processor, QueueProcessor::default());
    }

    #[test]
    fn test_memory_repository() {
        let carrier = Carrier {
            store: StoreConfig::Memory,
            ..Carrier::default()
        };
        assert!(carrier.repository().is_ok());
    }
}
