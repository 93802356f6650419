pub mod config;
pub mod initialization;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use initialization::InitializationError;
pub use logging_system::{LoggingSystem, setup_logging_safe};
pub use shutdown::SignalHandler;

use crate::metrics::MetricsRegistry;
use crate::server::{BroadcastServer, StatsPublisher};
use crate::simulation::SimulationDriver;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The wired-up process: one registry, one broadcast server, one driver.
pub struct App {
    config: Config,
    registry: Arc<MetricsRegistry>,
    server: Arc<BroadcastServer>,
    driver: Arc<SimulationDriver>,
}

impl App {
    pub async fn from_args<I, T>(args: I) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config).await
    }

    pub async fn from_config(
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let final_config = if let Some(config_file) = &config.config_file {
            eprintln!("Loading configuration from file: {}", config_file.display());
            Config::from_file(config_file)?
        } else {
            config
        };

        setup_logging_safe(final_config.log_level, final_config.log_format)?;

        info!("Starting backpressure-monitor v{}", env!("CARGO_PKG_VERSION"));
        info!(
            port = final_config.port,
            measurement = ?final_config.measurement,
            update_interval_ms = final_config.update_interval_ms,
            max_batches = ?final_config.max_batches,
            seed = ?final_config.seed,
            "Configuration loaded"
        );

        let registry = Arc::new(MetricsRegistry::new(final_config.measurement.backend()));
        let server = Arc::new(BroadcastServer::new(final_config.server.clone()));
        let publisher: Arc<dyn StatsPublisher> = server.clone();
        let driver = Arc::new(SimulationDriver::new(
            final_config.simulation.clone(),
            registry.clone(),
            publisher,
        ));

        Ok(Self {
            config: final_config,
            registry,
            server,
            driver,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn server(&self) -> &Arc<BroadcastServer> {
        &self.server
    }

    /// Serves until a signal arrives or the driver reaches its batch limit.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let shutdown = CancellationToken::new();
        let signals = SignalHandler::install(shutdown.clone());

        let local_addr = self.server.start()?;
        info!(%local_addr, "backpressure-monitor is running. Press Ctrl+C to stop.");

        let mut simulation = tokio::spawn({
            let driver = self.driver.clone();
            let shutdown = shutdown.clone();
            async move { driver.run(shutdown).await }
        });

        let completed = tokio::select! {
            _ = signals.wait() => {
                shutdown.cancel();
                simulation.await
            }
            finished = &mut simulation => finished,
        };

        match completed {
            Ok(batches) => info!(batches, "Simulation finished"),
            Err(e) => warn!(error = %e, "Simulation task ended abnormally"),
        }

        shutdown.cancel();
        self.server.stop().await?;
        info!("backpressure-monitor stopped.");
        Ok(())
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match App::from_args(std::env::args_os()).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Application error: {}", e);
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    }

    Ok(())
}
