use super::groups::{ServerConfig, SimulationConfig};
use super::serde_helpers::{
    load_env_enum, load_env_path, load_env_path_opt, load_env_var, load_env_var_opt,
};
use super::{ConfigError, LogFormat, LogLevel};
use crate::instrumentation::MeasurementMode;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port the broadcast server listens on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Address the broadcast server binds to
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// How item sizes are measured
    #[arg(long, env = "MEASUREMENT_MODE", default_value = "layout")]
    pub measurement: MeasurementMode,

    /// Interval between stats snapshots in milliseconds
    #[arg(long, env = "UPDATE_INTERVAL_MS", default_value = "500")]
    pub update_interval_ms: u64,

    /// Pause between batches in milliseconds
    #[arg(long, env = "INTER_BATCH_DELAY_MS", default_value = "5000")]
    pub inter_batch_delay_ms: u64,

    /// Stop after this many batches (runs forever when unset)
    #[arg(long, env = "MAX_BATCHES")]
    pub max_batches: Option<u64>,

    /// Seed for reproducible item counts and pacing jitter
    #[arg(long, env = "SIMULATION_SEED")]
    pub seed: Option<u64>,

    /// Maximum number of concurrent subscribers
    #[arg(long, env = "MAX_SESSIONS", default_value = "100")]
    pub max_sessions: usize,

    /// Directory served at `/`
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Simulation tunables (file only; flags above take precedence)
    #[arg(skip)]
    pub simulation: SimulationConfig,

    /// Server tunables (file only; flags above take precedence)
    #[arg(skip)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            measurement: MeasurementMode::Layout,
            update_interval_ms: 500,
            inter_batch_delay_ms: 5000,
            max_batches: None,
            seed: None,
            max_sessions: 100,
            static_dir: PathBuf::from("static"),
            config_file: None,
            simulation: SimulationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_var("PORT", &mut config.port)?;
        load_env_var("BIND_ADDRESS", &mut config.bind_address)?;
        load_env_enum("LOG_LEVEL", &mut config.log_level)?;
        load_env_enum("LOG_FORMAT", &mut config.log_format)?;
        load_env_enum("MEASUREMENT_MODE", &mut config.measurement)?;
        load_env_var("UPDATE_INTERVAL_MS", &mut config.update_interval_ms)?;
        load_env_var("INTER_BATCH_DELAY_MS", &mut config.inter_batch_delay_ms)?;
        load_env_var_opt("MAX_BATCHES", &mut config.max_batches)?;
        load_env_var_opt("SIMULATION_SEED", &mut config.seed)?;
        load_env_var("MAX_SESSIONS", &mut config.max_sessions)?;
        load_env_path("STATIC_DIR", &mut config.static_dir);
        load_env_path_opt("CONFIG_FILE", &mut config.config_file);

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Copies the top-level settings into the simulation and server groups.
    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.simulation.update_interval = std::time::Duration::from_millis(self.update_interval_ms);
        self.simulation.inter_batch_delay =
            std::time::Duration::from_millis(self.inter_batch_delay_ms);
        self.simulation.max_batches = self.max_batches;
        self.simulation.seed = self.seed;

        self.server.bind_address = self.bind_address;
        self.server.port = self.port;
        self.server.max_sessions = self.max_sessions;
        self.server.static_dir = self.static_dir.clone();

        Ok(())
    }
}
