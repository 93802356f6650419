use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Delay tiers for producers and consumers, each scaled by a random jitter
/// factor drawn from `jitter_min..jitter_max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    #[serde(with = "super::serde_helpers")]
    pub producer_slow: Duration,
    #[serde(with = "super::serde_helpers")]
    pub producer_medium: Duration,
    #[serde(with = "super::serde_helpers")]
    pub producer_fast: Duration,
    #[serde(with = "super::serde_helpers")]
    pub consumer_fast: Duration,
    #[serde(with = "super::serde_helpers")]
    pub consumer_medium: Duration,
    #[serde(with = "super::serde_helpers")]
    pub consumer_slow: Duration,
    pub consumer_fast_above: f64,
    pub consumer_medium_above: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            producer_slow: Duration::from_millis(1000),
            producer_medium: Duration::from_millis(500),
            producer_fast: Duration::from_millis(100),
            consumer_fast: Duration::from_millis(100),
            consumer_medium: Duration::from_millis(500),
            consumer_slow: Duration::from_millis(1000),
            consumer_fast_above: 0.8,
            consumer_medium_above: 0.5,
            jitter_min: 0.5,
            jitter_max: 1.5,
        }
    }
}

/// Payload sizes by item index: divisible by 10, by 5, by 3, otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadSizes {
    pub every_tenth: usize,
    pub every_fifth: usize,
    pub every_third: usize,
    pub base: usize,
}

impl Default for PayloadSizes {
    fn default() -> Self {
        Self {
            every_tenth: 10_000,
            every_fifth: 5_000,
            every_third: 1_000,
            base: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Capacity is `capacity_base + (batch % capacity_cycle) * capacity_step`
    pub capacity_base: usize,
    pub capacity_step: usize,
    pub capacity_cycle: u64,
    pub min_producer_items: usize,
    /// Exclusive upper bound
    pub max_producer_items: usize,
    #[serde(with = "super::serde_helpers")]
    pub update_interval: Duration,
    #[serde(with = "super::serde_helpers")]
    pub empty_poll_delay: Duration,
    #[serde(with = "super::serde_helpers")]
    pub inter_batch_delay: Duration,
    pub seed: Option<u64>,
    pub max_batches: Option<u64>,
    pub payload_sizes: PayloadSizes,
    pub pacing: PacingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity_base: 10,
            capacity_step: 2,
            capacity_cycle: 10,
            min_producer_items: 50,
            max_producer_items: 100,
            update_interval: Duration::from_millis(500),
            empty_poll_delay: Duration::from_millis(100),
            inter_batch_delay: Duration::from_secs(5),
            seed: None,
            max_batches: None,
            payload_sizes: PayloadSizes::default(),
            pacing: PacingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub max_sessions: usize,
    pub static_dir: PathBuf,
    #[serde(with = "super::serde_helpers")]
    pub ping_interval: Duration,
    #[serde(with = "super::serde_helpers")]
    pub graceful_shutdown: Duration,
    #[serde(with = "super::serde_helpers")]
    pub hard_shutdown: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            max_sessions: 100,
            static_dir: PathBuf::from("static"),
            ping_interval: Duration::from_secs(15),
            graceful_shutdown: Duration::from_millis(1000),
            hard_shutdown: Duration::from_millis(2000),
        }
    }
}
