//! Broadcast server: WebSocket fan-out of stats snapshots plus health and
//! metrics endpoints.

pub mod broadcast;
pub mod routes;
pub mod session;

pub use broadcast::BroadcastServer;
pub use routes::HealthReport;
pub use session::{BroadcastStats, BroadcastStatsSnapshot, SessionId, SessionRegistry};

use crate::domain::BufferStats;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Destination for the snapshots the simulation computes.
#[cfg_attr(test, automock)]
pub trait StatsPublisher: Send + Sync {
    /// Returns how many subscribers the snapshot reached.
    fn publish<'a>(&self, stats: Option<&'a BufferStats>) -> usize;
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Server is already running")]
    AlreadyRunning,
    #[error("Server has been stopped and cannot be restarted")]
    Stopped,
    #[error("Server is not running")]
    NotRunning,
    #[error("Failed to bind listener: {0}")]
    Bind(#[from] warp::Error),
}
