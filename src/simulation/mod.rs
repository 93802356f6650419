//! Producer/consumer batches that exercise the tracked buffers.

pub mod batch;
pub mod driver;
pub mod tasks;
pub mod workload;

use crate::buffer::BufferError;
use thiserror::Error;

pub use batch::BatchPlanner;
pub use driver::{BatchPhase, BatchReport, ItemTypeReport, SimulationDriver};
pub use workload::{Workload, consumer_delay, payload_size, producer_delay};

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Failed to create buffer: {0}")]
    Buffer(#[from] BufferError),
    #[error("Simulation task failed: {0}")]
    TaskFailed(String),
}
