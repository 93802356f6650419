//! Domain layer for backpressure-monitor.
//!
//! Contains the wire-level types shared across modules:
//! - `ItemType`: the payload kinds the simulation pushes through buffers
//! - `BufferStats`: one immutable snapshot per broadcast cycle
//! - `SessionCount`: the live-subscriber message

pub mod item_type;
pub mod stats;

pub use item_type::ItemType;
pub use stats::{BatchConfig, BatchInfo, BufferStats, BufferStatus, BufferTypeStats, SessionCount};
