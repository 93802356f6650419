#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Counters and durations stay far below the limits
    clippy::cast_possible_wrap,       // Gauges take i64 from non-negative counters
    clippy::cast_precision_loss,      // Acceptable for utilization ratios
    clippy::cast_sign_loss,           // Rounded percentages are non-negative
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod domain;
pub mod instrumentation;
pub mod metrics;
pub mod monitor;
pub mod server;
pub mod simulation;

// Re-export main types for easy access
pub use app::{App, Config};
pub use buffer::{BufferError, BufferView, TrackedBuffer};
pub use domain::{BufferStats, BufferStatus, ItemType};
pub use metrics::{BufferId, MetricsRegistry};
pub use monitor::StatsAggregator;
pub use server::{BroadcastServer, StatsPublisher};
pub use simulation::SimulationDriver;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
