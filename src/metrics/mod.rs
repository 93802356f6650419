pub mod registry;

#[cfg(feature = "metrics")]
pub mod exporter;

pub use registry::{
    BufferCounters, BufferId, DEFAULT_SUSPENSION_LOG_CAPACITY, GlobalCounters, MetricsRegistry,
    SuspensionEvent,
};

#[cfg(feature = "metrics")]
pub use exporter::{MetricsError, PrometheusExporter};
