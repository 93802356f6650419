pub mod aggregator;

pub use aggregator::{
    SnapshotError, StatsAggregator, aggregate_status, buffer_status, utilization_pct,
};
