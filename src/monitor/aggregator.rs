use crate::buffer::BufferView;
use crate::domain::{BatchInfo, BufferStats, BufferStatus, BufferTypeStats, ItemType};
use crate::metrics::{BufferId, MetricsRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("No buffers to aggregate")]
    NoBuffers,
    #[error("Buffer {buffer_id} ({item_type}) reports zero capacity")]
    ZeroCapacity {
        buffer_id: BufferId,
        item_type: ItemType,
    },
    #[error("Counter invariant violated: {consumptions} consumptions exceed {emissions} emissions")]
    CounterInvariant { emissions: u64, consumptions: u64 },
}

/// `round(100 * size / capacity)` clamped to `0..=100`.
pub fn utilization_pct(size: usize, capacity: usize) -> u8 {
    if capacity == 0 {
        return 0;
    }
    let pct = (size as f64 * 100.0 / capacity as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Status of a single buffer: critical only once it is completely full.
///
/// Thresholds apply to the exact ratio, not to the rounded
/// [`utilization_pct`]. From a capacity of 61 up the two can disagree: 43/61
/// reports 70% but is already `Warning`.
pub fn buffer_status(size: usize, capacity: usize) -> BufferStatus {
    if size >= capacity {
        BufferStatus::Critical
    } else if above_fraction(size, capacity, 7) {
        BufferStatus::Warning
    } else {
        BufferStatus::Normal
    }
}

/// Status across all buffers: critical above 90% utilization.
pub fn aggregate_status(size: usize, capacity: usize) -> BufferStatus {
    if above_fraction(size, capacity, 9) {
        BufferStatus::Critical
    } else if above_fraction(size, capacity, 7) {
        BufferStatus::Warning
    } else {
        BufferStatus::Normal
    }
}

// size / capacity > tenths / 10, in integers
fn above_fraction(size: usize, capacity: usize, tenths: usize) -> bool {
    size.saturating_mul(10) > capacity.saturating_mul(tenths)
}

/// Builds [`BufferStats`] snapshots from live buffers and the registry.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    registry: Arc<MetricsRegistry>,
}

impl StatsAggregator {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Snapshot for this cycle, or `None` after logging why it failed.
    pub fn snapshot(
        &self,
        buffers: &[Arc<dyn BufferView>],
        batch_info: Option<BatchInfo>,
    ) -> Option<BufferStats> {
        match self.compute(buffers, batch_info) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Skipping stats snapshot");
                None
            }
        }
    }

    pub fn compute(
        &self,
        buffers: &[Arc<dyn BufferView>],
        batch_info: Option<BatchInfo>,
    ) -> Result<BufferStats, SnapshotError> {
        if buffers.is_empty() {
            return Err(SnapshotError::NoBuffers);
        }

        let mut per_type = BTreeMap::new();
        let mut total_size = 0usize;
        let mut total_capacity = 0usize;

        for buffer in buffers {
            let capacity = buffer.capacity();
            if capacity == 0 {
                return Err(SnapshotError::ZeroCapacity {
                    buffer_id: buffer.id(),
                    item_type: buffer.item_type(),
                });
            }

            let size = buffer.current_size();
            total_size += size;
            total_capacity += capacity;

            per_type.insert(
                buffer.item_type().as_str().to_string(),
                BufferTypeStats {
                    buffer_size: size,
                    buffer_capacity: capacity,
                    utilization_pct: utilization_pct(size, capacity),
                    emissions: buffer.emissions(),
                    consumptions: buffer.consumptions(),
                    suspensions: buffer.suspensions(),
                    memory_usage: buffer.memory_usage(),
                    status: buffer_status(size, capacity),
                },
            );
        }

        let totals = self.registry.totals();
        if totals.consumptions > totals.emissions {
            return Err(SnapshotError::CounterInvariant {
                emissions: totals.emissions,
                consumptions: totals.consumptions,
            });
        }

        let memory_per_item = if total_size > 0 {
            totals.memory_usage / total_size as u64
        } else {
            0
        };
        let pct = utilization_pct(total_size, total_capacity);

        let stats = BufferStats {
            buffer_size: total_size,
            buffer_capacity: total_capacity,
            total_emissions: totals.emissions,
            total_consumptions: totals.consumptions,
            suspensions: totals.suspensions,
            waiting_items: totals.emissions - totals.consumptions,
            memory_usage: totals.memory_usage,
            memory_per_item,
            memory_utilization_pct: pct,
            utilization_pct: pct,
            status: aggregate_status(total_size, total_capacity),
            buffers: per_type,
            last_update: chrono::Utc::now().timestamp_millis(),
            batch_info,
        };

        debug!(
            size = stats.buffer_size,
            capacity = stats.buffer_capacity,
            emissions = stats.total_emissions,
            consumptions = stats.total_consumptions,
            suspensions = stats.suspensions,
            memory = stats.memory_usage,
            memory_per_item,
            status = %stats.status,
            "Buffer stats"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization_rounds_and_clamps() {
        assert_eq!(utilization_pct(0, 10), 0);
        assert_eq!(utilization_pct(1, 3), 33);
        assert_eq!(utilization_pct(2, 3), 67);
        assert_eq!(utilization_pct(10, 10), 100);
        assert_eq!(utilization_pct(15, 10), 100);
        assert_eq!(utilization_pct(5, 0), 0);
    }

    #[test]
    fn test_buffer_status_thresholds() {
        assert_eq!(buffer_status(10, 10), BufferStatus::Critical);
        assert_eq!(buffer_status(9, 10), BufferStatus::Warning);
        assert_eq!(buffer_status(8, 10), BufferStatus::Warning);
        assert_eq!(buffer_status(7, 10), BufferStatus::Normal);
        assert_eq!(buffer_status(0, 10), BufferStatus::Normal);
        // 95% is only a warning for a single buffer
        assert_eq!(buffer_status(19, 20), BufferStatus::Warning);
    }

    #[test]
    fn test_status_uses_exact_ratio_not_rounded_pct() {
        assert_eq!(utilization_pct(43, 61), 70);
        assert_eq!(buffer_status(43, 61), BufferStatus::Warning);
        assert_eq!(aggregate_status(43, 61), BufferStatus::Warning);
    }

    #[test]
    fn test_aggregate_status_thresholds() {
        assert_eq!(aggregate_status(30, 30), BufferStatus::Critical);
        assert_eq!(aggregate_status(28, 30), BufferStatus::Critical);
        assert_eq!(aggregate_status(27, 30), BufferStatus::Warning);
        assert_eq!(aggregate_status(22, 30), BufferStatus::Warning);
        assert_eq!(aggregate_status(21, 30), BufferStatus::Normal);
    }

    #[test]
    fn test_empty_buffer_list_is_an_error() {
        let aggregator = StatsAggregator::new(Arc::new(MetricsRegistry::default()));
        assert_eq!(aggregator.compute(&[], None), Err(SnapshotError::NoBuffers));
        assert!(aggregator.snapshot(&[], None).is_none());
    }
}
