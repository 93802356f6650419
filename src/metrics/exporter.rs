use crate::domain::BufferStats;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),
}

/// Mirrors the latest snapshot into Prometheus gauges for `/metrics`.
#[derive(Clone)]
pub struct PrometheusExporter {
    registry: Registry,
    emissions: IntGauge,
    consumptions: IntGauge,
    suspensions: IntGauge,
    waiting_items: IntGauge,
    memory_usage: IntGauge,
    buffer_utilization: IntGauge,
    live_buffers: IntGauge,
    sessions: IntGauge,
    completed_batches: IntGauge,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> Result<IntGauge, MetricsError> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        Ok(Self {
            emissions: gauge("bpm_emissions", "Emissions in the current batch")?,
            consumptions: gauge("bpm_consumptions", "Consumptions in the current batch")?,
            suspensions: gauge("bpm_suspensions", "Producer suspensions in the current batch")?,
            waiting_items: gauge("bpm_waiting_items", "Items emitted but not yet consumed")?,
            memory_usage: gauge("bpm_memory_usage_bytes", "Tracked memory across all buffers")?,
            buffer_utilization: gauge("bpm_buffer_utilization_pct", "Aggregate buffer utilization")?,
            live_buffers: gauge("bpm_live_buffers", "Buffers in the current batch")?,
            sessions: gauge("bpm_sessions", "Connected subscriber sessions")?,
            completed_batches: gauge("bpm_completed_batches", "Batches completed since start")?,
            registry,
        })
    }

    pub fn observe_snapshot(&self, stats: &BufferStats) {
        self.emissions.set(stats.total_emissions as i64);
        self.consumptions.set(stats.total_consumptions as i64);
        self.suspensions.set(stats.suspensions as i64);
        self.waiting_items.set(stats.waiting_items as i64);
        self.memory_usage.set(stats.memory_usage as i64);
        self.buffer_utilization.set(i64::from(stats.utilization_pct));
        self.live_buffers.set(stats.buffers.len() as i64);
        if let Some(info) = &stats.batch_info {
            self.completed_batches.set(info.completed_batches as i64);
        }
    }

    pub fn observe_sessions(&self, count: usize) {
        self.sessions.set(count as i64);
    }

    pub fn export(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BufferStatus;
    use std::collections::BTreeMap;

    #[test]
    fn test_export_contains_observed_values() {
        let exporter = PrometheusExporter::new().unwrap();
        exporter.observe_sessions(2);
        exporter.observe_snapshot(&BufferStats {
            buffer_size: 3,
            buffer_capacity: 30,
            total_emissions: 42,
            total_consumptions: 39,
            suspensions: 7,
            waiting_items: 3,
            memory_usage: 4096,
            memory_per_item: 1365,
            memory_utilization_pct: 10,
            utilization_pct: 10,
            status: BufferStatus::Normal,
            buffers: BTreeMap::new(),
            last_update: 0,
            batch_info: None,
        });

        let text = exporter.export().unwrap();
        assert!(text.contains("bpm_emissions 42"));
        assert!(text.contains("bpm_suspensions 7"));
        assert!(text.contains("bpm_sessions 2"));
        assert!(text.contains("bpm_memory_usage_bytes 4096"));
    }
}
