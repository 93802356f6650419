use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferStatus {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferStatus::Normal => "NORMAL",
            BufferStatus::Warning => "WARNING",
            BufferStatus::Critical => "CRITICAL",
        })
    }
}

/// Statistics for the single buffer of one item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferTypeStats {
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub utilization_pct: u8,
    pub emissions: u64,
    pub consumptions: u64,
    pub suspensions: u64,
    pub memory_usage: u64,
    pub status: BufferStatus,
}

/// Parameters fixed for the whole of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub buffer_capacity: usize,
    pub update_interval_ms: u64,
    pub producer_items: usize,
    pub empty_buffer_poll_delay_ms: u64,
}

impl BatchConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn empty_buffer_poll_delay(&self) -> Duration {
        Duration::from_millis(self.empty_buffer_poll_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub current_batch: u64,
    pub completed_batches: u64,
    pub batch_config: BatchConfig,
}

/// One snapshot pushed to subscribers.
///
/// `memory_utilization_pct` mirrors `utilization_pct`; subscribers read both.
/// `last_update` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub total_emissions: u64,
    pub total_consumptions: u64,
    pub suspensions: u64,
    pub waiting_items: u64,
    pub memory_usage: u64,
    pub memory_per_item: u64,
    pub memory_utilization_pct: u8,
    pub utilization_pct: u8,
    pub status: BufferStatus,
    pub buffers: BTreeMap<String, BufferTypeStats>,
    pub last_update: i64,
    pub batch_info: Option<BatchInfo>,
}

/// `{"type":"sessions","count":N}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "sessions")]
pub struct SessionCount {
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_count_wire_format() {
        let json = serde_json::to_value(SessionCount { count: 3 }).unwrap();
        assert_eq!(json, json!({"type": "sessions", "count": 3}));
    }

    #[test]
    fn test_stats_use_camel_case_and_screaming_status() {
        let stats = BufferStats {
            buffer_size: 1,
            buffer_capacity: 10,
            total_emissions: 5,
            total_consumptions: 4,
            suspensions: 0,
            waiting_items: 1,
            memory_usage: 128,
            memory_per_item: 128,
            memory_utilization_pct: 10,
            utilization_pct: 10,
            status: BufferStatus::Normal,
            buffers: BTreeMap::new(),
            last_update: 1_700_000_000_000,
            batch_info: Some(BatchInfo {
                current_batch: 2,
                completed_batches: 1,
                batch_config: BatchConfig {
                    buffer_capacity: 14,
                    update_interval_ms: 500,
                    producer_items: 60,
                    empty_buffer_poll_delay_ms: 100,
                },
            }),
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["bufferSize"], 1);
        assert_eq!(json["waitingItems"], 1);
        assert_eq!(json["status"], "NORMAL");
        assert_eq!(json["batchInfo"]["batchConfig"]["emptyBufferPollDelayMs"], 100);
        assert_eq!(json["lastUpdate"], 1_700_000_000_000i64);
    }
}
