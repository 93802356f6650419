use crate::instrumentation::{InstrumentationBackend, LayoutBackend, Measurable};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const DEFAULT_SUSPENSION_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(u64);

impl BufferId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCounters {
    pub capacity: usize,
    pub emissions: u64,
    pub consumptions: u64,
    pub suspensions: u64,
    pub current_size: usize,
    pub memory_usage: u64,
}

/// Sums over every tracked buffer, read under a single lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalCounters {
    pub buffers: usize,
    pub capacity: usize,
    pub emissions: u64,
    pub consumptions: u64,
    pub suspensions: u64,
    pub current_size: usize,
    pub memory_usage: u64,
}

impl GlobalCounters {
    pub fn waiting(&self) -> u64 {
        self.emissions.saturating_sub(self.consumptions)
    }
}

/// A producer about to park on a full buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspensionEvent {
    pub task: Option<String>,
    pub thread: Option<String>,
    pub buffer_id: BufferId,
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub at: DateTime<Utc>,
}

impl SuspensionEvent {
    /// Tags the event with whatever task and thread are currently running.
    pub fn capture(buffer_id: BufferId, buffer_size: usize, buffer_capacity: usize) -> Self {
        Self {
            task: tokio::task::try_id().map(|id| id.to_string()),
            thread: std::thread::current().name().map(str::to_owned),
            buffer_id,
            buffer_size,
            buffer_capacity,
            at: Utc::now(),
        }
    }
}

/// Shared counters for every live buffer.
///
/// Injected into buffers and the aggregator as an `Arc`. Buffers take their
/// own lock before calling in here; the registry never calls back out.
pub struct MetricsRegistry {
    backend: Arc<dyn InstrumentationBackend>,
    measurement_enabled: AtomicBool,
    next_buffer_id: AtomicU64,
    buffers: RwLock<HashMap<BufferId, BufferCounters>>,
    suspension_log: Mutex<VecDeque<SuspensionEvent>>,
    suspension_log_capacity: usize,
}

impl MetricsRegistry {
    pub fn new(backend: Arc<dyn InstrumentationBackend>) -> Self {
        Self::with_log_capacity(backend, DEFAULT_SUSPENSION_LOG_CAPACITY)
    }

    pub fn with_log_capacity(backend: Arc<dyn InstrumentationBackend>, log_capacity: usize) -> Self {
        let measurement_enabled = match backend.probe() {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    "Instrumentation backend unavailable, running in counter-only mode"
                );
                false
            }
        };

        Self {
            backend,
            measurement_enabled: AtomicBool::new(measurement_enabled),
            next_buffer_id: AtomicU64::new(1),
            buffers: RwLock::new(HashMap::new()),
            suspension_log: Mutex::new(VecDeque::with_capacity(log_capacity)),
            suspension_log_capacity: log_capacity,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn measurement_enabled(&self) -> bool {
        self.measurement_enabled.load(Ordering::Acquire)
    }

    /// Allocates a fresh id and starts tracking it. Ids are never reused.
    pub fn register_buffer(&self, capacity: usize) -> BufferId {
        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.write().insert(
            id,
            BufferCounters {
                capacity,
                ..BufferCounters::default()
            },
        );
        debug!(buffer_id = %id, capacity, "Registered buffer");
        id
    }

    pub fn record_emission(&self, id: BufferId) {
        self.with_counters(id, "emission", |c| c.emissions += 1);
    }

    pub fn record_consumption(&self, id: BufferId) {
        self.with_counters(id, "consumption", |c| {
            c.consumptions = (c.consumptions + 1).min(c.emissions);
        });
    }

    /// Counts an enqueue and sets the new size and memory under one lock.
    pub fn record_enqueue(&self, id: BufferId, size: usize, memory_usage: u64) {
        self.with_counters(id, "enqueue", |c| {
            c.emissions += 1;
            c.current_size = size;
            c.memory_usage = memory_usage;
        });
    }

    /// Counts a dequeue and sets the new size and memory under one lock.
    pub fn record_dequeue(&self, id: BufferId, size: usize, memory_usage: u64) {
        self.with_counters(id, "dequeue", |c| {
            c.consumptions = (c.consumptions + 1).min(c.emissions);
            c.current_size = size;
            c.memory_usage = memory_usage;
        });
    }

    pub fn record_suspension(&self, event: SuspensionEvent) {
        let id = event.buffer_id;
        if !self.with_counters(id, "suspension", |c| c.suspensions += 1) {
            return;
        }

        debug!(
            buffer_id = %id,
            task = event.task.as_deref().unwrap_or("-"),
            size = event.buffer_size,
            capacity = event.buffer_capacity,
            "Producer suspended on full buffer"
        );

        if self.suspension_log_capacity == 0 {
            return;
        }
        let mut log = self.suspension_log.lock();
        if log.len() == self.suspension_log_capacity {
            log.pop_front();
        }
        log.push_back(event);
    }

    pub fn update_buffer_metrics(&self, id: BufferId, size: usize, memory_usage: u64) {
        self.with_counters(id, "metrics update", |c| {
            c.current_size = size;
            c.memory_usage = memory_usage;
        });
    }

    /// Measured footprint of `value`, or `0` once measurement is off.
    ///
    /// The first `0` from the backend turns measurement off for the life of
    /// this registry and is reported once.
    pub fn object_size<T: Measurable + ?Sized>(&self, value: &T) -> u64 {
        if !self.measurement_enabled() {
            return 0;
        }

        let size = self.backend.measure(value.layout());
        if size == 0 && self.measurement_enabled.swap(false, Ordering::AcqRel) {
            warn!(
                backend = self.backend.name(),
                "Cannot measure object size, memory tracking disabled"
            );
        }
        size
    }

    pub fn buffer_counters(&self, id: BufferId) -> Option<BufferCounters> {
        self.buffers.read().get(&id).copied()
    }

    pub fn totals(&self) -> GlobalCounters {
        let buffers = self.buffers.read();
        buffers.values().fold(
            GlobalCounters {
                buffers: buffers.len(),
                ..GlobalCounters::default()
            },
            |mut acc, c| {
                acc.capacity += c.capacity;
                acc.emissions += c.emissions;
                acc.consumptions += c.consumptions;
                acc.suspensions += c.suspensions;
                acc.current_size += c.current_size;
                acc.memory_usage += c.memory_usage;
                acc
            },
        )
    }

    pub fn total_emissions(&self) -> u64 {
        self.totals().emissions
    }

    pub fn total_consumptions(&self) -> u64 {
        self.totals().consumptions
    }

    pub fn total_suspensions(&self) -> u64 {
        self.totals().suspensions
    }

    pub fn total_tracked_memory(&self) -> u64 {
        self.totals().memory_usage
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Most recent suspension events, oldest first.
    pub fn recent_suspensions(&self) -> Vec<SuspensionEvent> {
        self.suspension_log.lock().iter().cloned().collect()
    }

    /// Drops every tracked buffer and the suspension log.
    ///
    /// Only call once all tasks touching the cleared buffers have finished.
    pub fn clear_tracking(&self) {
        let cleared = {
            let mut buffers = self.buffers.write();
            let count = buffers.len();
            buffers.clear();
            count
        };
        self.suspension_log.lock().clear();
        info!(buffers = cleared, "Cleared metrics tracking");
    }

    fn with_counters(&self, id: BufferId, op: &str, f: impl FnOnce(&mut BufferCounters)) -> bool {
        let mut buffers = self.buffers.write();
        match buffers.get_mut(&id) {
            Some(counters) => {
                f(counters);
                true
            }
            None => {
                debug!(buffer_id = %id, op, "Ignoring update for untracked buffer");
                false
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(Arc::new(LayoutBackend))
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("backend", &self.backend.name())
            .field("measurement_enabled", &self.measurement_enabled())
            .field("buffers", &self.buffer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::{InstrumentationError, MockInstrumentationBackend};

    #[test]
    fn test_counters_per_buffer() {
        let registry = MetricsRegistry::default();
        let a = registry.register_buffer(10);
        let b = registry.register_buffer(20);

        registry.record_emission(a);
        registry.record_emission(a);
        registry.record_consumption(a);
        registry.record_emission(b);

        let counters = registry.buffer_counters(a).unwrap();
        assert_eq!(counters.emissions, 2);
        assert_eq!(counters.consumptions, 1);

        let totals = registry.totals();
        assert_eq!(totals.buffers, 2);
        assert_eq!(totals.capacity, 30);
        assert_eq!(totals.emissions, 3);
        assert_eq!(totals.waiting(), 2);
    }

    #[test]
    fn test_unknown_buffer_is_ignored() {
        let registry = MetricsRegistry::default();
        let id = registry.register_buffer(4);
        registry.clear_tracking();

        registry.record_emission(id);
        registry.record_suspension(SuspensionEvent::capture(id, 4, 4));
        registry.update_buffer_metrics(id, 1, 100);

        assert!(registry.buffer_counters(id).is_none());
        assert_eq!(registry.totals(), GlobalCounters::default());
        assert!(registry.recent_suspensions().is_empty());
    }

    #[test]
    fn test_enqueue_and_dequeue_move_size_with_counters() {
        let registry = MetricsRegistry::default();
        let id = registry.register_buffer(4);

        registry.record_enqueue(id, 1, 64);
        registry.record_enqueue(id, 2, 128);
        registry.record_dequeue(id, 1, 64);

        let counters = registry.buffer_counters(id).unwrap();
        assert_eq!(counters.emissions, 2);
        assert_eq!(counters.consumptions, 1);
        assert_eq!(counters.current_size, 1);
        assert_eq!(counters.memory_usage, 64);

        registry.clear_tracking();
        registry.record_enqueue(id, 1, 64);
        assert!(registry.buffer_counters(id).is_none());
    }

    #[test]
    fn test_consumptions_never_exceed_emissions() {
        let registry = MetricsRegistry::default();
        let id = registry.register_buffer(4);
        registry.record_consumption(id);
        assert_eq!(registry.buffer_counters(id).unwrap().consumptions, 0);
    }

    #[test]
    fn test_suspension_log_is_bounded() {
        let registry = MetricsRegistry::with_log_capacity(Arc::new(LayoutBackend), 3);
        let id = registry.register_buffer(1);
        for size in 0..5 {
            registry.record_suspension(SuspensionEvent::capture(id, size, 1));
        }

        let log = registry.recent_suspensions();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].buffer_size, 2);
        assert_eq!(registry.total_suspensions(), 5);
    }

    #[test]
    fn test_zero_size_disables_measurement_permanently() {
        let mut backend = MockInstrumentationBackend::new();
        backend.expect_probe().returning(|| Ok(()));
        backend.expect_name().return_const("mock");
        // Only the first call reaches the backend.
        backend.expect_measure().times(1).return_const(0u64);

        let registry = MetricsRegistry::new(Arc::new(backend));
        assert!(registry.measurement_enabled());
        assert_eq!(registry.object_size(&42i32), 0);
        assert!(!registry.measurement_enabled());
        assert_eq!(registry.object_size(&"payload".to_string()), 0);
    }

    #[test]
    fn test_unavailable_backend_falls_back_to_counters() {
        let mut backend = MockInstrumentationBackend::new();
        backend.expect_probe().returning(|| {
            Err(InstrumentationError::BackendUnavailable {
                backend: "mock".to_string(),
                reason: "not loaded".to_string(),
            })
        });
        backend.expect_name().return_const("mock");
        backend.expect_measure().never();

        let registry = MetricsRegistry::new(Arc::new(backend));
        assert!(!registry.measurement_enabled());

        let id = registry.register_buffer(2);
        registry.record_emission(id);
        assert_eq!(registry.object_size(&7i64), 0);
        assert_eq!(registry.total_emissions(), 1);
    }
}
