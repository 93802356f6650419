use super::entry::BufferEntry;
use super::error::BufferError;
use crate::domain::ItemType;
use crate::instrumentation::Measurable;
use crate::metrics::{BufferId, MetricsRegistry, SuspensionEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Read side of a buffer, independent of its item type.
///
/// The aggregator walks one of these per item type.
pub trait BufferView: Send + Sync {
    fn id(&self) -> BufferId;
    fn item_type(&self) -> ItemType;
    fn capacity(&self) -> usize;
    fn current_size(&self) -> usize;
    /// Highest size reached since creation.
    fn peak_size(&self) -> usize;
    fn memory_usage(&self) -> u64;
    fn emissions(&self) -> u64;
    fn consumptions(&self) -> u64;
    fn suspensions(&self) -> u64;
    fn is_closed(&self) -> bool;
    fn close(&self);
}

struct BufferState<T> {
    entries: VecDeque<BufferEntry<T>>,
    memory_bytes: u64,
    peak_size: usize,
    closed: bool,
}

/// Fixed-capacity FIFO that reports every operation to a [`MetricsRegistry`].
///
/// `emit` parks the calling task while the buffer is full. Consumption has a
/// non-blocking form (`try_consume`) and a parking one (`consume`).
pub struct TrackedBuffer<T> {
    id: BufferId,
    item_type: ItemType,
    capacity: usize,
    registry: Arc<MetricsRegistry>,
    state: Mutex<BufferState<T>>,
    space_available: Notify,
    items_available: Notify,
}

impl<T: Measurable + Send> TrackedBuffer<T> {
    pub fn new(
        item_type: ItemType,
        capacity: usize,
        registry: Arc<MetricsRegistry>,
    ) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        let id = registry.register_buffer(capacity);
        debug!(buffer_id = %id, %item_type, capacity, "Created buffer");

        Ok(Self {
            id,
            item_type,
            capacity,
            registry,
            state: Mutex::new(BufferState {
                entries: VecDeque::with_capacity(capacity),
                memory_bytes: 0,
                peak_size: 0,
                closed: false,
            }),
            space_available: Notify::new(),
            items_available: Notify::new(),
        })
    }

    /// Enqueues `value`, parking while the buffer is full.
    ///
    /// A suspension is recorded once per call, just before the first park.
    pub async fn emit(&self, value: T) -> Result<(), BufferError> {
        let size_bytes = self.registry.object_size(&value);
        let entry = BufferEntry::new(value, size_bytes);
        let mut suspended = false;

        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(BufferError::Closed { buffer_id: self.id });
                }

                if state.entries.len() < self.capacity {
                    state.memory_bytes = state.memory_bytes.saturating_add(entry.size_bytes());
                    state.entries.push_back(entry);
                    state.peak_size = state.peak_size.max(state.entries.len());
                    self.registry.record_enqueue(
                        self.id,
                        state.entries.len(),
                        state.memory_bytes,
                    );
                    drop(state);

                    self.items_available.notify_one();
                    return Ok(());
                }

                if !suspended {
                    self.registry.record_suspension(SuspensionEvent::capture(
                        self.id,
                        state.entries.len(),
                        self.capacity,
                    ));
                    suspended = true;
                }
            }

            notified.await;
            trace!(buffer_id = %self.id, "Producer resumed");
        }
    }

    /// Dequeues the oldest entry, or returns `None` right away if empty.
    pub fn try_consume(&self) -> Option<BufferEntry<T>> {
        let entry = {
            let mut state = self.state.lock();
            let entry = state.entries.pop_front()?;
            state.memory_bytes = state.memory_bytes.saturating_sub(entry.size_bytes());
            self.registry
                .record_dequeue(self.id, state.entries.len(), state.memory_bytes);
            entry
        };

        self.space_available.notify_one();
        Some(entry)
    }

    /// Waits for the next entry. Returns `None` once closed and drained.
    pub async fn consume(&self) -> Option<BufferEntry<T>> {
        loop {
            let notified = self.items_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_consume() {
                return Some(entry);
            }
            if self.state.lock().closed {
                return None;
            }

            notified.await;
        }
    }

    /// Stops accepting emissions and wakes every parked task.
    ///
    /// Entries already queued can still be consumed.
    pub fn close(&self) {
        let remaining = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.entries.len()
        };

        self.space_available.notify_waiters();
        self.items_available.notify_waiters();
        debug!(buffer_id = %self.id, item_type = %self.item_type, remaining, "Closed buffer");
    }
}

impl<T: Measurable + Send> BufferView for TrackedBuffer<T> {
    fn id(&self) -> BufferId {
        self.id
    }

    fn item_type(&self) -> ItemType {
        self.item_type
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn current_size(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn peak_size(&self) -> usize {
        self.state.lock().peak_size
    }

    fn memory_usage(&self) -> u64 {
        self.state.lock().memory_bytes
    }

    fn emissions(&self) -> u64 {
        self.registry
            .buffer_counters(self.id)
            .map_or(0, |c| c.emissions)
    }

    fn consumptions(&self) -> u64 {
        self.registry
            .buffer_counters(self.id)
            .map_or(0, |c| c.consumptions)
    }

    fn suspensions(&self) -> u64 {
        self.registry
            .buffer_counters(self.id)
            .map_or(0, |c| c.suspensions)
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn close(&self) {
        TrackedBuffer::close(self);
    }
}

impl<T> fmt::Debug for TrackedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TrackedBuffer")
            .field("id", &self.id)
            .field("item_type", &self.item_type)
            .field("capacity", &self.capacity)
            .field("len", &state.entries.len())
            .field("memory_bytes", &state.memory_bytes)
            .field("closed", &state.closed)
            .finish()
    }
}
