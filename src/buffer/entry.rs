use std::time::{Duration, Instant};

/// One queued item with the size it was accounted at.
#[derive(Debug, Clone)]
pub struct BufferEntry<T> {
    value: T,
    size_bytes: u64,
    created_at: Instant,
}

impl<T> BufferEntry<T> {
    pub fn new(value: T, size_bytes: u64) -> Self {
        Self {
            value,
            size_bytes,
            created_at: Instant::now(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time spent queued so far.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
