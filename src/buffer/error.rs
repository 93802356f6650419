use crate::metrics::BufferId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Buffer {buffer_id} is closed")]
    Closed { buffer_id: BufferId },

    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },
}
