pub mod entry;
pub mod error;
pub mod tracked;

pub use entry::BufferEntry;
pub use error::BufferError;
pub use tracked::{BufferView, TrackedBuffer};
