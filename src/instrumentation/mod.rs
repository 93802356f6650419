//! Memory measurement backends.
//!
//! Buffers never inspect values themselves. Each item type describes its own
//! layout through [`Measurable`], and an [`InstrumentationBackend`] turns that
//! layout into a byte count. A backend answering `0` means "cannot measure".

use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

const WORD_SIZE: u64 = 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentationError {
    #[error("Instrumentation backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },
}

/// Inline and heap footprint of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueLayout {
    pub shallow_bytes: usize,
    pub heap_bytes: usize,
}

impl ValueLayout {
    pub fn total(&self) -> usize {
        self.shallow_bytes.saturating_add(self.heap_bytes)
    }
}

/// Item types that can report their own memory layout.
pub trait Measurable {
    fn shallow_size(&self) -> usize;

    fn heap_size(&self) -> usize {
        0
    }

    fn layout(&self) -> ValueLayout {
        ValueLayout {
            shallow_bytes: self.shallow_size(),
            heap_bytes: self.heap_size(),
        }
    }
}

impl Measurable for String {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<String>()
    }

    fn heap_size(&self) -> usize {
        self.capacity()
    }
}

impl Measurable for Bytes {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<Bytes>()
    }

    fn heap_size(&self) -> usize {
        self.len()
    }
}

impl Measurable for Vec<u8> {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<Vec<u8>>()
    }

    fn heap_size(&self) -> usize {
        self.capacity()
    }
}

macro_rules! impl_measurable_scalar {
    ($($ty:ty),*) => {
        $(
            impl Measurable for $ty {
                fn shallow_size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_measurable_scalar!(i32, i64, u32, u64);

#[cfg_attr(test, automock)]
pub trait InstrumentationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks that the backend can serve requests at all.
    fn probe(&self) -> Result<(), InstrumentationError> {
        Ok(())
    }

    /// Size in bytes for a value with the given layout; `0` if unmeasurable.
    fn measure(&self, layout: ValueLayout) -> u64;
}

/// Measures from the value's own layout, rounded up to a whole machine word.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutBackend;

impl InstrumentationBackend for LayoutBackend {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn measure(&self, layout: ValueLayout) -> u64 {
        let raw = layout.total() as u64;
        raw.div_ceil(WORD_SIZE).saturating_mul(WORD_SIZE)
    }
}

/// Always reports `0`, which runs the registry in counter-only mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

impl InstrumentationBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn measure(&self, _layout: ValueLayout) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    /// Size items from their inline and heap layout
    #[default]
    Layout,
    /// Skip measurement, report zero memory everywhere
    Disabled,
}

impl MeasurementMode {
    pub fn backend(self) -> Arc<dyn InstrumentationBackend> {
        match self {
            MeasurementMode::Layout => Arc::new(LayoutBackend),
            MeasurementMode::Disabled => Arc::new(DisabledBackend),
        }
    }
}
