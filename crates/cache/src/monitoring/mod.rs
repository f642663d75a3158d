//! Memory pressure detection
//!
//! ## Key Components
//!
//! - **`sampler`**: reads process and system memory through the
//!   [`MemorySampler`] trait.
//! - **`detector`**: samples on a timer, classifies the pressure level,
//!   publishes edge-triggered events and dispatches eviction strategies.

mod detector;
mod sampler;
mod types;

#[cfg(test)]
mod tests;

pub use detector::MemoryPressureDetector;
pub use sampler::{ManualMemorySampler, MemorySample, MemorySampler, SystemMemorySampler};
pub use types::{EvictionResult, MemoryPressureConfig, MemoryStats, PressureEvent, PressureLevel};
