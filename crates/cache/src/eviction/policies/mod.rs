//! Built-in eviction strategies

mod expired;
mod lfu;
mod lru;

pub use expired::ExpiredEntriesStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;

use super::traits::{EvictionCandidate, EvictionTarget};
use crate::errors::{Error, RecoveryHint, Result};
use crate::monitoring::PressureLevel;
use std::sync::{Arc, Weak};

/// Share of the memory tier released at each level
pub(crate) fn eviction_fraction(level: PressureLevel) -> f64 {
    match level {
        PressureLevel::Normal => 0.0,
        PressureLevel::Warning => 0.25,
        PressureLevel::Critical => 0.5,
    }
}

/// Keys of the first `fraction` of already ordered candidates, at least one
/// when any eviction is due
pub(crate) fn select_victims(candidates: &[EvictionCandidate], fraction: f64) -> Vec<String> {
    if fraction <= 0.0 || candidates.is_empty() {
        return Vec::new();
    }
    let count = ((candidates.len() as f64) * fraction).ceil() as usize;
    candidates
        .iter()
        .take(count.clamp(1, candidates.len()))
        .map(|c| c.key.clone())
        .collect()
}

fn upgrade_target(target: &Weak<dyn EvictionTarget>, strategy: &str) -> Result<Arc<dyn EvictionTarget>> {
    target.upgrade().ok_or_else(|| Error::EvictionStrategy {
        strategy: strategy.to_string(),
        message: "cache has been dropped".to_string(),
        recovery_hint: RecoveryHint::Ignore,
    })
}
