//! Memory pressure wiring

use crate::errors::Result;
use crate::eviction::{
    EvictionCandidate, EvictionTarget, ExpiredEntriesStrategy, LfuStrategy, LruStrategy,
    StrategyOutcome,
};
use crate::monitoring::{MemoryPressureDetector, MemorySampler, SystemMemorySampler};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use super::types::{Cache, CacheInner, CallContext};

#[async_trait]
impl EvictionTarget for CacheInner {
    async fn evict_expired(&self) -> Result<StrategyOutcome> {
        self.sweep(None, &CallContext::default()).await
    }

    fn memory_candidates(&self) -> Vec<EvictionCandidate> {
        self.memory.candidates()
    }

    fn evict_from_memory(&self, keys: &[String]) -> StrategyOutcome {
        self.memory.evict(keys)
    }
}

impl Cache {
    /// Create the memory pressure detector, register the built-in strategies
    /// and start monitoring. Returns the running detector if already enabled.
    pub fn enable_memory_pressure_detection(&self) -> Result<MemoryPressureDetector> {
        let mut slot = self.inner.detector.write();
        if let Some(detector) = slot.as_ref() {
            return Ok(detector.clone());
        }

        let sampler: Arc<dyn MemorySampler> = match &self.inner.sampler {
            Some(sampler) => Arc::clone(sampler),
            None => Arc::new(SystemMemorySampler::new()?),
        };

        let tracked = Arc::downgrade(&self.inner);
        let detector = MemoryPressureDetector::new(
            self.inner.config.memory_pressure_config(),
            sampler,
            Arc::clone(&self.inner.clock),
        )
        .with_tracked_bytes(move || tracked.upgrade().map_or(0, |inner| inner.memory.bytes()));

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let target: Weak<dyn EvictionTarget> = weak;
        detector.register_strategy(Arc::new(ExpiredEntriesStrategy::new(target.clone())));
        detector.register_strategy(Arc::new(LfuStrategy::new(target.clone())));
        detector.register_strategy(Arc::new(LruStrategy::new(target)));

        detector.start_monitoring();
        *slot = Some(detector.clone());
        Ok(detector)
    }

    /// The running detector, if pressure detection is enabled
    pub fn memory_pressure_detector(&self) -> Option<MemoryPressureDetector> {
        self.inner.detector.read().clone()
    }
}
