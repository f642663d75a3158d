use super::{eviction_fraction, select_victims, upgrade_target};
use crate::errors::Result;
use crate::eviction::traits::{EvictionStrategy, EvictionTarget, StrategyOutcome};
use crate::monitoring::PressureLevel;
use async_trait::async_trait;
use std::sync::Weak;

/// Drops the least recently used share of the memory tier
pub struct LruStrategy {
    target: Weak<dyn EvictionTarget>,
}

impl LruStrategy {
    pub const NAME: &'static str = "lru";
    pub const PRIORITY: i32 = 10;

    pub fn new(target: Weak<dyn EvictionTarget>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl EvictionStrategy for LruStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn execute(&self, level: PressureLevel) -> Result<StrategyOutcome> {
        let target = upgrade_target(&self.target, Self::NAME)?;

        let mut candidates = target.memory_candidates();
        candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.key.cmp(&b.key))
        });

        let victims = select_victims(&candidates, eviction_fraction(level));
        Ok(target.evict_from_memory(&victims))
    }
}
