use super::upgrade_target;
use crate::errors::Result;
use crate::eviction::traits::{EvictionStrategy, EvictionTarget, StrategyOutcome};
use crate::monitoring::PressureLevel;
use async_trait::async_trait;
use std::sync::Weak;

/// Deletes expired entries; cheapest relief, so it runs first
pub struct ExpiredEntriesStrategy {
    target: Weak<dyn EvictionTarget>,
}

impl ExpiredEntriesStrategy {
    pub const NAME: &'static str = "expired-entries";
    pub const PRIORITY: i32 = 100;

    pub fn new(target: Weak<dyn EvictionTarget>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl EvictionStrategy for ExpiredEntriesStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn execute(&self, _level: PressureLevel) -> Result<StrategyOutcome> {
        upgrade_target(&self.target, Self::NAME)?
            .evict_expired()
            .await
    }
}
