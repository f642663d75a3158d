//! Memory pressure detector
//!
//! Each tick samples memory, appends to a bounded history, publishes a
//! `MemoryUpdate`, and publishes `Warning`/`Critical` only when the level
//! changes into that band. Sustained pressure does not re-fire. With
//! auto-eviction on, every warning or critical tick runs the registered
//! strategies in descending priority.

use super::sampler::MemorySampler;
use super::types::{EvictionResult, MemoryPressureConfig, MemoryStats, PressureEvent, PressureLevel};
use crate::clock::SharedClock;
use crate::errors::Result;
use crate::eviction::EvictionStrategy;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use warden_utils::CancellationToken;

type TrackedBytes = Box<dyn Fn() -> u64 + Send + Sync>;

struct Monitor {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct DetectorInner {
    config: MemoryPressureConfig,
    max_memory: u64,
    sampler: Arc<dyn MemorySampler>,
    clock: SharedClock,
    tracked_bytes: Option<TrackedBytes>,
    strategies: RwLock<Vec<Arc<dyn EvictionStrategy>>>,
    history: RwLock<VecDeque<MemoryStats>>,
    level: Mutex<PressureLevel>,
    latest: RwLock<Option<MemoryStats>>,
    events: broadcast::Sender<PressureEvent>,
    monitor: Mutex<Option<Monitor>>,
}

impl Drop for DetectorInner {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.cancel.cancel();
            monitor.handle.abort();
        }
    }
}

/// Watches memory usage and sheds cached data before it runs out
#[derive(Clone)]
pub struct MemoryPressureDetector {
    inner: Arc<DetectorInner>,
}

impl std::fmt::Debug for MemoryPressureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureDetector")
            .field("max_memory", &self.inner.max_memory)
            .field("level", &self.current_level())
            .field("strategies", &self.strategy_names())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

impl MemoryPressureDetector {
    /// Create an idle detector.
    ///
    /// When `config.max_memory` is unset the budget is the system total
    /// reported by the sampler. A budget of zero yields a usage of zero.
    pub fn new(
        config: MemoryPressureConfig,
        sampler: Arc<dyn MemorySampler>,
        clock: SharedClock,
    ) -> Self {
        let max_memory = match config.max_memory {
            Some(max) => max,
            None => match sampler.sample() {
                Ok(sample) => sample.system_total,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read system memory; usage will report 0");
                    0
                }
            },
        };
        if max_memory == 0 {
            tracing::warn!("Memory budget is zero; pressure detection is inert");
        }

        let (events, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(DetectorInner {
                config,
                max_memory,
                sampler,
                clock,
                tracked_bytes: None,
                strategies: RwLock::new(Vec::new()),
                history: RwLock::new(VecDeque::new()),
                level: Mutex::new(PressureLevel::Normal),
                latest: RwLock::new(None),
                events,
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Report `tracked` bytes (typically the cache memory tier) in each sample.
    /// Must be called before the detector is cloned or started.
    pub fn with_tracked_bytes(mut self, tracked: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.tracked_bytes = Some(Box::new(tracked)),
            None => tracing::warn!("Detector already shared; tracked bytes source ignored"),
        }
        self
    }

    pub fn config(&self) -> &MemoryPressureConfig {
        &self.inner.config
    }

    pub fn max_memory(&self) -> u64 {
        self.inner.max_memory
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PressureEvent> {
        self.inner.events.subscribe()
    }

    /// Register a strategy, replacing any strategy with the same name
    pub fn register_strategy(&self, strategy: Arc<dyn EvictionStrategy>) {
        let mut strategies = self.inner.strategies.write();
        strategies.retain(|s| s.name() != strategy.name());
        strategies.push(strategy);
        // Stable sort keeps registration order among equal priorities
        strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    }

    /// Remove a strategy by name; returns whether it was registered
    pub fn unregister_strategy(&self, name: &str) -> bool {
        let mut strategies = self.inner.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        strategies.len() != before
    }

    /// Registered strategy names in execution order
    pub fn strategy_names(&self) -> Vec<String> {
        self.inner
            .strategies
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn current_level(&self) -> PressureLevel {
        *self.inner.level.lock()
    }

    pub fn latest_stats(&self) -> Option<MemoryStats> {
        self.inner.latest.read().clone()
    }

    /// Recorded samples, oldest first
    pub fn history(&self) -> Vec<MemoryStats> {
        self.inner.history.read().iter().cloned().collect()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// Start the monitoring timer. Returns false if it was already running.
    pub fn start_monitoring(&self) -> bool {
        let mut monitor = self.inner.monitor.lock();
        if monitor.as_ref().is_some_and(|m| !m.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor_loop(
            Arc::downgrade(&self.inner),
            self.inner.config.monitoring_interval,
            cancel.clone(),
        ));
        *monitor = Some(Monitor { handle, cancel });

        tracing::info!(
            interval_ms = self.inner.config.monitoring_interval.as_millis() as u64,
            max_memory = self.inner.max_memory,
            "Memory pressure monitoring started"
        );
        true
    }

    /// Stop the monitoring timer. Returns false if it was not running.
    pub fn stop_monitoring(&self) -> bool {
        match self.inner.monitor.lock().take() {
            Some(monitor) => {
                monitor.cancel.cancel();
                monitor.handle.abort();
                tracing::info!("Memory pressure monitoring stopped");
                true
            }
            None => false,
        }
    }

    /// Run one monitoring tick
    pub async fn check_memory(&self) -> Result<MemoryStats> {
        self.inner.check_memory().await
    }

    /// Run every registered strategy for `level`, in priority order.
    ///
    /// Strategy errors and panics are logged and recorded in the result;
    /// they never stop the remaining strategies.
    pub async fn trigger_eviction(&self, level: PressureLevel) -> EvictionResult {
        self.inner.trigger_eviction(level).await
    }
}

impl DetectorInner {
    fn usage(&self, rss: u64) -> f64 {
        if self.max_memory == 0 {
            return 0.0;
        }
        let usage = rss as f64 / self.max_memory as f64;
        if usage.is_finite() {
            usage.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn publish(&self, event: PressureEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No pressure event subscribers");
        }
    }

    async fn check_memory(&self) -> Result<MemoryStats> {
        let sample = self.sampler.sample()?;

        let stats = MemoryStats {
            rss: sample.rss,
            virtual_memory: sample.virtual_memory,
            system_total: sample.system_total,
            system_available: sample.system_available,
            tracked_bytes: self.tracked_bytes.as_ref().map(|f| f()).unwrap_or(0),
            timestamp: self.clock.now_ms(),
            usage_percentage: self.usage(sample.rss),
        };

        if self.config.detailed_tracking && self.config.max_history_size > 0 {
            let mut history = self.history.write();
            while history.len() >= self.config.max_history_size {
                history.pop_front();
            }
            history.push_back(stats.clone());
        }
        *self.latest.write() = Some(stats.clone());

        self.publish(PressureEvent::MemoryUpdate(stats.clone()));

        let level = PressureLevel::classify(
            stats.usage_percentage,
            self.config.warning_threshold,
            self.config.critical_threshold,
        );
        let previous = std::mem::replace(&mut *self.level.lock(), level);

        if level != previous {
            match level {
                PressureLevel::Warning => {
                    tracing::warn!(
                        usage = stats.usage_percentage,
                        rss = stats.rss,
                        "Memory pressure entered warning level"
                    );
                    self.publish(PressureEvent::Warning(stats.clone()));
                }
                PressureLevel::Critical => {
                    tracing::error!(
                        usage = stats.usage_percentage,
                        rss = stats.rss,
                        "Memory pressure entered critical level"
                    );
                    self.publish(PressureEvent::Critical(stats.clone()));
                }
                PressureLevel::Normal => {
                    tracing::info!(usage = stats.usage_percentage, "Memory pressure back to normal");
                    self.publish(PressureEvent::Recovered(stats.clone()));
                }
            }
        }

        if self.config.auto_eviction && level != PressureLevel::Normal {
            self.trigger_eviction(level).await;
        }

        Ok(stats)
    }

    async fn trigger_eviction(&self, level: PressureLevel) -> EvictionResult {
        let strategies: Vec<Arc<dyn EvictionStrategy>> = self.strategies.read().clone();
        let mut result = EvictionResult::default();

        for strategy in strategies {
            result.strategies_executed += 1;
            let outcome = AssertUnwindSafe(strategy.execute(level))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(outcome)) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        items = outcome.items_evicted,
                        bytes = outcome.memory_freed,
                        "Eviction strategy finished"
                    );
                    result.total_items_evicted += outcome.items_evicted;
                    result.total_memory_freed += outcome.memory_freed;
                }
                Ok(Err(e)) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "Eviction strategy failed");
                    result.failed_strategies.push(strategy.name().to_string());
                }
                Err(_) => {
                    tracing::warn!(strategy = strategy.name(), "Eviction strategy panicked");
                    result.failed_strategies.push(strategy.name().to_string());
                }
            }
        }

        if result.total_items_evicted > 0 {
            tracing::info!(
                %level,
                items = result.total_items_evicted,
                bytes = result.total_memory_freed,
                "Evicted cache entries under memory pressure"
            );
        }

        self.publish(PressureEvent::Eviction {
            level,
            result: result.clone(),
        });
        result
    }
}

async fn monitor_loop(
    inner: Weak<DetectorInner>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(e) = inner.check_memory().await {
            tracing::error!(error = %e, "Memory sampling failed");
        }
    }
}
