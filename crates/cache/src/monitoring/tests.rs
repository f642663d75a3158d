//! Tests for the memory pressure detector

use super::*;
use crate::clock::ManualClock;
use crate::errors::{Error, RecoveryHint, Result};
use crate::eviction::{EvictionStrategy, StrategyOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

const MB: u64 = 1024 * 1024;

#[derive(Clone, Copy)]
enum Behaviour {
    Evict(u64, u64),
    Fail,
    Panic,
}

struct RecordingStrategy {
    name: &'static str,
    priority: i32,
    behaviour: Behaviour,
    calls: Arc<Mutex<Vec<(String, PressureLevel)>>>,
}

#[async_trait]
impl EvictionStrategy for RecordingStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn execute(&self, level: PressureLevel) -> Result<StrategyOutcome> {
        self.calls.lock().push((self.name.to_string(), level));
        match self.behaviour {
            Behaviour::Evict(items, bytes) => Ok(StrategyOutcome {
                items_evicted: items,
                memory_freed: bytes,
            }),
            Behaviour::Fail => Err(Error::EvictionStrategy {
                strategy: self.name.to_string(),
                message: "refused".to_string(),
                recovery_hint: RecoveryHint::Ignore,
            }),
            Behaviour::Panic => panic!("strategy exploded"),
        }
    }
}

fn detector(sampler: Arc<ManualMemorySampler>, auto_eviction: bool) -> MemoryPressureDetector {
    let config = MemoryPressureConfig {
        warning_threshold: 0.7,
        critical_threshold: 0.9,
        monitoring_interval: Duration::from_millis(100),
        auto_eviction,
        max_history_size: 3,
        max_memory: Some(100 * MB),
        ..MemoryPressureConfig::default()
    };
    MemoryPressureDetector::new(config, sampler, ManualClock::new(0))
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<PressureEvent>) -> Vec<PressureEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn count_warnings(events: &[PressureEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PressureEvent::Warning(_)))
        .count()
}

fn count_criticals(events: &[PressureEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PressureEvent::Critical(_)))
        .count()
}

#[tokio::test]
async fn test_warning_fires_once_per_entry_into_level() {
    let sampler = Arc::new(ManualMemorySampler::new(75 * MB, 1024 * MB));
    let detector = detector(sampler.clone(), false);
    let mut rx = detector.subscribe();

    detector.check_memory().await.unwrap();
    sampler.set_rss(76 * MB);
    detector.check_memory().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count_warnings(&events), 1);
    // Every tick publishes an update
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PressureEvent::MemoryUpdate(_)))
            .count(),
        2
    );

    sampler.set_rss(95 * MB);
    detector.check_memory().await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(count_criticals(&events), 1);
    assert_eq!(count_warnings(&events), 0);
    assert_eq!(detector.current_level(), PressureLevel::Critical);
}

#[tokio::test]
async fn test_warning_refires_after_recovery() {
    let sampler = Arc::new(ManualMemorySampler::new(75 * MB, 1024 * MB));
    let detector = detector(sampler.clone(), false);
    let mut rx = detector.subscribe();

    detector.check_memory().await.unwrap();
    sampler.set_rss(10 * MB);
    detector.check_memory().await.unwrap();
    sampler.set_rss(80 * MB);
    detector.check_memory().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count_warnings(&events), 2);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PressureEvent::Recovered(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_critical_after_warning_still_fires() {
    let sampler = Arc::new(ManualMemorySampler::new(80 * MB, 1024 * MB));
    let detector = detector(sampler.clone(), false);
    let mut rx = detector.subscribe();

    detector.check_memory().await.unwrap();
    sampler.set_rss(99 * MB);
    detector.check_memory().await.unwrap();
    sampler.set_rss(98 * MB);
    detector.check_memory().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count_warnings(&events), 1);
    assert_eq!(count_criticals(&events), 1);
}

#[tokio::test]
async fn test_usage_is_clamped() {
    let sampler = Arc::new(ManualMemorySampler::new(u64::MAX, 1024 * MB));
    let detector = detector(sampler.clone(), false);
    let stats = detector.check_memory().await.unwrap();
    assert_eq!(stats.usage_percentage, 1.0);

    sampler.set_rss(0);
    let stats = detector.check_memory().await.unwrap();
    assert_eq!(stats.usage_percentage, 0.0);
}

#[tokio::test]
async fn test_zero_budget_reports_zero_usage() {
    let sampler = Arc::new(ManualMemorySampler::new(50 * MB, 0));
    let detector = MemoryPressureDetector::new(
        MemoryPressureConfig::default(),
        sampler,
        ManualClock::new(0),
    );
    assert_eq!(detector.max_memory(), 0);
    let stats = detector.check_memory().await.unwrap();
    assert_eq!(stats.usage_percentage, 0.0);
    assert_eq!(detector.current_level(), PressureLevel::Normal);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let sampler = Arc::new(ManualMemorySampler::new(MB, 1024 * MB));
    let detector = detector(sampler.clone(), false);

    for rss in 1..=5 {
        sampler.set_rss(rss * MB);
        detector.check_memory().await.unwrap();
    }

    let history = detector.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].rss, 3 * MB);
    assert_eq!(history[2].rss, 5 * MB);
    assert_eq!(detector.latest_stats().map(|s| s.rss), Some(5 * MB));
}

#[tokio::test]
async fn test_trigger_eviction_runs_in_priority_order_and_survives_failures() {
    let sampler = Arc::new(ManualMemorySampler::new(MB, 1024 * MB));
    let detector = detector(sampler, false);
    let calls = Arc::new(Mutex::new(Vec::new()));

    for (name, priority, behaviour) in [
        ("low", 1, Behaviour::Evict(1, 10)),
        ("broken", 50, Behaviour::Fail),
        ("high", 100, Behaviour::Evict(4, 400)),
        ("explosive", 75, Behaviour::Panic),
    ] {
        detector.register_strategy(Arc::new(RecordingStrategy {
            name,
            priority,
            behaviour,
            calls: calls.clone(),
        }));
    }

    let mut rx = detector.subscribe();
    let result = detector.trigger_eviction(PressureLevel::Critical).await;

    let order: Vec<String> = calls.lock().iter().map(|(name, _)| name.clone()).collect();
    assert_eq!(order, vec!["high", "explosive", "broken", "low"]);

    assert_eq!(result.strategies_executed, 4);
    assert_eq!(result.total_items_evicted, 5);
    assert_eq!(result.total_memory_freed, 410);
    assert_eq!(result.failed_strategies, vec!["explosive", "broken"]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PressureEvent::Eviction { level: PressureLevel::Critical, result: r } if r == &result
    )));
}

#[tokio::test]
async fn test_register_replaces_and_unregister_removes() {
    let sampler = Arc::new(ManualMemorySampler::new(MB, 1024 * MB));
    let detector = detector(sampler, false);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let make = |priority| {
        Arc::new(RecordingStrategy {
            name: "only",
            priority,
            behaviour: Behaviour::Evict(1, 1),
            calls: calls.clone(),
        })
    };
    detector.register_strategy(make(1));
    detector.register_strategy(make(2));
    assert_eq!(detector.strategy_names(), vec!["only"]);

    assert!(detector.unregister_strategy("only"));
    assert!(!detector.unregister_strategy("only"));
    let result = detector.trigger_eviction(PressureLevel::Warning).await;
    assert_eq!(result.strategies_executed, 0);
}

#[tokio::test]
async fn test_auto_eviction_runs_on_pressure_ticks() {
    let sampler = Arc::new(ManualMemorySampler::new(MB, 1024 * MB));
    let detector = detector(sampler.clone(), true);
    let calls = Arc::new(Mutex::new(Vec::new()));
    detector.register_strategy(Arc::new(RecordingStrategy {
        name: "s",
        priority: 1,
        behaviour: Behaviour::Evict(1, 1),
        calls: calls.clone(),
    }));

    detector.check_memory().await.unwrap();
    assert!(calls.lock().is_empty());

    sampler.set_rss(80 * MB);
    detector.check_memory().await.unwrap();
    sampler.set_rss(95 * MB);
    detector.check_memory().await.unwrap();

    let levels: Vec<PressureLevel> = calls.lock().iter().map(|(_, level)| *level).collect();
    assert_eq!(levels, vec![PressureLevel::Warning, PressureLevel::Critical]);
}

#[tokio::test(start_paused = true)]
async fn test_monitoring_survives_sampling_failures() {
    let sampler = Arc::new(ManualMemorySampler::new(MB, 1024 * MB));
    let detector = detector(sampler.clone(), false);

    sampler.fail("sampler offline");
    assert!(detector.start_monitoring());
    assert!(!detector.start_monitoring());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(detector.is_monitoring());
    assert!(detector.history().is_empty());

    sampler.set_rss(2 * MB);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!detector.history().is_empty());

    assert!(detector.stop_monitoring());
    assert!(!detector.stop_monitoring());
    assert!(!detector.is_monitoring());
}
