use backpressure_monitor::BufferView;
use backpressure_monitor::buffer::TrackedBuffer;
use backpressure_monitor::domain::ItemType;
use backpressure_monitor::instrumentation::{DisabledBackend, LayoutBackend};
use backpressure_monitor::metrics::{GlobalCounters, MetricsRegistry, SuspensionEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;

#[test]
fn test_memory_totals_and_clear() {
    let registry = MetricsRegistry::new(Arc::new(LayoutBackend));
    let ids: Vec<_> = (0..3).map(|_| registry.register_buffer(10)).collect();

    for (id, memory) in ids.iter().zip([1000, 2000, 3000]) {
        registry.record_emission(*id);
        registry.update_buffer_metrics(*id, 1, memory);
    }
    registry.record_suspension(SuspensionEvent::capture(ids[0], 10, 10));

    assert_eq!(registry.total_tracked_memory(), 6000);
    assert_eq!(registry.total_emissions(), 3);
    assert_eq!(registry.total_suspensions(), 1);

    registry.clear_tracking();

    assert_eq!(registry.total_tracked_memory(), 0);
    assert_eq!(registry.totals(), GlobalCounters::default());
    assert_eq!(registry.buffer_count(), 0);
    assert!(registry.recent_suspensions().is_empty());
    for id in ids {
        assert!(registry.buffer_counters(id).is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_across_tasks() {
    let registry = Arc::new(MetricsRegistry::default());
    let id = registry.register_buffer(1_000);
    let tasks = 8u64;
    let total_ops = 8_000u64;

    let mut set = JoinSet::new();
    for _ in 0..tasks {
        let registry = registry.clone();
        set.spawn(async move {
            for _ in 0..total_ops / tasks {
                registry.record_emission(id);
                registry.record_consumption(id);
            }
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.unwrap();
    }

    let counters = registry.buffer_counters(id).unwrap();
    assert_eq!(counters.emissions, total_ops);
    assert_eq!(counters.consumptions, total_ops);
    assert_eq!(registry.total_emissions(), total_ops);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_yields_distinct_ids() {
    let registry = Arc::new(MetricsRegistry::default());
    let mut set = JoinSet::new();
    for _ in 0..16 {
        let registry = registry.clone();
        set.spawn(async move { (0..50).map(|_| registry.register_buffer(4)).collect::<Vec<_>>() });
    }

    let mut ids = HashSet::new();
    while let Some(joined) = set.join_next().await {
        ids.extend(joined.unwrap());
    }
    assert_eq!(ids.len(), 800);
    assert_eq!(registry.buffer_count(), 800);
}

#[test]
fn test_ids_keep_increasing_after_clear() {
    let registry = MetricsRegistry::default();
    let before = registry.register_buffer(1);
    registry.clear_tracking();
    let after = registry.register_buffer(1);
    assert!(after > before);
}

#[test]
fn test_disabled_backend_reports_zero_sizes() {
    let registry = MetricsRegistry::new(Arc::new(DisabledBackend));
    assert_eq!(registry.object_size(&"payload".to_string()), 0);
    assert!(!registry.measurement_enabled());
    assert_eq!(registry.object_size(&42i32), 0);
}

#[test]
fn test_mutations_on_unknown_ids_are_ignored() {
    let registry = MetricsRegistry::default();
    let id = registry.register_buffer(2);
    registry.clear_tracking();

    registry.record_emission(id);
    registry.update_buffer_metrics(id, 1, 512);

    assert_eq!(registry.total_emissions(), 0);
    assert_eq!(registry.total_tracked_memory(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_readers_see_consistent_sizes() {
    const ITEMS: usize = 20_000;
    let registry = Arc::new(MetricsRegistry::default());
    let buffer = Arc::new(TrackedBuffer::new(ItemType::String, ITEMS, registry.clone()).unwrap());
    let id = buffer.id();
    let done = Arc::new(AtomicBool::new(false));

    let reader = std::thread::spawn({
        let registry = registry.clone();
        let done = done.clone();
        move || {
            let mut reads = 0u64;
            let mut violations = 0u64;
            while !done.load(Ordering::Acquire) {
                if let Some(c) = registry.buffer_counters(id) {
                    if c.current_size as u64 != c.emissions - c.consumptions {
                        violations += 1;
                    }
                }
                let totals = registry.totals();
                if totals.current_size as u64 != totals.emissions - totals.consumptions {
                    violations += 1;
                }
                reads += 1;
            }
            (reads, violations)
        }
    });

    for i in 0..ITEMS {
        buffer.emit(format!("Item {i}")).await.unwrap();
        if i % 2 == 1 {
            buffer.try_consume().unwrap();
        }
    }
    done.store(true, Ordering::Release);

    let (reads, violations) = reader.join().unwrap();
    assert!(reads > 0);
    assert_eq!(violations, 0, "size drifted from emissions - consumptions");

    let counters = registry.buffer_counters(id).unwrap();
    assert_eq!(counters.emissions, ITEMS as u64);
    assert_eq!(counters.consumptions, ITEMS as u64 / 2);
    assert_eq!(counters.current_size, ITEMS / 2);
}
