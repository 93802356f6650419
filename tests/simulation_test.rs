use backpressure_monitor::app::config::{PacingConfig, PayloadSizes, SimulationConfig};
use backpressure_monitor::domain::{BufferStats, ItemType};
use backpressure_monitor::metrics::MetricsRegistry;
use backpressure_monitor::server::StatsPublisher;
use backpressure_monitor::simulation::{BatchPhase, BatchPlanner, SimulationDriver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<Option<BufferStats>>>,
}

impl RecordingPublisher {
    fn snapshots(&self) -> Vec<BufferStats> {
        self.published.lock().iter().flatten().cloned().collect()
    }
}

impl StatsPublisher for RecordingPublisher {
    fn publish(&self, stats: Option<&BufferStats>) -> usize {
        self.published.lock().push(stats.cloned());
        1
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn fast_config() -> SimulationConfig {
    SimulationConfig {
        capacity_base: 2,
        capacity_step: 1,
        capacity_cycle: 3,
        min_producer_items: 6,
        max_producer_items: 10,
        update_interval: millis(5),
        empty_poll_delay: millis(1),
        inter_batch_delay: millis(10),
        seed: Some(7),
        max_batches: Some(2),
        payload_sizes: PayloadSizes {
            every_tenth: 64,
            every_fifth: 32,
            every_third: 16,
            base: 8,
        },
        pacing: PacingConfig {
            producer_slow: millis(3),
            producer_medium: millis(2),
            producer_fast: millis(1),
            consumer_fast: millis(1),
            consumer_medium: millis(2),
            consumer_slow: millis(3),
            ..PacingConfig::default()
        },
    }
}

fn driver(config: SimulationConfig) -> (SimulationDriver, Arc<MetricsRegistry>, Arc<RecordingPublisher>) {
    let registry = Arc::new(MetricsRegistry::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let driver = SimulationDriver::new(config, registry.clone(), publisher.clone());
    (driver, registry, publisher)
}

#[tokio::test]
async fn test_single_batch_drains_every_item() {
    let (driver, registry, publisher) = driver(fast_config());
    let planned = driver.planner().plan(1);

    let report = tokio::time::timeout(Duration::from_secs(10), driver.run_batch(1, 0))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.batch, 1);
    assert_eq!(report.config, planned);
    assert_eq!(report.item_types.len(), 3);
    for item in &report.item_types {
        assert_eq!(item.emissions, planned.producer_items as u64, "{}", item.item_type);
        assert_eq!(item.consumptions, item.emissions, "{}", item.item_type);
        assert!(item.peak_size <= planned.buffer_capacity);
    }
    assert!(report.snapshot_cycles >= 1);

    assert_eq!(driver.phase(), BatchPhase::Complete);
    assert_eq!(registry.buffer_count(), 0);
    assert_eq!(registry.total_tracked_memory(), 0);

    let snapshots = publisher.snapshots();
    assert!(!snapshots.is_empty());
    for stats in &snapshots {
        assert!(stats.total_consumptions <= stats.total_emissions);
        assert_eq!(stats.batch_info.map(|b| b.current_batch), Some(1));
        assert_eq!(stats.buffers.len(), 3);
    }
}

#[tokio::test]
async fn test_slow_consumers_cause_suspensions() {
    let mut config = fast_config();
    config.capacity_base = 2;
    config.capacity_step = 0;
    config.pacing.producer_slow = millis(0);
    config.pacing.producer_medium = millis(0);
    config.pacing.producer_fast = millis(0);
    config.pacing.consumer_fast = millis(5);
    config.pacing.consumer_medium = millis(5);
    config.pacing.consumer_slow = millis(5);
    let (driver, _, _) = driver(config);

    let report = tokio::time::timeout(Duration::from_secs(10), driver.run_batch(1, 0))
        .await
        .unwrap()
        .unwrap();

    assert!(report.total_suspensions() > 0);
    for item in &report.item_types {
        assert_eq!(item.peak_size, 2, "{}", item.item_type);
    }
}

#[tokio::test]
async fn test_run_stops_at_batch_limit() {
    let (driver, registry, publisher) = driver(fast_config());
    let mut phases = driver.subscribe_phase();

    let completed = tokio::time::timeout(
        Duration::from_secs(20),
        driver.run(CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(completed, 2);
    assert_eq!(driver.phase(), BatchPhase::Stopped);
    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), BatchPhase::Stopped);
    assert_eq!(registry.buffer_count(), 0);

    let batches: Vec<u64> = publisher
        .snapshots()
        .iter()
        .filter_map(|s| s.batch_info.map(|b| b.current_batch))
        .collect();
    assert!(batches.contains(&1));
    assert!(batches.contains(&2));
    assert!(batches.windows(2).all(|w| w[0] <= w[1]));

    let second = publisher
        .snapshots()
        .into_iter()
        .find_map(|s| s.batch_info.filter(|b| b.current_batch == 2))
        .unwrap();
    assert_eq!(second.completed_batches, 1);
    assert_eq!(second.batch_config.buffer_capacity, 4);
}

#[tokio::test]
async fn test_cancel_stops_mid_batch() {
    let mut config = fast_config();
    config.max_batches = None;
    config.pacing.producer_fast = millis(50);
    config.pacing.producer_medium = millis(50);
    config.pacing.producer_slow = millis(50);
    let (driver, registry, _) = driver(config);
    let driver = Arc::new(driver);

    let shutdown = CancellationToken::new();
    let run = tokio::spawn({
        let driver = driver.clone();
        let shutdown = shutdown.clone();
        async move { driver.run(shutdown).await }
    });

    let mut phases = driver.subscribe_phase();
    phases
        .wait_for(|phase| *phase == BatchPhase::Running)
        .await
        .unwrap();
    shutdown.cancel();

    let completed = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed, 0);
    assert_eq!(driver.phase(), BatchPhase::Stopped);
    assert_eq!(registry.buffer_count(), 0);
}

#[test]
fn test_seeded_plans_are_reproducible() {
    let a = BatchPlanner::new(fast_config());
    let b = BatchPlanner::new(fast_config());
    for batch in 1..20 {
        assert_eq!(a.plan(batch), b.plan(batch));
        let items = a.plan(batch).producer_items;
        assert!((6..10).contains(&items));
    }

    use rand::Rng;
    let mut x = a.task_rng(4, ItemType::ByteArray, true);
    let mut y = b.task_rng(4, ItemType::ByteArray, true);
    assert_eq!(x.random::<u64>(), y.random::<u64>());
}

#[tokio::test]
async fn test_failed_batches_do_not_stop_the_loop() {
    let mut config = fast_config();
    config.capacity_base = 0;
    config.capacity_step = 0;
    config.max_batches = Some(3);
    let (driver, registry, publisher) = driver(config);
    let mut phases = driver.subscribe_phase();

    let completed = tokio::time::timeout(
        Duration::from_secs(5),
        driver.run(CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(completed, 0);
    assert_eq!(driver.phase(), BatchPhase::Stopped);
    assert_eq!(*phases.borrow_and_update(), BatchPhase::Stopped);
    assert_eq!(registry.buffer_count(), 0);
    assert!(publisher.snapshots().is_empty());
}

#[tokio::test]
async fn test_loop_resumes_after_a_failed_batch() {
    // Capacities per batch: 1, 0, 1. Only the second batch fails.
    let mut config = fast_config();
    config.capacity_base = 0;
    config.capacity_step = 1;
    config.capacity_cycle = 2;
    config.max_batches = Some(3);
    let (driver, registry, publisher) = driver(config);

    let completed = tokio::time::timeout(
        Duration::from_secs(20),
        driver.run(CancellationToken::new()),
    )
    .await
    .unwrap();

    assert_eq!(completed, 2);
    assert_eq!(driver.phase(), BatchPhase::Stopped);
    assert_eq!(registry.buffer_count(), 0);

    let batches: Vec<_> = publisher
        .snapshots()
        .iter()
        .filter_map(|s| s.batch_info)
        .collect();
    assert!(batches.iter().all(|b| b.current_batch != 2));
    let third = batches
        .iter()
        .find(|b| b.current_batch == 3)
        .expect("third batch published snapshots");
    assert_eq!(third.completed_batches, 1);
    assert_eq!(third.batch_config.buffer_capacity, 1);
}
