use super::batch::BatchPlanner;
use super::tasks::{ConsumerTask, ProducerTask, SnapshotTask, TaskOutcome};
use super::workload::Workload;
use super::SimulationError;
use crate::app::config::SimulationConfig;
use crate::buffer::{BufferView, TrackedBuffer};
use crate::domain::{BatchConfig, BatchInfo, ItemType};
use crate::metrics::MetricsRegistry;
use crate::monitor::StatsAggregator;
use crate::server::StatsPublisher;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Idle,
    Starting,
    Running,
    Draining,
    Complete,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTypeReport {
    pub item_type: ItemType,
    pub emissions: u64,
    pub consumptions: u64,
    pub suspensions: u64,
    pub peak_size: usize,
}

/// Counters captured at the end of a batch, before the registry is cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch: u64,
    pub config: BatchConfig,
    pub item_types: Vec<ItemTypeReport>,
    pub snapshot_cycles: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total_suspensions(&self) -> u64 {
        self.item_types.iter().map(|r| r.suspensions).sum()
    }
}

/// Runs producer/consumer batches back to back and publishes snapshots.
pub struct SimulationDriver {
    config: SimulationConfig,
    planner: BatchPlanner,
    registry: Arc<MetricsRegistry>,
    aggregator: StatsAggregator,
    publisher: Arc<dyn StatsPublisher>,
    phase: watch::Sender<BatchPhase>,
}

impl SimulationDriver {
    pub fn new(
        config: SimulationConfig,
        registry: Arc<MetricsRegistry>,
        publisher: Arc<dyn StatsPublisher>,
    ) -> Self {
        let (phase, _) = watch::channel(BatchPhase::Idle);
        Self {
            planner: BatchPlanner::new(config.clone()),
            aggregator: StatsAggregator::new(registry.clone()),
            config,
            registry,
            publisher,
            phase,
        }
    }

    pub fn phase(&self) -> BatchPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<BatchPhase> {
        self.phase.subscribe()
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    /// Loops over batches until `shutdown` fires or `max_batches` is reached.
    ///
    /// A failed batch is logged and the loop moves on. Returns the number of
    /// batches that completed successfully.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        let mut current_batch = 1u64;
        let mut completed_batches = 0u64;
        let mut attempted = 0u64;

        info!(max_batches = ?self.config.max_batches, "Simulation started");

        loop {
            let outcome = tokio::select! {
                result = self.run_batch(current_batch, completed_batches) => Some(result),
                _ = shutdown.cancelled() => None,
            };

            match outcome {
                Some(Ok(report)) => {
                    completed_batches += 1;
                    info!(
                        batch = report.batch,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        suspensions = report.total_suspensions(),
                        "Batch completed"
                    );
                }
                Some(Err(e)) => {
                    error!(batch = current_batch, error = %e, "Batch failed");
                }
                None => {
                    info!(batch = current_batch, "Shutdown requested, abandoning batch");
                    self.registry.clear_tracking();
                    break;
                }
            }

            current_batch += 1;
            attempted += 1;
            if self.config.max_batches.is_some_and(|max| attempted >= max) {
                info!(attempted, "Reached batch limit");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                _ = shutdown.cancelled() => break,
            }
            self.registry.clear_tracking();
        }

        self.phase.send_replace(BatchPhase::Stopped);
        info!(completed_batches, "Simulation stopped");
        completed_batches
    }

    /// Runs one batch to completion.
    ///
    /// Dropping the returned future aborts every task of the batch.
    pub async fn run_batch(
        &self,
        batch_index: u64,
        completed_batches: u64,
    ) -> Result<BatchReport, SimulationError> {
        let started = Instant::now();
        self.phase.send_replace(BatchPhase::Starting);

        let batch_config = self.planner.plan(batch_index);
        info!(batch = batch_index, config = ?batch_config, "Starting batch");

        let capacity = batch_config.buffer_capacity;
        let strings = Arc::new(TrackedBuffer::<String>::new(
            ItemType::String,
            capacity,
            self.registry.clone(),
        )?);
        let byte_arrays = Arc::new(TrackedBuffer::<Bytes>::new(
            ItemType::ByteArray,
            capacity,
            self.registry.clone(),
        )?);
        let ints = Arc::new(TrackedBuffer::<i32>::new(
            ItemType::Int,
            capacity,
            self.registry.clone(),
        )?);
        let views: Vec<Arc<dyn BufferView>> = vec![
            strings.clone() as Arc<dyn BufferView>,
            byte_arrays.clone() as Arc<dyn BufferView>,
            ints.clone() as Arc<dyn BufferView>,
        ];

        let batch_info = BatchInfo {
            current_batch: batch_index,
            completed_batches,
            batch_config,
        };

        let snapshot_cancel = CancellationToken::new();
        let _stop_snapshots_on_drop = snapshot_cancel.clone().drop_guard();
        let snapshots = tokio::spawn(
            SnapshotTask {
                aggregator: self.aggregator.clone(),
                buffers: views.clone(),
                batch_info,
                publisher: self.publisher.clone(),
                interval: batch_config.update_interval(),
                cancel: snapshot_cancel.clone(),
            }
            .run(),
        );

        self.phase.send_replace(BatchPhase::Running);
        let mut workers = JoinSet::new();
        self.spawn_pipeline(&mut workers, strings, &batch_config, batch_index);
        self.spawn_pipeline(&mut workers, byte_arrays, &batch_config, batch_index);
        self.spawn_pipeline(&mut workers, ints, &batch_config, batch_index);

        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(TaskOutcome::Produced(_) | TaskOutcome::Consumed(_)) => {}
                Err(e) => {
                    error!(batch = batch_index, error = %e, "Simulation task failed");
                    failures.push(e.to_string());
                }
            }
        }

        self.phase.send_replace(BatchPhase::Draining);
        snapshot_cancel.cancel();
        let snapshot_cycles = snapshots.await.unwrap_or_else(|e| {
            warn!(error = %e, "Snapshot task ended abnormally");
            0
        });
        for view in &views {
            view.close();
        }

        let item_types = views
            .iter()
            .map(|view| ItemTypeReport {
                item_type: view.item_type(),
                emissions: view.emissions(),
                consumptions: view.consumptions(),
                suspensions: view.suspensions(),
                peak_size: view.peak_size(),
            })
            .collect();

        self.registry.clear_tracking();
        self.phase.send_replace(BatchPhase::Complete);

        if !failures.is_empty() {
            return Err(SimulationError::TaskFailed(failures.join("; ")));
        }

        Ok(BatchReport {
            batch: batch_index,
            config: batch_config,
            item_types,
            snapshot_cycles,
            elapsed: started.elapsed(),
        })
    }

    fn spawn_pipeline<T: Workload>(
        &self,
        workers: &mut JoinSet<TaskOutcome>,
        buffer: Arc<TrackedBuffer<T>>,
        batch_config: &BatchConfig,
        batch_index: u64,
    ) {
        let finished = Arc::new(AtomicBool::new(false));

        workers.spawn(
            ProducerTask {
                buffer: buffer.clone(),
                items: batch_config.producer_items,
                sizes: self.config.payload_sizes.clone(),
                pacing: self.config.pacing.clone(),
                rng: self.planner.task_rng(batch_index, T::ITEM_TYPE, false),
                finished: finished.clone(),
            }
            .run(),
        );

        workers.spawn(
            ConsumerTask {
                buffer,
                producer_finished: finished,
                empty_poll_delay: batch_config.empty_buffer_poll_delay(),
                pacing: self.config.pacing.clone(),
                rng: self.planner.task_rng(batch_index, T::ITEM_TYPE, true),
            }
            .run(),
        );
    }
}
