use super::workload::{Workload, consumer_delay, producer_delay};
use crate::app::config::{PacingConfig, PayloadSizes};
use crate::buffer::{BufferError, BufferView, TrackedBuffer};
use crate::domain::BatchInfo;
use crate::monitor::StatsAggregator;
use crate::server::StatsPublisher;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Raises the producer-finished flag when dropped, so a consumer is released
/// even if its producer panics.
struct FinishedGuard(Arc<AtomicBool>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Produced(usize),
    Consumed(usize),
}

pub struct ProducerTask<T> {
    pub buffer: Arc<TrackedBuffer<T>>,
    pub items: usize,
    pub sizes: PayloadSizes,
    pub pacing: PacingConfig,
    pub rng: StdRng,
    pub finished: Arc<AtomicBool>,
}

impl<T: Workload> ProducerTask<T> {
    pub async fn run(mut self) -> TaskOutcome {
        let _finished = FinishedGuard(self.finished.clone());
        let item_type = T::ITEM_TYPE;
        let mut emitted = 0usize;

        for index in 0..self.items {
            let item = T::generate(index, &self.sizes);
            match self.buffer.emit(item).await {
                Ok(()) => emitted += 1,
                Err(e @ BufferError::Closed { .. }) => {
                    warn!(%item_type, error = %e, "Buffer closed, stopping producer");
                    break;
                }
                Err(e) => warn!(%item_type, index, error = %e, "Emission error"),
            }
            tokio::time::sleep(producer_delay(index, &self.pacing, &mut self.rng)).await;
        }

        info!(%item_type, emitted, "Producer completed");
        TaskOutcome::Produced(emitted)
    }
}

pub struct ConsumerTask<T> {
    pub buffer: Arc<TrackedBuffer<T>>,
    pub producer_finished: Arc<AtomicBool>,
    pub empty_poll_delay: Duration,
    pub pacing: PacingConfig,
    pub rng: StdRng,
}

impl<T: Workload> ConsumerTask<T> {
    pub async fn run(mut self) -> TaskOutcome {
        let item_type = T::ITEM_TYPE;
        let mut consumed = 0usize;

        loop {
            match self.buffer.try_consume() {
                Some(entry) => {
                    consumed += 1;
                    trace!(%item_type, waited_ms = entry.age().as_millis() as u64, "Consumed item");

                    let utilization =
                        self.buffer.current_size() as f64 / self.buffer.capacity() as f64;
                    let delay = consumer_delay(utilization, &self.pacing, &mut self.rng);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    // Flag first: a set flag means every emission has already landed.
                    if self.producer_finished.load(Ordering::Acquire)
                        && self.buffer.current_size() == 0
                    {
                        info!(%item_type, "No more items to consume and producer finished");
                        break;
                    }
                    tokio::time::sleep(self.empty_poll_delay).await;
                }
            }
        }

        info!(%item_type, consumed, "Consumer completed");
        TaskOutcome::Consumed(consumed)
    }
}

/// Publishes a snapshot every `interval` until cancelled.
///
/// Cancellation is only observed between publishes.
pub struct SnapshotTask {
    pub aggregator: StatsAggregator,
    pub buffers: Vec<Arc<dyn BufferView>>,
    pub batch_info: BatchInfo,
    pub publisher: Arc<dyn StatsPublisher>,
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl SnapshotTask {
    pub async fn run(self) -> u64 {
        let mut cycles = 0u64;
        loop {
            let stats = self.aggregator.snapshot(&self.buffers, Some(self.batch_info));
            let delivered = self.publisher.publish(stats.as_ref());
            cycles += 1;
            trace!(cycle = cycles, delivered, "Published snapshot");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(
            batch = self.batch_info.current_batch,
            cycles, "Snapshot task stopped"
        );
        cycles
    }
}
