use crate::app::config::SimulationConfig;
use crate::domain::{BatchConfig, ItemType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Derives each batch's [`BatchConfig`] and the RNGs its tasks draw from.
///
/// With a seed, everything random about a batch is a pure function of the
/// seed and the batch index.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    config: SimulationConfig,
}

impl BatchPlanner {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn capacity_for(&self, batch_index: u64) -> usize {
        let cycle = self.config.capacity_cycle.max(1);
        self.config.capacity_base + (batch_index % cycle) as usize * self.config.capacity_step
    }

    pub fn plan(&self, batch_index: u64) -> BatchConfig {
        let mut rng = self.rng_for(batch_index, 0);
        let producer_items = if self.config.max_producer_items > self.config.min_producer_items {
            rng.random_range(self.config.min_producer_items..self.config.max_producer_items)
        } else {
            self.config.min_producer_items
        };

        BatchConfig {
            buffer_capacity: self.capacity_for(batch_index),
            update_interval_ms: self.config.update_interval.as_millis() as u64,
            producer_items,
            empty_buffer_poll_delay_ms: self.config.empty_poll_delay.as_millis() as u64,
        }
    }

    /// RNG for the producer or consumer of one item type within a batch.
    pub fn task_rng(&self, batch_index: u64, item_type: ItemType, consumer: bool) -> StdRng {
        let stream = 1 + (item_type as u64) * 2 + u64::from(consumer);
        self.rng_for(batch_index, stream)
    }

    fn rng_for(&self, batch_index: u64, stream: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(
                seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
                    .wrapping_add(batch_index)
                    .rotate_left(17)
                    .wrapping_add(stream),
            ),
            None => StdRng::from_os_rng(),
        }
    }
}
