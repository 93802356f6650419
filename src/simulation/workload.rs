use crate::app::config::{PacingConfig, PayloadSizes};
use crate::domain::ItemType;
use crate::instrumentation::Measurable;
use bytes::Bytes;
use rand::Rng;
use std::time::Duration;

/// Item types a producer knows how to generate.
///
/// Every index maps to a fixed item, so the size skew of a batch depends only
/// on its item count.
pub trait Workload: Measurable + Send + Sync + Sized + 'static {
    const ITEM_TYPE: ItemType;

    fn generate(index: usize, sizes: &PayloadSizes) -> Self;
}

impl Workload for String {
    const ITEM_TYPE: ItemType = ItemType::String;

    fn generate(index: usize, sizes: &PayloadSizes) -> Self {
        let padding = "X".repeat(payload_size(index, sizes));
        format!("Item {index} [{padding}]")
    }
}

impl Workload for Bytes {
    const ITEM_TYPE: ItemType = ItemType::ByteArray;

    fn generate(index: usize, sizes: &PayloadSizes) -> Self {
        Bytes::from(vec![index as u8; payload_size(index, sizes)])
    }
}

impl Workload for i32 {
    const ITEM_TYPE: ItemType = ItemType::Int;

    fn generate(index: usize, _sizes: &PayloadSizes) -> Self {
        if index % 10 == 0 {
            i32::MAX
        } else if index % 5 == 0 {
            1_000_000
        } else if index % 3 == 0 {
            100_000
        } else {
            index as i32
        }
    }
}

pub fn payload_size(index: usize, sizes: &PayloadSizes) -> usize {
    if index % 10 == 0 {
        sizes.every_tenth
    } else if index % 5 == 0 {
        sizes.every_fifth
    } else if index % 3 == 0 {
        sizes.every_third
    } else {
        sizes.base
    }
}

/// Pause after emitting item `index`: long on every tenth, medium on every fifth.
pub fn producer_delay<R: Rng>(index: usize, pacing: &PacingConfig, rng: &mut R) -> Duration {
    let base = if index % 10 == 0 {
        pacing.producer_slow
    } else if index % 5 == 0 {
        pacing.producer_medium
    } else {
        pacing.producer_fast
    };
    base.mul_f64(jitter(pacing, rng))
}

/// Pause after a consumption: the fuller the buffer, the shorter the wait.
pub fn consumer_delay<R: Rng>(utilization: f64, pacing: &PacingConfig, rng: &mut R) -> Duration {
    let base = if utilization > pacing.consumer_fast_above {
        pacing.consumer_fast
    } else if utilization > pacing.consumer_medium_above {
        pacing.consumer_medium
    } else {
        pacing.consumer_slow
    };
    base.mul_f64(jitter(pacing, rng))
}

fn jitter<R: Rng>(pacing: &PacingConfig, rng: &mut R) -> f64 {
    if pacing.jitter_max > pacing.jitter_min {
        rng.random_range(pacing.jitter_min..pacing.jitter_max)
    } else {
        pacing.jitter_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_payload_tiers() {
        let sizes = PayloadSizes::default();
        assert_eq!(payload_size(0, &sizes), 10_000);
        assert_eq!(payload_size(20, &sizes), 10_000);
        assert_eq!(payload_size(15, &sizes), 5_000);
        assert_eq!(payload_size(9, &sizes), 1_000);
        assert_eq!(payload_size(7, &sizes), 100);
    }

    #[test]
    fn test_generated_items() {
        let sizes = PayloadSizes::default();

        let item = String::generate(7, &sizes);
        assert!(item.starts_with("Item 7 ["));
        assert_eq!(item.len(), "Item 7 []".len() + 100);

        let bytes = Bytes::generate(3, &sizes);
        assert_eq!(bytes.len(), 1_000);
        assert!(bytes.iter().all(|b| *b == 3));

        assert_eq!(i32::generate(10, &sizes), i32::MAX);
        assert_eq!(i32::generate(5, &sizes), 1_000_000);
        assert_eq!(i32::generate(6, &sizes), 100_000);
        assert_eq!(i32::generate(7, &sizes), 7);
    }

    #[test]
    fn test_delays_stay_inside_jitter_band() {
        let pacing = PacingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let slow = producer_delay(10, &pacing, &mut rng);
            assert!(slow >= Duration::from_millis(500) && slow < Duration::from_millis(1500));

            let fast = producer_delay(1, &pacing, &mut rng);
            assert!(fast >= Duration::from_millis(50) && fast < Duration::from_millis(150));

            let draining = consumer_delay(0.9, &pacing, &mut rng);
            assert!(draining < Duration::from_millis(150));

            let idle = consumer_delay(0.1, &pacing, &mut rng);
            assert!(idle >= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_zero_width_jitter_is_exact() {
        let pacing = PacingConfig {
            jitter_min: 1.0,
            jitter_max: 1.0,
            ..PacingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(consumer_delay(0.6, &pacing, &mut rng), Duration::from_millis(500));
    }
}
