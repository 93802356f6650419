use super::{Config, ConfigError};

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max sessions must be greater than 0".to_string(),
            ));
        }

        if self.update_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Update interval must be greater than 0".to_string(),
            ));
        }

        if self.max_batches == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Max batches must be greater than 0 when set".to_string(),
            ));
        }

        let sim = &self.simulation;
        if sim.capacity_base == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer capacity base must be greater than 0".to_string(),
            ));
        }
        if sim.capacity_cycle == 0 {
            return Err(ConfigError::InvalidConfig(
                "Capacity cycle must be greater than 0".to_string(),
            ));
        }

        if sim.min_producer_items == 0 || sim.min_producer_items >= sim.max_producer_items {
            return Err(ConfigError::InvalidConfig(format!(
                "Producer item range [{}, {}) must be non-empty and start above 0",
                sim.min_producer_items, sim.max_producer_items
            )));
        }

        let pacing = &sim.pacing;
        if !(pacing.jitter_min > 0.0 && pacing.jitter_min <= pacing.jitter_max) {
            return Err(ConfigError::InvalidConfig(format!(
                "Jitter bounds must satisfy 0 < min <= max, got [{}, {})",
                pacing.jitter_min, pacing.jitter_max
            )));
        }

        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(pacing.consumer_fast_above)
            || !in_unit(pacing.consumer_medium_above)
            || pacing.consumer_medium_above > pacing.consumer_fast_above
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Consumer thresholds must satisfy 0 <= medium ({}) <= fast ({}) <= 1",
                pacing.consumer_medium_above, pacing.consumer_fast_above
            )));
        }

        if self.server.graceful_shutdown > self.server.hard_shutdown {
            return Err(ConfigError::InvalidConfig(
                "Graceful shutdown period cannot exceed the hard cutoff".to_string(),
            ));
        }

        Ok(())
    }
}
