// src/engine/cadence.rs
//! Adaptive tick duration
//!
//! High tension means characters write more often, so ticks get shorter; a
//! quiet world skips ahead.

use crate::utils::config::TickConfig;
use chrono::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TickCadence {
    base: Duration,
    short: Duration,
    long: Duration,
    high_intensity: f64,
    quiet_intensity: f64,
}

impl TickCadence {
    pub fn from_config(config: &TickConfig) -> Self {
        Self {
            base: Duration::minutes(config.base_minutes),
            short: Duration::minutes(config.min_minutes),
            long: Duration::minutes(config.max_minutes),
            high_intensity: config.high_intensity,
            quiet_intensity: config.quiet_intensity,
        }
    }

    /// Duration for a world whose hottest open tension sits at `max_intensity`
    pub fn duration_for(&self, max_intensity: f64) -> Duration {
        if max_intensity >= self.high_intensity {
            self.short
        } else if max_intensity < self.quiet_intensity {
            self.long
        } else {
            self.base
        }
    }
}

impl Default for TickCadence {
    fn default() -> Self {
        Self::from_config(&TickConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_follows_intensity() {
        let cadence = TickCadence::default();

        assert_eq!(cadence.duration_for(0.9), Duration::minutes(60));
        assert_eq!(cadence.duration_for(0.7), Duration::minutes(60));
        assert_eq!(cadence.duration_for(0.5), Duration::minutes(240));
        assert_eq!(cadence.duration_for(0.1), Duration::minutes(1440));
    }

    #[test]
    fn test_custom_thresholds() {
        let cadence = TickCadence::from_config(&TickConfig {
            base_minutes: 30,
            min_minutes: 10,
            max_minutes: 90,
            high_intensity: 0.5,
            quiet_intensity: 0.5,
            ..Default::default()
        });

        assert_eq!(cadence.duration_for(0.5), Duration::minutes(10));
        assert_eq!(cadence.duration_for(0.49), Duration::minutes(90));
    }
}
