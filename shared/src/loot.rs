//! Loot generation with a configurable period and probability.

use std::time::Duration;

/// Decides how much loot should appear on a map as time passes.
///
/// The generator accumulates the time elapsed since it last produced
/// anything. The longer the world has gone without new loot, the higher the
/// effective probability, which approaches the configured per-period value
/// as the accumulated time approaches one period. Generation never raises
/// the item count above the number of active looters.
#[derive(Debug, Clone)]
pub struct LootGenerator {
    base_interval: Duration,
    probability: f64,
    time_without_loot: Duration,
    random_multiplier: f64,
}

impl LootGenerator {
    /// Creates a generator with the deterministic multiplier of 1.0.
    ///
    /// `base_interval` is the loot period; `probability` is the chance of a
    /// missing item being replaced over one full period.
    pub fn new(base_interval: Duration, probability: f64) -> Self {
        Self {
            base_interval,
            probability,
            time_without_loot: Duration::ZERO,
            random_multiplier: 1.0,
        }
    }

    /// Like [`LootGenerator::new`] but scales the effective probability by
    /// `multiplier` in [0, 1], for stochastic operation.
    pub fn with_multiplier(base_interval: Duration, probability: f64, multiplier: f64) -> Self {
        Self {
            random_multiplier: multiplier,
            ..Self::new(base_interval, probability)
        }
    }

    /// Returns how many loot items to add after `time_delta` has elapsed,
    /// given the current item and looter counts.
    pub fn generate(&mut self, time_delta: Duration, loot_count: u32, looter_count: u32) -> u32 {
        self.time_without_loot += time_delta;

        let loot_shortage = looter_count.saturating_sub(loot_count);
        if loot_shortage == 0 {
            return 0;
        }

        let ratio = self.time_without_loot.as_secs_f64() / self.base_interval.as_secs_f64();
        let probability =
            ((1.0 - (1.0 - self.probability).powf(ratio)) * self.random_multiplier).clamp(0.0, 1.0);
        let generated = (loot_shortage as f64 * probability).round() as u32;

        if generated > 0 {
            self.time_without_loot = Duration::ZERO;
        }
        generated
    }
}
