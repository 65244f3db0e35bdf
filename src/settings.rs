//! World and equipment configuration
//!
//! Everything the catalog and the solver need to know about the save game
//! that is not a recipe: which miner/belt/pipe marks are unlocked, how many
//! geysers feed free power, and the numeric knobs of the refinement loop.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// Hard overdrive ceiling imposed by the game (250 %).
pub const MAX_CLOCK: f64 = 2.5;

/// log2(2.5): power grows by 2.5x when the clock doubles.
pub const DEFAULT_POWER_EXPONENT: f64 = 1.321928;

/// Item scored by the AWESOME sink. Never mass-balanced.
pub const SCORE_ITEM: &str = "AWESOME points";

/// Somersloops consumed by one Alien Power Augmenter
pub const SLOOPS_PER_AUGMENTER: u32 = 10;

/// Flat MW every augmenter adds to the grid
pub const AUGMENTER_POWER: f64 = 500.0;

/// Fuel of a fueled augmenter, items/min
pub const AUGMENTER_FUEL: &str = "Alien Power Matrix";
pub const AUGMENTER_FUEL_RATE: f64 = 5.0;

const MINER_BASE_POWER: [f64; 3] = [5.0, 12.0, 30.0];
const BELT_CAPACITY: [f64; 6] = [60.0, 120.0, 270.0, 480.0, 780.0, 1200.0];
const PIPE_CAPACITY: [f64; 2] = [300.0, 600.0];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Miner mark, 1 to 3
    pub miner_mk: u8,
    /// Conveyor belt mark, 1 to 6
    pub belt_mk: u8,
    /// Pipeline mark, 1 or 2
    pub pipe_mk: u8,
    /// Occupied geysers by purity (impure, normal, pure)
    pub geysers: [u32; 3],
    /// MW per impure geyser; doubles per purity tier
    pub geothermal_base_power: f64,
    /// Power available beyond the geysers (may be negative)
    pub extra_power: f64,
    pub min_clock: f64,
    pub processing_exponent: f64,
    pub extraction_exponent: f64,
    pub sink_power: f64,
    /// Absolute quota change (items/min) that triggers re-linearization
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Somersloops available for output amplification; `None` disables the row
    pub somersloops: Option<u32>,
    /// Clock samples between 100 % and 250 % for somersloop variants
    pub sloop_clock_steps: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            miner_mk: 3,
            belt_mk: 5,
            pipe_mk: 2,
            geysers: [3, 9, 6],
            geothermal_base_power: 100.0,
            extra_power: 0.0,
            min_clock: 0.01,
            processing_exponent: DEFAULT_POWER_EXPONENT,
            extraction_exponent: DEFAULT_POWER_EXPONENT,
            sink_power: 30.0,
            tolerance: 1e-3,
            max_iterations: 50,
            somersloops: None,
            sloop_clock_steps: 2,
        }
    }
}

/// Alien Power Augmenters built from the somersloop budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerAugmenters {
    pub unfueled: u32,
    pub fueled: u32,
}

impl PowerAugmenters {
    pub fn count(&self) -> u32 {
        self.unfueled + self.fueled
    }

    pub fn sloops(&self) -> u32 {
        SLOOPS_PER_AUGMENTER * self.count()
    }

    /// Multiplier on generated power: +10 % per augmenter, +30 % when fueled
    pub fn boost(&self) -> f64 {
        1.0 + (self.unfueled + 3 * self.fueled) as f64 / 10.0
    }

    /// Every augmenter count and fueled share `somersloops` can pay for
    pub fn splits(somersloops: u32) -> Vec<PowerAugmenters> {
        let mut splits = Vec::new();
        for total in 0..=somersloops / SLOOPS_PER_AUGMENTER {
            for fueled in 0..=total {
                splits.push(PowerAugmenters {
                    unfueled: total - fueled,
                    fueled,
                });
            }
        }
        splits
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.miner_mk) {
            return Err(PlanError::invalid(format!("miner mark {} not in 1..=3", self.miner_mk)));
        }
        if !(1..=6).contains(&self.belt_mk) {
            return Err(PlanError::invalid(format!("belt mark {} not in 1..=6", self.belt_mk)));
        }
        if !(1..=2).contains(&self.pipe_mk) {
            return Err(PlanError::invalid(format!("pipe mark {} not in 1..=2", self.pipe_mk)));
        }
        if !(self.min_clock >= 0.0 && self.min_clock <= 1.0) {
            return Err(PlanError::invalid(format!("minimum clock {} not in [0, 1]", self.min_clock)));
        }
        if self.extraction_exponent <= 1.0 {
            return Err(PlanError::invalid(format!(
                "extraction exponent {} must exceed 1",
                self.extraction_exponent
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(PlanError::invalid("tolerance must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(PlanError::invalid("iteration cap must be at least 1"));
        }
        if self.sloop_clock_steps == 0 {
            return Err(PlanError::invalid("somersloop clock steps must be at least 1"));
        }
        Ok(())
    }

    /// Free power budget in MW before any building draws from it
    pub fn free_power(&self) -> f64 {
        self.free_power_with(PowerAugmenters::default())
    }

    /// Free power with `augmenters` built. Their boost also applies to
    /// positive extra power; a reservation is taken off after boosting.
    pub fn free_power_with(&self, augmenters: PowerAugmenters) -> f64 {
        let geothermal: f64 = self
            .geysers
            .iter()
            .enumerate()
            .map(|(tier, &count)| count as f64 * self.geothermal_base_power * 2f64.powi(tier as i32))
            .sum();
        let base = geothermal + AUGMENTER_POWER * augmenters.count() as f64;
        if self.extra_power >= 0.0 {
            (base + self.extra_power) * augmenters.boost()
        } else {
            base * augmenters.boost() + self.extra_power
        }
    }

    pub fn belt_capacity(&self) -> f64 {
        BELT_CAPACITY[(self.belt_mk.clamp(1, 6) - 1) as usize]
    }

    pub fn pipe_capacity(&self) -> f64 {
        PIPE_CAPACITY[(self.pipe_mk.clamp(1, 2) - 1) as usize]
    }

    pub fn miner_base_power(&self) -> f64 {
        MINER_BASE_POWER[(self.miner_mk.clamp(1, 3) - 1) as usize]
    }

    /// Miner output on an impure node at 100 % clock
    pub fn miner_base_rate(&self) -> f64 {
        30.0 * 2f64.powi(self.miner_mk.clamp(1, 3) as i32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_free_power_counts_geysers_by_tier() {
        let settings = Settings::default();
        // 3 * 100 + 9 * 200 + 6 * 400
        assert_eq!(settings.free_power(), 4500.0);
    }

    #[test]
    fn augmenters_add_flat_power_then_boost() {
        let settings = Settings::default();
        let one = PowerAugmenters { unfueled: 1, fueled: 0 };
        assert!((settings.free_power_with(one) - 5000.0 * 1.1).abs() < 1e-9);
        let fueled = PowerAugmenters { unfueled: 0, fueled: 1 };
        assert!((settings.free_power_with(fueled) - 5000.0 * 1.3).abs() < 1e-9);

        let reserved = Settings {
            extra_power: -200.0,
            ..Default::default()
        };
        assert!((reserved.free_power_with(one) - (5000.0 * 1.1 - 200.0)).abs() < 1e-9);
    }

    #[test]
    fn augmenter_splits_cover_every_affordable_mix() {
        assert_eq!(PowerAugmenters::splits(9), vec![PowerAugmenters::default()]);

        let splits = PowerAugmenters::splits(25);
        // 0 augmenters, 1 in two fuelings, 2 in three
        assert_eq!(splits.len(), 6);
        assert!(splits.iter().all(|a| a.sloops() <= 25));
        assert!(splits.contains(&PowerAugmenters { unfueled: 1, fueled: 1 }));
        assert!(splits.contains(&PowerAugmenters { unfueled: 0, fueled: 2 }));
    }

    #[test]
    fn rejects_out_of_range_marks() {
        let settings = Settings {
            belt_mk: 7,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(PlanError::InvalidParameter(_))));
    }

    #[test]
    fn mark_tables() {
        let settings = Settings {
            miner_mk: 2,
            belt_mk: 6,
            pipe_mk: 1,
            ..Default::default()
        };
        assert_eq!(settings.miner_base_rate(), 60.0);
        assert_eq!(settings.miner_base_power(), 12.0);
        assert_eq!(settings.belt_capacity(), 1200.0);
        assert_eq!(settings.pipe_capacity(), 300.0);
    }
}
