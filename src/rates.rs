//! Recipe rate model
//!
//! Signed item rates and power draw per unit of activity. Positive rates are
//! net consumption, negative rates net production. The nominal functions
//! describe the catalog column as the solver sees it; the `_at` variants
//! evaluate a recipe at an explicit clock and somersloop count.

use crate::catalog::{Building, Catalog, ExtractionRecipe, ItemId, RecipeId, RecipeKind};
use crate::error::{PlanError, Result};
use crate::models::BuildingKind;
use crate::settings::MAX_CLOCK;

/// Building-clock state a recipe is evaluated at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modifiers {
    pub clock: f64,
    pub sloops: u32,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self { clock: 1.0, sloops: 0 }
    }
}

impl Modifiers {
    pub fn clock(clock: f64) -> Self {
        Self { clock, sloops: 0 }
    }
}

impl Catalog {
    /// Sparse column of a recipe: every item with a non-zero nominal rate
    pub fn net_rates(&self, recipe: RecipeId) -> Vec<(ItemId, f64)> {
        match &self.recipe(recipe).kind {
            RecipeKind::Standard {
                building,
                inputs,
                outputs,
            } => standard_rates(self.building(*building), inputs, outputs, 1.0, 0),
            RecipeKind::Overclocked { base, sloops, clock } => match &self.recipe(*base).kind {
                RecipeKind::Standard {
                    building,
                    inputs,
                    outputs,
                } => standard_rates(self.building(*building), inputs, outputs, *clock, *sloops),
                _ => Vec::new(),
            },
            RecipeKind::Extraction(extraction) => vec![(extraction.resource, -extraction.base_rate)],
            RecipeKind::Milestone { costs } => merge(costs.iter().copied()),
            RecipeKind::Sink {
                item,
                points,
                throughput,
                ..
            } => {
                let mut column = vec![(*item, *throughput)];
                if let Some(score) = self.score_item() {
                    column.push((score, -points * throughput));
                }
                column
            }
        }
    }

    /// Net rate of `item` per unit activity at the recipe's catalog settings.
    ///
    /// Extraction activity is counted in deposits at 100 % clock, so the rate
    /// is the negated base rate.
    pub fn rate(&self, recipe: RecipeId, item: ItemId) -> f64 {
        self.net_rates(recipe)
            .into_iter()
            .find(|(i, _)| *i == item)
            .map(|(_, r)| r)
            .unwrap_or(0.0)
    }

    /// Power draw per unit activity at the recipe's catalog settings
    pub fn power(&self, recipe: RecipeId) -> f64 {
        match &self.recipe(recipe).kind {
            RecipeKind::Standard { building, .. } => standard_power(self.building(*building), 1.0, 0),
            RecipeKind::Overclocked { base, sloops, clock } => match &self.recipe(*base).kind {
                RecipeKind::Standard { building, .. } => {
                    standard_power(self.building(*building), *clock, *sloops)
                }
                _ => 0.0,
            },
            RecipeKind::Extraction(extraction) => extraction.base_power,
            RecipeKind::Milestone { .. } => 0.0,
            RecipeKind::Sink { power, .. } => *power,
        }
    }

    /// Net rate of `item` for one building running at `modifiers`
    pub fn rate_at(&self, recipe: RecipeId, item: ItemId, modifiers: Modifiers) -> Result<f64> {
        let rate = match &self.recipe(recipe).kind {
            RecipeKind::Standard {
                building,
                inputs,
                outputs,
            } => {
                let building = self.building(*building);
                self.check(building, modifiers)?;
                standard_rates(building, inputs, outputs, modifiers.clock, modifiers.sloops)
                    .into_iter()
                    .find(|(i, _)| *i == item)
                    .map_or(0.0, |(_, r)| r)
            }
            RecipeKind::Overclocked { base, .. } => return self.rate_at(*base, item, modifiers),
            RecipeKind::Extraction(extraction) => {
                self.check_extraction(modifiers)?;
                if item == extraction.resource {
                    -extraction_rate(extraction, modifiers.clock)
                } else {
                    0.0
                }
            }
            RecipeKind::Milestone { .. } | RecipeKind::Sink { .. } => {
                check_fixed(&self.recipe(recipe).name, modifiers)?;
                self.rate(recipe, item)
            }
        };
        Ok(rate)
    }

    /// Power of one building running at `modifiers`
    pub fn power_at(&self, recipe: RecipeId, modifiers: Modifiers) -> Result<f64> {
        match &self.recipe(recipe).kind {
            RecipeKind::Standard { building, .. } => {
                let building = self.building(*building);
                self.check(building, modifiers)?;
                Ok(standard_power(building, modifiers.clock, modifiers.sloops))
            }
            RecipeKind::Overclocked { base, .. } => self.power_at(*base, modifiers),
            RecipeKind::Extraction(extraction) => {
                self.check_extraction(modifiers)?;
                Ok(extraction.base_power * modifiers.clock.powf(extraction.exponent))
            }
            RecipeKind::Milestone { .. } | RecipeKind::Sink { .. } => {
                check_fixed(&self.recipe(recipe).name, modifiers)?;
                Ok(self.power(recipe))
            }
        }
    }

    fn check(&self, building: &Building, modifiers: Modifiers) -> Result<()> {
        check_clock(modifiers.clock, self.min_clock(), MAX_CLOCK)?;
        if modifiers.sloops > building.sloop_slots {
            return Err(PlanError::invalid(format!(
                "{} somersloops exceed the {} slots of {}",
                modifiers.sloops, building.sloop_slots, building.name
            )));
        }
        Ok(())
    }

    fn check_extraction(&self, modifiers: Modifiers) -> Result<()> {
        check_clock(modifiers.clock, self.min_clock(), MAX_CLOCK)?;
        if modifiers.sloops > 0 {
            return Err(PlanError::invalid("extractors take no somersloops"));
        }
        Ok(())
    }
}

/// Items/min of one deposit at `clock`, capped by its transport line
pub fn extraction_rate(extraction: &ExtractionRecipe, clock: f64) -> f64 {
    let rate = extraction.base_rate * clock;
    match extraction.transport_cap {
        Some(cap) => rate.min(cap),
        None => rate,
    }
}

fn check_clock(clock: f64, min: f64, max: f64) -> Result<()> {
    if !(clock >= min && clock <= max) {
        return Err(PlanError::invalid(format!("clock {} not in [{}, {}]", clock, min, max)));
    }
    Ok(())
}

// Sinks and milestones have no clock of their own
fn check_fixed(name: &str, modifiers: Modifiers) -> Result<()> {
    if modifiers.clock != 1.0 || modifiers.sloops != 0 {
        return Err(PlanError::invalid(format!("{} only runs at 100 % without somersloops", name)));
    }
    Ok(())
}

fn sloop_factor(building: &Building, sloops: u32) -> f64 {
    if building.sloop_slots == 0 {
        1.0
    } else {
        1.0 + sloops as f64 / building.sloop_slots as f64
    }
}

fn rate_multiplier(building: &Building, clock: f64) -> f64 {
    match building.kind {
        BuildingKind::Processing => clock,
        BuildingKind::Generator => clock.powf(building.exponent),
    }
}

fn standard_rates(
    building: &Building,
    inputs: &[(ItemId, f64)],
    outputs: &[(ItemId, f64)],
    clock: f64,
    sloops: u32,
) -> Vec<(ItemId, f64)> {
    let mult = rate_multiplier(building, clock);
    let amplify = sloop_factor(building, sloops);
    merge(
        inputs
            .iter()
            .map(|&(item, r)| (item, r * mult))
            .chain(outputs.iter().map(|&(item, r)| (item, -r * mult * amplify))),
    )
}

fn standard_power(building: &Building, clock: f64, sloops: u32) -> f64 {
    let amplify = sloop_factor(building, sloops);
    building.base_power * clock.powf(building.exponent) * amplify * amplify
}

/// Sum duplicate items and drop exact zeros, keeping first-seen order
fn merge(rates: impl Iterator<Item = (ItemId, f64)>) -> Vec<(ItemId, f64)> {
    let mut merged: Vec<(ItemId, f64)> = Vec::new();
    for (item, rate) in rates {
        match merged.iter_mut().find(|(i, _)| *i == item) {
            Some(entry) => entry.1 += rate,
            None => merged.push((item, rate)),
        }
    }
    merged.retain(|(_, r)| *r != 0.0);
    merged
}
