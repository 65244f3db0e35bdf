//! Post-hoc flow inspection of a solved plan

use std::fmt;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::{PlanError, Result};
use crate::solver::Plan;

#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    pub item: String,
    /// Items/min produced across all recipes
    pub inflow: f64,
    /// Producing recipes, largest first
    pub sources: Vec<(String, f64)>,
    /// Items/min consumed across all recipes
    pub outflow: f64,
    /// Consuming recipes, largest first
    pub sinks: Vec<(String, f64)>,
}

impl Flow {
    /// Inflow minus outflow; zero for every mass-balanced item
    pub fn net(&self) -> f64 {
        self.inflow - self.outflow
    }
}

/// Where `item` comes from and goes to under `plan`
pub fn flow(catalog: &Catalog, item: &str, plan: &Plan) -> Result<Flow> {
    let item_id = catalog.item(item).ok_or_else(|| PlanError::unknown("item", item))?;

    let mut sources = Vec::new();
    let mut sinks = Vec::new();
    for (name, &activity) in &plan.activities {
        let recipe = catalog
            .recipe_by_name(name)
            .ok_or_else(|| PlanError::unknown("recipe", name.clone()))?;
        let rate = catalog.rate(recipe, item_id);
        if rate < 0.0 {
            sources.push((name.clone(), -rate * activity));
        } else if rate > 0.0 {
            sinks.push((name.clone(), rate * activity));
        }
    }

    let largest_first = |a: &(String, f64), b: &(String, f64)| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0));
    sources.sort_by(largest_first);
    sinks.sort_by(largest_first);

    Ok(Flow {
        item: item.to_string(),
        inflow: sources.iter().map(|(_, v)| v).sum(),
        sources,
        outflow: sinks.iter().map(|(_, v)| v).sum(),
        sinks,
    })
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Flow: {} ===", self.item)?;
        writeln!(f, "In:  {:.3}/min", self.inflow)?;
        for (name, rate) in &self.sources {
            writeln!(f, "  {:>12.3}  {}", rate, name)?;
        }
        writeln!(f, "Out: {:.3}/min", self.outflow)?;
        for (name, rate) in &self.sinks {
            writeln!(f, "  {:>12.3}  {}", rate, name)?;
        }
        Ok(())
    }
}
