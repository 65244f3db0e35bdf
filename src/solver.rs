//! Successive-linearization plan solver
//!
//! Extraction power of each resource is a convex curve of its aggregate
//! quota. The LP carries one power column per resource, bounded below by
//! every tangent collected so far, starting from an even spread over the
//! resource's range. Each iteration solves the LP and adds a
//! tangent at the new quota of every resource whose cut model falls short of
//! the curve, until none does. A second LP then pins the objective and
//! minimizes total activity to pick a canonical plan among ties.
//!
//! With somersloops configured every affordable mix of power augmenters is
//! solved in turn and the best objective wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ItemId, RecipeId, RecipeKind};
use crate::error::{PlanError, Result};
use crate::linearize::{Linearization, PowerCurve, SupplyCurve, linearize};
use crate::lp::{LinearProgram, LpBackend, default_backends, dot, solve_with_fallback};
use crate::models::BuildingKind;
use crate::nlextract::Allocation;
use crate::settings::{AUGMENTER_FUEL, AUGMENTER_FUEL_RATE, PowerAugmenters, Settings};

/// Activities below this are reported as idle
const ACTIVITY_EPS: f64 = 1e-9;

/// Relative slack on the pinned objective of the tie-break pass
const PIN_SLACK: f64 = 1e-10;

/// Tangents spread evenly over a resource's range before the first solve
const SEED_CUTS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Cost added per unit of activity of every recipe
    pub penalty: f64,
    /// Cap on the summed activity of all recipes
    pub build_limit: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Maximize net production of an item (or the score currency)
    Item(ItemId),
    /// Maximize the activity of one recipe
    Recipe(RecipeId),
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceExtraction {
    /// Items/min drawn from all sources of the resource
    pub quota: f64,
    /// MW per additional item/min of the tangent supporting the quota
    pub marginal_power: f64,
    pub allocation: Allocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub target: String,
    /// Recipe name to activity, idle recipes omitted
    pub activities: BTreeMap<String, f64>,
    pub objective: f64,
    /// Net power of the plan with extraction at its optimal clocks
    pub power_used: f64,
    pub power_budget: f64,
    pub augmenters: PowerAugmenters,
    pub iterations: usize,
    pub converged: bool,
    pub extraction: BTreeMap<String, ResourceExtraction>,
}

impl Plan {
    pub fn activity(&self, recipe: &str) -> f64 {
        self.activities.get(recipe).copied().unwrap_or(0.0)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Plan: {} ===", self.target)?;
        writeln!(f, "Objective: {:.6}", self.objective)?;
        writeln!(
            f,
            "Iterations: {} ({})",
            self.iterations,
            if self.converged { "converged" } else { "not converged" }
        )?;
        writeln!(f, "Power: {:.3} of {:.3} MW", self.power_used, self.power_budget)?;
        if self.augmenters.count() > 0 {
            writeln!(
                f,
                "Power augmenters: {} unfueled, {} fueled",
                self.augmenters.unfueled, self.augmenters.fueled
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Recipes:")?;
        for (name, activity) in &self.activities {
            writeln!(f, "  {:.4}x {}", activity, name)?;
        }

        if !self.extraction.is_empty() {
            writeln!(f)?;
            writeln!(f, "Extraction:")?;
            for (resource, e) in &self.extraction {
                writeln!(
                    f,
                    "  {} @ {:.3}/min, {:.3} MW ({:.4} MW per item/min at the margin)",
                    resource, e.quota, e.allocation.total_power, e.marginal_power
                )?;
                for a in &e.allocation.assignments {
                    writeln!(f, "    {}x {} @ {:.2}%", a.count, a.source, a.clock * 100.0)?;
                }
            }
        }
        Ok(())
    }
}

/// Marginal objective value of relaxing each constraint of the converged LP
#[derive(Debug, Clone, Serialize)]
pub struct ShadowPrices {
    pub target: String,
    /// Per MW of free power
    pub power: f64,
    /// Per additional deposit, by source
    pub sources: Vec<(String, f64)>,
    pub build_limit: Option<f64>,
    pub somersloops: Option<f64>,
    /// Per item/min injected into the balance, by item
    pub items: Vec<(String, f64)>,
}

impl fmt::Display for ShadowPrices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Shadow prices: {} ===", self.target)?;
        writeln!(f, "Power: {:.6}", self.power)?;
        if let Some(v) = self.build_limit {
            writeln!(f, "Build limit: {:.6}", v)?;
        }
        if let Some(v) = self.somersloops {
            writeln!(f, "Somersloops: {:.6}", v)?;
        }
        writeln!(f)?;
        writeln!(f, "Sources:")?;
        for (name, value) in &self.sources {
            writeln!(f, "  {:>14.6}  {}", value, name)?;
        }
        writeln!(f)?;
        writeln!(f, "Items:")?;
        for (name, value) in &self.items {
            writeln!(f, "  {:>14.6}  {}", value, name)?;
        }
        Ok(())
    }
}

/// The outer approximation of one resource's extraction power
#[derive(Debug, Clone)]
struct ResourceState {
    item: ItemId,
    curve: SupplyCurve,
    /// (column, items/min per unit activity)
    columns: Vec<(usize, f64)>,
    /// LP column holding the resource's extraction power
    epigraph: usize,
    /// Tangents collected so far, never empty
    cuts: Vec<Linearization>,
}

impl ResourceState {
    fn quota(&self, x: &[f64]) -> f64 {
        self.columns.iter().map(|&(j, rate)| rate * x[j]).sum()
    }

    fn operating_quota(&self, x: &[f64]) -> f64 {
        self.quota(x).clamp(0.0, self.curve.max_quota())
    }

    /// (power, slope) of the tangent supporting the cut model at `quota`
    fn model(&self, quota: f64) -> (f64, f64) {
        self.cuts.iter().fold((f64::NEG_INFINITY, 0.0), |best, cut| {
            let power = cut.estimate(quota);
            if power > best.0 { (power, cut.slope) } else { best }
        })
    }

    /// Whether the cut model is exact enough at `quota`: a tangent already
    /// touches within `tolerance` items/min, or the power it misses is worth
    /// less than `tolerance` items/min at the margin.
    fn settled(&self, quota: f64, tolerance: f64) -> Result<bool> {
        if self.cuts.iter().any(|cut| (cut.quota - quota).abs() <= tolerance) {
            return Ok(true);
        }
        let (model, slope) = self.model(quota);
        Ok(self.curve.power(quota)? - model <= tolerance * slope.abs())
    }
}

/// The parts of the LP that do not depend on the cut models
#[derive(Debug, Clone)]
struct Formulation {
    /// Minimized objective without the penalty
    objective: Vec<f64>,
    penalty: f64,
    /// Power per unit activity, zero on extraction columns
    power: Vec<f64>,
    budget: f64,
    augmenters: PowerAugmenters,
    /// (column, 1 / max clock, deposits)
    sources: Vec<(usize, f64, f64)>,
    build_limit: Option<f64>,
    sloops: Option<(Vec<f64>, f64)>,
    /// (item, net rates, required net consumption)
    balance: Vec<(ItemId, Vec<f64>, f64)>,
}

impl Formulation {
    /// Columns are the recipes followed by one power column per resource.
    /// Rows: power, sources, build limit, somersloops, then the cuts.
    fn program(&self, resources: &[ResourceState]) -> LinearProgram {
        let n = self.objective.len();
        let m = n + resources.len();
        let widen = |row: &[f64]| -> Vec<f64> {
            row.iter().copied().chain(std::iter::repeat_n(0.0, m - n)).collect()
        };

        let c: Vec<f64> = self.objective.iter().map(|v| v + self.penalty).collect();
        let mut lp = LinearProgram::new(widen(c.as_slice()));

        let mut power = widen(self.power.as_slice());
        for r in resources {
            power[r.epigraph] = 1.0;
        }
        lp.add_ub(power, self.budget);

        for &(j, inv_clock, count) in &self.sources {
            let mut row = vec![0.0; m];
            row[j] = inv_clock;
            lp.add_ub(row, count);
        }
        if let Some(limit) = self.build_limit {
            lp.add_ub((0..m).map(|j| if j < n { 1.0 } else { 0.0 }).collect(), limit);
        }
        if let Some((row, total)) = &self.sloops {
            lp.add_ub(widen(row.as_slice()), *total);
        }
        for r in resources {
            for cut in &r.cuts {
                let mut row = vec![0.0; m];
                for &(j, rate) in &r.columns {
                    row[j] = cut.slope * rate;
                }
                row[r.epigraph] = -1.0;
                lp.add_ub(row, -cut.offset);
            }
        }
        for (_, row, rhs) in &self.balance {
            lp.add_eq(widen(row.as_slice()), *rhs);
        }
        lp
    }

    /// Achieved objective in the caller's sense (maximized, no penalty)
    fn value(&self, x: &[f64]) -> f64 {
        -dot(&self.objective, x)
    }
}

/// Outcome of the fixed-point loop
struct Converged {
    formulation: Formulation,
    resources: Vec<ResourceState>,
    lp: LinearProgram,
    x: Vec<f64>,
    iterations: usize,
}

pub struct Solver<'a> {
    catalog: &'a Catalog,
    settings: &'a Settings,
    backends: Vec<Box<dyn LpBackend>>,
}

impl<'a> Solver<'a> {
    pub fn new(catalog: &'a Catalog, settings: &'a Settings) -> Self {
        Self {
            catalog,
            settings,
            backends: default_backends(),
        }
    }

    /// Replace the LP fallback chain
    pub fn with_backends(mut self, backends: Vec<Box<dyn LpBackend>>) -> Self {
        self.backends = backends;
        self
    }

    pub fn target(&self, name: &str) -> Result<Target> {
        if let Some(item) = self.catalog.item(name) {
            return Ok(Target::Item(item));
        }
        if let Some(recipe) = self.catalog.recipe_by_name(name) {
            return Ok(Target::Recipe(recipe));
        }
        Err(PlanError::unknown("target", name))
    }

    /// Maximize `target` under the power budget and deposit limits
    pub fn solve(&self, target: &str, options: &SolveOptions) -> Result<Plan> {
        info!(goal = target, penalty = options.penalty, build_limit = ?options.build_limit, "solving");
        let resolved = self.target(target)?;
        let run = self.best_run(target, resolved, options)?;

        let x = self.tie_break(&run).unwrap_or_else(|| run.x.clone());
        let mut plan = self.plan(target, &run.formulation, &run.resources, &x, run.iterations, true)?;
        // The tie-break only picks among optima; report the first pass
        plan.objective = run.formulation.value(&run.x);
        info!(
            goal = target,
            objective = plan.objective,
            iterations = plan.iterations,
            recipes = plan.activities.len(),
            "solved"
        );
        Ok(plan)
    }

    /// Dual values of the converged LP
    pub fn shadow_prices(&self, target: &str, options: &SolveOptions) -> Result<ShadowPrices> {
        let resolved = self.target(target)?;
        let run = self.best_run(target, resolved, options)?;
        let dual = run.lp.dual();
        let solution = solve_with_fallback(&dual, &self.backends)?;
        let (u, z) = run.lp.split_dual(&solution.x);

        let mut row = 0;
        let power = u[row];
        row += 1;

        let mut sources: Vec<(String, f64)> = run
            .formulation
            .sources
            .iter()
            .zip(&u[row..])
            .map(|(&(j, _, _), &v)| {
                let name = match &self.catalog.recipe(RecipeId(j)).kind {
                    RecipeKind::Extraction(e) => self.catalog.source(e.source).name.clone(),
                    _ => self.catalog.recipe(RecipeId(j)).name.clone(),
                };
                (name, v)
            })
            .collect();
        row += run.formulation.sources.len();

        let build_limit = run.formulation.build_limit.map(|_| {
            row += 1;
            u[row - 1]
        });
        let somersloops = run.formulation.sloops.as_ref().map(|_| {
            row += 1;
            u[row - 1]
        });

        let mut items: Vec<(String, f64)> = run
            .formulation
            .balance
            .iter()
            .zip(&z)
            .map(|((item, _, _), &v)| (self.catalog.item_name(*item).to_string(), -v))
            .collect();

        let by_value = |a: &(String, f64), b: &(String, f64)| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0));
        sources.sort_by(by_value);
        items.sort_by(by_value);

        Ok(ShadowPrices {
            target: target.to_string(),
            power,
            sources,
            build_limit,
            somersloops,
            items,
        })
    }

    fn validate(&self, options: &SolveOptions) -> Result<()> {
        if !options.penalty.is_finite() || options.penalty < 0.0 {
            return Err(PlanError::invalid(format!("penalty {} must be non-negative", options.penalty)));
        }
        if let Some(limit) = options.build_limit {
            if !limit.is_finite() || limit < 0.0 {
                return Err(PlanError::invalid(format!("build limit {} must be non-negative", limit)));
            }
        }
        Ok(())
    }

    /// Augmenter mixes worth solving. Fueled ones need their fuel in the
    /// catalog and are pointless when the fuel itself is the target.
    fn augmenter_splits(&self, target: Target) -> Vec<PowerAugmenters> {
        let Some(total) = self.settings.somersloops else {
            return vec![PowerAugmenters::default()];
        };
        let fuel = self.catalog.item(AUGMENTER_FUEL);
        PowerAugmenters::splits(total)
            .into_iter()
            .filter(|a| a.fueled == 0 || fuel.is_some_and(|item| Target::Item(item) != target))
            .collect()
    }

    /// Converge every augmenter mix and keep the best objective. A mix that
    /// is infeasible or does not converge is skipped; if every mix fails the
    /// first failure is returned.
    fn best_run(&self, name: &str, target: Target, options: &SolveOptions) -> Result<Converged> {
        self.validate(options)?;
        let mut best: Option<(f64, Converged)> = None;
        let mut failure = None;

        for augmenters in self.augmenter_splits(target) {
            match self.converge(name, target, options, augmenters) {
                Ok(run) => {
                    let value = run.formulation.value(&run.x);
                    if best.as_ref().is_none_or(|(v, _)| value > *v) {
                        best = Some((value, run));
                    }
                }
                Err(e @ (PlanError::Infeasible(_) | PlanError::Convergence { .. })) => {
                    debug!(
                        goal = name,
                        unfueled = augmenters.unfueled,
                        fueled = augmenters.fueled,
                        error = %e,
                        "augmenter mix rejected"
                    );
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        match (best, failure) {
            (Some((_, run)), _) => Ok(run),
            (None, Some(e)) => Err(e),
            (None, None) => Err(PlanError::NumericalFailure("no augmenter mix to solve".to_string())),
        }
    }

    fn formulate(&self, target: Target, options: &SolveOptions, augmenters: PowerAugmenters) -> Formulation {
        let catalog = self.catalog;
        let n = catalog.recipes().len();
        let columns: Vec<Vec<(ItemId, f64)>> = catalog.recipe_ids().map(|id| catalog.net_rates(id)).collect();

        let mut objective = vec![0.0; n];
        match target {
            Target::Item(item) => {
                for (j, column) in columns.iter().enumerate() {
                    objective[j] = column.iter().filter(|(i, _)| *i == item).map(|(_, r)| r).sum();
                }
            }
            Target::Recipe(recipe) => objective[recipe.0] = -1.0,
        }

        let mut power = vec![0.0; n];
        let mut sources = Vec::new();
        for id in catalog.recipe_ids() {
            match &catalog.recipe(id).kind {
                RecipeKind::Extraction(e) => {
                    let count = catalog.source(e.source).count as f64;
                    sources.push((id.0, 1.0 / e.max_clock, count));
                }
                RecipeKind::Standard { building, .. }
                    if catalog.building(*building).kind == BuildingKind::Generator =>
                {
                    power[id.0] = catalog.power(id) * augmenters.boost();
                }
                _ => power[id.0] = catalog.power(id),
            }
        }

        let sloops = self.settings.somersloops.map(|total| {
            let row = catalog
                .recipe_ids()
                .map(|id| match &catalog.recipe(id).kind {
                    RecipeKind::Overclocked { sloops, .. } => *sloops as f64,
                    _ => 0.0,
                })
                .collect();
            (row, total.saturating_sub(augmenters.sloops()) as f64)
        });

        let score = catalog.score_item();
        let fuel = catalog.item(AUGMENTER_FUEL);
        let mut balance = Vec::new();
        for item in catalog.item_ids() {
            if Target::Item(item) == target || Some(item) == score {
                continue;
            }
            let mut row = vec![0.0; n];
            let mut used = false;
            for (j, column) in columns.iter().enumerate() {
                for &(i, rate) in column {
                    if i == item {
                        row[j] += rate;
                        used = true;
                    }
                }
            }
            // Net production covers the augmenters' fuel
            let rhs = if Some(item) == fuel {
                -AUGMENTER_FUEL_RATE * augmenters.fueled as f64
            } else {
                0.0
            };
            if (used && row.iter().any(|v| *v != 0.0)) || rhs != 0.0 {
                balance.push((item, row, rhs));
            }
        }

        Formulation {
            objective,
            penalty: options.penalty,
            power,
            budget: self.settings.free_power_with(augmenters),
            augmenters,
            sources,
            build_limit: options.build_limit,
            sloops,
            balance,
        }
    }

    fn resources(&self) -> Result<Vec<ResourceState>> {
        let catalog = self.catalog;
        let n = catalog.recipes().len();
        catalog
            .extractable_resources()
            .into_iter()
            .enumerate()
            .map(|(k, item)| {
                let columns = catalog
                    .extraction_recipes()
                    .filter(|(_, e)| e.resource == item)
                    .map(|(id, e)| (id.0, e.base_rate))
                    .collect();
                let curve = SupplyCurve::new(catalog.item_name(item), catalog.supply(item), 0.0);
                let max = curve.max_quota();
                let mut cuts = vec![linearize(&curve, 0.0)?];
                if max > 0.0 {
                    for step in 1..=SEED_CUTS {
                        cuts.push(linearize(&curve, max * step as f64 / SEED_CUTS as f64)?);
                    }
                }
                Ok(ResourceState {
                    item,
                    curve,
                    columns,
                    epigraph: n + k,
                    cuts,
                })
            })
            .collect()
    }

    fn converge(
        &self,
        name: &str,
        target: Target,
        options: &SolveOptions,
        augmenters: PowerAugmenters,
    ) -> Result<Converged> {
        let formulation = self.formulate(target, options, augmenters);
        let mut resources = self.resources()?;
        let tolerance = self.settings.tolerance;
        let mut last_x = Vec::new();

        for iteration in 1..=self.settings.max_iterations {
            let lp = formulation.program(&resources);
            let solution = solve_with_fallback(&lp, &self.backends)?;
            let x: Vec<f64> = solution.x.iter().map(|v| v.max(0.0)).collect();

            let mut added = 0usize;
            for r in &mut resources {
                let quota = r.operating_quota(&x);
                if !r.settled(quota, tolerance)? {
                    r.cuts.push(linearize(&r.curve, quota)?);
                    added += 1;
                }
            }
            debug!(
                goal = name,
                iteration,
                objective = formulation.value(&x),
                added,
                "linearized lp solved"
            );

            if added == 0 {
                return Ok(Converged {
                    formulation,
                    resources,
                    lp,
                    x,
                    iterations: iteration,
                });
            }
            last_x = x;
        }

        let iterations = self.settings.max_iterations;
        warn!(goal = name, iterations, "linearization did not converge");
        let best_effort = self.plan(name, &formulation, &resources, &last_x, iterations, false)?;
        Err(PlanError::Convergence {
            iterations,
            best_effort: Box::new(best_effort),
        })
    }

    /// Minimum-total-activity plan among the optima of the converged LP.
    ///
    /// Returns `None` if the second LP fails or moves any resource to a quota
    /// its cut model does not cover; the first-pass plan stands in that case.
    fn tie_break(&self, run: &Converged) -> Option<Vec<f64>> {
        let optimum = run.lp.objective(&run.x);
        let mut lp = run.lp.clone();
        let pin = lp.c.clone();
        lp.add_ub(pin, optimum + PIN_SLACK * optimum.abs().max(1.0));
        let n = run.formulation.objective.len();
        lp.c = (0..lp.num_vars()).map(|j| if j < n { 1.0 } else { 0.0 }).collect();

        let solution = match solve_with_fallback(&lp, &self.backends) {
            Ok(solution) => solution,
            Err(e) => {
                warn!(error = %e, "tie-break pass failed, keeping first-pass plan");
                return None;
            }
        };
        let x: Vec<f64> = solution.x.iter().map(|v| v.max(0.0)).collect();
        for r in &run.resources {
            match r.settled(r.operating_quota(&x), self.settings.tolerance) {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    debug!("tie-break left the cut model of a resource, keeping first-pass plan");
                    return None;
                }
            }
        }
        Some(x)
    }

    fn plan(
        &self,
        name: &str,
        formulation: &Formulation,
        resources: &[ResourceState],
        x: &[f64],
        iterations: usize,
        converged: bool,
    ) -> Result<Plan> {
        let catalog = self.catalog;
        let activities: BTreeMap<String, f64> = x
            .iter()
            .take(catalog.recipes().len())
            .enumerate()
            .filter(|&(_, &v)| v > ACTIVITY_EPS)
            .map(|(j, &v)| (catalog.recipe(RecipeId(j)).name.clone(), v))
            .collect();

        let mut power_used = dot(&formulation.power, x);
        let mut extraction = BTreeMap::new();
        for r in resources {
            if x.is_empty() {
                break;
            }
            let quota = r.operating_quota(x);
            if quota <= ACTIVITY_EPS {
                continue;
            }
            let allocation = r.curve.allocate(quota)?;
            power_used += allocation.total_power;
            extraction.insert(
                catalog.item_name(r.item).to_string(),
                ResourceExtraction {
                    quota,
                    marginal_power: r.model(quota).1,
                    allocation,
                },
            );
        }

        Ok(Plan {
            target: name.to_string(),
            activities,
            objective: if x.is_empty() { 0.0 } else { formulation.value(x) },
            power_used,
            power_budget: formulation.budget,
            augmenters: formulation.augmenters,
            iterations,
            converged,
            extraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BuildingDef, BuildingKind, CatalogDefinition, ExtractorDef, ExtractorKind, MilestoneDef, NodeDef,
        RecipeDef,
    };
    use crate::lp::{LpSolution, PivotRule, Simplex, SolveStatus};

    struct Broken;

    impl LpBackend for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn solve(&self, _lp: &LinearProgram) -> LpSolution {
            LpSolution::failed(SolveStatus::NumericalError, 0)
        }
    }

    fn building(name: &str, power: f64) -> BuildingDef {
        BuildingDef {
            name: name.to_string(),
            base_power: power,
            exponent: None,
            kind: BuildingKind::Processing,
            sloop_slots: 0,
        }
    }

    fn recipe(name: &str, building: &str, inputs: &[(&str, f64)], outputs: &[(&str, f64)]) -> RecipeDef {
        RecipeDef {
            name: name.to_string(),
            building: building.to_string(),
            inputs: inputs.iter().map(|(i, r)| (i.to_string(), *r)).collect(),
            outputs: outputs.iter().map(|(i, r)| (i.to_string(), *r)).collect(),
        }
    }

    fn iron() -> CatalogDefinition {
        CatalogDefinition {
            buildings: vec![building("Smelter", 4.0), building("Constructor", 4.0)],
            recipes: vec![
                recipe("r_IronIngot", "Smelter", &[("Iron Ore", 30.0)], &[("Iron Ingot", 30.0)]),
                // Same output, worse ratio
                recipe("r_IronIngot_Slow", "Smelter", &[("Iron Ore", 60.0)], &[("Iron Ingot", 30.0)]),
            ],
            nodes: vec![NodeDef {
                resource: "Iron Ore".to_string(),
                counts: [0, 0, 1],
            }],
            extractors: vec![ExtractorDef {
                resource: "Iron Ore".to_string(),
                extractor: ExtractorKind::Miner,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn unknown_target_is_rejected() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let solver = Solver::new(&catalog, &settings);
        let err = solver.solve("Copper Ingot", &SolveOptions::default()).unwrap_err();
        assert!(matches!(err, PlanError::UnknownName { kind: "target", .. }));
    }

    #[test]
    fn dominated_alternate_stays_idle() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let plan = Solver::new(&catalog, &settings)
            .solve("Iron Ingot", &SolveOptions::default())
            .unwrap();
        assert!(plan.converged);
        assert_eq!(plan.activity("r_IronIngot_Slow"), 0.0);
        // Mk3 miner on a pure node is belt-capped at 780/min
        assert!((plan.objective - 780.0).abs() < 1e-6);
        assert!((plan.activity("r_IronIngot") - 26.0).abs() < 1e-6);
    }

    #[test]
    fn build_limit_caps_total_activity() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let options = SolveOptions {
            build_limit: Some(10.0),
            ..Default::default()
        };
        let plan = Solver::new(&catalog, &settings).solve("Iron Ingot", &options).unwrap();
        let total: f64 = plan.activities.values().sum();
        assert!(total <= 10.0 + 1e-6);
        assert!(plan.objective > 0.0);
    }

    #[test]
    fn recipe_target_maximizes_its_activity() {
        let mut definition = iron();
        definition.milestones.push(MilestoneDef {
            name: "Ingot Milestone".to_string(),
            costs: vec![("Iron Ingot".to_string(), 10.0)],
        });
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&definition, &settings).unwrap();
        let plan = Solver::new(&catalog, &settings)
            .solve("Ingot Milestone", &SolveOptions::default())
            .unwrap();
        assert!((plan.objective - 78.0).abs() < 1e-6);
        assert!((plan.activity("Ingot Milestone") - 78.0).abs() < 1e-6);
    }

    #[test]
    fn negative_penalty_is_invalid() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let options = SolveOptions {
            penalty: -1.0,
            ..Default::default()
        };
        let err = Solver::new(&catalog, &settings).solve("Iron Ingot", &options).unwrap_err();
        assert!(matches!(err, PlanError::InvalidParameter(_)));
    }

    #[test]
    fn power_shadow_price_is_zero_when_slack() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let prices = Solver::new(&catalog, &settings)
            .shadow_prices("Iron Ingot", &SolveOptions::default())
            .unwrap();
        assert!(prices.power.abs() < 1e-9);
        // The single pure node is the binding constraint
        assert_eq!(prices.sources.len(), 1);
        assert!(prices.sources[0].1 > 0.0);
    }

    #[test]
    fn failing_backend_falls_through_to_the_next() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let backends: Vec<Box<dyn LpBackend>> = vec![Box::new(Broken), Box::new(Simplex::new(PivotRule::Bland))];
        let plan = Solver::new(&catalog, &settings)
            .with_backends(backends)
            .solve("Iron Ingot", &SolveOptions::default())
            .unwrap();
        assert!(plan.converged);
        assert!((plan.objective - 780.0).abs() < 1e-6);
    }

    #[test]
    fn no_working_backend_is_a_numerical_failure() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let backends: Vec<Box<dyn LpBackend>> = vec![Box::new(Broken)];
        let err = Solver::new(&catalog, &settings)
            .with_backends(backends)
            .solve("Iron Ingot", &SolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, PlanError::NumericalFailure(_)));
    }

    #[test]
    fn cuts_accumulate_until_the_model_is_tight() {
        // 10 pure nodes at 300 MW: power binds below the belt cap
        let mut definition = iron();
        definition.buildings[0].base_power = 0.0;
        definition.nodes[0].counts = [0, 0, 10];
        let settings = Settings {
            geysers: [0, 0, 0],
            extra_power: 300.0,
            ..Default::default()
        };
        let catalog = Catalog::from_definition(&definition, &settings).unwrap();
        let solver = Solver::new(&catalog, &settings);
        let target = solver.target("Iron Ingot").unwrap();
        let run = solver
            .best_run("Iron Ingot", target, &SolveOptions::default())
            .unwrap();

        let ore = &run.resources[0];
        assert!(ore.cuts.len() > SEED_CUTS + 1);
        let quota = ore.operating_quota(&run.x);
        assert!(ore.settled(quota, settings.tolerance).unwrap());
        // Every cut stays below the true curve
        for cut in &ore.cuts {
            for q in [0.0, 1000.0, quota, 7800.0] {
                assert!(cut.estimate(q) <= ore.curve.power(q).unwrap() + 1e-6);
            }
        }
    }

    #[test]
    fn reported_objective_is_the_first_pass_optimum() {
        let settings = Settings::default();
        let catalog = Catalog::from_definition(&iron(), &settings).unwrap();
        let solver = Solver::new(&catalog, &settings);
        let options = SolveOptions {
            penalty: 0.5,
            ..Default::default()
        };
        let target = solver.target("Iron Ingot").unwrap();
        let run = solver.best_run("Iron Ingot", target, &options).unwrap();
        let plan = solver.solve("Iron Ingot", &options).unwrap();
        assert_eq!(plan.objective, run.formulation.value(&run.x));
        assert!((plan.objective - 780.0).abs() < 1e-6);
    }
}
