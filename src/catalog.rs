//! Immutable recipe catalog
//!
//! A [`Catalog`] is built once from a [`CatalogDefinition`] and the world
//! [`Settings`], then shared read-only by every solve. Recipes are a closed
//! [`RecipeKind`] sum type; extraction recipes and somersloop variants are
//! materialized by the builder.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::error::{PlanError, Result};
use crate::models::{
    BuildingDef, BuildingKind, CatalogDefinition, ExtractorDef, ExtractorKind, MilestoneDef,
    NodeDef, RecipeDef, SinkDef, WellDef,
};
use crate::nlextract::SupplySource;
use crate::settings::{MAX_CLOCK, SCORE_ITEM, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BuildingId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecipeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub usize);

#[derive(Debug, Clone)]
pub struct Building {
    pub name: String,
    /// Signed MW at 100 % clock; negative for generators
    pub base_power: f64,
    pub exponent: f64,
    pub kind: BuildingKind,
    pub sloop_slots: u32,
}

/// Purity tier of a node, or flow value of a well
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    Impure,
    Normal,
    Pure,
    Well(u32),
}

impl Tier {
    pub fn from_purity_index(i: usize) -> Option<Tier> {
        match i {
            0 => Some(Tier::Impure),
            1 => Some(Tier::Normal),
            2 => Some(Tier::Pure),
            _ => None,
        }
    }

    /// Multiplier on the extractor's base rate
    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Impure => 1.0,
            Tier::Normal => 2.0,
            Tier::Pure => 4.0,
            Tier::Well(value) => *value as f64,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Impure => f.write_str("impure"),
            Tier::Normal => f.write_str("normal"),
            Tier::Pure => f.write_str("pure"),
            Tier::Well(value) => write!(f, "{}", value),
        }
    }
}

/// A set of identical deposits of one resource worked by one extractor type
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub resource: ItemId,
    pub extractor: ExtractorKind,
    pub tier: Tier,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct ExtractionRecipe {
    pub source: SourceId,
    pub resource: ItemId,
    /// Items/min per deposit at 100 % clock
    pub base_rate: f64,
    /// MW per deposit at 100 % clock
    pub base_power: f64,
    pub exponent: f64,
    /// min(2.5, transport cap / base rate)
    pub max_clock: f64,
    pub transport_cap: Option<f64>,
}

impl ExtractionRecipe {
    /// Items/min of one deposit at its clock ceiling
    pub fn max_rate(&self) -> f64 {
        self.base_rate * self.max_clock
    }
}

#[derive(Debug, Clone)]
pub enum RecipeKind {
    Standard {
        building: BuildingId,
        inputs: Vec<(ItemId, f64)>,
        outputs: Vec<(ItemId, f64)>,
    },
    Extraction(ExtractionRecipe),
    /// A standard recipe run overclocked with somersloops slotted
    Overclocked {
        base: RecipeId,
        sloops: u32,
        clock: f64,
    },
    Milestone {
        costs: Vec<(ItemId, f64)>,
    },
    Sink {
        item: ItemId,
        points: f64,
        /// Items/min fed per sink (belt capacity)
        throughput: f64,
        power: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub kind: RecipeKind,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<String>,
    item_index: HashMap<String, ItemId>,
    buildings: Vec<Building>,
    building_index: HashMap<String, BuildingId>,
    recipes: Vec<Recipe>,
    recipe_index: HashMap<String, RecipeId>,
    sources: Vec<Source>,
    min_clock: f64,
}

impl Catalog {
    pub fn builder(settings: &Settings) -> Result<CatalogBuilder<'_>> {
        CatalogBuilder::new(settings)
    }

    pub fn from_definition(definition: &CatalogDefinition, settings: &Settings) -> Result<Catalog> {
        let mut builder = CatalogBuilder::new(settings)?;
        builder.add_definition(definition)?;
        builder.build()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn item(&self, name: &str) -> Option<ItemId> {
        self.item_index.get(name).copied()
    }

    pub fn item_name(&self, id: ItemId) -> &str {
        &self.items[id.0]
    }

    pub fn score_item(&self) -> Option<ItemId> {
        self.item(SCORE_ITEM)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn building(&self, id: BuildingId) -> &Building {
        &self.buildings[id.0]
    }

    pub fn building_by_name(&self, name: &str) -> Option<BuildingId> {
        self.building_index.get(name).copied()
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn recipe(&self, id: RecipeId) -> &Recipe {
        &self.recipes[id.0]
    }

    pub fn recipe_by_name(&self, name: &str) -> Option<RecipeId> {
        self.recipe_index.get(name).copied()
    }

    pub fn recipe_ids(&self) -> impl Iterator<Item = RecipeId> + '_ {
        (0..self.recipes.len()).map(RecipeId)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, id: SourceId) -> &Source {
        &self.sources[id.0]
    }

    pub fn min_clock(&self) -> f64 {
        self.min_clock
    }

    /// Extraction recipes together with their ids, in catalog order
    pub fn extraction_recipes(&self) -> impl Iterator<Item = (RecipeId, &ExtractionRecipe)> + '_ {
        self.recipes.iter().enumerate().filter_map(|(i, r)| match &r.kind {
            RecipeKind::Extraction(extraction) => Some((RecipeId(i), extraction)),
            _ => None,
        })
    }

    /// Items that appear anywhere in the recipe graph, score currency included
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        (0..self.items.len()).map(ItemId)
    }

    /// Resources that have at least one extraction recipe
    pub fn extractable_resources(&self) -> Vec<ItemId> {
        let mut resources: Vec<ItemId> = self.extraction_recipes().map(|(_, e)| e.resource).collect();
        resources.sort();
        resources.dedup();
        resources
    }

    /// Every deposit set of `resource` as allocator input
    pub fn supply(&self, resource: ItemId) -> Vec<SupplySource> {
        self.extraction_recipes()
            .filter(|(_, e)| e.resource == resource)
            .map(|(id, e)| {
                let source = self.source(e.source);
                SupplySource {
                    name: self.recipe(id).name.clone(),
                    count: source.count,
                    base_rate: e.base_rate,
                    base_power: e.base_power,
                    exponent: e.exponent,
                    max_clock: e.max_clock,
                }
            })
            .collect()
    }
}

/// Collects definitions and validates them into a [`Catalog`].
///
/// Buildings must be added before the recipes that reference them, and
/// nodes/wells before `build`. [`CatalogBuilder::add_definition`] does this
/// ordering itself.
pub struct CatalogBuilder<'a> {
    settings: &'a Settings,
    items: Vec<String>,
    item_index: HashMap<String, ItemId>,
    buildings: Vec<Building>,
    building_index: HashMap<String, BuildingId>,
    recipes: Vec<Recipe>,
    recipe_index: HashMap<String, RecipeId>,
    nodes: BTreeMap<String, [u32; 3]>,
    wells: BTreeMap<String, BTreeMap<u32, u32>>,
    extractors: Vec<(String, ExtractorKind)>,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            items: Vec::new(),
            item_index: HashMap::new(),
            buildings: Vec::new(),
            building_index: HashMap::new(),
            recipes: Vec::new(),
            recipe_index: HashMap::new(),
            nodes: BTreeMap::new(),
            wells: BTreeMap::new(),
            extractors: Vec::new(),
        })
    }

    pub fn add_definition(&mut self, definition: &CatalogDefinition) -> Result<&mut Self> {
        for building in &definition.buildings {
            self.add_building(building)?;
        }
        for nodes in &definition.nodes {
            self.add_nodes(nodes)?;
        }
        for well in &definition.wells {
            self.add_well(well)?;
        }
        for recipe in &definition.recipes {
            self.add_recipe(recipe)?;
        }
        for milestone in &definition.milestones {
            self.add_milestone(milestone)?;
        }
        for sink in &definition.sinks {
            self.add_sink(sink)?;
        }
        for extractor in &definition.extractors {
            self.add_extractor(extractor)?;
        }
        Ok(self)
    }

    pub fn add_building(&mut self, def: &BuildingDef) -> Result<&mut Self> {
        if self.building_index.contains_key(&def.name) {
            return Err(PlanError::Duplicate {
                kind: "building",
                name: def.name.clone(),
            });
        }
        if !def.base_power.is_finite() || def.base_power < 0.0 {
            return Err(PlanError::invalid(format!(
                "building {} has invalid base power {}",
                def.name, def.base_power
            )));
        }
        let exponent = match (def.exponent, def.kind) {
            (Some(e), _) => e,
            (None, BuildingKind::Processing) => self.settings.processing_exponent,
            (None, BuildingKind::Generator) => 1.0,
        };
        if !(exponent > 0.0) {
            return Err(PlanError::invalid(format!("building {} has exponent {}", def.name, exponent)));
        }
        if def.kind == BuildingKind::Generator && def.sloop_slots > 0 {
            return Err(PlanError::invalid(format!(
                "generator {} cannot take somersloops",
                def.name
            )));
        }
        let base_power = match def.kind {
            BuildingKind::Processing => def.base_power,
            BuildingKind::Generator => -def.base_power,
        };
        let id = BuildingId(self.buildings.len());
        self.building_index.insert(def.name.clone(), id);
        self.buildings.push(Building {
            name: def.name.clone(),
            base_power,
            exponent,
            kind: def.kind,
            sloop_slots: def.sloop_slots,
        });
        Ok(self)
    }

    pub fn add_recipe(&mut self, def: &RecipeDef) -> Result<&mut Self> {
        let building = self
            .building_index
            .get(&def.building)
            .copied()
            .ok_or_else(|| PlanError::unknown("building", def.building.clone()))?;
        let inputs = self.intern_rates(&def.name, &def.inputs)?;
        let outputs = self.intern_rates(&def.name, &def.outputs)?;
        self.push_recipe(
            def.name.clone(),
            RecipeKind::Standard {
                building,
                inputs,
                outputs,
            },
        )
    }

    pub fn add_milestone(&mut self, def: &MilestoneDef) -> Result<&mut Self> {
        let costs = self.intern_rates(&def.name, &def.costs)?;
        self.push_recipe(def.name.clone(), RecipeKind::Milestone { costs })
    }

    pub fn add_sink(&mut self, def: &SinkDef) -> Result<&mut Self> {
        if !(def.points >= 0.0) {
            return Err(PlanError::invalid(format!("sink points for {} must be non-negative", def.item)));
        }
        let item = self.intern(&def.item);
        self.intern(SCORE_ITEM);
        let name = format!("sink_{}", compact(&def.item));
        self.push_recipe(
            name,
            RecipeKind::Sink {
                item,
                points: def.points,
                throughput: self.settings.belt_capacity(),
                power: self.settings.sink_power,
            },
        )
    }

    pub fn add_nodes(&mut self, def: &NodeDef) -> Result<&mut Self> {
        if def.counts.iter().all(|&n| n == 0) {
            return Ok(self);
        }
        let entry = self.nodes.entry(def.resource.clone()).or_insert([0; 3]);
        for (slot, &n) in entry.iter_mut().zip(def.counts.iter()) {
            *slot += n;
        }
        Ok(self)
    }

    pub fn add_well(&mut self, def: &WellDef) -> Result<&mut Self> {
        let value = def.value();
        if value == 0 {
            return Ok(self);
        }
        *self
            .wells
            .entry(def.resource.clone())
            .or_default()
            .entry(value)
            .or_insert(0) += 1;
        Ok(self)
    }

    pub fn add_extractor(&mut self, def: &ExtractorDef) -> Result<&mut Self> {
        if self
            .extractors
            .iter()
            .any(|(r, k)| r == &def.resource && *k == def.extractor)
        {
            return Err(PlanError::Duplicate {
                kind: "extractor",
                name: format!("{} on {}", def.extractor, def.resource),
            });
        }
        let has_deposits = if def.extractor.uses_wells() {
            self.wells.contains_key(&def.resource)
        } else {
            self.nodes.contains_key(&def.resource)
        };
        if !has_deposits {
            return Err(PlanError::invalid(format!(
                "no deposits registered for {} ({})",
                def.resource, def.extractor
            )));
        }
        self.extractors.push((def.resource.clone(), def.extractor));
        Ok(self)
    }

    pub fn build(mut self) -> Result<Catalog> {
        let mut sources = Vec::new();
        let mut extractors = std::mem::take(&mut self.extractors);
        extractors.sort();

        for (resource, extractor) in &extractors {
            let tiers: Vec<(Tier, u32)> = if extractor.uses_wells() {
                self.wells
                    .get(resource)
                    .map(|w| w.iter().map(|(&value, &count)| (Tier::Well(value), count)).collect())
                    .unwrap_or_default()
            } else {
                self.nodes
                    .get(resource)
                    .map(|counts| {
                        counts
                            .iter()
                            .enumerate()
                            .filter_map(|(i, &n)| Tier::from_purity_index(i).map(|t| (t, n)))
                            .collect()
                    })
                    .unwrap_or_default()
            };

            let resource_id = self.intern(resource);
            for (tier, count) in tiers {
                // Empty tiers are pinned to zero by leaving them out entirely
                if count == 0 {
                    continue;
                }
                let source_id = SourceId(sources.len());
                let deposit = if extractor.uses_wells() { "Well" } else { "Node" };
                sources.push(Source {
                    name: format!("{} {} {}", resource, deposit, tier),
                    resource: resource_id,
                    extractor: *extractor,
                    tier,
                    count,
                });
                let recipe = self.extraction_recipe(source_id, resource_id, *extractor, tier)?;
                let name = match extractor {
                    ExtractorKind::WellPressurizer => format!("extract_Well-{}-{}", compact(resource), tier),
                    _ => format!(
                        "extract_{}-{}-{}",
                        compact(extractor.as_str()),
                        compact(resource),
                        tier
                    ),
                };
                self.push_recipe(name, RecipeKind::Extraction(recipe))?;
            }
        }

        if self.settings.somersloops.is_some() {
            self.add_sloop_variants()?;
        }

        Ok(Catalog {
            items: self.items,
            item_index: self.item_index,
            buildings: self.buildings,
            building_index: self.building_index,
            recipes: self.recipes,
            recipe_index: self.recipe_index,
            sources,
            min_clock: self.settings.min_clock,
        })
    }

    fn extraction_recipe(
        &self,
        source: SourceId,
        resource: ItemId,
        extractor: ExtractorKind,
        tier: Tier,
    ) -> Result<ExtractionRecipe> {
        let s = self.settings;
        let (base_rate, base_power, transport_cap) = match (extractor, tier) {
            (ExtractorKind::Miner, Tier::Well(_)) | (ExtractorKind::OilExtractor, Tier::Well(_)) => {
                return Err(PlanError::invalid(format!("{} cannot work a well", extractor)));
            }
            (ExtractorKind::WellPressurizer, Tier::Well(value)) => (30.0 * value as f64, 150.0, None),
            (ExtractorKind::WellPressurizer, _) => {
                return Err(PlanError::invalid("well pressurizer needs a well tier"));
            }
            (ExtractorKind::Miner, t) => (
                s.miner_base_rate() * t.multiplier(),
                s.miner_base_power(),
                Some(s.belt_capacity()),
            ),
            (ExtractorKind::OilExtractor, t) => (60.0 * t.multiplier(), 40.0, Some(s.pipe_capacity())),
        };
        let max_clock = match transport_cap {
            Some(cap) => MAX_CLOCK.min(cap / base_rate),
            None => MAX_CLOCK,
        };
        Ok(ExtractionRecipe {
            source,
            resource,
            base_rate,
            base_power,
            exponent: s.extraction_exponent,
            max_clock,
            transport_cap,
        })
    }

    fn add_sloop_variants(&mut self) -> Result<()> {
        let steps = self.settings.sloop_clock_steps;
        let clocks: Vec<f64> = if steps == 1 {
            vec![1.0]
        } else {
            (0..steps)
                .map(|k| 1.0 + (MAX_CLOCK - 1.0) * k as f64 / (steps - 1) as f64)
                .collect()
        };

        let bases: Vec<(RecipeId, String, u32)> = self
            .recipes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match &r.kind {
                RecipeKind::Standard { building, .. } => {
                    let slots = self.buildings[building.0].sloop_slots;
                    (slots > 0).then(|| (RecipeId(i), r.name.clone(), slots))
                }
                _ => None,
            })
            .collect();

        for (base, base_name, slots) in bases {
            for sloops in 1..=slots {
                for &clock in &clocks {
                    let name = format!("{}-s={}-@{}%", base_name, sloops, format_percent(clock));
                    self.push_recipe(name, RecipeKind::Overclocked { base, sloops, clock })?;
                }
            }
        }
        Ok(())
    }

    fn push_recipe(&mut self, name: String, kind: RecipeKind) -> Result<&mut Self> {
        if self.recipe_index.contains_key(&name) {
            return Err(PlanError::Duplicate { kind: "recipe", name });
        }
        let id = RecipeId(self.recipes.len());
        self.recipe_index.insert(name.clone(), id);
        self.recipes.push(Recipe { name, kind });
        Ok(self)
    }

    fn intern(&mut self, item: &str) -> ItemId {
        if let Some(&id) = self.item_index.get(item) {
            return id;
        }
        let id = ItemId(self.items.len());
        self.items.push(item.to_string());
        self.item_index.insert(item.to_string(), id);
        id
    }

    fn intern_rates(&mut self, recipe: &str, rates: &[(String, f64)]) -> Result<Vec<(ItemId, f64)>> {
        rates
            .iter()
            .map(|(item, rate)| {
                if !rate.is_finite() || *rate < 0.0 {
                    return Err(PlanError::invalid(format!(
                        "recipe {} has invalid rate {} for {}",
                        recipe, rate, item
                    )));
                }
                Ok((self.intern(item), *rate))
            })
            .collect()
    }
}

/// "Iron Ore" -> "IronOre", used in generated recipe names
fn compact(name: &str) -> String {
    name.split_whitespace().collect()
}

/// Clock as a percentage without trailing zeros, e.g. 1.75 -> "175"
fn format_percent(clock: f64) -> String {
    let s = format!("{:.5}", clock * 100.0);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
