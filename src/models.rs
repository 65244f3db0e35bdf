//! Declarative catalog definitions
//!
//! These are the rows the catalog is assembled from, whether they come out of
//! the SQLite store, a definition file, or the built-in sample.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Consumes power; rate scales linearly with clock
    Processing,
    /// Produces power; rate scales with clock^exponent
    Generator,
}

impl BuildingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingKind::Processing => "processing",
            BuildingKind::Generator => "generator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(BuildingKind::Processing),
            "generator" => Some(BuildingKind::Generator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDef {
    pub name: String,
    /// MW at 100 % clock. For generators this is the amount generated.
    pub base_power: f64,
    /// `None` uses the processing exponent from the settings
    pub exponent: Option<f64>,
    pub kind: BuildingKind,
    pub sloop_slots: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDef {
    pub name: String,
    pub building: String,
    pub inputs: Vec<(String, f64)>,  // (item, per minute at 100 %)
    pub outputs: Vec<(String, f64)>, // (item, per minute at 100 %)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneDef {
    pub name: String,
    pub costs: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkDef {
    pub item: String,
    pub points: f64,
}

/// Resource nodes of one resource by purity (impure, normal, pure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub resource: String,
    pub counts: [u32; 3],
}

/// A resource well; `satellites` are its satellite nodes by purity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellDef {
    pub resource: String,
    pub satellites: [u32; 3],
}

impl WellDef {
    /// Combined flow value of the well, Σ satellites[i]·2^i
    pub fn value(&self) -> u32 {
        self.satellites
            .iter()
            .enumerate()
            .map(|(i, &n)| n << i)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtractorKind {
    Miner,
    OilExtractor,
    WellPressurizer,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Miner => "Miner",
            ExtractorKind::OilExtractor => "Oil Extractor",
            ExtractorKind::WellPressurizer => "Resource Well Pressurizer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Miner" => Some(ExtractorKind::Miner),
            "Oil Extractor" => Some(ExtractorKind::OilExtractor),
            "Resource Well Pressurizer" | "Well" => Some(ExtractorKind::WellPressurizer),
            _ => None,
        }
    }

    /// Draws from wells rather than nodes
    pub fn uses_wells(&self) -> bool {
        matches!(self, ExtractorKind::WellPressurizer)
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorDef {
    pub resource: String,
    pub extractor: ExtractorKind,
}

/// Everything needed to build a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub buildings: Vec<BuildingDef>,
    pub recipes: Vec<RecipeDef>,
    pub milestones: Vec<MilestoneDef>,
    pub sinks: Vec<SinkDef>,
    pub nodes: Vec<NodeDef>,
    pub wells: Vec<WellDef>,
    pub extractors: Vec<ExtractorDef>,
}

impl CatalogDefinition {
    /// Append another definition, e.g. one per imported file
    pub fn merge(&mut self, other: CatalogDefinition) {
        self.buildings.extend(other.buildings);
        self.recipes.extend(other.recipes);
        self.milestones.extend(other.milestones);
        self.sinks.extend(other.sinks);
        self.nodes.extend(other.nodes);
        self.wells.extend(other.wells);
        self.extractors.extend(other.extractors);
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
            && self.recipes.is_empty()
            && self.milestones.is_empty()
            && self.sinks.is_empty()
            && self.nodes.is_empty()
            && self.wells.is_empty()
            && self.extractors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_value_weights_satellites_by_purity() {
        let well = WellDef {
            resource: "Nitrogen Gas".to_string(),
            satellites: [2, 2, 4],
        };
        assert_eq!(well.value(), 2 + 4 + 16);
    }
}
