//! Catalog definition file import
//!
//! Walks a directory for `*.catalog` files and parses their line-oriented
//! records into a [`CatalogDefinition`]:
//!
//! ```text
//! building "Smelter" power=4 slots=1
//! generator "Coal Generator" power=75 exponent=1
//! recipe "r_IronIngot" @ "Smelter" : "Iron Ore"=30 -> "Iron Ingot"=30
//! milestone "ProjectAssembly1" : "Smart Plating"=1
//! sink "Iron Ore" points=1
//! nodes "Iron Ore" impure=33 normal=41 pure=46
//! well "Nitrogen Gas" impure=0 normal=2 pure=5
//! extractor "Iron Ore" "Miner"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::db;
use crate::models::{
    BuildingDef, BuildingKind, CatalogDefinition, ExtractorDef, ExtractorKind, MilestoneDef,
    NodeDef, RecipeDef, SinkDef, WellDef,
};
use crate::settings::Settings;

/// Find all *.catalog files below `dir`
pub fn find_catalog_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "catalog") {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

struct Patterns {
    building: Regex,
    recipe: Regex,
    milestone: Regex,
    sink: Regex,
    deposits: Regex,
    extractor: Regex,
    key_value: Regex,
    item_rate: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            building: Regex::new(r#"^(building|generator)\s+"([^"]+)"(.*)$"#)?,
            recipe: Regex::new(r#"^recipe\s+"([^"]+)"\s*@\s*"([^"]+)"\s*:(.*?)->(.*)$"#)?,
            milestone: Regex::new(r#"^milestone\s+"([^"]+)"\s*:(.*)$"#)?,
            sink: Regex::new(r#"^sink\s+"([^"]+)"(.*)$"#)?,
            deposits: Regex::new(r#"^(nodes|well)\s+"([^"]+)"(.*)$"#)?,
            extractor: Regex::new(r#"^extractor\s+"([^"]+)"\s+"([^"]+)"\s*$"#)?,
            key_value: Regex::new(r"(\w+)\s*=\s*(\S+)")?,
            item_rate: Regex::new(r#""([^"]+)"\s*=\s*(\S+)"#)?,
        })
    }

    fn keys(&self, text: &str) -> Option<HashMap<String, f64>> {
        let mut keys = HashMap::new();
        for cap in self.key_value.captures_iter(text) {
            keys.insert(cap[1].to_string(), cap[2].parse::<f64>().ok()?);
        }
        Some(keys)
    }

    fn item_rates(&self, text: &str) -> Option<Vec<(String, f64)>> {
        let mut rates = Vec::new();
        for cap in self.item_rate.captures_iter(text) {
            rates.push((cap[1].to_string(), cap[2].parse::<f64>().ok()?));
        }
        Some(rates)
    }

    fn counts(&self, text: &str) -> Option<[u32; 3]> {
        let keys = self.keys(text)?;
        let mut counts = [0; 3];
        for (slot, purity) in counts.iter_mut().zip(["impure", "normal", "pure"]) {
            let n = keys.get(purity).copied().unwrap_or(0.0);
            if n < 0.0 || n.fract() != 0.0 {
                return None;
            }
            *slot = n as u32;
        }
        Some(counts)
    }
}

/// Remove a trailing `#` comment that is not inside quotes
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

/// One parsed line. `None` from [`parse_line`] means the line was not understood.
enum Record {
    Building(BuildingDef),
    Recipe(RecipeDef),
    Milestone(MilestoneDef),
    Sink(SinkDef),
    Nodes(NodeDef),
    Well(WellDef),
    Extractor(ExtractorDef),
}

fn parse_line(patterns: &Patterns, line: &str) -> Option<Record> {
    if let Some(cap) = patterns.building.captures(line) {
        let keys = patterns.keys(&cap[3])?;
        let kind = if &cap[1] == "generator" {
            BuildingKind::Generator
        } else {
            BuildingKind::Processing
        };
        let slots = keys.get("slots").copied().unwrap_or(0.0);
        if slots < 0.0 || slots.fract() != 0.0 {
            return None;
        }
        return Some(Record::Building(BuildingDef {
            name: cap[2].to_string(),
            base_power: *keys.get("power")?,
            exponent: keys.get("exponent").copied(),
            kind,
            sloop_slots: slots as u32,
        }));
    }

    if let Some(cap) = patterns.recipe.captures(line) {
        return Some(Record::Recipe(RecipeDef {
            name: cap[1].to_string(),
            building: cap[2].to_string(),
            inputs: patterns.item_rates(&cap[3])?,
            outputs: patterns.item_rates(&cap[4])?,
        }));
    }

    if let Some(cap) = patterns.milestone.captures(line) {
        let costs = patterns.item_rates(&cap[2])?;
        if costs.is_empty() {
            return None;
        }
        return Some(Record::Milestone(MilestoneDef {
            name: cap[1].to_string(),
            costs,
        }));
    }

    if let Some(cap) = patterns.sink.captures(line) {
        let keys = patterns.keys(&cap[2])?;
        return Some(Record::Sink(SinkDef {
            item: cap[1].to_string(),
            points: *keys.get("points")?,
        }));
    }

    if let Some(cap) = patterns.deposits.captures(line) {
        let resource = cap[2].to_string();
        let counts = patterns.counts(&cap[3])?;
        return Some(if &cap[1] == "nodes" {
            Record::Nodes(NodeDef { resource, counts })
        } else {
            Record::Well(WellDef {
                resource,
                satellites: counts,
            })
        });
    }

    if let Some(cap) = patterns.extractor.captures(line) {
        return Some(Record::Extractor(ExtractorDef {
            resource: cap[1].to_string(),
            extractor: ExtractorKind::parse(&cap[2])?,
        }));
    }

    None
}

/// Parse the contents of one definition file. `origin` only labels log lines.
pub fn parse_definition(content: &str, origin: &str) -> Result<(CatalogDefinition, ImportStats)> {
    let patterns = Patterns::new()?;
    let mut definition = CatalogDefinition::default();
    let mut stats = ImportStats::default();

    for (number, raw) in content.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(&patterns, line) {
            Some(record) => {
                stats.record(&record);
                match record {
                    Record::Building(b) => definition.buildings.push(b),
                    Record::Recipe(r) => definition.recipes.push(r),
                    Record::Milestone(m) => definition.milestones.push(m),
                    Record::Sink(s) => definition.sinks.push(s),
                    Record::Nodes(n) => definition.nodes.push(n),
                    Record::Well(w) => definition.wells.push(w),
                    Record::Extractor(e) => definition.extractors.push(e),
                }
            }
            None => {
                warn!(file = origin, line = number + 1, text = line, "unparseable catalog line");
                stats.skipped += 1;
            }
        }
    }

    Ok((definition, stats))
}

/// Parse every definition file below `dir`
pub fn import_dir(dir: &Path) -> Result<(CatalogDefinition, ImportStats)> {
    let mut definition = CatalogDefinition::default();
    let mut stats = ImportStats::default();

    for filepath in find_catalog_files(dir)? {
        let content = fs::read_to_string(&filepath)
            .with_context(|| format!("Failed to read {}", filepath.display()))?;
        let (parsed, file_stats) = parse_definition(&content, &filepath.display().to_string())?;
        debug!(file = %filepath.display(), records = file_stats.records(), "parsed catalog file");
        definition.merge(parsed);
        stats.add(&file_stats);
        stats.files += 1;
    }

    Ok((definition, stats))
}

/// Import `dir` into the store, on top of the stored catalog or in place of
/// it when `replace` is set.
///
/// The resulting catalog must build, so duplicate names and dangling building
/// references are rejected before anything is written.
pub fn import_to_database(
    conn: &mut Connection,
    dir: &Path,
    settings: &Settings,
    replace: bool,
) -> Result<ImportStats> {
    let (definition, stats) = import_dir(dir)?;

    let mut combined = if replace {
        CatalogDefinition::default()
    } else {
        db::load_definition(conn)?
    };
    combined.merge(definition.clone());
    Catalog::from_definition(&combined, settings)
        .with_context(|| format!("Catalog in {} does not build", dir.display()))?;

    if replace {
        db::replace_definition(conn, &definition)?;
    } else {
        db::save_definition(conn, &definition)?;
    }
    Ok(stats)
}

#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    pub files: usize,
    pub buildings: usize,
    pub recipes: usize,
    pub milestones: usize,
    pub sinks: usize,
    pub deposits: usize,
    pub extractors: usize,
    pub skipped: usize,
}

impl ImportStats {
    fn record(&mut self, record: &Record) {
        match record {
            Record::Building(_) => self.buildings += 1,
            Record::Recipe(_) => self.recipes += 1,
            Record::Milestone(_) => self.milestones += 1,
            Record::Sink(_) => self.sinks += 1,
            Record::Nodes(_) | Record::Well(_) => self.deposits += 1,
            Record::Extractor(_) => self.extractors += 1,
        }
    }

    fn add(&mut self, other: &ImportStats) {
        self.files += other.files;
        self.buildings += other.buildings;
        self.recipes += other.recipes;
        self.milestones += other.milestones;
        self.sinks += other.sinks;
        self.deposits += other.deposits;
        self.extractors += other.extractors;
        self.skipped += other.skipped;
    }

    pub fn records(&self) -> usize {
        self.buildings + self.recipes + self.milestones + self.sinks + self.deposits + self.extractors
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} files: {} buildings, {} recipes, {} milestones, {} sinks, {} deposit lines, {} extractors. Skipped: {}",
            self.files,
            self.buildings,
            self.recipes,
            self.milestones,
            self.sinks,
            self.deposits,
            self.extractors,
            self.skipped
        )
    }
}
