//! Built-in sample catalog
//!
//! A representative slice of the game economy (ores through Heavy Modular
//! Frames, oil refining, coal and fuel power) for trying the planner without
//! writing definition files.

use anyhow::{Result, ensure};
use rusqlite::Connection;

use crate::db;
use crate::import::parse_definition;
use crate::models::CatalogDefinition;

pub const SAMPLE_CATALOG: &str = include_str!("../data/sample.catalog");

pub fn sample_definition() -> Result<CatalogDefinition> {
    let (definition, stats) = parse_definition(SAMPLE_CATALOG, "sample.catalog")?;
    ensure!(stats.skipped == 0, "sample catalog has {} unparseable lines", stats.skipped);
    Ok(definition)
}

/// Replace the stored catalog with the sample
pub fn load_sample_data(conn: &mut Connection) -> Result<()> {
    db::replace_definition(conn, &sample_definition()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::settings::Settings;

    #[test]
    fn sample_builds_a_catalog() {
        let definition = sample_definition().unwrap();
        let catalog = Catalog::from_definition(&definition, &Settings::default()).unwrap();
        assert!(catalog.recipe_by_name("r_SmartPlating").is_some());
        assert!(catalog.recipe_by_name("extract_Miner-IronOre-pure").is_some());
        assert!(catalog.recipe_by_name("extract_Well-CrudeOil-10").is_some());
        assert!(catalog.recipe_by_name("extract_Well-CrudeOil-5").is_some());
        assert!(catalog.recipe_by_name("sink_SmartPlating").is_some());
    }

    #[test]
    fn sample_loads_into_the_store() {
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        load_sample_data(&mut conn).unwrap();
        let loaded = db::load_definition(&conn).unwrap();
        assert_eq!(loaded.recipes.len(), sample_definition().unwrap().recipes.len());
        assert!(db::list_items(&conn).unwrap().contains(&"Smart Plating".to_string()));
    }
}
