//! Database schema and operations

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use crate::models::{
    BuildingDef, BuildingKind, CatalogDefinition, ExtractorDef, ExtractorKind, MilestoneDef,
    NodeDef, RecipeDef, SinkDef, WellDef,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Buildings; generators store the power they produce
        CREATE TABLE IF NOT EXISTS buildings (
            name TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            base_power REAL NOT NULL,
            exponent REAL,
            sloop_slots INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            building TEXT NOT NULL
        );

        -- Per-minute rates at 100 % clock; position keeps file order
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe TEXT,
            position INTEGER,
            item TEXT NOT NULL,
            rate REAL NOT NULL,
            PRIMARY KEY (recipe, position)
        );

        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe TEXT,
            position INTEGER,
            item TEXT NOT NULL,
            rate REAL NOT NULL,
            PRIMARY KEY (recipe, position)
        );

        CREATE TABLE IF NOT EXISTS milestones (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS milestone_costs (
            milestone TEXT,
            position INTEGER,
            item TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (milestone, position)
        );

        CREATE TABLE IF NOT EXISTS sinks (
            item TEXT PRIMARY KEY,
            points REAL NOT NULL
        );

        -- Nodes and wells accumulate, so every row counts
        CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource TEXT NOT NULL,
            impure INTEGER NOT NULL,
            normal INTEGER NOT NULL,
            pure INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wells (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource TEXT NOT NULL,
            impure INTEGER NOT NULL,
            normal INTEGER NOT NULL,
            pure INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS extractors (
            resource TEXT,
            extractor TEXT,
            PRIMARY KEY (resource, extractor)
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_item ON recipe_outputs(item);
        CREATE INDEX IF NOT EXISTS idx_recipe_inputs_item ON recipe_inputs(item);
        "#,
    )?;
    Ok(())
}

/// Clear the whole catalog (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM extractors;
        DELETE FROM wells;
        DELETE FROM nodes;
        DELETE FROM sinks;
        DELETE FROM milestone_costs;
        DELETE FROM milestones;
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        DELETE FROM buildings;
        "#,
    )?;
    Ok(())
}

/// Insert or replace a building
pub fn upsert_building(conn: &Connection, building: &BuildingDef) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO buildings (name, kind, base_power, exponent, sloop_slots)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &building.name,
            building.kind.as_str(),
            building.base_power,
            building.exponent,
            building.sloop_slots,
        ),
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its inputs and outputs
pub fn upsert_recipe(conn: &Connection, recipe: &RecipeDef) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO recipes (name, building) VALUES (?1, ?2)",
        (&recipe.name, &recipe.building),
    )?;
    conn.execute("DELETE FROM recipe_inputs WHERE recipe = ?1", [&recipe.name])?;
    conn.execute("DELETE FROM recipe_outputs WHERE recipe = ?1", [&recipe.name])?;
    for (position, (item, rate)) in recipe.inputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_inputs (recipe, position, item, rate) VALUES (?1, ?2, ?3, ?4)",
            (&recipe.name, position as i64, item, rate),
        )?;
    }
    for (position, (item, rate)) in recipe.outputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_outputs (recipe, position, item, rate) VALUES (?1, ?2, ?3, ?4)",
            (&recipe.name, position as i64, item, rate),
        )?;
    }
    Ok(())
}

pub fn upsert_milestone(conn: &Connection, milestone: &MilestoneDef) -> Result<()> {
    conn.execute("INSERT OR REPLACE INTO milestones (name) VALUES (?1)", [&milestone.name])?;
    conn.execute("DELETE FROM milestone_costs WHERE milestone = ?1", [&milestone.name])?;
    for (position, (item, amount)) in milestone.costs.iter().enumerate() {
        conn.execute(
            "INSERT INTO milestone_costs (milestone, position, item, amount) VALUES (?1, ?2, ?3, ?4)",
            (&milestone.name, position as i64, item, amount),
        )?;
    }
    Ok(())
}

pub fn upsert_sink(conn: &Connection, sink: &SinkDef) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sinks (item, points) VALUES (?1, ?2)",
        (&sink.item, sink.points),
    )?;
    Ok(())
}

pub fn insert_nodes(conn: &Connection, nodes: &NodeDef) -> Result<()> {
    let [impure, normal, pure] = nodes.counts;
    conn.execute(
        "INSERT INTO nodes (resource, impure, normal, pure) VALUES (?1, ?2, ?3, ?4)",
        (&nodes.resource, impure, normal, pure),
    )?;
    Ok(())
}

pub fn insert_well(conn: &Connection, well: &WellDef) -> Result<()> {
    let [impure, normal, pure] = well.satellites;
    conn.execute(
        "INSERT INTO wells (resource, impure, normal, pure) VALUES (?1, ?2, ?3, ?4)",
        (&well.resource, impure, normal, pure),
    )?;
    Ok(())
}

pub fn upsert_extractor(conn: &Connection, extractor: &ExtractorDef) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO extractors (resource, extractor) VALUES (?1, ?2)",
        (&extractor.resource, extractor.extractor.as_str()),
    )?;
    Ok(())
}

/// Store a whole definition in one transaction
pub fn save_definition(conn: &mut Connection, definition: &CatalogDefinition) -> Result<()> {
    let tx = conn.transaction()?;
    write_definition(&tx, definition)?;
    tx.commit()?;
    Ok(())
}

/// Swap the stored catalog for `definition` in one transaction
pub fn replace_definition(conn: &mut Connection, definition: &CatalogDefinition) -> Result<()> {
    let tx = conn.transaction()?;
    clear_catalog(&tx)?;
    write_definition(&tx, definition)?;
    tx.commit()?;
    Ok(())
}

fn write_definition(tx: &Connection, definition: &CatalogDefinition) -> Result<()> {
    for building in &definition.buildings {
        upsert_building(tx, building)?;
    }
    for recipe in &definition.recipes {
        upsert_recipe(tx, recipe)?;
    }
    for milestone in &definition.milestones {
        upsert_milestone(tx, milestone)?;
    }
    for sink in &definition.sinks {
        upsert_sink(tx, sink)?;
    }
    for nodes in &definition.nodes {
        insert_nodes(tx, nodes)?;
    }
    for well in &definition.wells {
        insert_well(tx, well)?;
    }
    for extractor in &definition.extractors {
        upsert_extractor(tx, extractor)?;
    }
    Ok(())
}

/// Read the stored catalog back into a definition
pub fn load_definition(conn: &Connection) -> Result<CatalogDefinition> {
    let mut definition = CatalogDefinition {
        buildings: list_buildings(conn)?,
        ..Default::default()
    };

    for (name, building) in list_recipes(conn)? {
        definition.recipes.push(RecipeDef {
            inputs: item_rates(conn, "recipe_inputs", "recipe", "rate", &name)?,
            outputs: item_rates(conn, "recipe_outputs", "recipe", "rate", &name)?,
            name,
            building,
        });
    }

    let mut stmt = conn.prepare("SELECT name FROM milestones ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for name in names {
        let name = name?;
        definition.milestones.push(MilestoneDef {
            costs: item_rates(conn, "milestone_costs", "milestone", "amount", &name)?,
            name,
        });
    }

    let mut stmt = conn.prepare("SELECT item, points FROM sinks ORDER BY item")?;
    let rows = stmt.query_map([], |row| {
        Ok(SinkDef {
            item: row.get(0)?,
            points: row.get(1)?,
        })
    })?;
    for row in rows {
        definition.sinks.push(row?);
    }

    let mut stmt = conn.prepare("SELECT resource, impure, normal, pure FROM nodes ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(NodeDef {
            resource: row.get(0)?,
            counts: [row.get(1)?, row.get(2)?, row.get(3)?],
        })
    })?;
    for row in rows {
        definition.nodes.push(row?);
    }

    let mut stmt = conn.prepare("SELECT resource, impure, normal, pure FROM wells ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(WellDef {
            resource: row.get(0)?,
            satellites: [row.get(1)?, row.get(2)?, row.get(3)?],
        })
    })?;
    for row in rows {
        definition.wells.push(row?);
    }

    let mut stmt = conn.prepare("SELECT resource, extractor FROM extractors ORDER BY resource, extractor")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (resource, extractor) = row?;
        let Some(kind) = ExtractorKind::parse(&extractor) else {
            bail!("unknown extractor '{}' stored for {}", extractor, resource);
        };
        definition.extractors.push(ExtractorDef {
            resource,
            extractor: kind,
        });
    }

    Ok(definition)
}

fn item_rates(conn: &Connection, table: &str, key: &str, value: &str, name: &str) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT item, {value} FROM {table} WHERE {key} = ?1 ORDER BY position"
    ))?;
    let rows = stmt.query_map([name], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all buildings
pub fn list_buildings(conn: &Connection) -> Result<Vec<BuildingDef>> {
    let mut stmt =
        conn.prepare("SELECT name, kind, base_power, exponent, sloop_slots FROM buildings ORDER BY name")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, u32>(4)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (name, kind, base_power, exponent, sloop_slots) = row?;
        let kind = BuildingKind::parse(&kind)
            .with_context(|| format!("building '{}' has unknown kind '{}'", name, kind))?;
        results.push(BuildingDef {
            name,
            base_power,
            exponent,
            kind,
            sloop_slots,
        });
    }
    Ok(results)
}

/// List all recipes as (name, building)
pub fn list_recipes(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, building FROM recipes ORDER BY name")?;

    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all items that some recipe produces
pub fn list_items(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT item FROM recipe_outputs ORDER BY item")?;

    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
