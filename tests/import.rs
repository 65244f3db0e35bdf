//! Definition files through the SQLite store and into a plan

use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use factory_planner::catalog::Catalog;
use factory_planner::db;
use factory_planner::import::import_to_database;
use factory_planner::settings::Settings;
use factory_planner::solver::{SolveOptions, Solver};

const SMELTING: &str = r#"
building "Smelter" power=4 slots=1
recipe "r_IronIngot" @ "Smelter" : "Iron Ore"=30 -> "Iron Ingot"=30
sink "Iron Ingot" points=2
"#;

const DEPOSITS: &str = r#"
nodes "Iron Ore" impure=1 normal=0 pure=0   # one node
extractor "Iron Ore" "Miner"
"#;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("factory-planner-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("nested")).unwrap();
    dir
}

#[test]
fn imported_catalog_solves() {
    let dir = scratch_dir("solves");
    fs::write(dir.join("smelting.catalog"), SMELTING).unwrap();
    fs::write(dir.join("nested").join("deposits.catalog"), DEPOSITS).unwrap();
    fs::write(dir.join("notes.txt"), "building \"Ignored\" power=1").unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let settings = Settings {
        miner_mk: 1,
        ..Default::default()
    };
    let stats = import_to_database(&mut conn, &dir, &settings, false).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.records(), 5);
    assert_eq!(stats.skipped, 0);

    let catalog = Catalog::from_definition(&db::load_definition(&conn).unwrap(), &settings).unwrap();
    assert!(catalog.building_by_name("Ignored").is_none());

    let solver = Solver::new(&catalog, &settings);
    let ingots = solver.solve("Iron Ingot", &SolveOptions::default()).unwrap();
    assert!((ingots.objective - 75.0).abs() < 1e-6);

    // Sinking every ingot scores 2 points each
    let points = solver.solve("AWESOME points", &SolveOptions::default()).unwrap();
    assert!((points.objective - 150.0).abs() < 1e-6);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn duplicate_names_are_rejected_before_writing() {
    let dir = scratch_dir("duplicates");
    fs::write(dir.join("a.catalog"), SMELTING).unwrap();
    fs::write(dir.join("b.catalog"), "building \"Smelter\" power=4\n").unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let err = import_to_database(&mut conn, &dir, &Settings::default(), false).unwrap_err();
    assert!(format!("{:#}", err).contains("Smelter"));
    assert!(db::list_buildings(&conn).unwrap().is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn importing_twice_is_a_duplicate() {
    let dir = scratch_dir("twice");
    fs::write(dir.join("smelting.catalog"), SMELTING).unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    import_to_database(&mut conn, &dir, &Settings::default(), false).unwrap();
    assert!(import_to_database(&mut conn, &dir, &Settings::default(), false).is_err());

    db::clear_catalog(&conn).unwrap();
    import_to_database(&mut conn, &dir, &Settings::default(), false).unwrap();
    assert_eq!(db::list_recipes(&conn).unwrap().len(), 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn rejected_replacement_keeps_the_stored_catalog() {
    let good = scratch_dir("replace-good");
    fs::write(good.join("smelting.catalog"), SMELTING).unwrap();
    let bad = scratch_dir("replace-bad");
    // Recipe in a building nobody defined
    fs::write(
        bad.join("broken.catalog"),
        "recipe \"r_Wire\" @ \"Constructor\" : \"Copper Ingot\"=15 -> \"Wire\"=30\n",
    )
    .unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    import_to_database(&mut conn, &good, &Settings::default(), false).unwrap();

    assert!(import_to_database(&mut conn, &bad, &Settings::default(), true).is_err());
    assert_eq!(db::list_recipes(&conn).unwrap().len(), 1);
    assert_eq!(db::list_buildings(&conn).unwrap().len(), 1);

    // A valid replacement of the same records is not a duplicate
    import_to_database(&mut conn, &good, &Settings::default(), true).unwrap();
    assert_eq!(db::list_recipes(&conn).unwrap().len(), 1);

    fs::remove_dir_all(&good).unwrap();
    fs::remove_dir_all(&bad).unwrap();
}
