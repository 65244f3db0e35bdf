//! Factory Production Planner
//!
//! Power-constrained production planning for factory-building game economies.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use factory_planner::catalog::Catalog;
use factory_planner::error::PlanError;
use factory_planner::settings::Settings;
use factory_planner::solver::{SolveOptions, Solver};
use factory_planner::{db, flow, import, nlextract, sample};

#[derive(Parser)]
#[command(name = "factory-planner")]
#[command(about = "Maximize factory output under a power budget and finite resource deposits")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "factory.db")]
    database: PathBuf,

    #[command(flatten)]
    world: WorldArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Save-game configuration shared by every command
#[derive(Args)]
struct WorldArgs {
    /// Miner mark (1-3)
    #[arg(long, default_value_t = 3, global = true)]
    miner_mk: u8,

    /// Conveyor belt mark (1-6)
    #[arg(long, default_value_t = 5, global = true)]
    belt_mk: u8,

    /// Pipeline mark (1-2)
    #[arg(long, default_value_t = 2, global = true)]
    pipe_mk: u8,

    /// Occupied geysers as impure,normal,pure
    #[arg(long, value_delimiter = ',', default_values_t = vec![3, 9, 6], global = true)]
    geysers: Vec<u32>,

    /// MW per impure geyser; doubles per purity tier
    #[arg(long, default_value_t = 100.0, global = true)]
    geothermal_base_power: f64,

    /// Additional free power in MW (negative to reserve power)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true, global = true)]
    extra_power: f64,

    /// Somersloops available; enables somersloop recipe variants
    #[arg(long, global = true)]
    somersloops: Option<u32>,

    /// Clock samples from 100 % to 250 % for somersloop variants
    #[arg(long, default_value_t = 2, global = true)]
    sloop_clock_steps: usize,

    /// Lowest clock a building may run at
    #[arg(long, default_value_t = 0.01, global = true)]
    min_clock: f64,

    /// MW drawn by one AWESOME sink
    #[arg(long, default_value_t = 30.0, global = true)]
    sink_power: f64,

    /// Quota change in items/min that triggers re-linearization
    #[arg(long, default_value_t = 1e-3, global = true)]
    tolerance: f64,

    /// Re-linearization iteration cap
    #[arg(long, default_value_t = 50, global = true)]
    max_iterations: usize,
}

impl WorldArgs {
    fn settings(&self) -> Result<Settings> {
        let [impure, normal, pure] = self.geysers[..] else {
            bail!("--geysers takes exactly three counts (impure,normal,pure)");
        };
        let settings = Settings {
            miner_mk: self.miner_mk,
            belt_mk: self.belt_mk,
            pipe_mk: self.pipe_mk,
            geysers: [impure, normal, pure],
            geothermal_base_power: self.geothermal_base_power,
            extra_power: self.extra_power,
            min_clock: self.min_clock,
            sink_power: self.sink_power,
            somersloops: self.somersloops,
            sloop_clock_steps: self.sloop_clock_steps,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            ..Default::default()
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import *.catalog definition files from a directory
    Import {
        /// Directory searched recursively for *.catalog files
        source_dir: PathBuf,

        /// Replace the stored catalog instead of adding to it
        #[arg(long)]
        clear: bool,
    },

    /// Maximize production of an item, the sink score, or a milestone
    Solve {
        /// Item or recipe name (e.g. "Smart Plating", "AWESOME points")
        target: String,

        /// Cost per unit of recipe activity, discourages sprawling plans
        #[arg(long, default_value_t = 0.0)]
        penalty: f64,

        /// Cap on total building count
        #[arg(long)]
        build_limit: Option<f64>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show where an item comes from and goes to in the optimal plan
    Flow {
        /// Target the plan is solved for
        target: String,

        /// Item to inspect
        item: String,

        #[arg(long)]
        json: bool,
    },

    /// Minimum-power clocks for extracting a quota of one resource
    Nlextract {
        /// Resource (e.g. "Iron Ore")
        resource: String,

        /// Items/min to extract
        quota: f64,

        /// Lowest clock any working deposit may run at
        #[arg(long, default_value_t = 0.0)]
        floor: f64,

        #[arg(long)]
        json: bool,
    },

    /// Marginal value of power, deposits, and items in the optimal plan
    ShadowPrices {
        target: String,

        #[arg(long, default_value_t = 0.0)]
        penalty: f64,

        #[arg(long)]
        build_limit: Option<f64>,
    },

    /// List all buildings in the database
    ListBuildings,

    /// List all recipes in the database
    ListRecipes,

    /// List all producible items
    ListItems,

    /// Initialize empty database with schema
    Init,

    /// Load the built-in sample catalog
    LoadSample,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { source_dir, clear } => {
            let settings = cli.world.settings()?;
            let stats = import::import_to_database(&mut conn, &source_dir, &settings, clear)?;
            if clear {
                println!("Replaced the stored catalog");
            }
            println!("\n{}", stats);
        }

        Commands::Solve {
            target,
            penalty,
            build_limit,
            json,
        } => {
            let settings = cli.world.settings()?;
            let catalog = load_catalog(&conn, &settings)?;
            let options = SolveOptions { penalty, build_limit };

            match Solver::new(&catalog, &settings).solve(&target, &options) {
                Ok(plan) if json => println!("{}", serde_json::to_string_pretty(&plan)?),
                Ok(plan) => println!("{}", plan),
                Err(PlanError::Convergence { iterations, best_effort }) => {
                    println!("{}", best_effort);
                    bail!("no fixed point after {} iterations; best effort shown", iterations);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Flow { target, item, json } => {
            let settings = cli.world.settings()?;
            let catalog = load_catalog(&conn, &settings)?;
            let plan = Solver::new(&catalog, &settings).solve(&target, &SolveOptions::default())?;
            let report = flow::flow(&catalog, &item, &plan)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }

        Commands::Nlextract {
            resource,
            quota,
            floor,
            json,
        } => {
            let settings = cli.world.settings()?;
            let catalog = load_catalog(&conn, &settings)?;
            let Some(item) = catalog.item(&resource) else {
                bail!("Unknown resource '{}'", resource);
            };
            let sources = catalog.supply(item);
            if sources.is_empty() {
                bail!("No extractable deposits of '{}' in the catalog", resource);
            }
            let allocation = nlextract::nlextract(&resource, &sources, quota, floor)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&allocation)?);
            } else {
                println!("{}", allocation);
            }
        }

        Commands::ShadowPrices {
            target,
            penalty,
            build_limit,
        } => {
            let settings = cli.world.settings()?;
            let catalog = load_catalog(&conn, &settings)?;
            let options = SolveOptions { penalty, build_limit };
            let prices = Solver::new(&catalog, &settings).shadow_prices(&target, &options)?;
            println!("{}", prices);
        }

        Commands::ListBuildings => {
            let buildings = db::list_buildings(&conn)?;
            if buildings.is_empty() {
                println!("No buildings in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:>10} {:>10} {:>6}", "Building", "Kind", "Power (MW)", "Slots");
                println!("{}", "-".repeat(59));
                for b in buildings {
                    println!(
                        "{:<30} {:>10} {:>10.1} {:>6}",
                        b.name,
                        b.kind.as_str(),
                        b.base_power,
                        b.sloop_slots
                    );
                }
            }
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<36} {}", "Recipe", "Building");
                println!("{}", "-".repeat(56));
                for (name, building) in recipes {
                    println!("{:<36} {}", name, building);
                }
            }
        }

        Commands::ListItems => {
            let items = db::list_items(&conn)?;
            if items.is_empty() {
                println!("No items in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("Producible items:");
                for item in items {
                    println!("  {}", item);
                }
            }
        }

        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            sample::load_sample_data(&mut conn)?;
            println!("Sample catalog loaded successfully!");
        }
    }

    Ok(())
}

fn load_catalog(conn: &Connection, settings: &Settings) -> Result<Catalog> {
    let definition = db::load_definition(conn)?;
    if definition.is_empty() {
        bail!("No catalog in database. Run 'import' or 'load-sample' first.");
    }
    Ok(Catalog::from_definition(&definition, settings)?)
}
