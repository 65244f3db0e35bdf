//! Factory Production Planner
//!
//! Maximizes the output of a target item, score currency, or milestone in a
//! factory-building game economy under a power budget and finite resource
//! deposits. Extraction power is a convex power law of clock speed; the
//! solver handles it by successive linearization around an LP.

pub mod catalog;
pub mod db;
pub mod error;
pub mod flow;
pub mod import;
pub mod linearize;
pub mod lp;
pub mod models;
pub mod nlextract;
pub mod rates;
pub mod sample;
pub mod settings;
pub mod solver;

pub use catalog::{Catalog, CatalogBuilder, ItemId, RecipeId, RecipeKind, SourceId};
pub use error::{PlanError, Result};
pub use flow::{Flow, flow};
pub use nlextract::{Allocation, Assignment, SupplySource, nlextract};
pub use rates::Modifiers;
pub use settings::Settings;
pub use solver::{Plan, ShadowPrices, SolveOptions, Solver, Target};
