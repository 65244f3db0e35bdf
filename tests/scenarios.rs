//! End-to-end planning scenarios

use factory_planner::catalog::Catalog;
use factory_planner::error::PlanError;
use factory_planner::flow::flow;
use factory_planner::models::{
    BuildingDef, BuildingKind, CatalogDefinition, ExtractorDef, ExtractorKind, NodeDef, RecipeDef,
};
use factory_planner::nlextract::nlextract;
use factory_planner::sample::sample_definition;
use factory_planner::settings::{PowerAugmenters, SCORE_ITEM, Settings};
use factory_planner::solver::{Plan, SolveOptions, Solver};

fn smelting(smelter_power: f64, nodes: [u32; 3]) -> CatalogDefinition {
    CatalogDefinition {
        buildings: vec![BuildingDef {
            name: "Smelter".to_string(),
            base_power: smelter_power,
            exponent: None,
            kind: BuildingKind::Processing,
            sloop_slots: 0,
        }],
        recipes: vec![RecipeDef {
            name: "r_IronIngot".to_string(),
            building: "Smelter".to_string(),
            inputs: vec![("Iron Ore".to_string(), 30.0)],
            outputs: vec![("Iron Ingot".to_string(), 30.0)],
        }],
        nodes: vec![NodeDef {
            resource: "Iron Ore".to_string(),
            counts: nodes,
        }],
        extractors: vec![ExtractorDef {
            resource: "Iron Ore".to_string(),
            extractor: ExtractorKind::Miner,
        }],
        ..Default::default()
    }
}

fn no_free_power() -> Settings {
    Settings {
        geysers: [0, 0, 0],
        extra_power: 0.0,
        ..Default::default()
    }
}

fn converged(result: Result<Plan, PlanError>) -> Plan {
    let plan = result.unwrap_or_else(|e| panic!("solve failed: {}", e));
    assert!(plan.converged);
    plan
}

/// Every cut-model shortfall is worth at most the tolerance at the margin
fn within_budget(plan: &Plan) -> bool {
    plan.power_used <= plan.power_budget + 1e-2
}

#[test]
fn single_source_is_saturated() {
    // Mk1 miner on one impure node: 30/min at 100 %, 75/min at 250 %
    let settings = Settings {
        miner_mk: 1,
        ..Default::default()
    };
    let catalog = Catalog::from_definition(&smelting(4.0, [1, 0, 0]), &settings).unwrap();
    let plan = Solver::new(&catalog, &settings)
        .solve("Iron Ingot", &SolveOptions::default())
        .unwrap();

    assert!(plan.converged);
    assert!((plan.objective - 75.0).abs() < 1e-6);
    assert!((plan.activity("r_IronIngot") - 2.5).abs() < 1e-6);
    assert!((plan.activity("extract_Miner-IronOre-impure") - 2.5).abs() < 1e-6);

    let ore = &plan.extraction["Iron Ore"];
    assert!((ore.quota - 75.0).abs() < 1e-6);
    assert!((ore.allocation.assignments[0].clock - 2.5).abs() < 1e-6);
    assert!(plan.power_used <= plan.power_budget);
}

#[test]
fn zero_budget_yields_idle_plan() {
    let settings = no_free_power();
    let catalog = Catalog::from_definition(&smelting(4.0, [0, 1, 0]), &settings).unwrap();
    let plan = converged(Solver::new(&catalog, &settings).solve("Iron Ingot", &SolveOptions::default()));
    assert!(plan.activities.is_empty(), "{:?}", plan.activities);
    assert!(plan.objective.abs() < 1e-9);
}

#[test]
fn power_deficit_is_infeasible() {
    let settings = Settings {
        extra_power: -100.0,
        ..no_free_power()
    };
    let catalog = Catalog::from_definition(&smelting(4.0, [0, 1, 0]), &settings).unwrap();
    let err = Solver::new(&catalog, &settings)
        .solve("Iron Ingot", &SolveOptions::default())
        .unwrap_err();
    assert!(matches!(err, PlanError::Infeasible(_)), "{}", err);
}

#[test]
fn iteration_cap_returns_the_last_plan() {
    // Power binds, so one LP cannot settle the extraction curve
    let settings = Settings {
        extra_power: 300.0,
        max_iterations: 1,
        ..no_free_power()
    };
    let catalog = Catalog::from_definition(&smelting(0.0, [0, 0, 10]), &settings).unwrap();
    match Solver::new(&catalog, &settings).solve("Iron Ingot", &SolveOptions::default()) {
        Err(PlanError::Convergence { iterations, best_effort }) => {
            assert_eq!(iterations, 1);
            assert!(!best_effort.converged);
            assert_eq!(best_effort.iterations, 1);
            assert!(best_effort.objective > 0.0);
        }
        other => panic!("expected a convergence failure, got {:?}", other.map(|p| p.objective)),
    }
}

#[test]
fn binding_power_converges_to_the_true_optimum() {
    // Only extraction draws power: 10 pure nodes, Mk3 miners, 300 MW
    let settings = Settings {
        extra_power: 300.0,
        ..no_free_power()
    };
    let catalog = Catalog::from_definition(&smelting(0.0, [0, 0, 10]), &settings).unwrap();
    let plan = Solver::new(&catalog, &settings)
        .solve("Iron Ingot", &SolveOptions::default())
        .unwrap();
    assert!(plan.converged);
    assert!(plan.iterations >= 2);

    // Largest quota whose optimal extraction power fits the budget
    let item = catalog.item("Iron Ore").unwrap();
    let sources = catalog.supply(item);
    let (mut lo, mut hi) = (0.0f64, 7800.0f64);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        let power = nlextract("Iron Ore", &sources, mid, 0.0).unwrap().total_power;
        if power <= 300.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    // 10 nodes at exactly 100 % draw 10 * 30 MW
    assert!((lo - 4800.0).abs() < 1e-3);
    assert!((plan.objective - lo).abs() < 1e-2, "{} vs {}", plan.objective, lo);
    assert!((plan.power_used - 300.0).abs() < 1e-2);
}

#[test]
fn solving_twice_gives_the_same_objective() {
    let settings = Settings::default();
    let catalog = Catalog::from_definition(&sample_definition().unwrap(), &settings).unwrap();
    let solver = Solver::new(&catalog, &settings);
    let first = converged(solver.solve("Smart Plating", &SolveOptions::default()));
    let second = converged(solver.solve("Smart Plating", &SolveOptions::default()));
    assert!(first.objective > 0.0);
    assert!((first.objective - second.objective).abs() < 1e-6);
    assert_eq!(first.activities.len(), second.activities.len());
}

#[test]
fn sample_plan_balances_intermediate_items() {
    let settings = Settings::default();
    let catalog = Catalog::from_definition(&sample_definition().unwrap(), &settings).unwrap();
    let plan = converged(Solver::new(&catalog, &settings).solve("Modular Frame", &SolveOptions::default()));
    assert!(within_budget(&plan));

    for item in catalog.items() {
        if item == "Modular Frame" || item == SCORE_ITEM {
            continue;
        }
        let f = flow(&catalog, item, &plan).unwrap();
        let scale = f.inflow.max(f.outflow).max(1.0);
        assert!(f.net().abs() <= 1e-6 * scale, "{} is off balance by {}", item, f.net());
    }
    let frames = flow(&catalog, "Modular Frame", &plan).unwrap();
    assert!((frames.net() - plan.objective).abs() <= 1e-6 * plan.objective.max(1.0));
}

#[test]
fn penalty_never_raises_the_objective() {
    let settings = Settings::default();
    let catalog = Catalog::from_definition(&smelting(4.0, [2, 1, 0]), &settings).unwrap();
    let solver = Solver::new(&catalog, &settings);
    let plain = solver.solve("Iron Ingot", &SolveOptions::default()).unwrap();
    let penalized = solver
        .solve(
            "Iron Ingot",
            &SolveOptions {
                penalty: 0.01,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(penalized.objective <= plain.objective + 1e-6);
}

#[test]
fn sample_targets_converge_within_budget() {
    let definition = sample_definition().unwrap();
    let worlds = [
        Settings::default(),
        Settings {
            pipe_mk: 1,
            belt_mk: 2,
            ..Default::default()
        },
        Settings {
            extra_power: -4000.0,
            ..Default::default()
        },
    ];
    for settings in &worlds {
        let catalog = Catalog::from_definition(&definition, settings).unwrap();
        let solver = Solver::new(&catalog, settings);
        for target in [SCORE_ITEM, "Concrete", "Copper Sheet", "Limestone", "Heavy Modular Frame"] {
            let plan = converged(solver.solve(target, &SolveOptions::default()));
            assert!(
                within_budget(&plan),
                "{}: {} of {} MW",
                target,
                plan.power_used,
                plan.power_budget
            );
            assert!(plan.iterations <= settings.max_iterations);
        }
    }
}

#[test]
fn sample_shadow_prices_converge() {
    let settings = Settings::default();
    let catalog = Catalog::from_definition(&sample_definition().unwrap(), &settings).unwrap();
    let prices = Solver::new(&catalog, &settings)
        .shadow_prices(SCORE_ITEM, &SolveOptions::default())
        .unwrap();
    // Sinking more needs more power
    assert!(prices.power > -1e-9);
}

#[test]
fn somersloops_can_become_power_augmenters() {
    // No building takes somersloops, so the only use of ten is one augmenter
    let settings = Settings {
        extra_power: 300.0,
        somersloops: Some(10),
        ..no_free_power()
    };
    let catalog = Catalog::from_definition(&smelting(0.0, [0, 0, 10]), &settings).unwrap();
    let plan = converged(Solver::new(&catalog, &settings).solve("Iron Ingot", &SolveOptions::default()));

    // No fuel item in the catalog, so the augmenter runs unfueled
    assert_eq!(plan.augmenters, PowerAugmenters { unfueled: 1, fueled: 0 });
    assert!((plan.power_budget - 800.0 * 1.1).abs() < 1e-9);
    // 880 MW lifts extraction to the belt cap of 10 x 780/min
    assert!((plan.objective - 7800.0).abs() < 1e-6);
    assert!(within_budget(&plan));
}
