//! Grid/reservoir coupling through the simulator.

mod common;

use std::collections::BTreeMap;

use common::{assert_close, config, reservoir_params};
use pcm_algo::{Basin, CouplingMode, NonConvergencePolicy, Reservoir, SimulationConfig, SimulationRecord, Simulator};
use pcm_core::{series, HydroUnit, PcmError, SystemInput};

const DAYS: usize = 2;

/// One node, a free 100 MW hydro unit and 50 MW of flat demand.
fn hydro_system() -> SystemInput {
    let hours = DAYS * 24;
    SystemInput::builder(hours)
        .node("A")
        .hydro(HydroUnit::new("dam", "A", 100.0))
        .demand("A", series::constant(50.0, hours))
        .build()
        .unwrap()
}

fn basin(initial_storage: f64) -> Basin {
    let mut params = reservoir_params("lake", "dam");
    params.initial_storage = Some(initial_storage);
    let reservoir = Reservoir::new(params, vec![5e6; DAYS]).unwrap();
    Basin::new(vec![reservoir], Vec::new()).unwrap()
}

fn hard(max_iterations: usize, policy: NonConvergencePolicy) -> SimulationConfig {
    let mut config = config(24, DAYS);
    config.coupling.mode = CouplingMode::Hard;
    config.coupling.max_iterations = max_iterations;
    config.coupling.on_non_convergence = policy;
    config
}

fn daily_hydro(record: &SimulationRecord) -> BTreeMap<usize, f64> {
    let mut days = BTreeMap::new();
    for row in record.asset_rows("dam") {
        *days.entry(row.hour / 24).or_insert(0.0) += row.dispatch_mw;
    }
    days
}

#[test]
fn flat_target_converges_within_five_iterations() {
    let input = hydro_system();
    let config = hard(5, NonConvergencePolicy::Abort);
    let mut simulator = Simulator::new(&input, &config).with_basin(basin(9.5e8));
    let record = simulator.run().unwrap();

    for window in &record.windows {
        assert_eq!(window.coupling_converged, Some(true));
        let iterations = window.coupling_iterations.unwrap();
        assert!((1..=5).contains(&iterations), "{iterations} iterations");
    }
    for energy in daily_hydro(&record).values() {
        assert_close(*energy, 1200.0, 1e-4);
    }
    assert_close(record.summary().total_shortfall_mwh, 0.0, 1e-5);

    // The committed reservoir operation reproduces the dispatched energy.
    let basin = simulator.basin().unwrap();
    assert_eq!(basin.next_day(), DAYS);
    for day in basin.history() {
        assert!(
            (day.energy_mwh - 1200.0).abs() <= config.coupling.allowed_deviation(1200.0),
            "day {} energy {}",
            day.day,
            day.energy_mwh
        );
    }
}

#[test]
fn dry_start_needs_a_second_iteration() {
    // Far below the rule curve: the rule-curve run releases nothing, so the
    // first grid solve has no hydro budget at all.
    let input = hydro_system();
    let config = hard(5, NonConvergencePolicy::Abort);
    let mut simulator = Simulator::new(&input, &config).with_basin(basin(1e8));
    let record = simulator.run().unwrap();

    assert!(record.windows[0].coupling_iterations.unwrap() >= 2);
    assert!(record.windows.iter().all(|w| w.coupling_converged == Some(true)));
    for energy in daily_hydro(&record).values() {
        assert_close(*energy, 1200.0, 1e-4);
    }
}

#[test]
fn abort_policy_stops_on_non_convergence() {
    let input = hydro_system();
    let config = hard(1, NonConvergencePolicy::Abort);
    let mut simulator = Simulator::new(&input, &config).with_basin(basin(1e8));
    let failure = simulator.run().unwrap_err();

    assert_eq!(failure.window, 0);
    assert!(matches!(
        failure.error,
        PcmError::CouplingNotConverged { window: 0, iterations: 1, .. }
    ));
    assert!(failure.partial.windows.is_empty());

    // The rejected iterate comes back for inspection but is never committed.
    let last = failure.last_iterate.expect("aborted window keeps its last iterate");
    assert!(!last.converged);
    assert_eq!(last.iterations, 1);
    assert_eq!(last.solved.window.index, 0);
    assert!(last.max_deviation > config.coupling.allowed_deviation(0.0));
    let proposal = last.proposal.expect("basin proposal of the last iterate");
    assert!(proposal.energy().contains_key(&("dam".to_string(), 0)));
    assert_eq!(last.solved.extracted.rows.hydro_daily_dispatch().len(), 1);
    assert_eq!(simulator.basin().unwrap().next_day(), 0);
}

#[test]
fn accept_policy_keeps_the_last_iterate() {
    let input = hydro_system();
    let config = hard(1, NonConvergencePolicy::Accept);
    let mut simulator = Simulator::new(&input, &config).with_basin(basin(1e8));
    let record = simulator.run().unwrap();

    assert_eq!(record.windows.len(), DAYS);
    assert_eq!(record.windows[0].coupling_converged, Some(false));
    assert_eq!(simulator.basin().unwrap().next_day(), DAYS);
}

#[test]
fn soft_coupling_budgets_follow_the_rule_curve() {
    let input = hydro_system();
    let mut config = config(24, DAYS);
    config.coupling.mode = CouplingMode::Soft;
    let mut simulator = Simulator::new(&input, &config).with_basin(basin(9.5e8));
    let record = simulator.run().unwrap();

    let rule_curve = simulator.basin().unwrap().simulate_rule_curve(DAYS).unwrap();
    for (day, dispatched) in daily_hydro(&record) {
        let budget = rule_curve.iter().find(|r| r.day == day).unwrap().energy_mwh;
        assert!(dispatched <= budget + 1e-4, "day {day}: {dispatched} > {budget}");
    }
    assert!(record.windows.iter().all(|w| w.coupling_iterations.is_none()));
    // Soft coupling never commits reservoir history.
    assert_eq!(simulator.basin().unwrap().next_day(), 0);
}

#[test]
fn coupling_requires_a_basin_and_whole_days() {
    let input = hydro_system();

    let config = hard(5, NonConvergencePolicy::Accept);
    let failure = Simulator::new(&input, &config).run().unwrap_err();
    assert!(matches!(failure.error, PcmError::Config(_)));

    let mut config = hard(5, NonConvergencePolicy::Accept);
    config.window_hours = 12;
    config.steps = 4;
    let failure = Simulator::new(&input, &config)
        .with_basin(basin(9.5e8))
        .run()
        .unwrap_err();
    assert!(matches!(failure.error, PcmError::Config(_)));
}
