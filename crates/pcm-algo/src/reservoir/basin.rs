//! Cascade of reservoirs connected by flow paths.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use pcm_core::{HydroSchedule, PcmError, PcmResult, HOURS_PER_DAY};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::functions::{release_bounds, Hydraulics, ReleaseImpact};
use super::release::{release_for_energy, rule_curve_release, DayConditions};
use super::{Reservoir, ReservoirState};

/// Share of a reservoir's release plus spill routed to a downstream reservoir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPath {
    pub source: String,
    pub sink: String,
    pub fraction: f64,
}

/// Simulated values of one reservoir on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirDay {
    pub reservoir: String,
    pub unit: String,
    pub day: usize,
    pub inflow: f64,
    pub upstream_flow: f64,
    pub release: f64,
    pub spill: f64,
    pub evaporation: f64,
    pub storage: f64,
    pub level: f64,
    pub energy_mwh: f64,
}

/// Grid-side view of one hydro unit on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchTarget {
    /// Energy the grid model dispatched (MWh)
    pub dispatched_mwh: f64,
    /// Energy the grid model was allowed to dispatch (MWh)
    pub budget_mwh: f64,
}

/// Tentative dispatch-driven operation over a range of days.
///
/// Evaluated from the committed basin state; nothing changes until
/// [`Basin::commit`] accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct BasinProposal {
    days: Range<usize>,
    records: Vec<ReservoirDay>,
    end_state: Vec<ReservoirState>,
}

impl BasinProposal {
    pub fn records(&self) -> &[ReservoirDay] {
        &self.records
    }

    /// Proposed energy per (unit, day).
    pub fn energy(&self) -> BTreeMap<(String, usize), f64> {
        self.records
            .iter()
            .map(|r| ((r.unit.clone(), r.day), r.energy_mwh))
            .collect()
    }

    /// Write the proposed energy into a schedule.
    pub fn apply(&self, schedule: &mut HydroSchedule) {
        apply_energy(&self.records, schedule);
    }
}

/// Overwrite the daily budgets of every (unit, day) in `records`.
pub fn apply_energy(records: &[ReservoirDay], schedule: &mut HydroSchedule) {
    for record in records {
        schedule.set(&record.unit, record.day, record.energy_mwh);
    }
}

#[derive(Debug, Clone)]
pub struct Basin {
    reservoirs: Vec<Reservoir>,
    /// `downstream[i]` lists `(sink, fraction)` pairs
    downstream: Vec<Vec<(usize, f64)>>,
    /// Upstream-to-downstream processing order
    order: Vec<usize>,
    state: Vec<ReservoirState>,
    next_day: usize,
    history: Vec<ReservoirDay>,
}

impl Basin {
    pub fn new(reservoirs: Vec<Reservoir>, paths: Vec<FlowPath>) -> PcmResult<Self> {
        let mut index = HashMap::new();
        let mut units = HashMap::new();
        for (i, reservoir) in reservoirs.iter().enumerate() {
            if index.insert(reservoir.name().to_string(), i).is_some() {
                return Err(PcmError::inconsistent(reservoir.name(), "duplicate reservoir name"));
            }
            if let Some(other) = units.insert(reservoir.unit().to_string(), reservoir.name()) {
                return Err(PcmError::inconsistent(
                    reservoir.name(),
                    format!("feeds unit '{}' which is already fed by '{}'", reservoir.unit(), other),
                ));
            }
        }

        let mut graph = DiGraph::<usize, f64>::new();
        let nodes: Vec<_> = (0..reservoirs.len()).map(|i| graph.add_node(i)).collect();
        let mut downstream = vec![Vec::new(); reservoirs.len()];
        let mut routed = vec![0.0; reservoirs.len()];
        for path in &paths {
            let lookup = |name: &str| {
                index.get(name).copied().ok_or_else(|| {
                    PcmError::inconsistent(
                        format!("{}->{}", path.source, path.sink),
                        format!("flow path references unknown reservoir '{name}'"),
                    )
                })
            };
            let (source, sink) = (lookup(&path.source)?, lookup(&path.sink)?);
            if source == sink {
                return Err(PcmError::inconsistent(&path.source, "flow path loops onto itself"));
            }
            if !(path.fraction > 0.0 && path.fraction <= 1.0) {
                return Err(PcmError::inconsistent(
                    &path.source,
                    format!("flow fraction to '{}' must lie in (0, 1]", path.sink),
                ));
            }
            routed[source] += path.fraction;
            downstream[source].push((sink, path.fraction));
            graph.add_edge(nodes[source], nodes[sink], path.fraction);
        }
        if let Some(i) = routed.iter().position(|f| *f > 1.0 + 1e-4) {
            return Err(PcmError::inconsistent(
                reservoirs[i].name(),
                format!("downstream flow fractions sum to {:.4}", routed[i]),
            ));
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| {
                PcmError::Reservoir(format!(
                    "flow paths form a cycle through '{}'",
                    reservoirs[graph[cycle.node_id()]].name()
                ))
            })?
            .into_iter()
            .map(|n| graph[n])
            .collect();

        let state = reservoirs
            .iter()
            .map(|r| ReservoirState {
                storage: r.initial_storage(),
                last_release: None,
            })
            .collect();

        Ok(Self {
            reservoirs,
            downstream,
            order,
            state,
            next_day: 0,
            history: Vec::new(),
        })
    }

    pub fn reservoirs(&self) -> &[Reservoir] {
        &self.reservoirs
    }

    /// Reservoir names in processing order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|i| self.reservoirs[*i].name())
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.reservoirs.iter().map(|r| r.unit())
    }

    /// Committed state of a reservoir.
    pub fn state(&self, name: &str) -> Option<ReservoirState> {
        self.reservoirs
            .iter()
            .position(|r| r.name() == name)
            .map(|i| self.state[i])
    }

    /// First day not yet committed.
    pub fn next_day(&self) -> usize {
        self.next_day
    }

    /// Committed daily records.
    pub fn history(&self) -> &[ReservoirDay] {
        &self.history
    }

    /// Open-loop rule-curve operation for `days` days after the committed state.
    pub fn simulate_rule_curve(&self, days: usize) -> PcmResult<Vec<ReservoirDay>> {
        let mut state = self.state.clone();
        let mut records = Vec::with_capacity(days * self.reservoirs.len());
        for day in self.next_day..self.next_day + days {
            self.step(day, &mut state, &mut records, |reservoir, hydraulics, conditions| {
                Ok(rule_curve_release(hydraulics, conditions, reservoir.target_storage(day)))
            })?;
        }
        debug!(days, reservoirs = self.reservoirs.len(), "rule-curve basin run");
        Ok(records)
    }

    /// Dispatch-driven operation over `days`, which must start at [`Basin::next_day`].
    ///
    /// Reservoirs whose unit has a target on a day follow it; the rest keep
    /// to the rule curve. A target that used its whole budget was limited by
    /// the budget itself, so the reservoir offers its maximum release instead.
    pub fn propose(
        &self,
        days: Range<usize>,
        targets: &BTreeMap<(String, usize), DispatchTarget>,
    ) -> PcmResult<BasinProposal> {
        if days.start != self.next_day {
            return Err(PcmError::Reservoir(format!(
                "proposal must start at day {}, got {}",
                self.next_day, days.start
            )));
        }
        let mut state = self.state.clone();
        let mut records = Vec::with_capacity(days.len() * self.reservoirs.len());
        for day in days.clone() {
            self.step(day, &mut state, &mut records, |reservoir, hydraulics, conditions| {
                match targets.get(&(reservoir.unit().to_string(), day)) {
                    Some(target) => {
                        let binding_tolerance = 0.001 * reservoir.params().max_generation * HOURS_PER_DAY as f64;
                        if target.dispatched_mwh >= target.budget_mwh - binding_tolerance {
                            Ok(hydraulics.impact(
                                conditions.max_release,
                                conditions.storage0,
                                conditions.inflow,
                                conditions.evaporation,
                            ))
                        } else {
                            release_for_energy(hydraulics, conditions, target.dispatched_mwh)
                        }
                    }
                    None => Ok(rule_curve_release(hydraulics, conditions, reservoir.target_storage(day))),
                }
            })?;
        }
        Ok(BasinProposal {
            days,
            records,
            end_state: state,
        })
    }

    /// Make a proposal the committed history.
    pub fn commit(&mut self, proposal: BasinProposal) -> PcmResult<()> {
        if proposal.days.start != self.next_day {
            return Err(PcmError::Reservoir(format!(
                "stale proposal for day {} (basin is at day {})",
                proposal.days.start, self.next_day
            )));
        }
        self.state = proposal.end_state;
        self.next_day = proposal.days.end;
        self.history.extend(proposal.records);
        Ok(())
    }

    /// Advance every reservoir by one day in cascade order.
    fn step<F>(
        &self,
        day: usize,
        state: &mut [ReservoirState],
        records: &mut Vec<ReservoirDay>,
        mut decide: F,
    ) -> PcmResult<()>
    where
        F: FnMut(&Reservoir, &Hydraulics, &DayConditions) -> PcmResult<ReleaseImpact>,
    {
        let mut upstream = vec![0.0; self.reservoirs.len()];
        for &i in &self.order {
            let reservoir = &self.reservoirs[i];
            let params = reservoir.params();
            let hydraulics = params.hydraulics();
            let natural = reservoir.inflow(day)?;
            let inflow = natural + upstream[i];
            let evaporation = reservoir.evaporation(day);
            let storage0 = state[i].storage;
            let (min_release, max_release) = release_bounds(
                storage0 + inflow - evaporation,
                reservoir.min_flow(day),
                params.max_release,
                state[i].last_release,
                params.hydropeak_factor,
            );
            let conditions = DayConditions {
                storage0,
                inflow,
                evaporation,
                min_release,
                max_release,
            };
            let impact = decide(reservoir, &hydraulics, &conditions)?;

            let outflow = impact.release + impact.spill;
            for (sink, fraction) in &self.downstream[i] {
                upstream[*sink] += fraction * outflow;
            }
            state[i] = ReservoirState {
                storage: impact.storage,
                last_release: Some(impact.release),
            };
            records.push(ReservoirDay {
                reservoir: reservoir.name().to_string(),
                unit: reservoir.unit().to_string(),
                day,
                inflow: natural,
                upstream_flow: upstream[i],
                release: impact.release,
                spill: impact.spill,
                evaporation: impact.evaporation,
                storage: impact.storage,
                level: impact.level,
                energy_mwh: impact.energy_mwh,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservoir::tests::params;

    fn reservoir(name: &str, inflow: f64, days: usize) -> Reservoir {
        let mut p = params(name);
        p.initial_storage = Some(5e8);
        Reservoir::new(p, vec![inflow; days]).unwrap()
    }

    fn path(source: &str, sink: &str, fraction: f64) -> FlowPath {
        FlowPath {
            source: source.into(),
            sink: sink.into(),
            fraction,
        }
    }

    #[test]
    fn test_topological_order_ignores_input_order() {
        let basin = Basin::new(
            vec![reservoir("low", 1e6, 3), reservoir("mid", 1e6, 3), reservoir("top", 1e6, 3)],
            vec![path("top", "mid", 1.0), path("mid", "low", 1.0)],
        )
        .unwrap();
        let order: Vec<_> = basin.order().collect();
        assert_eq!(order, vec!["top", "mid", "low"]);
    }

    #[test]
    fn test_cyclic_paths_rejected() {
        let err = Basin::new(
            vec![reservoir("a", 1e6, 1), reservoir("b", 1e6, 1)],
            vec![path("a", "b", 1.0), path("b", "a", 1.0)],
        )
        .err()
        .unwrap();
        assert!(matches!(err, PcmError::Reservoir(_)));
    }

    #[test]
    fn test_fractions_over_one_rejected() {
        let result = Basin::new(
            vec![reservoir("a", 1e6, 1), reservoir("b", 1e6, 1), reservoir("c", 1e6, 1)],
            vec![path("a", "b", 0.7), path("a", "c", 0.6)],
        );
        assert!(matches!(result, Err(PcmError::DataInconsistency { .. })));
    }

    #[test]
    fn test_downstream_receives_same_day_outflow() {
        let basin = Basin::new(
            vec![reservoir("low", 0.0, 2), reservoir("top", 3e6, 2)],
            vec![path("top", "low", 0.5)],
        )
        .unwrap();
        let records = basin.simulate_rule_curve(2).unwrap();
        for day in 0..2 {
            let top = records.iter().find(|r| r.reservoir == "top" && r.day == day).unwrap();
            let low = records.iter().find(|r| r.reservoir == "low" && r.day == day).unwrap();
            assert!((low.upstream_flow - 0.5 * (top.release + top.spill)).abs() < 1e-6);
        }
        // Rule-curve runs never commit
        assert_eq!(basin.next_day(), 0);
    }

    #[test]
    fn test_proposal_commits_only_on_request() {
        let mut basin = Basin::new(vec![reservoir("lake", 5e6, 4)], Vec::new()).unwrap();
        let initial = basin.state("lake").unwrap();
        let mut targets = BTreeMap::new();
        for day in 0..2 {
            targets.insert(
                ("lake".to_string(), day),
                DispatchTarget {
                    dispatched_mwh: 600.0,
                    budget_mwh: 2000.0,
                },
            );
        }
        let proposal = basin.propose(0..2, &targets).unwrap();
        for energy in proposal.energy().values() {
            assert!((energy - 600.0).abs() < 1e-3);
        }
        assert_eq!(basin.state("lake").unwrap(), initial);

        basin.commit(proposal.clone()).unwrap();
        assert_eq!(basin.next_day(), 2);
        assert_eq!(basin.history().len(), 2);
        assert!(basin.commit(proposal).is_err());
    }

    #[test]
    fn test_binding_budget_offers_maximum_release() {
        let basin = Basin::new(vec![reservoir("lake", 5e6, 1)], Vec::new()).unwrap();
        let mut targets = BTreeMap::new();
        targets.insert(
            ("lake".to_string(), 0),
            DispatchTarget {
                dispatched_mwh: 100.0,
                budget_mwh: 100.0,
            },
        );
        let proposal = basin.propose(0..1, &targets).unwrap();
        assert_eq!(proposal.records()[0].release, 2e7);
        assert!(proposal.records()[0].energy_mwh > 100.0);
    }
}
