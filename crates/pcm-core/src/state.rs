//! Cross-window simulation state.
//!
//! A [`SimulationState`] is the only thing that crosses a window boundary.
//! It is produced from the solved values of the last hour of one window and
//! consumed, read-only, by the model of the next.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::SystemInput;

/// Commitment history of one thermal unit at a window boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitState {
    pub online: bool,
    /// Consecutive hours spent in the current status; zero means no history
    pub hours_in_status: usize,
    /// Total output in the last hour (MW)
    pub dispatch_mw: f64,
}

impl UnitState {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn online(hours: usize, dispatch_mw: f64) -> Self {
        Self {
            online: true,
            hours_in_status: hours,
            dispatch_mw,
        }
    }

    /// Hours the unit must still stay online at the next window start.
    pub fn remaining_up(&self, min_up_hours: usize) -> usize {
        if self.online && self.hours_in_status > 0 {
            min_up_hours.saturating_sub(self.hours_in_status)
        } else {
            0
        }
    }

    /// Hours the unit must still stay offline at the next window start.
    pub fn remaining_down(&self, min_down_hours: usize) -> usize {
        if !self.online && self.hours_in_status > 0 {
            min_down_hours.saturating_sub(self.hours_in_status)
        } else {
            0
        }
    }

    /// Roll the history forward over a window with the given hourly statuses.
    pub fn advance(&self, statuses: &[bool], last_dispatch_mw: f64) -> UnitState {
        let Some(&last) = statuses.last() else {
            return *self;
        };
        let run = statuses.iter().rev().take_while(|s| **s == last).count();
        let hours_in_status = if run == statuses.len() && self.online == last {
            self.hours_in_status + run
        } else {
            run
        };
        UnitState {
            online: last,
            hours_in_status,
            dispatch_mw: if last { last_dispatch_mw } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageState {
    pub level_mwh: f64,
}

/// Initial condition for one window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationState {
    /// Absolute hour at which the next window starts
    pub hour: usize,
    pub units: BTreeMap<String, UnitState>,
    pub storage: BTreeMap<String, StorageState>,
    /// Hydro output in the last hour (MW); absent units start without ramp history
    #[serde(default)]
    pub hydro: BTreeMap<String, f64>,
}

impl SimulationState {
    /// All thermal units offline without history, storage at its configured initial level.
    pub fn initial(input: &SystemInput) -> Self {
        Self {
            hour: 0,
            units: input
                .thermal_units()
                .map(|u| (u.name.clone(), UnitState::offline()))
                .collect(),
            storage: input
                .storage_units()
                .map(|s| {
                    (
                        s.name.clone(),
                        StorageState {
                            level_mwh: s.initial_level_mwh,
                        },
                    )
                })
                .collect(),
            hydro: BTreeMap::new(),
        }
    }

    /// Override the initial condition of one unit.
    pub fn with_unit(mut self, name: &str, state: UnitState) -> Self {
        self.units.insert(name.to_string(), state);
        self
    }

    pub fn unit(&self, name: &str) -> UnitState {
        self.units.get(name).copied().unwrap_or_default()
    }

    /// Last-hour output of a hydro unit, if a previous window dispatched it.
    pub fn hydro_output(&self, name: &str) -> Option<f64> {
        self.hydro.get(name).copied()
    }

    /// Stored energy, falling back to `default` for unknown units.
    pub fn storage_level(&self, name: &str, default: f64) -> f64 {
        self.storage.get(name).map(|s| s.level_mwh).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_means_no_carry_over() {
        assert_eq!(UnitState::offline().remaining_down(5), 0);
        assert_eq!(UnitState::online(0, 10.0).remaining_up(5), 0);
    }

    #[test]
    fn test_remaining_up_time() {
        let state = UnitState::online(1, 10.0);
        assert_eq!(state.remaining_up(4), 3);
        assert_eq!(state.remaining_down(4), 0);
        assert_eq!(UnitState::online(6, 10.0).remaining_up(4), 0);
    }

    #[test]
    fn test_advance_counts_trailing_run() {
        let state = UnitState::offline();
        let next = state.advance(&[false, false, true, true], 25.0);
        assert_eq!(next, UnitState::online(2, 25.0));
    }

    #[test]
    fn test_advance_extends_unbroken_status() {
        let state = UnitState::online(3, 20.0);
        let next = state.advance(&[true, true], 30.0);
        assert_eq!(next.hours_in_status, 5);
        assert_eq!(next.dispatch_mw, 30.0);

        let off = UnitState::offline().advance(&[false; 4], 0.0);
        assert!(!off.online);
        assert_eq!(off.hours_in_status, 4);
    }
}
