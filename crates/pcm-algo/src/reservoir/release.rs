//! Daily release decisions.
//!
//! Rule-curve mode steers storage towards the seasonal target. Dispatch-driven
//! mode searches the feasible release interval for the volume whose
//! hydropower best matches an energy target, using golden-section search.

use argmin::core::{CostFunction, Executor, State};
use argmin::solver::goldensectionsearch::GoldenSectionSearch;
use pcm_core::{PcmError, PcmResult};

use super::functions::{Hydraulics, ReleaseImpact};

const SEARCH_TOLERANCE: f64 = 1e-9;
const SEARCH_MAX_ITERS: u64 = 200;

/// Inputs for one reservoir-day.
#[derive(Debug, Clone, Copy)]
pub struct DayConditions {
    pub storage0: f64,
    /// Natural plus upstream inflow (m³/day)
    pub inflow: f64,
    pub evaporation: f64,
    pub min_release: f64,
    pub max_release: f64,
}

/// Release that brings end-of-day storage closest to `target_storage`.
pub fn rule_curve_release(hydraulics: &Hydraulics, day: &DayConditions, target_storage: f64) -> ReleaseImpact {
    let desired = day.storage0 + day.inflow - day.evaporation - target_storage;
    let release = desired.clamp(day.min_release, day.max_release);
    hydraulics.impact(release, day.storage0, day.inflow, day.evaporation)
}

/// |target - energy(release)| as a scalar cost.
struct EnergyMismatch<'a> {
    hydraulics: &'a Hydraulics,
    day: &'a DayConditions,
    target_mwh: f64,
}

impl CostFunction for EnergyMismatch<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, release: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let impact = self
            .hydraulics
            .impact(*release, self.day.storage0, self.day.inflow, self.day.evaporation);
        Ok((self.target_mwh - impact.energy_mwh).abs())
    }
}

/// Release whose daily energy best matches `target_mwh`.
///
/// Targets outside the energy range of the feasible interval snap to the
/// nearer end; the returned impact reports the energy actually achievable.
pub fn release_for_energy(
    hydraulics: &Hydraulics,
    day: &DayConditions,
    target_mwh: f64,
) -> PcmResult<ReleaseImpact> {
    let at = |release: f64| hydraulics.impact(release, day.storage0, day.inflow, day.evaporation);
    let low = at(day.min_release);
    if target_mwh <= low.energy_mwh || day.max_release <= day.min_release {
        return Ok(low);
    }
    let high = at(day.max_release);
    if target_mwh >= high.energy_mwh {
        return Ok(high);
    }

    let problem = EnergyMismatch {
        hydraulics,
        day,
        target_mwh,
    };
    let search_error = |e: argmin::core::Error| PcmError::Reservoir(format!("release search failed: {e}"));
    let solver = GoldenSectionSearch::new(day.min_release, day.max_release)
        .and_then(|s| s.with_tolerance(SEARCH_TOLERANCE))
        .map_err(search_error)?;
    let start = 0.5 * (day.min_release + day.max_release);
    let result = Executor::new(problem, solver)
        .configure(|state| state.param(start).max_iters(SEARCH_MAX_ITERS))
        .run()
        .map_err(search_error)?;
    let release = result
        .state()
        .get_best_param()
        .copied()
        .unwrap_or(start)
        .clamp(day.min_release, day.max_release);
    Ok(at(release))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydraulics() -> Hydraulics {
        Hydraulics {
            min_level: 0.0,
            max_level: 10.0,
            max_storage: 1e9,
            max_head: 100.0,
            turbine_factor: 0.9,
            max_generation: 200.0,
        }
    }

    fn day() -> DayConditions {
        DayConditions {
            storage0: 9e8,
            inflow: 5e6,
            evaporation: 0.0,
            min_release: 0.0,
            max_release: 2e7,
        }
    }

    #[test]
    fn test_release_matches_energy_target() {
        let h = hydraulics();
        let out = release_for_energy(&h, &day(), 1200.0).unwrap();
        assert!((out.energy_mwh - 1200.0).abs() < 1e-3, "energy {}", out.energy_mwh);
        assert!(out.release > 0.0 && out.release < 2e7);
    }

    #[test]
    fn test_unreachable_target_snaps_to_bound() {
        let h = hydraulics();
        let out = release_for_energy(&h, &day(), 1e9).unwrap();
        assert_eq!(out.release, 2e7);
        let out = release_for_energy(&h, &day(), 0.0).unwrap();
        assert_eq!(out.release, 0.0);
    }

    #[test]
    fn test_rule_curve_tracks_target_storage() {
        let h = hydraulics();
        let out = rule_curve_release(&h, &day(), 9e8);
        assert!((out.release - 5e6).abs() < 1e-6);
        assert!((out.storage - 9e8).abs() < 1e-3);

        // Target above current storage: hold back down to the minimum release
        let out = rule_curve_release(&h, &day(), 9.9e8);
        assert_eq!(out.release, 0.0);
    }
}
