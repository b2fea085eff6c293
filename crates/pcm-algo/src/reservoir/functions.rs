//! Closed-form reservoir relations.
//!
//! Volumes are in m³, flows in m³/day, levels and heads in metres, power in
//! MW and daily energy in MWh.

use pcm_core::HOURS_PER_DAY;

/// Water density (kg/m³)
pub const WATER_DENSITY: f64 = 998.0;
/// Gravitational acceleration (m/s²)
pub const GRAVITY: f64 = 9.81;
pub const DAYS_PER_YEAR: usize = 365;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Water surface elevation for a storage volume, linear between `min_level`
/// (empty) and `max_level` (full).
pub fn level_from_storage(storage: f64, min_level: f64, max_level: f64, max_storage: f64) -> f64 {
    storage / max_storage * (max_level - min_level) + min_level
}

/// Inverse of [`level_from_storage`].
pub fn storage_from_level(level: f64, min_level: f64, max_level: f64, max_storage: f64) -> f64 {
    (level - min_level) / (max_level - min_level) * max_storage
}

/// Rule-curve target level for a 1-based day of the year.
///
/// The curve rises linearly from `min_level` on `min_day` to `max_level` on
/// `max_day`, then falls back, wrapping around the end of the year.
pub fn target_level(day_of_year: usize, min_day: usize, max_day: usize, min_level: f64, max_level: f64) -> f64 {
    let day = day_of_year as f64;
    let (lo, hi) = (min_day as f64, max_day as f64);
    let year = DAYS_PER_YEAR as f64;
    let span = max_level - min_level;
    let falling = year - hi + lo;

    let fraction = if min_day <= day_of_year && day_of_year <= max_day {
        if max_day == min_day {
            1.0
        } else {
            (day - lo) / (hi - lo)
        }
    } else if day_of_year > max_day {
        (year - day + lo) / falling
    } else {
        (lo - day) / falling
    };
    fraction * span + min_level
}

/// Minimum environmental release derived from the day's inflow relative to
/// the mean annual flow, never above `max_release`.
pub fn min_environmental_flow(inflow: f64, mean_annual_flow: f64, max_release: f64) -> f64 {
    let share = if inflow <= 0.4 * mean_annual_flow {
        0.6
    } else if inflow > 0.8 * mean_annual_flow {
        0.3
    } else {
        0.45
    };
    (share * inflow).min(max_release)
}

/// Hydraulic head for the mean water level of a day.
pub fn head(max_head: f64, max_level: f64, mid_level: f64) -> f64 {
    max_head - (max_level - mid_level)
}

/// Turbine output for a daily release, capped at `max_generation` (MW).
pub fn hydropower_mw(release: f64, head: f64, turbine_factor: f64, max_generation: f64) -> f64 {
    let flow_rate = release / SECONDS_PER_DAY;
    let watts = turbine_factor * WATER_DENSITY * GRAVITY * head.max(0.0) * flow_rate;
    (watts / 1e6).min(max_generation).max(0.0)
}

/// Energy over one day at constant [`hydropower_mw`] output.
pub fn daily_energy_mwh(release: f64, head: f64, turbine_factor: f64, max_generation: f64) -> f64 {
    HOURS_PER_DAY as f64 * hydropower_mw(release, head, turbine_factor, max_generation)
}

/// Feasible release interval for one day as `(min, max)`.
///
/// The upper end honors turbine capacity and the hydropeaking limit around
/// `previous_release` but never falls below the environmental minimum. Both
/// ends are capped by the water available, so the interval may collapse to a
/// point in a drought.
pub fn release_bounds(
    available: f64,
    min_flow: f64,
    max_release: f64,
    previous_release: Option<f64>,
    hydropeak_factor: f64,
) -> (f64, f64) {
    let step = hydropeak_factor * max_release;
    let mut upper = match previous_release {
        Some(prev) => max_release.min(prev + step),
        None => max_release,
    };
    upper = upper.max(min_flow);
    let mut lower = match previous_release {
        Some(prev) => min_flow.max(prev - step),
        None => min_flow,
    };
    let available = available.max(0.0);
    upper = upper.min(available);
    lower = lower.min(available).min(upper).max(0.0);
    (lower, upper)
}

/// State of a reservoir at the end of one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseImpact {
    pub release: f64,
    pub spill: f64,
    pub evaporation: f64,
    pub storage: f64,
    pub level: f64,
    pub energy_mwh: f64,
}

/// Physical parameters needed to evaluate a release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hydraulics {
    pub min_level: f64,
    pub max_level: f64,
    pub max_storage: f64,
    pub max_head: f64,
    pub turbine_factor: f64,
    pub max_generation: f64,
}

impl Hydraulics {
    pub fn level(&self, storage: f64) -> f64 {
        level_from_storage(storage, self.min_level, self.max_level, self.max_storage)
    }

    /// Mass balance `storage = storage0 + inflow - release - evaporation - spill`
    /// where spill is the water above `max_storage`.
    pub fn impact(&self, release: f64, storage0: f64, inflow: f64, evaporation: f64) -> ReleaseImpact {
        let evaporation = evaporation.clamp(0.0, (storage0 + inflow).max(0.0));
        let after_release = storage0 + inflow - evaporation - release;
        let spill = (after_release - self.max_storage).max(0.0);
        let storage = after_release - spill;
        let level = self.level(storage);
        let mid_level = (self.level(storage0) + level) / 2.0;
        let energy_mwh = daily_energy_mwh(
            release,
            head(self.max_head, self.max_level, mid_level),
            self.turbine_factor,
            self.max_generation,
        );
        ReleaseImpact {
            release,
            spill,
            evaporation,
            storage,
            level,
            energy_mwh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydraulics() -> Hydraulics {
        Hydraulics {
            min_level: 500.0,
            max_level: 610.0,
            max_storage: 4.32e8,
            max_head: 122.0,
            turbine_factor: 0.9,
            max_generation: 194.0,
        }
    }

    #[test]
    fn test_level_storage_inverse() {
        let level = level_from_storage(2.16e8, 500.0, 610.0, 4.32e8);
        assert!((level - 555.0).abs() < 1e-9);
        let storage = storage_from_level(level, 500.0, 610.0, 4.32e8);
        assert!((storage - 2.16e8).abs() < 1e-3);
    }

    #[test]
    fn test_target_level_curve() {
        // Minimum on day 100, maximum on day 280
        assert!((target_level(100, 100, 280, 500.0, 600.0) - 500.0).abs() < 1e-9);
        assert!((target_level(280, 100, 280, 500.0, 600.0) - 600.0).abs() < 1e-9);
        assert!((target_level(190, 100, 280, 500.0, 600.0) - 550.0).abs() < 1e-9);
        // Falls after the maximum and is continuous over the year end
        let late = target_level(365, 100, 280, 500.0, 600.0);
        let early = target_level(1, 100, 280, 500.0, 600.0);
        assert!(late < 600.0 && late > early);
    }

    #[test]
    fn test_min_environmental_flow_bands() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(min_environmental_flow(30.0, 100.0, 1e6), 18.0));
        assert!(close(min_environmental_flow(60.0, 100.0, 1e6), 27.0));
        assert!(close(min_environmental_flow(90.0, 100.0, 1e6), 27.0));
        assert_eq!(min_environmental_flow(90.0, 100.0, 10.0), 10.0);
    }

    #[test]
    fn test_hydropower_formula_and_cap() {
        // 0.9 * 998 * 9.81 * 100 m * 1 m³/s = 0.881 MW
        let mw = hydropower_mw(86_400.0, 100.0, 0.9, 500.0);
        assert!((mw - 0.881_134_2).abs() < 1e-6);
        assert_eq!(hydropower_mw(1e12, 100.0, 0.9, 50.0), 50.0);
        assert!((daily_energy_mwh(86_400.0, 100.0, 0.9, 500.0) - 24.0 * mw).abs() < 1e-9);
    }

    #[test]
    fn test_release_bounds_hydropeaking() {
        let (lo, hi) = release_bounds(1e9, 10.0, 1000.0, Some(500.0), 0.15);
        assert_eq!((lo, hi), (350.0, 650.0));
        let (lo, hi) = release_bounds(1e9, 10.0, 1000.0, None, 0.15);
        assert_eq!((lo, hi), (10.0, 1000.0));
        // Water-limited
        let (lo, hi) = release_bounds(5.0, 10.0, 1000.0, None, 0.15);
        assert_eq!((lo, hi), (5.0, 5.0));
    }

    #[test]
    fn test_spill_above_max_storage() {
        let h = hydraulics();
        let out = h.impact(1e6, 4.3e8, 5e6, 0.0);
        assert!((out.storage - 4.32e8).abs() < 1e-3);
        assert!((out.spill - 2e6).abs() < 1e-3);
    }

    #[test]
    fn test_mass_balance_forward_backward() {
        let h = hydraulics();
        let inflow = [5e6, 9e5, 2.4e6, 0.0, 7.7e6, 1.2e6];
        let release = [3e6, 4e6, 2e6, 1e6, 2e6, 8e6];
        let evaporation = [1e4, 2e4, 0.0, 5e4, 1e4, 0.0];

        let mut storage = vec![3.0e8];
        let mut spill = Vec::new();
        let mut evap = Vec::new();
        for day in 0..inflow.len() {
            let out = h.impact(release[day], storage[day], inflow[day], evaporation[day]);
            storage.push(out.storage);
            spill.push(out.spill);
            evap.push(out.evaporation);
        }

        // Walk backwards from the final storage and recover the starting volume
        let mut recovered = storage[inflow.len()];
        for day in (0..inflow.len()).rev() {
            recovered = recovered - inflow[day] + release[day] + evap[day] + spill[day];
            assert!((recovered - storage[day]).abs() < 1e-3, "day {day}");
        }
        assert!((recovered - 3.0e8).abs() < 1e-3);
    }
}
