//! Daily hydropower energy budgets.
//!
//! The grid model only ever reads a [`HydroSchedule`]; the reservoir simulator
//! and the coupler are the ones producing new schedules.

use serde::{Deserialize, Serialize};

use crate::series::SeriesTable;

/// Hours per calendar day.
pub const HOURS_PER_DAY: usize = 24;

/// Available hydro energy per unit per day (MWh).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydroSchedule {
    daily: SeriesTable,
}

impl HydroSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(daily: SeriesTable) -> Self {
        Self { daily }
    }

    pub fn table(&self) -> &SeriesTable {
        &self.daily
    }

    /// Energy budget for `unit` on `day`, if one is known.
    pub fn daily_energy(&self, unit: &str, day: usize) -> Option<f64> {
        self.daily.value(unit, day)
    }

    /// Overwrite one day, growing the column as needed.
    pub fn set(&mut self, unit: &str, day: usize, mwh: f64) {
        if !self.daily.contains(unit) {
            self.daily.insert(unit, Vec::new());
        }
        if let Some(column) = self.daily.get_mut(unit) {
            if column.len() <= day {
                column.resize(day + 1, 0.0);
            }
            column[day] = mwh;
        }
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.daily.names()
    }
}

/// Day containing an absolute hour.
pub fn day_of_hour(hour: usize) -> usize {
    hour / HOURS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_grows_column() {
        let mut schedule = HydroSchedule::new();
        schedule.set("dam", 2, 480.0);
        assert_eq!(schedule.daily_energy("dam", 2), Some(480.0));
        assert_eq!(schedule.daily_energy("dam", 0), Some(0.0));
        assert_eq!(schedule.daily_energy("dam", 3), None);
    }

    #[test]
    fn test_day_of_hour() {
        assert_eq!(day_of_hour(0), 0);
        assert_eq!(day_of_hour(23), 0);
        assert_eq!(day_of_hour(24), 1);
    }
}
