//! Named numeric series.
//!
//! A [`SeriesTable`] maps a column name (node, unit or contract) to a vector
//! indexed by absolute period: hours for hourly tables, days for daily ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesTable {
    columns: BTreeMap<String, Vec<f64>>,
}

impl SeriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn with(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.columns.get_mut(name)
    }

    /// Value of `name` at `period`, `None` when the column or period is missing.
    pub fn value(&self, name: &str, period: usize) -> Option<f64> {
        self.columns.get(name).and_then(|v| v.get(period).copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Shortest column length (0 for an empty table).
    pub fn min_len(&self) -> usize {
        self.columns.values().map(Vec::len).min().unwrap_or(0)
    }
}

/// Constant series helper used by builders and tests.
pub fn constant(value: f64, len: usize) -> Vec<f64> {
    vec![value; len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup() {
        let table = SeriesTable::new().with("A", vec![1.0, 2.0]).with("B", constant(5.0, 3));
        assert_eq!(table.value("A", 1), Some(2.0));
        assert_eq!(table.value("A", 2), None);
        assert_eq!(table.value("C", 0), None);
        assert_eq!(table.min_len(), 2);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }
}
