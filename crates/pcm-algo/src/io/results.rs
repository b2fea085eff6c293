//! Result writers.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::record::SimulationRecord;
use crate::reservoir::ReservoirDay;

/// Write every result table of a run into `dir`, plus `summary.json`.
///
/// `lmp.csv` is only written for runs that computed nodal prices.
pub fn write_record(record: &SimulationRecord, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;

    write_rows(&dir.join("thermal.csv"), &record.thermal)?;
    write_rows(&dir.join("dispatch.csv"), &record.dispatch)?;
    write_rows(&dir.join("storage.csv"), &record.storage)?;
    write_rows(&dir.join("flows.csv"), &record.flows)?;
    write_rows(&dir.join("node_slack.csv"), &record.node_slack)?;
    write_rows(&dir.join("reserve.csv"), &record.reserve)?;
    write_rows(&dir.join("windows.csv"), &record.windows)?;
    if !record.lmp.is_empty() {
        write_rows(&dir.join("lmp.csv"), &record.lmp)?;
    }

    let summary_path = dir.join("summary.json");
    let file = File::create(&summary_path)
        .with_context(|| format!("creating {}", summary_path.display()))?;
    serde_json::to_writer_pretty(file, &record.summary())
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!(dir = %dir.display(), windows = record.windows.len(), "results written");
    Ok(())
}

/// Write a daily reservoir trajectory.
pub fn write_reservoir_days(days: &[ReservoirDay], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    write_rows(path, days)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LmpRecord, NodeSlackRecord, RunSummary, WindowRows, WindowSummary};
    use crate::solver::SolveStatus;
    use tempfile::tempdir;

    #[test]
    fn test_record_tables_written() {
        let mut record = SimulationRecord::new();
        let rows = WindowRows {
            node_slack: vec![NodeSlackRecord {
                node: "A".into(),
                hour: 0,
                demand_mw: 10.0,
                shortfall_mw: 2.0,
                excess_mw: 0.0,
            }],
            ..WindowRows::default()
        };
        record.append(
            rows,
            WindowSummary {
                index: 0,
                start_hour: 0,
                hours: 1,
                status: SolveStatus::Optimal,
                objective: 2000.0,
                shortfall_mwh: 2.0,
                solve_time_ms: 3,
                coupling_iterations: None,
                coupling_converged: None,
            },
        );

        let dir = tempdir().unwrap();
        write_record(&record, dir.path()).unwrap();
        for table in ["thermal", "dispatch", "storage", "flows", "node_slack", "reserve", "windows"] {
            assert!(dir.path().join(format!("{table}.csv")).exists(), "{table}.csv missing");
        }

        let slack = fs::read_to_string(dir.path().join("node_slack.csv")).unwrap();
        assert!(slack.starts_with("node,hour,demand_mw,shortfall_mw,excess_mw"));
        assert!(slack.contains("A,0,10.0,2.0,0.0"));

        let summary: RunSummary =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary.windows, 1);
        assert_eq!(summary.total_shortfall_mwh, 2.0);
        assert!(!dir.path().join("lmp.csv").exists());
    }

    #[test]
    fn test_lmp_table_written_when_priced() {
        let mut record = SimulationRecord::new();
        record.lmp.push(LmpRecord {
            node: "B".into(),
            hour: 5,
            lmp: 42.5,
        });
        let dir = tempdir().unwrap();
        write_record(&record, dir.path()).unwrap();
        let lmp = fs::read_to_string(dir.path().join("lmp.csv")).unwrap();
        assert!(lmp.starts_with("node,hour,lmp"));
        assert!(lmp.contains("B,5,42.5"));
    }
}
