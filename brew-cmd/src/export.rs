//! CSV export of the tabular reports.

use crate::config::BrewConfig;
use crate::Dataset;
use brew_core::BatchRecord;
use brew_data::materials::recipe_waste;
use brew_utils::dates::format_timestamp;
use clap::ValueEnum;
use log::{info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Report {
    MachineAverages,
    Recipes,
    Shifts,
    Delays,
    Problematic,
    Efficiency,
    RecipeWaste,
    Batches,
}

/// Flat view of a record for the `batches` export.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub batch_id: String,
    pub machine: String,
    pub product: String,
    pub real_total_min: f64,
    pub expected_total_min: f64,
    pub delta_total_min: f64,
    pub idle_min: f64,
    pub max_gap_min: f64,
    pub timestamp: Option<String>,
    pub start_hour: u32,
    pub steps: usize,
    pub alerts: usize,
}

impl From<&BatchRecord> for BatchRow {
    fn from(record: &BatchRecord) -> Self {
        BatchRow {
            batch_id: record.batch_id.clone(),
            machine: record.machine_group.clone(),
            product: record.product_or_unknown().to_string(),
            real_total_min: record.real_total_min,
            expected_total_min: record.expected_total_min,
            delta_total_min: record.delta_total_min,
            idle_min: record.idle_min,
            max_gap_min: record.max_gap_min,
            timestamp: record.timestamp.as_ref().map(format_timestamp),
            start_hour: record.start_hour,
            steps: record.steps.len(),
            alerts: record.alerts.len(),
        }
    }
}

/// Serialize `rows` as CSV with a header row. Returns the row count.
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> anyhow::Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

/// Render one report as CSV into `writer`.
pub fn export_report<W: Write>(
    dataset: &Dataset,
    report: Report,
    config: &BrewConfig,
    writer: W,
) -> anyhow::Result<usize> {
    let db = &dataset.db;
    let analysis = &config.analysis;
    match report {
        Report::MachineAverages => write_csv(&db.query_machine_averages()?, writer),
        Report::Recipes => write_csv(&db.query_recipe_stats()?, writer),
        Report::Shifts => write_csv(&db.query_shift_stats()?, writer),
        Report::Delays => write_csv(&db.query_delay_alerts(analysis.delay_alert_threshold_min)?, writer),
        Report::Problematic => write_csv(
            &db.query_problematic_batches(analysis.problem_gap_min, analysis.problem_delay_min)?,
            writer,
        ),
        Report::Efficiency => write_csv(&db.query_efficiency()?, writer),
        Report::RecipeWaste => write_csv(&recipe_waste(&dataset.records, analysis), writer),
        Report::Batches => {
            let rows: Vec<BatchRow> = dataset.records.iter().map(BatchRow::from).collect();
            write_csv(&rows, writer)
        }
    }
}

/// Write `report` to `output`. An empty report writes nothing.
pub fn run_export(data: &Path, report: Report, output: &Path, config: &BrewConfig) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    let mut buffer = Vec::new();
    let rows = export_report(&dataset, report, config, &mut buffer)?;
    if rows == 0 {
        warn!("Report {:?} is empty, nothing written", report);
        return Ok(());
    }
    std::fs::write(output, buffer)?;
    info!("Exported {} rows to {}", rows, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::dataset;

    fn export_text(report: Report) -> (usize, String) {
        let mut buffer = Vec::new();
        let rows = export_report(&dataset(), report, &BrewConfig::default(), &mut buffer).unwrap();
        (rows, String::from_utf8(buffer).unwrap())
    }

    #[test]
    fn shifts_export_has_header_and_rows() {
        let (rows, text) = export_text(Report::Shifts);
        assert_eq!(rows, 3);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,batches,avgDelta,avgIdle");
        assert!(lines[1].starts_with("Shift 1 (Morning),2,"));
    }

    #[test]
    fn batches_export_flattens_records() {
        let (rows, text) = export_text(Report::Batches);
        assert_eq!(rows, 4);
        assert!(text.starts_with("batchId,machine,product,"));
        assert!(text.contains("1001,Cocedor 1,Clara,62.0,45.0,17.0,20.0,20.0,2023-10-01T06:00:00.000Z,6,3,1"));
    }

    #[test]
    fn recipe_waste_export_ranks_worst_first() {
        let (rows, text) = export_text(Report::RecipeWaste);
        assert_eq!(rows, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,totalExpected,totalReal,delta,percentDeviation,status");
        assert_eq!(lines[1], "Oscura,400.0,440.0,40.0,10.0,danger");
        assert!(lines[2].starts_with("Clara,"));
    }

    #[test]
    fn efficiency_export_quotes_line_breaks() {
        let (_, text) = export_text(Report::Efficiency);
        assert!(text.contains("\"Cocedor \n1\""));
    }

    #[test]
    fn empty_report_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("empty-report.json");
        let output = dir.path().join("empty-report.csv");
        std::fs::write(&data, "[]").unwrap();

        run_export(&data, Report::Delays, &output, &BrewConfig::default()).unwrap();
        assert!(!output.exists());
    }
}
