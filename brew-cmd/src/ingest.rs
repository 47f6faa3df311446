//! Ingestion of spreadsheet exports and the raw interval merger command.

use crate::config::BrewConfig;
use crate::print_json;
use brew_core::consolidate::consolidate;
use brew_core::event::StepEvent;
use brew_core::interval::{summarize, Interval};
use brew_utils::numbers::parse_number;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Maximum number of CSV exports consolidated in one run.
pub const MAX_INPUT_FILES: usize = 4;

/// Parse every input export, consolidate the step events into batch
/// records and write them as a JSON array.
///
/// Events from all inputs are consolidated together, so one batch split
/// across exports still yields a single record per equipment group.
pub fn run_ingest(inputs: &[PathBuf], output: &Path, config: &BrewConfig) -> anyhow::Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files given");
    }
    if inputs.len() > MAX_INPUT_FILES {
        anyhow::bail!(
            "At most {} input files can be ingested at once (got {})",
            MAX_INPUT_FILES,
            inputs.len()
        );
    }

    let mut events = Vec::new();
    for path in inputs {
        let data = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let parsed = StepEvent::from_csv(&data)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        if parsed.is_empty() {
            warn!("No usable rows in {}", path.display());
        }
        info!("{} step events from {}", parsed.len(), path.display());
        events.extend(parsed);
    }

    let records = consolidate(events, &config.ingest)?;
    if records.is_empty() {
        anyhow::bail!("No valid batch records found in the input files");
    }

    std::fs::write(output, serde_json::to_string_pretty(&records)?)?;
    info!(
        "Ingest complete. {} batch records written to {}",
        records.len(),
        output.display()
    );
    Ok(())
}

/// Read `start,end` millisecond pairs. A first row whose start is not a
/// number is taken as a header.
pub fn parse_intervals(csv_data: &str) -> anyhow::Result<Vec<Interval>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());

    let mut intervals = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let start = record.get(0).unwrap_or("");
        let end = record.get(1).unwrap_or("");
        match (parse_number(start), parse_number(end)) {
            (Some(start), Some(end)) => intervals.push(Interval::new(start, end)),
            _ if row == 0 => continue,
            _ => anyhow::bail!("Row {}: expected two numbers, got {:?},{:?}", row + 1, start, end),
        }
    }
    Ok(intervals)
}

/// Print the merged spans, gaps and totals of the intervals in `input`.
pub fn run_merge(input: &Path) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;
    let intervals = parse_intervals(&data)?;
    info!("Merging {} intervals from {}", intervals.len(), input.display());
    let summary = summarize(&intervals)?;
    print_json(&summary)
}
