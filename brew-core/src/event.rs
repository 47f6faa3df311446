//! Step events parsed from brewhouse spreadsheet exports (CSV).
//!
//! Each row of the export is one step (GOP) of one batch (CHARG_NR) on one
//! piece of equipment (TEILANL). Columns are looked up by header name:
//!
//! - `CHARG_NR` (or `COCIMIENTO`): batch number
//! - `TEILANL`: raw equipment name, mapped to an equipment group
//! - `GOP_NAME`, `GOP_NR`: step name and number
//! - `REZEPT` (or `PRODUCT`): recipe / product
//! - `SW_ZEIT`, `IW_ZEIT`: expected and real duration in seconds
//! - `SZ_*`, `EZ_*`: start and end as split `JAHR`, `MONAT`, `TAG`,
//!   `STUNDE`, `MINUTE`, `SEKUNDE` fields
//! - `NAME_DFM{i}`, `IW_DFM{i}`, `SW_DFM{i}`, `DIM_DFM{i}` for i in 1..=24:
//!   measurement slots (name, real value, expected value, unit)

use crate::error::{IngestError, Result};
use brew_utils::dates::{as_utc, build_timestamp};
use brew_utils::numbers::parse_number;
use brew_utils::text::{equipment_group, UNASSIGNED_GROUP};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;

/// Number of measurement slots in an export row.
pub const MEASUREMENT_SLOTS: usize = 24;

/// Columns every export must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = ["SW_ZEIT", "IW_ZEIT"];

/// Units that mark a measurement slot as a material quantity.
pub const MATERIAL_UNITS: [&str; 5] = ["kg", "hl", "l", "g", "lbs"];

/// Units that mark a measurement slot as a process parameter.
pub const PARAMETER_UNITS: [&str; 9] = ["c", "°c", "bar", "mbar", "m3/h", "%", "rpm", "hz", "a"];

/// What a measurement slot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    Material,
    Parameter,
}

impl MeasurementKind {
    /// Classify a slot by its (lowercased) unit. Unknown units count as
    /// parameters when the value is positive and are dropped otherwise.
    pub fn classify(unit: &str, value: f64) -> Option<MeasurementKind> {
        if MATERIAL_UNITS.contains(&unit) {
            Some(MeasurementKind::Material)
        } else if PARAMETER_UNITS.contains(&unit) || value > 0.0 {
            Some(MeasurementKind::Parameter)
        } else {
            None
        }
    }
}

/// One filled measurement slot of an export row.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub name: String,
    pub value: f64,
    pub expected: f64,
    pub unit: String,
    pub dfm_code: String,
}

/// One step of one batch on one equipment group.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub batch_id: String,
    pub machine_group: String,
    pub step_name: String,
    pub step_nr: String,
    pub product_name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub start_hour: u32,
    pub expected_min: f64,
    pub real_min: f64,
    pub measurements: Vec<Measurement>,
}

/// Header name to column index.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Columns { index }
    }

    fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Trimmed, non-empty cell.
    fn text<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index
            .get(name)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn first_text<'r>(&self, record: &'r StringRecord, names: &[&str]) -> Option<&'r str> {
        names.iter().find_map(|name| self.text(record, name))
    }

    fn number(&self, record: &StringRecord, name: &str) -> Option<f64> {
        self.text(record, name).and_then(parse_number)
    }

    fn whole(&self, record: &StringRecord, name: &str) -> Option<u32> {
        self.number(record, name)
            .filter(|v| *v >= 0.0)
            .map(|v| v.trunc() as u32)
    }

    fn timestamp(&self, record: &StringRecord, prefix: &str) -> Option<DateTime<Utc>> {
        let field = |suffix: &str| format!("{prefix}_{suffix}");
        let year = self
            .number(record, &field("JAHR"))
            .map(|v| v.trunc() as i32);
        build_timestamp(
            year,
            self.whole(record, &field("MONAT")),
            self.whole(record, &field("TAG")),
            self.whole(record, &field("STUNDE")),
            self.whole(record, &field("MINUTE")),
            self.whole(record, &field("SEKUNDE")),
        )
        .map(as_utc)
    }
}

/// Spreadsheets often store batch numbers as floats ("1001.0").
fn normalize_batch_id(raw: &str) -> String {
    match raw.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => raw.to_string(),
    }
}

impl StepEvent {
    /// Parse a CSV export into step events.
    ///
    /// Rows without a batch number or whose equipment group cannot be
    /// determined are skipped.
    pub fn from_csv(csv_data: &str) -> Result<Vec<StepEvent>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(csv_data.as_bytes());
        let columns = Columns::new(rdr.headers()?);
        for required in REQUIRED_COLUMNS {
            if !columns.has(required) {
                return Err(IngestError::MissingColumn(required.to_string()));
            }
        }

        let mut events = Vec::new();
        let mut skipped = 0u32;
        for result in rdr.records() {
            let record = result?;
            match StepEvent::from_record(&columns, &record) {
                Some(event) => events.push(event),
                None => skipped += 1,
            }
        }
        log::info!(
            "[brew] ingest: parsed {} step events, skipped {} rows without batch or equipment",
            events.len(),
            skipped
        );
        Ok(events)
    }

    fn from_record(columns: &Columns, record: &StringRecord) -> Option<StepEvent> {
        let batch_id = normalize_batch_id(columns.first_text(record, &["CHARG_NR", "COCIMIENTO"])?);
        let machine_group = equipment_group(columns.text(record, "TEILANL").unwrap_or(""));
        if machine_group == UNASSIGNED_GROUP {
            return None;
        }

        let measurements = (1..=MEASUREMENT_SLOTS)
            .filter_map(|i| StepEvent::measurement(columns, record, i))
            .collect();

        Some(StepEvent {
            batch_id,
            machine_group,
            step_name: columns.text(record, "GOP_NAME").unwrap_or("").to_string(),
            step_nr: columns.text(record, "GOP_NR").unwrap_or("").to_string(),
            product_name: columns
                .first_text(record, &["REZEPT", "PRODUCT"])
                .unwrap_or("")
                .to_string(),
            start: columns.timestamp(record, "SZ"),
            end: columns.timestamp(record, "EZ"),
            start_hour: columns.whole(record, "SZ_STUNDE").unwrap_or(0),
            expected_min: columns.number(record, "SW_ZEIT").unwrap_or(0.0) / 60.0,
            real_min: columns.number(record, "IW_ZEIT").unwrap_or(0.0) / 60.0,
            measurements,
        })
    }

    fn measurement(columns: &Columns, record: &StringRecord, slot: usize) -> Option<Measurement> {
        let name = columns.text(record, &format!("NAME_DFM{slot}"))?;
        let value = columns.number(record, &format!("IW_DFM{slot}"))?;
        let expected = columns
            .number(record, &format!("SW_DFM{slot}"))
            .unwrap_or(0.0);
        let unit = columns
            .text(record, &format!("DIM_DFM{slot}"))
            .unwrap_or("")
            .to_lowercase();
        let kind = MeasurementKind::classify(&unit, value)?;
        Some(Measurement {
            kind,
            name: name.to_string(),
            value,
            expected,
            unit,
            dfm_code: format!("DFM{slot}"),
        })
    }
}
