use crate::error::InvalidIntervalError;
use crate::interval::{self, Interval, IntervalSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product name used when the export carries none.
pub const UNKNOWN_PRODUCT: &str = "Unknown";

/// Whether a step is real processing or an idle stretch inserted between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    #[default]
    Process,
    Wait,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Process => "process",
            StepKind::Wait => "wait",
        }
    }

    /// Inverse of [`StepKind::as_str`]; anything unrecognised is a process step.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("wait") {
            StepKind::Wait
        } else {
            StepKind::Process
        }
    }
}

/// A named phase within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStep {
    pub step_name: String,
    #[serde(default)]
    pub step_nr: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub duration_min: f64,
    #[serde(default)]
    pub expected_duration_min: f64,
    #[serde(default, with = "opt_timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "opt_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
}

impl BatchStep {
    pub fn is_wait(&self) -> bool {
        self.kind == StepKind::Wait
    }

    /// The step's wall-clock interval, when both timestamps are known.
    pub fn interval(&self) -> Option<Interval> {
        match (&self.start_time, &self.end_time) {
            (Some(start), Some(end)) => Some(Interval::from_datetimes(start, end)),
            _ => None,
        }
    }
}

/// Consumption of one material over a batch, summed across its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMaterial {
    pub name: String,
    pub total_real: f64,
    pub total_expected: f64,
    #[serde(default)]
    pub unit: String,
}

/// A process measurement (temperature, pressure, ...) taken during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParameter {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub target: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub step_name: String,
    #[serde(default, with = "opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dfm_code: Option<String>,
}

/// One production cycle of a batch on one equipment group.
///
/// Field names on the wire follow the brewhouse export (`CHARG_NR`,
/// `TEILANL_GRUPO`, `esperado_total_min`, ...) so previously exported
/// datasets load unchanged. Collections absent from older exports default
/// to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(rename = "CHARG_NR")]
    pub batch_id: String,
    #[serde(rename = "TEILANL_GRUPO")]
    pub machine_group: String,
    #[serde(rename = "productName", default)]
    pub product_name: String,
    #[serde(default)]
    pub real_total_min: f64,
    #[serde(rename = "esperado_total_min", default)]
    pub expected_total_min: f64,
    #[serde(default)]
    pub delta_total_min: f64,
    #[serde(rename = "idle_wall_minus_sumsteps_min", default)]
    pub idle_min: f64,
    #[serde(default)]
    pub max_gap_min: f64,
    #[serde(default, with = "opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "startHour", default)]
    pub start_hour: u32,
    #[serde(default)]
    pub steps: Vec<BatchStep>,
    #[serde(default)]
    pub materials: Vec<BatchMaterial>,
    #[serde(default)]
    pub parameters: Vec<BatchParameter>,
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl BatchRecord {
    /// Intervals of the process steps that carry both timestamps.
    ///
    /// Steps whose times are reversed or non-finite are logged and left out.
    pub fn step_intervals(&self) -> Vec<Interval> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.is_wait())
            .filter_map(|(index, step)| {
                let interval = step.interval()?;
                match interval.validate(index) {
                    Ok(()) => Some(interval),
                    Err(e) => {
                        log::warn!(
                            "[brew] batch {} step {:?} skipped: {}",
                            self.batch_id,
                            step.step_name,
                            e
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Wall-clock minutes during which at least one process step was running.
    pub fn merged_step_minutes(&self) -> Result<f64, InvalidIntervalError> {
        interval::merged_duration_minutes(&self.step_intervals())
    }

    /// Full timing breakdown of the process steps.
    pub fn timing(&self) -> Result<IntervalSummary, InvalidIntervalError> {
        interval::summarize(&self.step_intervals())
    }

    /// The product name, or [`UNKNOWN_PRODUCT`] when blank.
    pub fn product_or_unknown(&self) -> &str {
        if self.product_name.is_empty() {
            UNKNOWN_PRODUCT
        } else {
            &self.product_name
        }
    }

    /// Parse a JSON array of records.
    pub fn from_json(json: &str) -> serde_json::Result<Vec<BatchRecord>> {
        serde_json::from_str(json)
    }
}

/// Borrow the records ordered by timestamp; untimed records sort first.
pub fn chronological(records: &[BatchRecord]) -> Vec<&BatchRecord> {
    let mut sorted: Vec<&BatchRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.timestamp);
    sorted
}

/// Optional timestamps that tolerate `""` and `null` on input.
pub(crate) mod opt_timestamp {
    use brew_utils::dates::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_timestamp(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brew_utils::dates::parse_timestamp;

    // Shape written by the legacy ingestion script: no steps, materials or parameters.
    const SCRIPT_EXPORT: &str = r#"[
  {
    "CHARG_NR": "1001",
    "TEILANL_GRUPO": "Cocedor 1",
    "real_total_min": 120.5,
    "esperado_total_min": 100.0,
    "delta_total_min": 20.5,
    "idle_wall_minus_sumsteps_min": 4.25,
    "timestamp": "2023-10-01T10:00:00.000Z"
  }
]"#;

    fn step(name: &str, start: &str, end: &str) -> BatchStep {
        BatchStep {
            step_name: name.to_string(),
            step_nr: String::new(),
            kind: StepKind::Process,
            duration_min: 0.0,
            expected_duration_min: 0.0,
            start_time: Some(parse_timestamp(start).unwrap()),
            end_time: Some(parse_timestamp(end).unwrap()),
        }
    }

    #[test]
    fn test_loads_script_export() {
        let records = BatchRecord::from_json(SCRIPT_EXPORT).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.batch_id, "1001");
        assert_eq!(record.machine_group, "Cocedor 1");
        assert_eq!(record.expected_total_min, 100.0);
        assert_eq!(record.idle_min, 4.25);
        assert!(record.steps.is_empty());
        assert_eq!(record.product_or_unknown(), UNKNOWN_PRODUCT);
        assert_eq!(record.timestamp, Some(parse_timestamp("2023-10-01T10:00:00Z").unwrap()));
    }

    #[test]
    fn test_empty_step_timestamps_are_none() {
        let json = r#"{"stepName":"Calentar","stepNr":"1","durationMin":60,"expectedDurationMin":50,"startTime":"","endTime":""}"#;
        let step: BatchStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.start_time, None);
        assert_eq!(step.kind, StepKind::Process);
        assert!(step.interval().is_none());
    }

    #[test]
    fn test_serializes_wire_names() {
        let records = BatchRecord::from_json(SCRIPT_EXPORT).unwrap();
        let value = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(value["CHARG_NR"], "1001");
        assert_eq!(value["esperado_total_min"], 100.0);
        assert_eq!(value["timestamp"], "2023-10-01T10:00:00.000Z");
        let back: BatchRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, records[0]);
    }

    #[test]
    fn test_merged_step_minutes_ignores_waits_and_overlap() {
        let mut record = BatchRecord::from_json(SCRIPT_EXPORT).unwrap().remove(0);
        record.steps = vec![
            step("Calentar", "2023-10-01T10:00:00Z", "2023-10-01T10:10:00Z"),
            step("Bombear", "2023-10-01T10:05:00Z", "2023-10-01T10:15:00Z"),
            step("Hervir", "2023-10-01T10:16:40Z", "2023-10-01T10:20:00Z"),
        ];
        let mut wait = step("Wait 1", "2023-10-01T10:15:00Z", "2023-10-01T10:16:40Z");
        wait.kind = StepKind::Wait;
        record.steps.push(wait);

        let minutes = record.merged_step_minutes().unwrap();
        assert!((minutes - (15.0 + 200.0 / 60.0)).abs() < 1e-9);

        let timing = record.timing().unwrap();
        assert_eq!(timing.gaps.len(), 1);
        assert!((timing.idle_minutes - 100.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_intervals_skip_reversed_steps() {
        let mut record = BatchRecord::from_json(SCRIPT_EXPORT).unwrap().remove(0);
        record.steps = vec![
            step("Calentar", "2023-10-01T10:00:00Z", "2023-10-01T10:10:00Z"),
            step("Hervir", "2023-10-01T11:00:00Z", "2023-10-01T10:30:00Z"),
        ];

        assert_eq!(record.step_intervals().len(), 1);
        assert_eq!(record.merged_step_minutes().unwrap(), 10.0);
        assert_eq!(record.timing().unwrap().idle_minutes, 0.0);
    }

    #[test]
    fn test_chronological_puts_untimed_first() {
        let mut records = BatchRecord::from_json(SCRIPT_EXPORT).unwrap();
        let mut earlier = records[0].clone();
        earlier.batch_id = "0999".to_string();
        earlier.timestamp = Some(parse_timestamp("2023-09-30T08:00:00Z").unwrap());
        let mut untimed = records[0].clone();
        untimed.batch_id = "untimed".to_string();
        untimed.timestamp = None;
        records.push(earlier);
        records.push(untimed);

        let ids: Vec<&str> = chronological(&records)
            .iter()
            .map(|r| r.batch_id.as_str())
            .collect();
        assert_eq!(ids, vec!["untimed", "0999", "1001"]);
    }
}
