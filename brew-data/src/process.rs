//! Step-level views of a batch: merged steps, the full process across
//! machines, anomalies and timing.

use crate::config::AnalysisConfig;
use brew_core::{BatchRecord, BatchStep, InvalidIntervalError, Interval};
use brew_utils::numbers::round2;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Label of the neighbour before the first step.
pub const START_LABEL: &str = "Start";
/// Label of the neighbour after the last step.
pub const END_LABEL: &str = "End";

/// Collapse runs of adjacent steps with the same name, summing durations.
pub fn merge_consecutive_steps(steps: &[BatchStep]) -> Vec<BatchStep> {
    let mut merged: Vec<BatchStep> = Vec::with_capacity(steps.len());
    for step in steps {
        match merged.last_mut() {
            Some(last) if last.step_name == step.step_name => {
                last.duration_min += step.duration_min;
                last.expected_duration_min += step.expected_duration_min;
                if step.end_time.is_some() {
                    last.end_time = step.end_time;
                }
            }
            _ => merged.push(step.clone()),
        }
    }
    merged
}

/// A merged step of one batch, tagged with its machine.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub machine: String,
    /// `"{machine} - {step}"`
    pub label: String,
    #[serde(flatten)]
    pub step: BatchStep,
}

/// Every merged step of `batch_id` across its machines, machines in
/// chronological order.
pub fn full_process(records: &[BatchRecord], batch_id: &str) -> Vec<ProcessStep> {
    let mut batch: Vec<&BatchRecord> = records.iter().filter(|r| r.batch_id == batch_id).collect();
    batch.sort_by_key(|r| r.timestamp);
    batch
        .into_iter()
        .flat_map(|record| {
            merge_consecutive_steps(&record.steps)
                .into_iter()
                .map(move |step| ProcessStep {
                    machine: record.machine_group.clone(),
                    label: format!("{} - {}", record.machine_group, step.step_name),
                    step,
                })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Idle time between steps.
    Gap,
    /// A step that overran its expected duration.
    Delay,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    /// Position of the step among the merged steps.
    pub index: usize,
    pub kind: AnomalyKind,
    pub name: String,
    pub duration: f64,
    pub expected: f64,
    /// Overrun in minutes; 0 for gaps.
    pub delta: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub prev_step: String,
    pub next_step: String,
}

impl Anomaly {
    /// Minutes lost: gap length or overrun.
    pub fn severity_minutes(&self) -> f64 {
        match self.kind {
            AnomalyKind::Gap => self.duration,
            AnomalyKind::Delay => self.delta,
        }
    }
}

/// Gaps and slow steps of one record, worst first.
///
/// A step is slow when it has an expected duration and ran more than
/// `slow_step_tolerance_min` past it.
pub fn anomaly_report(record: &BatchRecord, config: &AnalysisConfig) -> Vec<Anomaly> {
    let steps = merge_consecutive_steps(&record.steps);
    let mut anomalies: Vec<Anomaly> = steps
        .iter()
        .enumerate()
        .filter_map(|(index, step)| {
            let is_gap = step.is_wait();
            let is_slow = !is_gap
                && step.expected_duration_min > 0.0
                && step.duration_min > step.expected_duration_min + config.slow_step_tolerance_min;
            if !is_gap && !is_slow {
                return None;
            }
            Some(Anomaly {
                index,
                kind: if is_gap { AnomalyKind::Gap } else { AnomalyKind::Delay },
                name: step.step_name.clone(),
                duration: step.duration_min,
                expected: step.expected_duration_min,
                delta: if is_slow {
                    round2(step.duration_min - step.expected_duration_min)
                } else {
                    0.0
                },
                start_time: step.start_time,
                prev_step: index
                    .checked_sub(1)
                    .map_or(START_LABEL, |i| steps[i].step_name.as_str())
                    .to_string(),
                next_step: steps
                    .get(index + 1)
                    .map_or(END_LABEL, |s| s.step_name.as_str())
                    .to_string(),
            })
        })
        .collect();
    anomalies.sort_by(|a, b| b.severity_minutes().total_cmp(&a.severity_minutes()));
    anomalies
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DelaySeverity {
    OnTime,
    Minor,
    Major,
}

/// Classify an overrun of `delta` minutes on an `expected`-minute cycle.
pub fn classify_delay(delta: f64, expected: f64, config: &AnalysisConfig) -> DelaySeverity {
    if delta.is_nan() || delta <= 0.0 {
        return DelaySeverity::OnTime;
    }
    let relative_major = expected > 0.0 && delta / expected > config.major_delay_ratio;
    if delta > config.major_delay_min || relative_major {
        DelaySeverity::Major
    } else {
        DelaySeverity::Minor
    }
}

/// Timing breakdown of one record.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchTiming {
    pub batch_id: String,
    pub machine: String,
    /// Wall-clock minutes with at least one step running.
    pub merged_step_min: f64,
    /// Plain sum of the timed step durations.
    pub naive_step_min: f64,
    pub overlap_min: f64,
    pub idle_min: f64,
    pub max_gap_min: f64,
    pub gaps: Vec<Interval>,
    pub real_total_min: f64,
    pub expected_total_min: f64,
    pub delta_total_min: f64,
    pub severity: DelaySeverity,
}

/// Merge the record's step intervals and classify its delay.
///
/// Records without timed steps keep the idle figures they were loaded with.
pub fn batch_timing(record: &BatchRecord, config: &AnalysisConfig) -> Result<BatchTiming, InvalidIntervalError> {
    let summary = record.timing()?;
    let timed = !summary.spans.is_empty();
    Ok(BatchTiming {
        batch_id: record.batch_id.clone(),
        machine: record.machine_group.clone(),
        merged_step_min: round2(summary.merged_minutes),
        naive_step_min: round2(summary.naive_minutes),
        overlap_min: round2(summary.overlap_minutes),
        idle_min: if timed { round2(summary.idle_minutes) } else { record.idle_min },
        max_gap_min: if timed {
            round2(summary.max_gap_minutes)
        } else {
            record.max_gap_min
        },
        gaps: summary.gaps,
        real_total_min: record.real_total_min,
        expected_total_min: record.expected_total_min,
        delta_total_min: record.delta_total_min,
        severity: classify_delay(record.delta_total_min, record.expected_total_min, config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brew_core::consolidate::{consolidate, ConsolidationOptions};
    use brew_core::event::StepEvent;
    use brew_core::StepKind;
    use brew_utils::dates::parse_timestamp;

    fn step(name: &str, duration: f64, expected: f64) -> BatchStep {
        BatchStep {
            step_name: name.to_string(),
            step_nr: String::new(),
            kind: StepKind::Process,
            duration_min: duration,
            expected_duration_min: expected,
            start_time: None,
            end_time: None,
        }
    }

    fn timed(name: &str, start: &str, end: &str) -> BatchStep {
        let start = parse_timestamp(start).unwrap();
        let end = parse_timestamp(end).unwrap();
        BatchStep {
            start_time: Some(start),
            end_time: Some(end),
            ..step(name, (end - start).num_minutes() as f64, 0.0)
        }
    }

    fn wait(name: &str, duration: f64) -> BatchStep {
        BatchStep {
            kind: StepKind::Wait,
            ..step(name, duration, 0.0)
        }
    }

    fn record(batch: &str, machine: &str, timestamp: &str, steps: Vec<BatchStep>) -> BatchRecord {
        let mut record = BatchRecord::from_json(&format!(
            r#"[{{"CHARG_NR":"{batch}","TEILANL_GRUPO":"{machine}","timestamp":"{timestamp}"}}]"#
        ))
        .unwrap()
        .remove(0);
        record.steps = steps;
        record
    }

    #[test]
    fn test_merge_consecutive_steps() {
        let steps = vec![step("Calentar", 10.0, 8.0), step("Calentar", 5.0, 4.0), step("Hervir", 60.0, 60.0), step("Calentar", 1.0, 1.0)];
        let merged = merge_consecutive_steps(&steps);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].duration_min, 15.0);
        assert_eq!(merged[0].expected_duration_min, 12.0);
        assert_eq!(merged[2].step_name, "Calentar");
        assert_eq!(steps[0].duration_min, 10.0);
    }

    #[test]
    fn test_full_process_orders_machines() {
        let records = vec![
            record("1", "Olla 1", "2023-10-01T09:00:00Z", vec![step("Hervir", 60.0, 60.0)]),
            record("1", "Cocedor 1", "2023-10-01T06:00:00Z", vec![step("Calentar", 10.0, 10.0), step("Calentar", 5.0, 5.0)]),
            record("2", "Cocedor 1", "2023-10-01T05:00:00Z", vec![step("Otro", 1.0, 1.0)]),
        ];
        let process = full_process(&records, "1");
        let labels: Vec<&str> = process.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Cocedor 1 - Calentar", "Olla 1 - Hervir"]);
        assert_eq!(process[0].step.duration_min, 15.0);
        assert_eq!(process[0].machine, "Cocedor 1");
    }

    #[test]
    fn test_anomaly_report() {
        let r = record(
            "1",
            "Cocedor 1",
            "2023-10-01T06:00:00Z",
            vec![
                step("Calentar", 12.0, 10.0),
                wait("Wait 1", 4.0),
                step("Hervir", 60.5, 60.0),
                step("Enfriar", 30.0, 20.0),
            ],
        );
        let report = anomaly_report(&r, &AnalysisConfig::default());
        assert_eq!(report.len(), 3);

        assert_eq!(report[0].name, "Enfriar");
        assert_eq!(report[0].kind, AnomalyKind::Delay);
        assert_eq!(report[0].delta, 10.0);
        assert_eq!(report[0].prev_step, "Hervir");
        assert_eq!(report[0].next_step, END_LABEL);

        assert_eq!(report[1].kind, AnomalyKind::Gap);
        assert_eq!(report[1].delta, 0.0);
        assert_eq!(report[1].prev_step, "Calentar");

        assert_eq!(report[2].name, "Calentar");
        assert_eq!(report[2].prev_step, START_LABEL);
    }

    #[test]
    fn test_classify_delay() {
        let cfg = AnalysisConfig::default();
        assert_eq!(classify_delay(0.0, 100.0, &cfg), DelaySeverity::OnTime);
        assert_eq!(classify_delay(-5.0, 100.0, &cfg), DelaySeverity::OnTime);
        assert_eq!(classify_delay(10.0, 100.0, &cfg), DelaySeverity::Minor);
        assert_eq!(classify_delay(31.0, 1000.0, &cfg), DelaySeverity::Major);
        assert_eq!(classify_delay(10.0, 20.0, &cfg), DelaySeverity::Major);
        assert_eq!(classify_delay(10.0, 0.0, &cfg), DelaySeverity::Minor);
    }

    #[test]
    fn test_batch_timing_merges_overlap() {
        let mut r = record(
            "1",
            "Cocedor 1",
            "2023-10-01T10:00:00Z",
            vec![
                timed("Calentar", "2023-10-01T10:00:00Z", "2023-10-01T10:10:00Z"),
                timed("Bombear", "2023-10-01T10:05:00Z", "2023-10-01T10:15:00Z"),
                timed("Hervir", "2023-10-01T10:16:40Z", "2023-10-01T10:20:00Z"),
            ],
        );
        r.expected_total_min = 20.0;
        r.delta_total_min = 8.0;

        let timing = batch_timing(&r, &AnalysisConfig::default()).unwrap();
        assert_eq!(timing.merged_step_min, 18.33);
        assert_eq!(timing.overlap_min, 5.0);
        assert_eq!(timing.idle_min, 1.67);
        assert_eq!(timing.gaps.len(), 1);
        assert_eq!(timing.severity, DelaySeverity::Major);
    }

    #[test]
    fn test_batch_timing_without_timestamps() {
        let mut r = record("1", "Cocedor 1", "2023-10-01T10:00:00Z", vec![step("Calentar", 10.0, 10.0)]);
        r.idle_min = 4.25;
        let timing = batch_timing(&r, &AnalysisConfig::default()).unwrap();
        assert_eq!(timing.idle_min, 4.25);
        assert_eq!(timing.merged_step_min, 0.0);
        assert_eq!(timing.severity, DelaySeverity::OnTime);
    }

    #[test]
    fn test_batch_timing_after_ingesting_reversed_step() {
        let export = "\
CHARG_NR,TEILANL,GOP_NAME,GOP_NR,REZEPT,SW_ZEIT,IW_ZEIT,SZ_JAHR,SZ_MONAT,SZ_TAG,SZ_STUNDE,SZ_MINUTE,SZ_SEKUNDE,EZ_JAHR,EZ_MONAT,EZ_TAG,EZ_STUNDE,EZ_MINUTE,EZ_SEKUNDE
2001,Cocedor 1,Calentar,1,Clara,1800,1800,23,10,1,7,0,0,23,10,1,7,30,0
2001,Cocedor 1,Hervir,2,Clara,3600,3600,23,10,1,9,0,0,23,10,1,8,0,0
";
        let events = StepEvent::from_csv(export).unwrap();
        let records = consolidate(events, &ConsolidationOptions::default()).unwrap();
        assert_eq!(records.len(), 1);

        let timing = batch_timing(&records[0], &AnalysisConfig::default()).unwrap();
        assert_eq!(timing.merged_step_min, 30.0);
        assert_eq!(timing.idle_min, 0.0);
        assert_eq!(timing.real_total_min, 90.0);
    }
}
