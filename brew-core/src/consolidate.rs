//! Consolidation of step events into one [`BatchRecord`] per batch and
//! equipment group.

use crate::batch::{BatchMaterial, BatchParameter, BatchRecord, BatchStep, StepKind, UNKNOWN_PRODUCT};
use crate::error::Result;
use crate::event::{MeasurementKind, StepEvent};
use crate::interval::{summarize, Interval};
use brew_utils::dates::{from_millis, to_millis};
use brew_utils::numbers::round2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tunables for [`consolidate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationOptions {
    /// Idle gaps longer than this many minutes raise an alert on the record.
    pub gap_alert_min: f64,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        ConsolidationOptions { gap_alert_min: 15.0 }
    }
}

/// Group events by (batch, equipment group), preserving first-seen order.
fn group_events(events: Vec<StepEvent>) -> Vec<Vec<StepEvent>> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Vec<StepEvent>> = Vec::new();
    for event in events {
        let key = (event.batch_id.clone(), event.machine_group.clone());
        match index.get(&key) {
            Some(&i) => groups[i].push(event),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![event]);
            }
        }
    }
    groups
}

fn event_interval(event: &StepEvent) -> Option<Interval> {
    let (start, end) = (event.start.as_ref()?, event.end.as_ref()?);
    if end < start {
        log::warn!(
            "[brew] consolidate: batch {} step {:?} ends before it starts, ignoring its interval",
            event.batch_id,
            event.step_name
        );
        return None;
    }
    Some(Interval::from_datetimes(start, end))
}

fn wait_step(number: usize, gap: &Interval) -> BatchStep {
    BatchStep {
        step_name: format!("Wait {number}"),
        step_nr: String::new(),
        kind: StepKind::Wait,
        duration_min: round2(gap.duration_minutes()),
        expected_duration_min: 0.0,
        start_time: from_millis(gap.start),
        end_time: from_millis(gap.end),
    }
}

fn aggregate_materials(events: &[StepEvent]) -> Vec<BatchMaterial> {
    let mut materials: Vec<BatchMaterial> = Vec::new();
    for m in events
        .iter()
        .flat_map(|e| &e.measurements)
        .filter(|m| m.kind == MeasurementKind::Material)
    {
        match materials
            .iter_mut()
            .find(|existing| existing.name == m.name && existing.unit == m.unit)
        {
            Some(existing) => {
                existing.total_real += m.value;
                existing.total_expected += m.expected;
            }
            None => materials.push(BatchMaterial {
                name: m.name.clone(),
                total_real: m.value,
                total_expected: m.expected,
                unit: m.unit.clone(),
            }),
        }
    }
    for material in &mut materials {
        material.total_real = round2(material.total_real);
        material.total_expected = round2(material.total_expected);
    }
    materials
}

fn build_record(mut events: Vec<StepEvent>, options: &ConsolidationOptions) -> Result<BatchRecord> {
    // Stable: events without a start keep their export order ahead of timed ones.
    events.sort_by_key(|e| e.start);

    let intervals: Vec<Interval> = events.iter().filter_map(event_interval).collect();
    let summary = summarize(&intervals)?;

    let mut steps = Vec::with_capacity(events.len() + summary.gaps.len());
    let mut alerts = Vec::new();
    let mut gaps = summary.gaps.iter().peekable();
    let mut waits = 0;
    for (i, event) in events.iter().enumerate() {
        let step_name = if event.step_name.is_empty() {
            format!("Step {}", i + 1)
        } else {
            event.step_name.clone()
        };
        if let Some(start) = event.start.as_ref().map(to_millis) {
            while let Some(gap) = gaps.next_if(|gap| gap.end <= start) {
                waits += 1;
                steps.push(wait_step(waits, gap));
                let gap_min = gap.duration_minutes();
                if gap_min > options.gap_alert_min {
                    alerts.push(format!("Wait of {} min before {}", gap_min.round(), step_name));
                }
            }
        }
        // A reversed step keeps its durations but carries no wall-clock times.
        let reversed = matches!((event.start, event.end), (Some(s), Some(e)) if e < s);
        steps.push(BatchStep {
            step_name,
            step_nr: event.step_nr.clone(),
            kind: StepKind::Process,
            duration_min: round2(event.real_min),
            expected_duration_min: round2(event.expected_min),
            start_time: if reversed { None } else { event.start },
            end_time: if reversed { None } else { event.end },
        });
    }

    let parameters = events
        .iter()
        .enumerate()
        .flat_map(|(i, event)| {
            event
                .measurements
                .iter()
                .filter(|m| m.kind == MeasurementKind::Parameter)
                .map(move |m| BatchParameter {
                    name: m.name.clone(),
                    value: m.value,
                    target: m.expected,
                    unit: m.unit.clone(),
                    step_name: if event.step_name.is_empty() {
                        format!("Step {}", i + 1)
                    } else {
                        event.step_name.clone()
                    },
                    timestamp: event.start,
                    dfm_code: Some(m.dfm_code.clone()),
                })
        })
        .collect();

    let real: f64 = events.iter().map(|e| e.real_min).sum();
    let expected: f64 = events.iter().map(|e| e.expected_min).sum();
    let first_timed = events.iter().find(|e| e.start.is_some());
    let product_name = events
        .iter()
        .map(|e| e.product_name.as_str())
        .find(|p| !p.is_empty())
        .unwrap_or(UNKNOWN_PRODUCT)
        .to_string();

    Ok(BatchRecord {
        batch_id: events[0].batch_id.clone(),
        machine_group: events[0].machine_group.clone(),
        product_name,
        real_total_min: round2(real),
        expected_total_min: round2(expected),
        delta_total_min: round2(real - expected),
        idle_min: round2(summary.idle_minutes),
        max_gap_min: round2(summary.max_gap_minutes),
        timestamp: first_timed.and_then(|e| e.start),
        start_hour: first_timed.unwrap_or(&events[0]).start_hour,
        materials: aggregate_materials(&events),
        parameters,
        steps,
        alerts,
    })
}

/// Consolidate parsed step events into batch records.
///
/// One record is produced per (batch, equipment group), in the order the
/// groups first appear. Idle time between the merged step intervals is
/// inserted as `Wait n` steps.
pub fn consolidate(events: Vec<StepEvent>, options: &ConsolidationOptions) -> Result<Vec<BatchRecord>> {
    let event_count = events.len();
    let records = group_events(events)
        .into_iter()
        .map(|group| build_record(group, options))
        .collect::<Result<Vec<_>>>()?;
    log::info!(
        "[brew] consolidate: {} records from {} step events",
        records.len(),
        event_count
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Measurement;
    use brew_utils::dates::parse_timestamp;

    fn event(batch: &str, machine: &str, step: &str, start: &str, end: &str, real: f64, expected: f64) -> StepEvent {
        StepEvent {
            batch_id: batch.to_string(),
            machine_group: machine.to_string(),
            step_name: step.to_string(),
            step_nr: String::new(),
            product_name: "Clara".to_string(),
            start: Some(parse_timestamp(start).unwrap()),
            end: Some(parse_timestamp(end).unwrap()),
            start_hour: parse_timestamp(start).unwrap().format("%H").to_string().parse().unwrap(),
            expected_min: expected,
            real_min: real,
            measurements: Vec::new(),
        }
    }

    fn measurement(kind: MeasurementKind, name: &str, value: f64, expected: f64, unit: &str) -> Measurement {
        Measurement {
            kind,
            name: name.to_string(),
            value,
            expected,
            unit: unit.to_string(),
            dfm_code: "DFM1".to_string(),
        }
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let events = vec![
            event("2", "Cocedor 1", "A", "2023-10-01T08:00:00Z", "2023-10-01T08:10:00Z", 10.0, 10.0),
            event("1", "Cocedor 1", "A", "2023-10-01T06:00:00Z", "2023-10-01T06:10:00Z", 10.0, 10.0),
            event("2", "Olla 1", "B", "2023-10-01T09:00:00Z", "2023-10-01T09:10:00Z", 10.0, 10.0),
            event("2", "Cocedor 1", "C", "2023-10-01T08:10:00Z", "2023-10-01T08:20:00Z", 10.0, 8.0),
        ];
        let records = consolidate(events, &ConsolidationOptions::default()).unwrap();
        let keys: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.batch_id.as_str(), r.machine_group.as_str()))
            .collect();
        assert_eq!(keys, vec![("2", "Cocedor 1"), ("1", "Cocedor 1"), ("2", "Olla 1")]);
        assert_eq!(records[0].steps.len(), 2);
        assert_eq!(records[0].real_total_min, 20.0);
        assert_eq!(records[0].delta_total_min, 2.0);
        assert_eq!(records[0].idle_min, 0.0);
    }

    #[test]
    fn test_inserts_wait_steps_and_alerts() {
        let events = vec![
            event("1", "Cocedor 1", "Hervir", "2023-10-01T07:00:00Z", "2023-10-01T07:30:00Z", 30.0, 30.0),
            event("1", "Cocedor 1", "Calentar", "2023-10-01T06:00:00Z", "2023-10-01T06:40:00Z", 40.0, 35.0),
            event("1", "Cocedor 1", "Bombear", "2023-10-01T06:30:00Z", "2023-10-01T06:50:00Z", 20.0, 20.0),
            event("1", "Cocedor 1", "Enfriar", "2023-10-01T07:35:00Z", "2023-10-01T07:45:00Z", 10.0, 10.0),
        ];
        let record = consolidate(events, &ConsolidationOptions::default()).unwrap().remove(0);

        let names: Vec<&str> = record.steps.iter().map(|s| s.step_name.as_str()).collect();
        assert_eq!(names, vec!["Calentar", "Bombear", "Wait 1", "Hervir", "Wait 2", "Enfriar"]);
        assert!(record.steps[2].is_wait());
        assert_eq!(record.steps[2].duration_min, 10.0);
        assert_eq!(record.idle_min, 15.0);
        assert_eq!(record.max_gap_min, 10.0);
        assert!(record.alerts.is_empty());
        assert_eq!(record.start_hour, 6);
        assert_eq!(record.timestamp, Some(parse_timestamp("2023-10-01T06:00:00Z").unwrap()));

        let strict = ConsolidationOptions { gap_alert_min: 5.0 };
        let events = vec![
            event("1", "Cocedor 1", "Calentar", "2023-10-01T06:00:00Z", "2023-10-01T06:40:00Z", 40.0, 35.0),
            event("1", "Cocedor 1", "Hervir", "2023-10-01T06:47:30Z", "2023-10-01T07:00:00Z", 12.5, 10.0),
        ];
        let record = consolidate(events, &strict).unwrap().remove(0);
        assert_eq!(record.alerts, vec!["Wait of 8 min before Hervir".to_string()]);
    }

    #[test]
    fn test_aggregates_materials_and_lists_parameters() {
        let mut first = event("1", "Cocedor 1", "", "2023-10-01T06:00:00Z", "2023-10-01T06:10:00Z", 10.0, 10.0);
        first.measurements = vec![
            measurement(MeasurementKind::Material, "Malta", 500.0, 480.0, "kg"),
            measurement(MeasurementKind::Parameter, "Temp", 72.0, 70.0, "°c"),
        ];
        let mut second = event("1", "Cocedor 1", "Hervir", "2023-10-01T06:10:00Z", "2023-10-01T06:20:00Z", 10.0, 10.0);
        second.measurements = vec![
            measurement(MeasurementKind::Material, "Malta", 100.5, 120.0, "kg"),
            measurement(MeasurementKind::Material, "Malta", 2.0, 2.0, "hl"),
        ];
        let record = consolidate(vec![first, second], &ConsolidationOptions::default())
            .unwrap()
            .remove(0);

        assert_eq!(record.materials.len(), 2);
        assert_eq!(record.materials[0].total_real, 600.5);
        assert_eq!(record.materials[0].total_expected, 600.0);
        assert_eq!(record.materials[1].unit, "hl");
        assert_eq!(record.parameters.len(), 1);
        assert_eq!(record.parameters[0].step_name, "Step 1");
        assert_eq!(record.parameters[0].target, 70.0);
        assert_eq!(record.steps[0].step_name, "Step 1");
    }

    #[test]
    fn test_untimed_and_reversed_events() {
        let mut untimed = event("7", "Olla 1", "Limpiar", "2023-10-01T06:00:00Z", "2023-10-01T06:10:00Z", 5.0, 5.0);
        untimed.start = None;
        untimed.end = None;
        untimed.product_name = String::new();
        let mut reversed = event("7", "Olla 1", "Hervir", "2023-10-01T09:00:00Z", "2023-10-01T08:00:00Z", 60.0, 60.0);
        reversed.product_name = String::new();
        let record = consolidate(vec![reversed, untimed], &ConsolidationOptions::default())
            .unwrap()
            .remove(0);

        assert_eq!(record.steps[0].step_name, "Limpiar");
        assert_eq!(record.idle_min, 0.0);
        assert_eq!(record.product_name, UNKNOWN_PRODUCT);
        assert_eq!(record.real_total_min, 65.0);

        let hervir = &record.steps[1];
        assert_eq!(hervir.step_name, "Hervir");
        assert_eq!(hervir.duration_min, 60.0);
        assert_eq!(hervir.start_time, None);
        assert_eq!(hervir.end_time, None);
    }

    #[test]
    fn test_reversed_step_keeps_record_timing_valid() {
        let events = vec![
            event("8", "Cocedor 1", "Calentar", "2023-10-01T07:00:00Z", "2023-10-01T07:30:00Z", 30.0, 30.0),
            event("8", "Cocedor 1", "Hervir", "2023-10-01T09:00:00Z", "2023-10-01T08:00:00Z", 60.0, 60.0),
        ];
        let record = consolidate(events, &ConsolidationOptions::default())
            .unwrap()
            .remove(0);

        assert_eq!(record.step_intervals().len(), 1);
        let timing = record.timing().unwrap();
        assert_eq!(timing.merged_minutes, 30.0);
        assert_eq!(timing.idle_minutes, record.idle_min);
    }

    #[test]
    fn test_empty_input() {
        assert!(consolidate(Vec::new(), &ConsolidationOptions::default())
            .unwrap()
            .is_empty());
    }
}
