//! Detection of steps whose duration keeps growing from batch to batch.

use crate::config::AnalysisConfig;
use brew_core::batch::chronological;
use brew_core::BatchRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Machine name used when a record carries none.
pub const UNKNOWN_MACHINE: &str = "Unknown";

/// A (machine, step) whose duration is trending upwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DegradationAlert {
    pub machine: String,
    pub step_name: String,
    /// Least-squares slope, minutes per batch.
    pub slope: f64,
    /// Mean duration over the most recent third of the history.
    pub recent_avg: f64,
    pub percent_increase: f64,
}

/// Least-squares slope of `values` against their index.
pub fn regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }
    (n * sum_xy - sum_x * sum_y) / (n * sum_xx - sum_x * sum_x).max(1.0)
}

/// Mean of the last third and percent change against the first third.
///
/// Both windows hold `max(1, n / 3)` values.
pub fn period_averages(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let third = (values.len() / 3).max(1);
    let first = values[..third].iter().sum::<f64>() / third as f64;
    let last = values[values.len() - third..].iter().sum::<f64>() / third as f64;
    let percent = if first > 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };
    (last, percent)
}

/// Duration histories per (machine, step), in chronological batch order.
fn step_histories(records: &[BatchRecord]) -> BTreeMap<(String, String), Vec<f64>> {
    let mut histories: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for record in chronological(records) {
        let machine = if record.machine_group.is_empty() {
            UNKNOWN_MACHINE
        } else {
            record.machine_group.as_str()
        };
        for step in record.steps.iter().filter(|s| !s.is_wait()) {
            histories
                .entry((machine.to_string(), step.step_name.clone()))
                .or_default()
                .push(step.duration_min);
        }
    }
    histories
}

/// Steps that are getting slower, worst first.
pub fn degradation_alerts(records: &[BatchRecord], config: &AnalysisConfig) -> Vec<DegradationAlert> {
    let mut alerts: Vec<DegradationAlert> = step_histories(records)
        .into_iter()
        .filter(|(_, durations)| durations.len() >= config.degradation_min_samples)
        .filter_map(|((machine, step_name), durations)| {
            let slope = regression_slope(&durations);
            let (recent_avg, percent_increase) = period_averages(&durations);
            (percent_increase > config.degradation_min_percent && slope > 0.0).then(|| {
                DegradationAlert {
                    machine,
                    step_name,
                    slope,
                    recent_avg,
                    percent_increase,
                }
            })
        })
        .collect();
    alerts.sort_by(|a, b| b.percent_increase.total_cmp(&a.percent_increase));
    alerts.truncate(config.degradation_max_alerts);
    log::info!("[brew] degradation: {} alerts", alerts.len());
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::degrading_batches;

    #[test]
    fn test_alert_on_growing_durations() {
        let alerts = degradation_alerts(&degrading_batches(), &AnalysisConfig::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].machine, "macerador");
        assert_eq!(alerts[0].step_name, "Step1");
        assert!(alerts[0].slope > 0.0);
        assert!((alerts[0].percent_increase - 120.0).abs() < 1e-9);
        assert_eq!(alerts[0].recent_avg, 22.0);
    }

    #[test]
    fn test_needs_min_samples() {
        let batches = degrading_batches();
        assert!(degradation_alerts(&batches[..4], &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn test_order_of_input_does_not_matter() {
        let mut batches = degrading_batches();
        batches.reverse();
        let alerts = degradation_alerts(&batches, &AnalysisConfig::default());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].slope > 0.0);
    }

    #[test]
    fn test_regression_slope() {
        assert!((regression_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert_eq!(regression_slope(&[5.0, 5.0, 5.0]), 0.0);
        assert!(regression_slope(&[4.0, 3.0, 2.0]) < 0.0);
    }

    #[test]
    fn test_period_averages() {
        let (last, percent) = period_averages(&[10.0, 10.0, 10.0, 12.0, 12.0, 12.0]);
        assert_eq!(last, 12.0);
        assert!((percent - 20.0).abs() < 1e-9);
        assert_eq!(period_averages(&[0.0, 3.0]), (3.0, 0.0));
    }
}
