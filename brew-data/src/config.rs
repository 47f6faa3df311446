use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thresholds used by the analytics.
///
/// Every field has a default, so a partial JSON object is enough to
/// override a single threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Shortest duration history considered for degradation alerts.
    pub degradation_min_samples: usize,
    /// Last-third vs first-third increase (percent) that raises an alert.
    pub degradation_min_percent: f64,
    pub degradation_max_alerts: usize,
    /// Control limits are mean ± `control_sigma` standard deviations.
    pub control_sigma: f64,
    /// Minutes a step may overrun its expected duration before it is reported.
    pub slow_step_tolerance_min: f64,
    pub major_delay_min: f64,
    /// Overrun relative to the expected duration that counts as major.
    pub major_delay_ratio: f64,
    /// Records whose total delta exceeds this are delay alerts.
    pub delay_alert_threshold_min: f64,
    pub problem_gap_min: f64,
    pub problem_delay_min: f64,
    /// Material overrun (percent of expected) above which a product is a warning.
    pub waste_warning_percent: f64,
    pub waste_danger_percent: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            degradation_min_samples: 5,
            degradation_min_percent: 5.0,
            degradation_max_alerts: 6,
            control_sigma: 3.0,
            slow_step_tolerance_min: 1.0,
            major_delay_min: 30.0,
            major_delay_ratio: 0.25,
            delay_alert_threshold_min: 30.0,
            problem_gap_min: 5.0,
            problem_delay_min: 5.0,
            waste_warning_percent: 2.0,
            waste_danger_percent: 5.0,
        }
    }
}

/// A threshold outside its usable range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisConfigError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("degradation_min_samples must be at least 2 (got {0})")]
    TooFewSamples(usize),

    #[error("degradation_max_alerts must be at least 1")]
    NoAlerts,

    #[error("control_sigma must be positive (got {0})")]
    NonPositiveSigma(f64),
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalysisConfigError> {
        let thresholds = [
            ("degradation_min_percent", self.degradation_min_percent),
            ("slow_step_tolerance_min", self.slow_step_tolerance_min),
            ("major_delay_min", self.major_delay_min),
            ("major_delay_ratio", self.major_delay_ratio),
            ("delay_alert_threshold_min", self.delay_alert_threshold_min),
            ("problem_gap_min", self.problem_gap_min),
            ("problem_delay_min", self.problem_delay_min),
            ("waste_warning_percent", self.waste_warning_percent),
            ("waste_danger_percent", self.waste_danger_percent),
        ];
        for (field, value) in thresholds {
            if value.is_nan() || value < 0.0 {
                return Err(AnalysisConfigError::Negative { field, value });
            }
        }
        if self.degradation_min_samples < 2 {
            return Err(AnalysisConfigError::TooFewSamples(self.degradation_min_samples));
        }
        if self.degradation_max_alerts == 0 {
            return Err(AnalysisConfigError::NoAlerts);
        }
        if self.control_sigma.is_nan() || self.control_sigma <= 0.0 {
            return Err(AnalysisConfigError::NonPositiveSigma(self.control_sigma));
        }
        Ok(())
    }
}
