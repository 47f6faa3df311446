//! Process capability (Cp / Cpk) of parameter deviations from target.

use brew_core::BatchRecord;
use brew_utils::numbers::{mean, sample_std_dev};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cpk used to order rows whose index could not be computed.
const MISSING_CPK: f64 = -999.0;

/// Lower and upper specification limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecLimits {
    pub lsl: f64,
    pub usl: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub sample_size: usize,
    pub process_mean: f64,
    pub standard_deviation: f64,
    pub lsl: f64,
    pub usl: f64,
    pub cp: Option<f64>,
    pub cpk: Option<f64>,
}

/// Cp and Cpk of `values` against the given limits, using the sample
/// standard deviation.
///
/// Both indices are `None` with fewer than two values, a zero or
/// non-finite deviation, non-finite limits, or `usl <= lsl`.
pub fn cp_cpk(values: &[f64], lsl: f64, usl: f64) -> Capability {
    let process_mean = mean(values);
    let sd = sample_std_dev(values);
    let invalid = values.len() < 2
        || sd <= 0.0
        || !sd.is_finite()
        || !lsl.is_finite()
        || !usl.is_finite()
        || usl <= lsl;

    let (cp, cpk) = if invalid {
        (None, None)
    } else {
        let cp = (usl - lsl) / (6.0 * sd);
        let upper = (usl - process_mean) / (3.0 * sd);
        let lower = (process_mean - lsl) / (3.0 * sd);
        (Some(cp), Some(upper.min(lower)))
    };

    Capability {
        sample_size: values.len(),
        process_mean,
        standard_deviation: sd,
        lsl,
        usl,
        cp,
        cpk,
    }
}

/// Narrows which parameters enter [`capability_by_parameter`].
#[derive(Debug, Clone, Default)]
pub struct CapabilityFilter {
    pub machine: Option<String>,
    pub step_name: Option<String>,
    pub parameter: Option<String>,
}

/// Capability of one parameter's deviation from target.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterCapability {
    pub parameter: String,
    pub unit: String,
    pub sample_size: usize,
    pub process_mean: f64,
    pub standard_deviation: f64,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
    pub cp: Option<f64>,
    pub cpk: Option<f64>,
    pub missing_spec: bool,
}

/// Cp/Cpk of `value - target` per parameter name.
///
/// Rows with limits come first, least capable first; parameters without
/// an entry in `specs` follow.
pub fn capability_by_parameter(
    records: &[BatchRecord],
    specs: &HashMap<String, SpecLimits>,
    filter: &CapabilityFilter,
) -> Vec<ParameterCapability> {
    let mut groups: Vec<(&str, &str, Vec<f64>)> = Vec::new();
    let params = records
        .iter()
        .filter(|r| filter.machine.as_ref().map_or(true, |m| &r.machine_group == m))
        .flat_map(|r| &r.parameters)
        .filter(|p| filter.step_name.as_ref().map_or(true, |s| &p.step_name == s))
        .filter(|p| filter.parameter.as_ref().map_or(true, |n| &p.name == n));
    for p in params {
        let delta = p.value - p.target;
        let index = match groups.iter().position(|(name, _, _)| *name == p.name) {
            Some(i) => i,
            None => {
                groups.push((p.name.as_str(), p.unit.as_str(), Vec::new()));
                groups.len() - 1
            }
        };
        if delta.is_finite() {
            groups[index].2.push(delta);
        }
    }

    let mut rows: Vec<ParameterCapability> = groups
        .into_iter()
        .map(|(name, unit, deltas)| match specs.get(name) {
            Some(spec) => {
                let cap = cp_cpk(&deltas, spec.lsl, spec.usl);
                ParameterCapability {
                    parameter: name.to_string(),
                    unit: unit.to_string(),
                    sample_size: cap.sample_size,
                    process_mean: cap.process_mean,
                    standard_deviation: cap.standard_deviation,
                    lsl: Some(cap.lsl),
                    usl: Some(cap.usl),
                    cp: cap.cp,
                    cpk: cap.cpk,
                    missing_spec: false,
                }
            }
            None => ParameterCapability {
                parameter: name.to_string(),
                unit: unit.to_string(),
                sample_size: deltas.len(),
                process_mean: mean(&deltas),
                standard_deviation: sample_std_dev(&deltas),
                lsl: None,
                usl: None,
                cp: None,
                cpk: None,
                missing_spec: true,
            },
        })
        .collect();

    rows.sort_by(|a, b| {
        a.missing_spec.cmp(&b.missing_spec).then_with(|| {
            a.cpk
                .unwrap_or(MISSING_CPK)
                .total_cmp(&b.cpk.unwrap_or(MISSING_CPK))
        })
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::comparison_batches;

    #[test]
    fn test_cp_cpk_centered_process() {
        let cap = cp_cpk(&[9.0, 10.0, 11.0], 7.0, 13.0);
        assert_eq!(cap.sample_size, 3);
        assert_eq!(cap.process_mean, 10.0);
        assert!((cap.standard_deviation - 1.0).abs() < 1e-12);
        assert!((cap.cp.unwrap() - 1.0).abs() < 1e-12);
        assert!((cap.cpk.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cpk_penalises_off_center() {
        let cap = cp_cpk(&[11.0, 12.0, 13.0], 7.0, 13.0);
        assert!((cap.cp.unwrap() - 1.0).abs() < 1e-12);
        assert!((cap.cpk.unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cp_cpk_invalid_inputs() {
        assert_eq!(cp_cpk(&[1.0], 0.0, 2.0).cp, None);
        assert_eq!(cp_cpk(&[1.0, 1.0, 1.0], 0.0, 2.0).cpk, None);
        assert_eq!(cp_cpk(&[1.0, 2.0], 2.0, 2.0).cp, None);
        assert_eq!(cp_cpk(&[1.0, 2.0], f64::NEG_INFINITY, 2.0).cp, None);
    }

    #[test]
    fn test_capability_by_parameter_orders_rows() {
        let specs = HashMap::from([(
            "Temp Mosto".to_string(),
            SpecLimits { lsl: -5.0, usl: 10.0 },
        )]);
        let rows = capability_by_parameter(&comparison_batches(), &specs, &CapabilityFilter::default());
        let names: Vec<&str> = rows.iter().map(|r| r.parameter.as_str()).collect();
        assert_eq!(names, vec!["Temp Mosto", "pH", "Presion"]);

        let temp = &rows[0];
        assert!(!temp.missing_spec);
        assert_eq!(temp.sample_size, 2);
        assert_eq!(temp.process_mean, 4.5);
        assert_eq!(temp.unit, "°C");
        assert!(temp.cpk.is_some());
        assert!(rows[1].missing_spec && rows[2].missing_spec);
    }

    #[test]
    fn test_capability_filter() {
        let filter = CapabilityFilter {
            machine: Some("Fermentador".to_string()),
            ..CapabilityFilter::default()
        };
        let rows = capability_by_parameter(&comparison_batches(), &HashMap::new(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].parameter, "Presion");
        assert!((rows[0].process_mean - 0.1).abs() < 1e-9);
        assert_eq!(rows[0].standard_deviation, 0.0);
    }
}
