//! Statistical process control charts for product parameters.

use brew_core::batch::chronological;
use brew_core::BatchRecord;
use brew_utils::numbers::{mean, population_std_dev, round2};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const KEY_DELIMITER: &str = " ::: ";

/// A parameter measured in a given step, e.g. `Temp Mosto ::: Calentar`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ParamKey {
    pub name: String,
    pub step: String,
}

impl ParamKey {
    pub fn new(name: impl Into<String>, step: impl Into<String>) -> Self {
        ParamKey {
            name: name.into(),
            step: step.into(),
        }
    }

    /// Parse the `name ::: step` label form. A label without the delimiter
    /// is a name with an empty step.
    pub fn parse(label: &str) -> Self {
        match label.split_once(KEY_DELIMITER) {
            Some((name, step)) => ParamKey::new(name, step),
            None => ParamKey::new(label, ""),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_DELIMITER, self.step)
    }
}

/// Products and, per product, the parameters recorded for it.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProductParameters {
    pub products: Vec<String>,
    pub parameters: BTreeMap<String, Vec<ParamKey>>,
}

pub fn product_parameters(records: &[BatchRecord]) -> ProductParameters {
    let mut parameters: BTreeMap<String, BTreeSet<ParamKey>> = BTreeMap::new();
    for record in records {
        let keys = parameters
            .entry(record.product_or_unknown().to_string())
            .or_default();
        for p in &record.parameters {
            keys.insert(ParamKey::new(p.name.as_str(), p.step_name.as_str()));
        }
    }
    ProductParameters {
        products: parameters.keys().cloned().collect(),
        parameters: parameters
            .into_iter()
            .map(|(product, keys)| (product, keys.into_iter().collect()))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ControlStats {
    pub mean: f64,
    pub sigma: f64,
    pub ucl: f64,
    pub lcl: f64,
    pub count: usize,
}

/// One batch on the chart; figures rounded to 2 decimals for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPoint {
    pub batch_id: String,
    pub value: f64,
    pub target: Option<f64>,
    pub unit: String,
    pub mean: f64,
    pub ucl: f64,
    pub lcl: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlChart {
    pub points: Vec<ControlPoint>,
    pub stats: Option<ControlStats>,
    pub out_of_control: usize,
}

/// Mean ± `sigma` population standard deviations; `None` without values.
pub fn control_limits(values: &[f64], sigma: f64) -> Option<ControlStats> {
    if values.is_empty() {
        return None;
    }
    let mean = mean(values);
    let sd = population_std_dev(values);
    Some(ControlStats {
        mean,
        sigma: sd,
        ucl: mean + sigma * sd,
        lcl: mean - sigma * sd,
        count: values.len(),
    })
}

/// Control chart of one parameter over the batches of one product, in
/// chronological order.
pub fn control_chart(records: &[BatchRecord], product: &str, key: &ParamKey, sigma: f64) -> ControlChart {
    if product.is_empty() || key.name.is_empty() {
        return ControlChart::default();
    }
    let readings: Vec<(&BatchRecord, f64, f64, &str)> = chronological(records)
        .into_iter()
        .filter(|r| r.product_or_unknown() == product)
        .filter_map(|r| {
            r.parameters
                .iter()
                .find(|p| p.name == key.name && p.step_name == key.step)
                .filter(|p| p.value.is_finite())
                .map(|p| (r, p.value, p.target, p.unit.as_str()))
        })
        .collect();

    let values: Vec<f64> = readings.iter().map(|(_, value, _, _)| *value).collect();
    let Some(stats) = control_limits(&values, sigma) else {
        return ControlChart::default();
    };

    let points: Vec<ControlPoint> = readings
        .into_iter()
        .map(|(record, value, target, unit)| ControlPoint {
            batch_id: record.batch_id.clone(),
            value: round2(value),
            target: (target != 0.0).then_some(target),
            unit: unit.to_string(),
            mean: round2(stats.mean),
            ucl: round2(stats.ucl),
            lcl: round2(stats.lcl),
            is_anomaly: value > stats.ucl || value < stats.lcl,
        })
        .collect();
    let out_of_control = points.iter().filter(|p| p.is_anomaly).count();
    log::debug!(
        "[brew] control chart: {} {} -> {} points, {} out of control",
        product,
        key,
        points.len(),
        out_of_control
    );

    ControlChart {
        points,
        stats: Some(stats),
        out_of_control,
    }
}
