//! Filters, option lists and parameter trends for comparing batches.

use brew_core::{BatchParameter, BatchRecord};
use brew_utils::dates::format_short;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Label that selects everything.
pub const FILTER_ALL: &str = "ALL";

/// A selector that either matches everything or one exact value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Only(String),
}

impl Filter {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(wanted) => wanted == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }
}

impl FromStr for Filter {
    type Err = Infallible;

    /// `"ALL"` and the empty string select everything.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.is_empty() || s == FILTER_ALL {
            Filter::All
        } else {
            Filter::Only(s.to_string())
        })
    }
}

impl From<Option<String>> for Filter {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => s.parse().unwrap_or_default(),
            None => Filter::All,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str(FILTER_ALL),
            Filter::Only(value) => f.write_str(value),
        }
    }
}

/// Whether a parameter looks like a temperature, by unit or by name.
pub fn is_temperature_param(name: &str, unit: &str) -> bool {
    let unit = unit.to_lowercase();
    unit.contains("°c") || unit.contains("temp") || name.to_lowercase().contains("temp")
}

fn has_temperature(record: &BatchRecord) -> bool {
    record
        .parameters
        .iter()
        .any(|p| is_temperature_param(&p.name, &p.unit))
}

/// Selectable values for the comparison filters, sorted and unique.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOptions {
    pub recipes: Vec<String>,
    /// Machines with at least one temperature reading.
    pub machines: Vec<String>,
    /// Batches with at least one temperature reading.
    pub batches: Vec<String>,
}

pub fn comparison_options(records: &[BatchRecord], recipe: &Filter, machine: &Filter) -> ComparisonOptions {
    let recipes: BTreeSet<&str> = records
        .iter()
        .filter(|r| machine.matches(&r.machine_group))
        .map(|r| r.product_name.as_str())
        .filter(|p| !p.is_empty())
        .collect();
    let machines: BTreeSet<&str> = records
        .iter()
        .filter(|r| recipe.matches(&r.product_name))
        .filter(|r| has_temperature(r))
        .map(|r| r.machine_group.as_str())
        .collect();
    let batches: BTreeSet<&str> = records
        .iter()
        .filter(|r| recipe.matches(&r.product_name) && machine.matches(&r.machine_group))
        .filter(|r| has_temperature(r))
        .map(|r| r.batch_id.as_str())
        .collect();

    ComparisonOptions {
        recipes: recipes.into_iter().map(String::from).collect(),
        machines: machines.into_iter().map(String::from).collect(),
        batches: batches.into_iter().map(String::from).collect(),
    }
}

/// One point of a parameter trend.
///
/// In single-batch mode `label` is the step; across batches it is the
/// batch start time.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub batch_id: String,
    pub machine: String,
    pub date: Option<DateTime<Utc>>,
}

fn trend_parameter<'a>(record: &'a BatchRecord, param: &str) -> Option<&'a BatchParameter> {
    record
        .parameters
        .iter()
        .find(|p| p.name == param)
        .or_else(|| {
            record
                .parameters
                .iter()
                .find(|p| is_temperature_param(&p.name, &p.unit))
        })
}

/// Values of `param` either across the steps of one batch or across
/// batches over time.
///
/// When `batch` selects a single batch, every reading of `param` in that
/// batch is returned, falling back to its temperature readings. Otherwise
/// each record matching the machine and recipe filters contributes one
/// point (the exact parameter or else its first temperature reading), in
/// chronological order.
pub fn trend_data(
    records: &[BatchRecord],
    machine: &Filter,
    recipe: &Filter,
    batch: &Filter,
    param: &str,
) -> Vec<TrendPoint> {
    if let Filter::Only(batch_id) = batch {
        let Some(record) = records
            .iter()
            .find(|r| &r.batch_id == batch_id && machine.matches(&r.machine_group))
        else {
            return Vec::new();
        };
        let exact: Vec<&BatchParameter> = record.parameters.iter().filter(|p| p.name == param).collect();
        let source: Vec<&BatchParameter> = if exact.is_empty() {
            record
                .parameters
                .iter()
                .filter(|p| is_temperature_param(&p.name, &p.unit))
                .collect()
        } else {
            exact
        };
        return source
            .into_iter()
            .enumerate()
            .filter(|(_, p)| p.value.is_finite())
            .map(|(i, p)| TrendPoint {
                label: if p.step_name.is_empty() {
                    format!("Step {}", i + 1)
                } else {
                    p.step_name.clone()
                },
                value: p.value,
                unit: p.unit.clone(),
                batch_id: record.batch_id.clone(),
                machine: record.machine_group.clone(),
                date: record.timestamp,
            })
            .collect();
    }

    let mut filtered: Vec<&BatchRecord> = records
        .iter()
        .filter(|r| machine.matches(&r.machine_group) && recipe.matches(&r.product_name))
        .collect();
    filtered.sort_by_key(|r| r.timestamp);
    filtered
        .into_iter()
        .filter_map(|record| {
            let p = trend_parameter(record, param)?;
            p.value.is_finite().then(|| TrendPoint {
                label: record.timestamp.as_ref().map(format_short).unwrap_or_default(),
                value: p.value,
                unit: p.unit.clone(),
                batch_id: record.batch_id.clone(),
                machine: record.machine_group.clone(),
                date: record.timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::comparison_batches;

    fn only(s: &str) -> Filter {
        Filter::Only(s.to_string())
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("ALL".parse::<Filter>().unwrap(), Filter::All);
        assert_eq!("".parse::<Filter>().unwrap(), Filter::All);
        assert_eq!("Olla".parse::<Filter>().unwrap(), only("Olla"));
        assert_eq!(Filter::from(None), Filter::All);
        assert_eq!(only("x").to_string(), "x");
        assert!(Filter::All.matches("anything"));
        assert!(!only("a").matches("b"));
    }

    #[test]
    fn test_is_temperature_param() {
        assert!(is_temperature_param("CualquierCosa", "°C"));
        assert!(is_temperature_param("Temp Fermentador", "grados"));
        assert!(is_temperature_param("Temperature 1", ""));
        assert!(!is_temperature_param("T Empe", "bar"));
        assert!(!is_temperature_param("pH", ""));
        assert!(!is_temperature_param("Presion", "bar"));
        assert!(!is_temperature_param("Volumen", "hl"));
    }

    #[test]
    fn test_options_without_filters() {
        let options = comparison_options(&comparison_batches(), &Filter::All, &Filter::All);
        assert_eq!(options.recipes, vec!["Cerveza Clara", "Cerveza Oscura"]);
        assert_eq!(options.machines, vec!["Olla de Coccion"]);
        assert_eq!(options.batches, vec!["1001", "1002"]);
    }

    #[test]
    fn test_options_narrow_with_filters() {
        let data = comparison_batches();
        let options = comparison_options(&data, &only("Cerveza Oscura"), &Filter::All);
        assert_eq!(options.machines, vec!["Olla de Coccion"]);
        assert_eq!(options.batches, vec!["1002"]);

        let options = comparison_options(&data, &Filter::All, &only("Fermentador"));
        assert_eq!(options.recipes, vec!["Cerveza Clara"]);
        assert!(options.batches.is_empty());
    }

    #[test]
    fn test_trend_for_single_batch() {
        let points = trend_data(
            &comparison_batches(),
            &only("Olla de Coccion"),
            &Filter::All,
            &only("1001"),
            "Temp Mosto",
        );
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 95.0);
        assert_eq!(points[0].label, "Calentamiento");
    }

    #[test]
    fn test_trend_across_batches() {
        let data = comparison_batches();
        let points = trend_data(&data, &only("Olla de Coccion"), &Filter::All, &Filter::All, "Temp Mosto");
        let values: Vec<(&str, f64)> = points.iter().map(|p| (p.batch_id.as_str(), p.value)).collect();
        assert_eq!(values, vec![("1001", 95.0), ("1002", 98.0)]);
        assert_eq!(points[0].label, "2023-10-01 10:00");

        let points = trend_data(
            &data,
            &only("Olla de Coccion"),
            &only("Cerveza Clara"),
            &Filter::All,
            "Temp Mosto",
        );
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].batch_id, "1001");
    }

    #[test]
    fn test_trend_skips_records_without_readings() {
        let points = trend_data(
            &comparison_batches(),
            &only("Fermentador"),
            &Filter::All,
            &Filter::All,
            "Fantasma",
        );
        assert!(points.is_empty());
    }
}
