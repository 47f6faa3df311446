//! Raw material consumption against the recipe, per product.

use crate::config::AnalysisConfig;
use brew_core::BatchRecord;
use serde::Serialize;

/// Traffic-light rating of a product's material overrun.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WasteStatus {
    Good,
    Warning,
    Danger,
    /// No expected consumption to compare against.
    NoData,
}

impl WasteStatus {
    pub fn classify(total_expected: f64, percent_deviation: f64, config: &AnalysisConfig) -> Self {
        if total_expected == 0.0 {
            WasteStatus::NoData
        } else if percent_deviation > config.waste_danger_percent {
            WasteStatus::Danger
        } else if percent_deviation > config.waste_warning_percent {
            WasteStatus::Warning
        } else {
            WasteStatus::Good
        }
    }
}

/// Real versus expected material use summed over every batch of a product.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeWaste {
    pub name: String,
    pub total_expected: f64,
    pub total_real: f64,
    /// `total_real - total_expected`
    pub delta: f64,
    /// Delta as a percentage of the expected total, 0 without an expectation.
    pub percent_deviation: f64,
    pub status: WasteStatus,
}

/// Material totals across a whole dataset.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WasteTotals {
    pub total_expected: f64,
    pub total_real: f64,
    pub delta: f64,
    pub percent_deviation: f64,
}

impl WasteTotals {
    fn add(&mut self, record: &BatchRecord) {
        for material in &record.materials {
            self.total_expected += material.total_expected;
            self.total_real += material.total_real;
        }
    }

    fn finish(mut self) -> Self {
        self.delta = self.total_real - self.total_expected;
        self.percent_deviation = if self.total_expected > 0.0 {
            self.delta / self.total_expected * 100.0
        } else {
            0.0
        };
        self
    }
}

/// Material overrun per product, worst first.
///
/// Units are not converted: every material of a product is summed as is.
/// Products tie in the order they first appear.
pub fn recipe_waste(records: &[BatchRecord], config: &AnalysisConfig) -> Vec<RecipeWaste> {
    let mut products: Vec<(&str, WasteTotals)> = Vec::new();
    for record in records {
        let name = record.product_or_unknown();
        let index = match products.iter().position(|(n, _)| *n == name) {
            Some(i) => i,
            None => {
                products.push((name, WasteTotals::default()));
                products.len() - 1
            }
        };
        products[index].1.add(record);
    }

    let mut rows: Vec<RecipeWaste> = products
        .into_iter()
        .map(|(name, totals)| {
            let totals = totals.finish();
            RecipeWaste {
                name: name.to_string(),
                status: WasteStatus::classify(totals.total_expected, totals.percent_deviation, config),
                total_expected: totals.total_expected,
                total_real: totals.total_real,
                delta: totals.delta,
                percent_deviation: totals.percent_deviation,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.percent_deviation.total_cmp(&a.percent_deviation));
    log::debug!("[brew] recipe waste over {} products", rows.len());
    rows
}

/// Material totals over every record.
pub fn total_waste(records: &[BatchRecord]) -> WasteTotals {
    let mut totals = WasteTotals::default();
    for record in records {
        totals.add(record);
    }
    totals.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batches() -> Vec<BatchRecord> {
        BatchRecord::from_json(
            r#"[
              {"CHARG_NR": "1", "TEILANL_GRUPO": "Cocedor 1", "productName": "Clara",
               "materials": [{"name": "Malta", "totalReal": 510, "totalExpected": 500, "unit": "kg"},
                             {"name": "Lupulo", "totalReal": 10, "totalExpected": 10, "unit": "kg"}]},
              {"CHARG_NR": "2", "TEILANL_GRUPO": "Cocedor 1", "productName": "Oscura",
               "materials": [{"name": "Malta", "totalReal": 420, "totalExpected": 400, "unit": "kg"}]},
              {"CHARG_NR": "2", "TEILANL_GRUPO": "Olla 1", "productName": "Oscura"},
              {"CHARG_NR": "3", "TEILANL_GRUPO": "Cocedor 1", "productName": "Clara",
               "materials": [{"name": "Malta", "totalReal": 480, "totalExpected": 490, "unit": "kg"}]},
              {"CHARG_NR": "4", "TEILANL_GRUPO": "Cocedor 1", "productName": "Roja",
               "materials": [{"name": "Malta", "totalReal": 95, "totalExpected": 100, "unit": "kg"}]},
              {"CHARG_NR": "5", "TEILANL_GRUPO": "Cocedor 1",
               "materials": [{"name": "Agua", "totalReal": 12, "totalExpected": 0, "unit": "hl"}]}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_recipe_waste_sums_materials_per_product() {
        let rows = recipe_waste(&batches(), &AnalysisConfig::default());
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Oscura", "Clara", "Unknown", "Roja"]);

        let oscura = &rows[0];
        assert_eq!(oscura.total_expected, 400.0);
        assert_eq!(oscura.delta, 20.0);
        assert_eq!(oscura.percent_deviation, 5.0);
        assert_eq!(oscura.status, WasteStatus::Warning);

        let clara = &rows[1];
        assert_eq!(clara.total_real, 1000.0);
        assert_eq!(clara.total_expected, 1000.0);
        assert_eq!(clara.status, WasteStatus::Good);

        assert_eq!(rows[2].status, WasteStatus::NoData);
        assert_eq!(rows[2].percent_deviation, 0.0);
        assert_eq!(rows[3].percent_deviation, -5.0);
        assert_eq!(rows[3].status, WasteStatus::Good);
    }

    #[test]
    fn test_waste_status_thresholds() {
        let cfg = AnalysisConfig::default();
        assert_eq!(WasteStatus::classify(100.0, 5.01, &cfg), WasteStatus::Danger);
        assert_eq!(WasteStatus::classify(100.0, 5.0, &cfg), WasteStatus::Warning);
        assert_eq!(WasteStatus::classify(100.0, 2.0, &cfg), WasteStatus::Good);
        assert_eq!(WasteStatus::classify(0.0, 50.0, &cfg), WasteStatus::NoData);

        let strict = AnalysisConfig {
            waste_warning_percent: 0.5,
            ..AnalysisConfig::default()
        };
        assert_eq!(WasteStatus::classify(100.0, 1.0, &strict), WasteStatus::Warning);
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(WasteStatus::NoData).unwrap(), "no-data");
        assert_eq!(serde_json::to_value(WasteStatus::Danger).unwrap(), "danger");
    }

    #[test]
    fn test_total_waste() {
        let totals = total_waste(&batches());
        assert_eq!(totals.total_expected, 1500.0);
        assert_eq!(totals.total_real, 1527.0);
        assert_eq!(totals.delta, 27.0);
        assert!((totals.percent_deviation - 1.8).abs() < 1e-9);

        assert_eq!(total_waste(&[]), WasteTotals::default());
    }

    #[test]
    fn test_records_without_materials() {
        let rows = recipe_waste(&crate::fixtures::comparison_batches(), &AnalysisConfig::default());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == WasteStatus::NoData));
    }
}
