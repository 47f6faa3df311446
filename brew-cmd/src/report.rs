//! Dashboard-level reports: KPIs and alerts.

use crate::config::BrewConfig;
use crate::{print_json, Dataset};
use brew_data::degradation::{degradation_alerts, DegradationAlert};
use brew_data::materials::{recipe_waste, total_waste, RecipeWaste, WasteTotals};
use brew_db::models::{
    DelayAlert, EfficiencyPoint, HighestIdle, MachineAverages, ProblematicBatch, RecipeStats,
    ShiftStats,
};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_batches: usize,
    /// Overrun as a percentage of expected time.
    pub average_cycle_deviation: f64,
    pub highest_idle: HighestIdle,
    pub machine_averages: Vec<MachineAverages>,
    pub efficiency: Vec<EfficiencyPoint>,
    pub recipes: Vec<RecipeStats>,
    pub shifts: Vec<ShiftStats>,
    /// Material use against the recipe over all batches.
    pub material_waste: WasteTotals,
    pub recipe_waste: Vec<RecipeWaste>,
}

pub fn summary(dataset: &Dataset, config: &BrewConfig) -> anyhow::Result<Summary> {
    let db = &dataset.db;
    Ok(Summary {
        total_batches: db.query_total_batches()?,
        average_cycle_deviation: db.query_average_cycle_deviation()?,
        highest_idle: db.query_machine_with_highest_idle()?,
        machine_averages: db.query_machine_averages()?,
        efficiency: db.query_efficiency()?,
        recipes: db.query_recipe_stats()?,
        shifts: db.query_shift_stats()?,
        material_waste: total_waste(&dataset.records),
        recipe_waste: recipe_waste(&dataset.records, &config.analysis),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerts {
    pub delay_threshold_min: f64,
    pub delay_alerts: Vec<DelayAlert>,
    pub degradation_alerts: Vec<DegradationAlert>,
    pub problematic_batches: Vec<ProblematicBatch>,
}

/// Delay, degradation and problem-batch alerts. `threshold` overrides the
/// configured delay alert threshold.
pub fn alerts(dataset: &Dataset, threshold: Option<f64>, config: &BrewConfig) -> anyhow::Result<Alerts> {
    let analysis = &config.analysis;
    let threshold = threshold.unwrap_or(analysis.delay_alert_threshold_min);
    Ok(Alerts {
        delay_threshold_min: threshold,
        delay_alerts: dataset.db.query_delay_alerts(threshold)?,
        degradation_alerts: degradation_alerts(&dataset.records, analysis),
        problematic_batches: dataset
            .db
            .query_problematic_batches(analysis.problem_gap_min, analysis.problem_delay_min)?,
    })
}

pub fn run_summary(data: &Path, config: &BrewConfig) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    print_json(&summary(&dataset, config)?)
}

pub fn run_alerts(data: &Path, threshold: Option<f64>, config: &BrewConfig) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    let alerts = alerts(&dataset, threshold, config)?;
    log::info!(
        "{} delay alerts, {} degradation alerts, {} problematic batches",
        alerts.delay_alerts.len(),
        alerts.degradation_alerts.len(),
        alerts.problematic_batches.len()
    );
    print_json(&alerts)
}
