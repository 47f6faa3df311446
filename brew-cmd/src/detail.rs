//! Per-batch and per-parameter views, and the persisted selection.

use crate::config::BrewConfig;
use crate::{print_json, Dataset};
use brew_core::storage::{load_dataset, save_dataset, Storage};
use brew_core::{BatchMaterial, BatchParameter, BatchRecord, BatchStep};
use brew_data::capability::{capability_by_parameter, CapabilityFilter, ParameterCapability, SpecLimits};
use brew_data::comparison::{comparison_options, trend_data, ComparisonOptions, TrendPoint};
use brew_data::control_chart::{control_chart, ParamKey};
use brew_data::process::{
    anomaly_report, batch_timing, full_process, merge_consecutive_steps, Anomaly, BatchTiming,
    ProcessStep,
};
use brew_data::selection::{
    batch_product_map, filtered_batches, machines_for_batch, unique_recipes, Selection,
    SelectionStore,
};
use brew_data::Filter;
use brew_db::Database;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

// ───────────────────── Batch ─────────────────────

/// One equipment group's share of a batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDetail {
    pub machine: String,
    pub product: String,
    pub timing: BatchTiming,
    /// Steps with adjacent repeats of the same step merged.
    pub steps: Vec<BatchStep>,
    pub anomalies: Vec<Anomaly>,
    pub materials: Vec<BatchMaterial>,
    pub parameters: Vec<BatchParameter>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetail {
    pub batch_id: String,
    pub machines: Vec<MachineDetail>,
    /// Steps across all machines, machines in chronological order.
    pub full_process: Vec<ProcessStep>,
}

pub fn batch_detail(
    dataset: &Dataset,
    batch_id: &str,
    machine: Option<&str>,
    config: &BrewConfig,
) -> anyhow::Result<BatchDetail> {
    let db = &dataset.db;
    let available = db.query_batch_machines(batch_id)?;
    if available.is_empty() {
        anyhow::bail!("Batch {} not found", batch_id);
    }
    let selected: Vec<String> = match machine {
        Some(m) if available.iter().any(|a| a == m) => vec![m.to_string()],
        Some(m) => anyhow::bail!(
            "Batch {} did not run on {} (available: {})",
            batch_id,
            m,
            available.join(", ")
        ),
        None => available,
    };

    let mut machines = Vec::with_capacity(selected.len());
    for machine in &selected {
        let Some(record) = db.query_batch(batch_id, machine)? else {
            continue;
        };
        machines.push(MachineDetail {
            machine: record.machine_group.clone(),
            product: record.product_or_unknown().to_string(),
            timing: batch_timing(&record, &config.analysis)?,
            steps: merge_consecutive_steps(&record.steps),
            anomalies: anomaly_report(&record, &config.analysis),
            materials: record.materials,
            parameters: record.parameters,
            alerts: record.alerts,
        });
    }

    Ok(BatchDetail {
        batch_id: batch_id.to_string(),
        machines,
        full_process: full_process(&dataset.records, batch_id),
    })
}

pub fn run_batch(
    data: &Path,
    batch_id: &str,
    machine: Option<&str>,
    config: &BrewConfig,
) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    print_json(&batch_detail(&dataset, batch_id, machine, config)?)
}

// ───────────────────── Parameters ─────────────────────

pub fn run_control_chart(
    data: &Path,
    product: &str,
    param: &str,
    step: &str,
    config: &BrewConfig,
) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    let key = ParamKey::new(param, step);
    let chart = control_chart(&dataset.records, product, &key, config.analysis.control_sigma);
    if chart.points.is_empty() {
        warn!("No readings of {} for product {}", key, product);
    }
    print_json(&chart)
}

/// Read a JSON object of parameter name to specification limits.
pub fn read_specs(json: &str) -> anyhow::Result<HashMap<String, SpecLimits>> {
    Ok(serde_json::from_str(json)?)
}

pub fn capability(
    dataset: &Dataset,
    specs: &HashMap<String, SpecLimits>,
    filter: &CapabilityFilter,
) -> Vec<ParameterCapability> {
    let rows = capability_by_parameter(&dataset.records, specs, filter);
    let missing = rows.iter().filter(|r| r.missing_spec).count();
    if missing > 0 {
        info!("{} parameters have no specification limits", missing);
    }
    rows
}

pub fn run_capability(data: &Path, specs: &Path, filter: CapabilityFilter) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    let json = std::fs::read_to_string(specs)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", specs.display(), e))?;
    let specs = read_specs(&json)?;
    print_json(&capability(&dataset, &specs, &filter))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub options: ComparisonOptions,
    pub points: Vec<TrendPoint>,
}

pub fn trend(dataset: &Dataset, param: &str, machine: &Filter, recipe: &Filter, batch: &Filter) -> Trend {
    Trend {
        options: comparison_options(&dataset.records, recipe, machine),
        points: trend_data(&dataset.records, machine, recipe, batch, param),
    }
}

pub fn run_trend(
    data: &Path,
    param: &str,
    machine: Filter,
    recipe: Filter,
    batch: Filter,
) -> anyhow::Result<()> {
    let dataset = Dataset::open(data)?;
    print_json(&trend(&dataset, param, &machine, &recipe, &batch))
}

// ───────────────────── Selection ─────────────────────

/// The reconciled selection with the choices available for each field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub selection: Selection,
    /// Product of the selected batch.
    pub product: Option<String>,
    pub recipes: Vec<String>,
    pub batches: Vec<String>,
    pub machines: Vec<String>,
}

/// Apply the requested changes to the stored selection and reconcile it.
///
/// When `records` is given it replaces the dataset saved in `storage`;
/// otherwise the saved dataset is used.
pub fn select<S: Storage + ?Sized>(
    storage: &S,
    records: Option<&[BatchRecord]>,
    recipe: Option<&str>,
    batch: Option<&str>,
    machine: Option<&str>,
) -> anyhow::Result<SelectionView> {
    let records = match records {
        Some(records) => {
            save_dataset(storage, records)?;
            records.to_vec()
        }
        None => load_dataset(storage)?,
    };
    if records.is_empty() {
        warn!("No batch records available for selection");
    }

    let store = SelectionStore::new(storage);
    if let Some(recipe) = recipe {
        store.set_recipe(&recipe.parse::<Filter>().unwrap_or_default())?;
    }
    if let Some(batch) = batch {
        store.set_batch(batch)?;
    }
    if let Some(machine) = machine {
        store.set_machine(machine)?;
    }
    let selection = store.reconcile(&records)?;

    Ok(SelectionView {
        product: batch_product_map(&records).remove(&selection.batch_id),
        recipes: unique_recipes(&records),
        batches: filtered_batches(&records, &selection.recipe),
        machines: machines_for_batch(&records, &selection.batch_id),
        selection,
    })
}

pub fn run_select(
    state: &Path,
    data: Option<&Path>,
    recipe: Option<&str>,
    batch: Option<&str>,
    machine: Option<&str>,
) -> anyhow::Result<()> {
    let storage = Database::open(state)?;
    let dataset = data.map(Dataset::open).transpose()?;
    let view = select(
        &storage,
        dataset.as_ref().map(|d| d.records.as_slice()),
        recipe,
        batch,
        machine,
    )?;
    print_json(&view)
}
