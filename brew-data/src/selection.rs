//! Recipe / batch / machine selection for the batch detail view, persisted
//! through a [`Storage`].

use crate::comparison::{Filter, FILTER_ALL};
use brew_core::storage::{load_json, save_json, Storage};
use brew_core::BatchRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const RECIPE_KEY: &str = "detail-recipe-selection";
pub const BATCH_KEY: &str = "detail-batch-selection-v2";
pub const MACHINE_KEY: &str = "detail-machine-selection-v2";

/// Recipes present in the data, sorted.
pub fn unique_recipes(records: &[BatchRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.product_name.as_str())
        .filter(|p| !p.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Sorted unique batch ids of the records matching `recipe`.
pub fn filtered_batches(records: &[BatchRecord], recipe: &Filter) -> Vec<String> {
    records
        .iter()
        .filter(|r| recipe.matches(&r.product_name))
        .map(|r| r.batch_id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Sorted machines that processed `batch_id`.
pub fn machines_for_batch(records: &[BatchRecord], batch_id: &str) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.batch_id == batch_id)
        .map(|r| r.machine_group.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Product of each batch; later records win.
pub fn batch_product_map(records: &[BatchRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .filter(|r| !r.product_name.is_empty())
        .map(|r| (r.batch_id.clone(), r.product_name.clone()))
        .collect()
}

/// The current selection. Empty batch or machine means nothing selected.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(serialize_with = "serialize_filter")]
    pub recipe: Filter,
    pub batch_id: String,
    pub machine: String,
}

fn serialize_filter<S: serde::Serializer>(filter: &Filter, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(filter)
}

/// Selection state read from and written to a storage backend.
///
/// Values are stored JSON-encoded, one key per field.
pub struct SelectionStore<'a, S: Storage + ?Sized> {
    storage: &'a S,
}

impl<'a, S: Storage + ?Sized> SelectionStore<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        SelectionStore { storage }
    }

    pub fn load(&self) -> anyhow::Result<Selection> {
        let recipe: String = load_json(self.storage, RECIPE_KEY, FILTER_ALL.to_string())?;
        Ok(Selection {
            recipe: recipe.parse().unwrap_or_default(),
            batch_id: load_json(self.storage, BATCH_KEY, String::new())?,
            machine: load_json(self.storage, MACHINE_KEY, String::new())?,
        })
    }

    pub fn set_recipe(&self, recipe: &Filter) -> anyhow::Result<()> {
        save_json(self.storage, RECIPE_KEY, &recipe.to_string())
    }

    pub fn set_batch(&self, batch_id: &str) -> anyhow::Result<()> {
        save_json(self.storage, BATCH_KEY, batch_id)
    }

    pub fn set_machine(&self, machine: &str) -> anyhow::Result<()> {
        save_json(self.storage, MACHINE_KEY, machine)
    }

    /// Bring the stored selection in line with `records`.
    ///
    /// A batch outside the recipe's batches is replaced by the first one
    /// (or cleared when there is none); the machine is then checked the
    /// same way against the machines of the selected batch.
    pub fn reconcile(&self, records: &[BatchRecord]) -> anyhow::Result<Selection> {
        let mut selection = self.load()?;

        let batches = filtered_batches(records, &selection.recipe);
        if !batches.contains(&selection.batch_id) {
            let batch_id = batches.first().cloned().unwrap_or_default();
            log::debug!(
                "[brew] selection: batch {:?} -> {:?}",
                selection.batch_id,
                batch_id
            );
            self.set_batch(&batch_id)?;
            selection.batch_id = batch_id;
        }

        let machines = if selection.batch_id.is_empty() {
            Vec::new()
        } else {
            machines_for_batch(records, &selection.batch_id)
        };
        if !machines.contains(&selection.machine) {
            let machine = machines.first().cloned().unwrap_or_default();
            log::debug!(
                "[brew] selection: machine {:?} -> {:?}",
                selection.machine,
                machine
            );
            self.set_machine(&machine)?;
            selection.machine = machine;
        }

        Ok(selection)
    }
}
