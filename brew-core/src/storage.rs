//! Key/value storage injected into anything that keeps state between runs
//! (selection state, the loaded dataset).
//!
//! Values are strings; [`load_json`] and [`save_json`] layer serde on top.

use crate::batch::BatchRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Key under which the consolidated batch set is persisted.
pub const DATASET_KEY: &str = "brew-dataset";

/// A string key/value store.
///
/// Methods take `&self`; implementations use interior mutability the same
/// way the SQLite connection wrapper does.
pub trait Storage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// Read a JSON value, falling back to `default` when the key is absent or
/// the stored value does not parse.
pub fn load_json<T, S>(storage: &S, key: &str, default: T) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    S: Storage + ?Sized,
{
    let Some(raw) = storage.get(key)? else {
        return Ok(default);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!("[brew] storage: ignoring unreadable value under {key:?}: {e}");
            Ok(default)
        }
    }
}

/// Store a value as JSON.
pub fn save_json<T, S>(storage: &S, key: &str, value: &T) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    S: Storage + ?Sized,
{
    storage.set(key, &serde_json::to_string(value)?)
}

/// Persist the batch set under [`DATASET_KEY`].
pub fn save_dataset<S: Storage + ?Sized>(storage: &S, records: &[BatchRecord]) -> anyhow::Result<()> {
    save_json(storage, DATASET_KEY, records)?;
    log::info!("[brew] storage: saved dataset of {} records", records.len());
    Ok(())
}

/// Load the persisted batch set; empty when nothing usable is stored.
pub fn load_dataset<S: Storage + ?Sized>(storage: &S) -> anyhow::Result<Vec<BatchRecord>> {
    load_json(storage, DATASET_KEY, Vec::new())
}
