//! SQLite database layer for consolidated brewery batch records.
//!
//! This crate loads [`brew_core::BatchRecord`]s into SQLite and exposes
//! typed query methods for the dashboard KPIs: machine averages, delay
//! alerts, recipe and shift statistics, machine history and problem
//! batches.
//!
//! # Architecture
//!
//! - `Rc<RefCell<Connection>>` wrapper for interior mutability; the CLI is
//!   single-threaded
//! - In-memory SQLite via `rusqlite` by default, or a file via [`Database::open`]
//! - Records loaded from the JSON written by the `ingest` command
//! - Typed query methods returning serializable structs for JSON/CSV export
//! - A `kv_store` table backing [`brew_core::storage::Storage`], so selection
//!   state survives between runs when the database is file-backed
//!
//! # Usage
//!
//! ```rust
//! use brew_db::Database;
//!
//! let db = Database::new().unwrap();
//! db.load_batches_json(r#"[{"CHARG_NR":"1001","TEILANL_GRUPO":"Cocedor 1",
//!     "real_total_min":120,"esperado_total_min":100,"delta_total_min":20,
//!     "idle_wall_minus_sumsteps_min":4,"timestamp":"2023-10-01T10:00:00.000Z"}]"#).unwrap();
//!
//! assert_eq!(db.query_total_batches().unwrap(), 1);
//! let alerts = db.query_delay_alerts(10.0).unwrap();
//! assert_eq!(alerts[0].batch_id, "1001");
//! ```
//!
//! # Tables
//!
//! See [`schema::create_schema`] for the full SQL schema.
//!
//! - `batches` - one row per (batch, equipment group) with its KPIs
//! - `steps`, `materials`, `parameters`, `alerts` - children of a batch row
//! - `kv_store` - string key/value pairs

pub mod schema;
mod loader;
mod queries;
pub mod models;

pub use queries::SHIFT_NAMES;

use brew_core::storage::Storage;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// SQLite database holding consolidated batch records.
///
/// This struct is cheaply cloneable (via `Rc`); clones share one connection.
///
/// # Example
///
/// ```rust
/// use brew_db::Database;
///
/// let db = Database::new().unwrap();
/// assert!(db.query_all_batches().unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct Database {
    conn: Rc<RefCell<Connection>>,
}

impl Database {
    /// Create a new in-memory database with the full schema applied.
    pub fn new() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_schema(conn)
    }

    /// Open (or create) a database file and apply the schema.
    ///
    /// The schema uses `IF NOT EXISTS`, so reopening keeps stored data.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        log::info!("[brew] db: Opened {}", path.display());
        Self::with_schema(conn)
    }

    fn with_schema(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(schema::create_schema())?;
        Ok(Self {
            conn: Rc::new(RefCell::new(conn)),
        })
    }
}

impl Storage for Database {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = self
            .conn
            .borrow()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.borrow().execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.conn
            .borrow()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.conn.borrow().execute("DELETE FROM kv_store", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brew_core::storage::{load_dataset, save_dataset};
    use brew_core::BatchRecord;

    const ONE_RECORD: &str = r#"[{"CHARG_NR":"1001","TEILANL_GRUPO":"Cocedor 1","real_total_min":120}]"#;

    #[test]
    fn database_creates_successfully() {
        let db = Database::new();
        assert!(db.is_ok(), "Database should create without errors");
    }

    #[test]
    fn database_is_cloneable() {
        let db = Database::new().unwrap();
        let db2 = db.clone();
        db.load_batches_json(ONE_RECORD).unwrap();
        assert_eq!(
            db2.query_total_batches().unwrap(),
            1,
            "Clone should see same data via shared Rc"
        );
    }

    #[test]
    fn database_starts_empty() {
        let db = Database::new().unwrap();
        assert_eq!(db.query_total_batches().unwrap(), 0);
        assert!(db.query_machine_groups().unwrap().is_empty());
        assert!(db.get("anything").unwrap().is_none());
    }

    #[test]
    fn storage_round_trip() {
        let db = Database::new().unwrap();
        db.set("a", "1").unwrap();
        db.set("a", "2").unwrap();
        db.set("b", "3").unwrap();
        assert_eq!(db.get("a").unwrap().as_deref(), Some("2"));

        db.remove("a").unwrap();
        assert!(db.get("a").unwrap().is_none());
        assert_eq!(db.get("b").unwrap().as_deref(), Some("3"));

        db.clear().unwrap();
        assert!(db.get("b").unwrap().is_none());
    }

    #[test]
    fn dataset_persists_in_kv_store() {
        let db = Database::new().unwrap();
        let records = BatchRecord::from_json(ONE_RECORD).unwrap();
        save_dataset(&db, &records).unwrap();
        assert_eq!(load_dataset(&db).unwrap(), records);
    }

    #[test]
    fn clearing_batches_keeps_kv_store() {
        let db = Database::new().unwrap();
        db.load_batches_json(ONE_RECORD).unwrap();
        db.set("keep", "me").unwrap();
        db.clear_batches().unwrap();
        assert_eq!(db.query_total_batches().unwrap(), 0);
        assert_eq!(db.get("keep").unwrap().as_deref(), Some("me"));
    }
}
