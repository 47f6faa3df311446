//! SQL schema definitions for the batch database.
//!
//! The schema is applied as a single batch when the database is opened.

/// Returns the full SQL schema as a single batch string.
///
/// This creates the following tables:
///
/// **Batch tables:**
/// - `batches` - One row per (batch, equipment group) record with its timing totals
/// - `steps` - Ordered steps of each record, wait steps included
/// - `materials` - Material consumption per record
/// - `parameters` - Process measurements per record
/// - `alerts` - Alert messages raised during consolidation
///
/// **Session tables:**
/// - `kv_store` - String key/value pairs backing the `Storage` implementation
///
/// Child rows reference `batches.id` and keep their original order in `position`.
/// Timestamps are stored as `YYYY-MM-DDTHH:MM:SS.mmmZ` text so they sort
/// chronologically; untimed records hold NULL and sort first.
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY,
        batch_id TEXT NOT NULL,
        machine_group TEXT NOT NULL,
        product_name TEXT NOT NULL,
        real_total_min REAL NOT NULL,
        expected_total_min REAL NOT NULL,
        delta_total_min REAL NOT NULL,
        idle_min REAL NOT NULL,
        max_gap_min REAL NOT NULL,
        timestamp TEXT,
        start_hour INTEGER NOT NULL,
        UNIQUE (batch_id, machine_group)
    );
    CREATE INDEX IF NOT EXISTS idx_batches_batch ON batches(batch_id);
    CREATE INDEX IF NOT EXISTS idx_batches_machine ON batches(machine_group);
    CREATE INDEX IF NOT EXISTS idx_batches_timestamp ON batches(timestamp);

    CREATE TABLE IF NOT EXISTS steps (
        record_id INTEGER NOT NULL REFERENCES batches(id),
        position INTEGER NOT NULL,
        step_name TEXT NOT NULL,
        step_nr TEXT NOT NULL,
        kind TEXT NOT NULL,
        duration_min REAL NOT NULL,
        expected_duration_min REAL NOT NULL,
        start_time TEXT,
        end_time TEXT,
        PRIMARY KEY (record_id, position)
    );

    CREATE TABLE IF NOT EXISTS materials (
        record_id INTEGER NOT NULL REFERENCES batches(id),
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        total_real REAL NOT NULL,
        total_expected REAL NOT NULL,
        unit TEXT NOT NULL,
        PRIMARY KEY (record_id, position)
    );

    CREATE TABLE IF NOT EXISTS parameters (
        record_id INTEGER NOT NULL REFERENCES batches(id),
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        value REAL NOT NULL,
        target REAL NOT NULL,
        unit TEXT NOT NULL,
        step_name TEXT NOT NULL,
        timestamp TEXT,
        dfm_code TEXT,
        PRIMARY KEY (record_id, position)
    );
    CREATE INDEX IF NOT EXISTS idx_parameters_name ON parameters(name);

    CREATE TABLE IF NOT EXISTS alerts (
        record_id INTEGER NOT NULL REFERENCES batches(id),
        position INTEGER NOT NULL,
        message TEXT NOT NULL,
        PRIMARY KEY (record_id, position)
    );

    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#
}

/// Tables holding per-record child rows, deleted before their parent.
pub const CHILD_TABLES: [&str; 4] = ["steps", "materials", "parameters", "alerts"];
