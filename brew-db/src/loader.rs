//! Loading consolidated batch records into the database.
//!
//! Records come either as [`BatchRecord`] values straight from
//! consolidation, or as the JSON array written by the `ingest` command.
//! A record whose (batch, equipment group) is already present replaces the
//! stored one.

use crate::schema::CHILD_TABLES;
use crate::Database;
use brew_core::BatchRecord;
use brew_utils::dates::format_timestamp;
use rusqlite::{params, OptionalExtension, Transaction};

fn delete_existing(tx: &Transaction<'_>, batch_id: &str, machine: &str) -> rusqlite::Result<bool> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM batches WHERE batch_id = ?1 AND machine_group = ?2",
            params![batch_id, machine],
            |row| row.get(0),
        )
        .optional()?;
    let Some(id) = existing else {
        return Ok(false);
    };
    for table in CHILD_TABLES {
        tx.execute(&format!("DELETE FROM {table} WHERE record_id = ?1"), params![id])?;
    }
    tx.execute("DELETE FROM batches WHERE id = ?1", params![id])?;
    Ok(true)
}

fn insert_record(tx: &Transaction<'_>, record: &BatchRecord) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO batches
         (batch_id, machine_group, product_name, real_total_min, expected_total_min,
          delta_total_min, idle_min, max_gap_min, timestamp, start_hour)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.batch_id,
            record.machine_group,
            record.product_name,
            record.real_total_min,
            record.expected_total_min,
            record.delta_total_min,
            record.idle_min,
            record.max_gap_min,
            record.timestamp.as_ref().map(format_timestamp),
            record.start_hour,
        ],
    )?;
    let id = tx.last_insert_rowid();

    for (position, step) in record.steps.iter().enumerate() {
        tx.execute(
            "INSERT INTO steps
             (record_id, position, step_name, step_nr, kind, duration_min,
              expected_duration_min, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                position as i64,
                step.step_name,
                step.step_nr,
                step.kind.as_str(),
                step.duration_min,
                step.expected_duration_min,
                step.start_time.as_ref().map(format_timestamp),
                step.end_time.as_ref().map(format_timestamp),
            ],
        )?;
    }

    for (position, material) in record.materials.iter().enumerate() {
        tx.execute(
            "INSERT INTO materials (record_id, position, name, total_real, total_expected, unit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                position as i64,
                material.name,
                material.total_real,
                material.total_expected,
                material.unit,
            ],
        )?;
    }

    for (position, p) in record.parameters.iter().enumerate() {
        tx.execute(
            "INSERT INTO parameters
             (record_id, position, name, value, target, unit, step_name, timestamp, dfm_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                position as i64,
                p.name,
                p.value,
                p.target,
                p.unit,
                p.step_name,
                p.timestamp.as_ref().map(format_timestamp),
                p.dfm_code,
            ],
        )?;
    }

    for (position, message) in record.alerts.iter().enumerate() {
        tx.execute(
            "INSERT INTO alerts (record_id, position, message) VALUES (?1, ?2, ?3)",
            params![id, position as i64, message],
        )?;
    }
    Ok(())
}

impl Database {
    /// Load batch records, replacing any stored record with the same batch
    /// and equipment group.
    ///
    /// All records are written in one transaction. Returns how many were loaded.
    pub fn load_batches(&self, records: &[BatchRecord]) -> anyhow::Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let mut replaced = 0u32;
        for record in records {
            if delete_existing(&tx, &record.batch_id, &record.machine_group)? {
                replaced += 1;
            }
            insert_record(&tx, record)?;
        }
        tx.commit()?;
        log::info!(
            "[brew] loader: Loaded {} batch records, replaced {}",
            records.len(),
            replaced
        );
        Ok(records.len())
    }

    /// Load a JSON array of batch records.
    ///
    /// Both full records and the reduced form without steps, materials and
    /// parameters are accepted.
    ///
    /// # Example JSON
    /// ```text
    /// [{"CHARG_NR":"1001","TEILANL_GRUPO":"Cocedor 1","real_total_min":120.5,
    ///   "esperado_total_min":100,"delta_total_min":20.5,
    ///   "idle_wall_minus_sumsteps_min":4.25,"timestamp":"2023-10-01T10:00:00.000Z"}]
    /// ```
    pub fn load_batches_json(&self, json: &str) -> anyhow::Result<usize> {
        let records = BatchRecord::from_json(json)?;
        self.load_batches(&records)
    }

    /// Remove every batch record; the key/value store is left alone.
    pub fn clear_batches(&self) -> anyhow::Result<()> {
        let conn = self.conn.borrow();
        for table in CHILD_TABLES {
            conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
        conn.execute("DELETE FROM batches", [])?;
        log::info!("[brew] loader: Cleared batch tables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    const RECORDS: &str = r#"[
      {"CHARG_NR":"1001","TEILANL_GRUPO":"Cocedor 1","productName":"Clara","real_total_min":60,
       "esperado_total_min":50,"delta_total_min":10,"idle_wall_minus_sumsteps_min":2,
       "timestamp":"2023-10-01T06:00:00.000Z","startHour":6,
       "steps":[{"stepName":"Calentar","durationMin":40,"expectedDurationMin":35},
                {"stepName":"Wait 1","kind":"wait","durationMin":2},
                {"stepName":"Hervir","durationMin":18,"expectedDurationMin":15}],
       "materials":[{"name":"Malta","totalReal":500,"totalExpected":480,"unit":"kg"}],
       "parameters":[{"name":"Temp","value":72,"target":70,"unit":"°c","stepName":"Calentar","dfmCode":"DFM1"}],
       "alerts":["Wait of 2 min before Hervir"]},
      {"CHARG_NR":"1001","TEILANL_GRUPO":"Olla 1","real_total_min":30,"timestamp":""}
    ]"#;

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .borrow()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn load_batches_json_inserts_children() {
        let db = Database::new().unwrap();
        assert_eq!(db.load_batches_json(RECORDS).unwrap(), 2);
        assert_eq!(count(&db, "batches"), 2);
        assert_eq!(count(&db, "steps"), 3);
        assert_eq!(count(&db, "materials"), 1);
        assert_eq!(count(&db, "parameters"), 1);
        assert_eq!(count(&db, "alerts"), 1);
    }

    #[test]
    fn reloading_replaces_records() {
        let db = Database::new().unwrap();
        db.load_batches_json(RECORDS).unwrap();
        db.load_batches_json(RECORDS).unwrap();
        assert_eq!(count(&db, "batches"), 2);
        assert_eq!(count(&db, "steps"), 3);
    }

    #[test]
    fn load_batches_json_rejects_malformed_input() {
        let db = Database::new().unwrap();
        assert!(db.load_batches_json("{not an array").is_err());
        assert!(db.load_batches_json(r#"[{"real_total_min": 1}]"#).is_err());
        assert_eq!(count(&db, "batches"), 0);
    }

    #[test]
    fn clear_batches_empties_tables() {
        let db = Database::new().unwrap();
        db.load_batches_json(RECORDS).unwrap();
        db.clear_batches().unwrap();
        assert_eq!(count(&db, "batches"), 0);
        assert_eq!(count(&db, "steps"), 0);
    }
}
