//! Typed query methods over the loaded batch records.
//!
//! All queries return typed structs from [`crate::models`] (or rebuilt
//! [`BatchRecord`]s) that can be serialized to JSON or CSV.
//!
//! # Shifts
//!
//! Records are assigned to a production shift by their start hour:
//! 06:00-13:59 morning, 14:00-21:59 afternoon, anything else night.

use crate::models::{
    DelayAlert, EfficiencyPoint, HighestIdle, MachineAverages, MachineHistoryPoint,
    ProblematicBatch, RecipeStats, ShiftStats,
};
use crate::Database;
use brew_core::batch::UNKNOWN_PRODUCT;
use brew_core::{BatchMaterial, BatchParameter, BatchRecord, BatchStep, StepKind};
use brew_utils::dates::parse_timestamp;
use brew_utils::numbers::{round_half_up, round_to};
use brew_utils::text::process_sort_index;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ToSql};

/// Shift names, in the order [`Database::query_shift_stats`] returns them.
pub const SHIFT_NAMES: [&str; 3] = ["Shift 1 (Morning)", "Shift 2 (Afternoon)", "Shift 3 (Night)"];

const RECORD_COLUMNS: &str = "id, batch_id, machine_group, product_name, real_total_min, \
    expected_total_min, delta_total_min, idle_min, max_gap_min, timestamp, start_hour";

fn parse_optional(ts: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    ts.map(|s| parse_timestamp(&s)).transpose()
}

/// Insert a line break before the first digit: "Cocedor 1" -> "Cocedor \n1".
fn display_machine(machine: &str) -> String {
    match machine.find(|c: char| c.is_ascii_digit()) {
        Some(i) => format!("{}\n{}", &machine[..i], &machine[i..]),
        None => machine.to_string(),
    }
}

fn read_steps(conn: &Connection, record_id: i64) -> anyhow::Result<Vec<BatchStep>> {
    let mut stmt = conn.prepare(
        "SELECT step_name, step_nr, kind, duration_min, expected_duration_min, start_time, end_time
         FROM steps WHERE record_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![record_id], |row| {
            Ok((
                BatchStep {
                    step_name: row.get(0)?,
                    step_nr: row.get(1)?,
                    kind: StepKind::from_label(&row.get::<_, String>(2)?),
                    duration_min: row.get(3)?,
                    expected_duration_min: row.get(4)?,
                    start_time: None,
                    end_time: None,
                },
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(mut step, start, end)| {
            step.start_time = parse_optional(start)?;
            step.end_time = parse_optional(end)?;
            Ok(step)
        })
        .collect()
}

fn read_materials(conn: &Connection, record_id: i64) -> anyhow::Result<Vec<BatchMaterial>> {
    let mut stmt = conn.prepare(
        "SELECT name, total_real, total_expected, unit
         FROM materials WHERE record_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![record_id], |row| {
            Ok(BatchMaterial {
                name: row.get(0)?,
                total_real: row.get(1)?,
                total_expected: row.get(2)?,
                unit: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn read_parameters(conn: &Connection, record_id: i64) -> anyhow::Result<Vec<BatchParameter>> {
    let mut stmt = conn.prepare(
        "SELECT name, value, target, unit, step_name, timestamp, dfm_code
         FROM parameters WHERE record_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![record_id], |row| {
            Ok((
                BatchParameter {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    target: row.get(2)?,
                    unit: row.get(3)?,
                    step_name: row.get(4)?,
                    timestamp: None,
                    dfm_code: row.get(6)?,
                },
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(mut p, ts)| {
            p.timestamp = parse_optional(ts)?;
            Ok(p)
        })
        .collect()
}

fn read_alerts(conn: &Connection, record_id: i64) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT message FROM alerts WHERE record_id = ?1 ORDER BY position")?;
    let rows = stmt
        .query_map(params![record_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

impl Database {
    // ───────────────────── Identity Queries ─────────────────────

    /// Number of distinct batch numbers.
    pub fn query_total_batches(&self) -> anyhow::Result<usize> {
        let conn = self.conn.borrow();
        let count: i64 = conn.query_row("SELECT COUNT(DISTINCT batch_id) FROM batches", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    /// Distinct batch numbers, sorted.
    pub fn query_unique_batch_ids(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT DISTINCT batch_id FROM batches ORDER BY batch_id")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        log::info!(
            "[brew] query: query_unique_batch_ids returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    /// Distinct equipment groups, sorted.
    pub fn query_machine_groups(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.borrow();
        let mut stmt =
            conn.prepare("SELECT DISTINCT machine_group FROM batches ORDER BY machine_group")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    /// Equipment groups that processed `batch_id`, sorted.
    pub fn query_batch_machines(&self, batch_id: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT machine_group FROM batches WHERE batch_id = ?1 ORDER BY machine_group",
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    // ───────────────────── KPI Queries ─────────────────────

    /// Total overrun as a percentage of expected time, one decimal.
    ///
    /// Only records with a positive expected time count; 0 when there are none.
    pub fn query_average_cycle_deviation(&self) -> anyhow::Result<f64> {
        let conn = self.conn.borrow();
        let (delta, expected): (Option<f64>, Option<f64>) = conn.query_row(
            "SELECT SUM(delta_total_min), SUM(expected_total_min)
             FROM batches WHERE expected_total_min > 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match (delta, expected) {
            (Some(delta), Some(expected)) if expected > 0.0 => round_to(delta / expected * 100.0, 1),
            _ => 0.0,
        })
    }

    /// Per-machine means of real, expected, delta and idle minutes, rounded
    /// to whole minutes and ordered by machine name.
    pub fn query_machine_averages(&self) -> anyhow::Result<Vec<MachineAverages>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT machine_group, AVG(real_total_min), AVG(expected_total_min),
                    AVG(delta_total_min), AVG(idle_min)
             FROM batches
             GROUP BY machine_group
             ORDER BY machine_group",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MachineAverages {
                    machine: row.get(0)?,
                    avg_real: round_half_up(row.get::<_, f64>(1)?),
                    avg_expected: round_half_up(row.get::<_, f64>(2)?),
                    avg_delta: round_half_up(row.get::<_, f64>(3)?),
                    avg_idle: round_half_up(row.get::<_, f64>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[brew] query: query_machine_averages returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    /// The machine with the highest average idle time; the first one wins ties.
    pub fn query_machine_with_highest_idle(&self) -> anyhow::Result<HighestIdle> {
        let averages = self.query_machine_averages()?;
        let mut highest: Option<&MachineAverages> = None;
        for avg in &averages {
            if highest.map_or(true, |h| avg.avg_idle > h.avg_idle) {
                highest = Some(avg);
            }
        }
        Ok(match highest {
            Some(h) => HighestIdle {
                machine: h.machine.clone(),
                idle_time: h.avg_idle,
            },
            None => HighestIdle {
                machine: "N/A".to_string(),
                idle_time: 0.0,
            },
        })
    }

    /// Records whose total delta exceeds `threshold` minutes, largest first.
    pub fn query_delay_alerts(&self, threshold: f64) -> anyhow::Result<Vec<DelayAlert>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT batch_id, machine_group, product_name, real_total_min, expected_total_min,
                    delta_total_min, timestamp
             FROM batches
             WHERE delta_total_min > ?1
             ORDER BY delta_total_min DESC, id",
        )?;
        let rows = stmt
            .query_map(params![threshold], |row| {
                Ok(DelayAlert {
                    batch_id: row.get(0)?,
                    machine: row.get(1)?,
                    product: row.get(2)?,
                    real_total_min: row.get(3)?,
                    expected_total_min: row.get(4)?,
                    delta_total_min: row.get(5)?,
                    timestamp: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[brew] query: query_delay_alerts returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    /// Per-recipe averages over distinct batches, most produced first.
    ///
    /// A batch that ran on several machines contributes all of its records
    /// to the sums but counts once in the divisor.
    pub fn query_recipe_stats(&self) -> anyhow::Result<Vec<RecipeStats>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT CASE WHEN product_name = '' THEN ?1 ELSE product_name END AS name,
                    COUNT(DISTINCT batch_id) AS batch_count, COUNT(*),
                    SUM(real_total_min), SUM(expected_total_min), SUM(idle_min)
             FROM batches
             GROUP BY name
             ORDER BY batch_count DESC, MIN(id)",
        )?;
        let rows = stmt
            .query_map(params![UNKNOWN_PRODUCT], |row| {
                let batch_count: i64 = row.get(1)?;
                let per_batch = |sum: f64| {
                    if batch_count > 0 {
                        round_half_up(sum / batch_count as f64)
                    } else {
                        0.0
                    }
                };
                Ok(RecipeStats {
                    name: row.get(0)?,
                    batch_count,
                    record_count: row.get(2)?,
                    avg_real: per_batch(row.get(3)?),
                    avg_expected: per_batch(row.get(4)?),
                    avg_idle: per_batch(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[brew] query: query_recipe_stats returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    /// Record count and rounded mean delta/idle for each of the three shifts.
    ///
    /// All shifts are always present, empty ones with zeros.
    pub fn query_shift_stats(&self) -> anyhow::Result<Vec<ShiftStats>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT CASE
                        WHEN start_hour >= 6 AND start_hour < 14 THEN 0
                        WHEN start_hour >= 14 AND start_hour < 22 THEN 1
                        ELSE 2
                    END AS shift,
                    COUNT(*), AVG(delta_total_min), AVG(idle_min)
             FROM batches
             GROUP BY shift",
        )?;
        let mut stats: Vec<ShiftStats> = SHIFT_NAMES
            .iter()
            .map(|name| ShiftStats {
                name: name.to_string(),
                batches: 0,
                avg_delta: 0.0,
                avg_idle: 0.0,
            })
            .collect();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (shift, count, avg_delta, avg_idle) in rows {
            if let Some(entry) = stats.get_mut(shift as usize) {
                entry.batches = count;
                entry.avg_delta = round_half_up(avg_delta);
                entry.avg_idle = round_half_up(avg_idle);
            }
        }
        Ok(stats)
    }

    /// Machine averages in brewhouse process order (milling first).
    pub fn query_efficiency(&self) -> anyhow::Result<Vec<EfficiencyPoint>> {
        let mut averages = self.query_machine_averages()?;
        averages.sort_by_key(|a| process_sort_index(&a.machine));
        Ok(averages
            .into_iter()
            .map(|a| EfficiencyPoint {
                display_machine: display_machine(&a.machine),
                machine: a.machine,
                expected: a.avg_expected,
                real: a.avg_real,
                delta: a.avg_delta,
                idle: a.avg_idle,
            })
            .collect())
    }

    // ───────────────────── Detail Queries ─────────────────────

    /// Chronological real and idle time of every record on `machine`.
    ///
    /// Records of `selected_batch` are flagged with `is_current`.
    pub fn query_machine_history(
        &self,
        machine: &str,
        selected_batch: &str,
    ) -> anyhow::Result<Vec<MachineHistoryPoint>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT batch_id, real_total_min, idle_min, timestamp
             FROM batches
             WHERE machine_group = ?1
             ORDER BY timestamp, id",
        )?;
        let rows = stmt
            .query_map(params![machine], |row| {
                let batch_id: String = row.get(0)?;
                Ok(MachineHistoryPoint {
                    is_current: batch_id == selected_batch,
                    batch_id,
                    real_time: row.get(1)?,
                    idle: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[brew] query: query_machine_history returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    /// Records with idle time above `gap_min` or delta above `delay_min`,
    /// ordered by the larger of the two, descending.
    pub fn query_problematic_batches(
        &self,
        gap_min: f64,
        delay_min: f64,
    ) -> anyhow::Result<Vec<ProblematicBatch>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT batch_id, product_name, machine_group, idle_min, delta_total_min, timestamp
             FROM batches
             WHERE idle_min > ?1 OR delta_total_min > ?2
             ORDER BY MAX(idle_min, delta_total_min) DESC, id",
        )?;
        let rows = stmt
            .query_map(params![gap_min, delay_min], |row| {
                let total_wait: f64 = row.get(3)?;
                Ok(ProblematicBatch {
                    batch: row.get(0)?,
                    product: row.get(1)?,
                    machine: row.get(2)?,
                    is_delay: total_wait <= gap_min,
                    total_wait,
                    total_delay: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[brew] query: query_problematic_batches returned {} records",
            rows.len()
        );
        Ok(rows)
    }

    // ───────────────────── Record Reconstruction ─────────────────────

    fn select_records(&self, filter: &str, args: &[&dyn ToSql]) -> anyhow::Result<Vec<BatchRecord>> {
        let conn = self.conn.borrow();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM batches {filter} ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    BatchRecord {
                        batch_id: row.get(1)?,
                        machine_group: row.get(2)?,
                        product_name: row.get(3)?,
                        real_total_min: row.get(4)?,
                        expected_total_min: row.get(5)?,
                        delta_total_min: row.get(6)?,
                        idle_min: row.get(7)?,
                        max_gap_min: row.get(8)?,
                        timestamp: None,
                        start_hour: row.get(10)?,
                        steps: Vec::new(),
                        materials: Vec::new(),
                        parameters: Vec::new(),
                        alerts: Vec::new(),
                    },
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, mut record, timestamp) in rows {
            record.timestamp = parse_optional(timestamp)?;
            record.steps = read_steps(&conn, id)?;
            record.materials = read_materials(&conn, id)?;
            record.parameters = read_parameters(&conn, id)?;
            record.alerts = read_alerts(&conn, id)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Rebuild the full record of one batch on one equipment group.
    pub fn query_batch(&self, batch_id: &str, machine: &str) -> anyhow::Result<Option<BatchRecord>> {
        let mut records = self.select_records(
            "WHERE batch_id = ?1 AND machine_group = ?2",
            &[&batch_id, &machine],
        )?;
        Ok(records.pop())
    }

    /// Rebuild every stored record, in load order.
    pub fn query_all_batches(&self) -> anyhow::Result<Vec<BatchRecord>> {
        let records = self.select_records("", &[])?;
        log::info!(
            "[brew] query: query_all_batches returned {} records",
            records.len()
        );
        Ok(records)
    }
}
