//! Query result model structs for batch data.
//!
//! All structs derive `Serialize` so they can be printed as JSON or
//! written as CSV rows by the command layer.

use serde::Serialize;

/// Rounded per-machine means over all of its records.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineAverages {
    pub machine: String,
    pub avg_real: f64,
    pub avg_expected: f64,
    pub avg_delta: f64,
    pub avg_idle: f64,
}

/// The machine with the largest average idle time.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HighestIdle {
    /// `"N/A"` when there is no data.
    pub machine: String,
    pub idle_time: f64,
}

/// A record whose total overrun exceeds the alert threshold.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DelayAlert {
    pub batch_id: String,
    pub machine: String,
    pub product: String,
    pub real_total_min: f64,
    pub expected_total_min: f64,
    pub delta_total_min: f64,
    pub timestamp: Option<String>,
}

/// Per-recipe totals divided by the number of distinct batches.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStats {
    pub name: String,
    pub avg_real: f64,
    pub avg_expected: f64,
    pub avg_idle: f64,
    /// Distinct batch numbers.
    pub batch_count: i64,
    /// (batch, equipment group) records.
    pub record_count: i64,
}

/// Production shift statistics keyed by start hour.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShiftStats {
    pub name: String,
    pub batches: i64,
    pub avg_delta: f64,
    pub avg_idle: f64,
}

/// Machine averages in brewhouse process order, for the efficiency chart.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyPoint {
    pub machine: String,
    /// Machine name with a line break before its unit number.
    pub display_machine: String,
    pub expected: f64,
    pub real: f64,
    pub delta: f64,
    pub idle: f64,
}

/// One record in a machine's chronological history.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineHistoryPoint {
    pub batch_id: String,
    pub real_time: f64,
    pub idle: f64,
    /// True for the batch currently selected.
    pub is_current: bool,
    pub timestamp: Option<String>,
}

/// A record with too much idle time or overrun.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicBatch {
    pub batch: String,
    pub product: String,
    pub machine: String,
    pub total_wait: f64,
    pub total_delay: f64,
    /// Only the overrun condition holds.
    pub is_delay: bool,
    pub timestamp: Option<String>,
}
