//! Core types for brewery batch production data.
//!
//! - [`interval`]: union length of possibly overlapping step intervals
//! - [`batch`]: the consolidated per batch + equipment group record
//! - [`event`]: step events parsed from spreadsheet CSV exports
//! - [`consolidate`]: grouping of step events into [`batch::BatchRecord`]s
//! - [`storage`]: injected key/value storage for session state and datasets

pub mod batch;
pub mod consolidate;
pub mod error;
pub mod event;
pub mod interval;
pub mod storage;

pub use batch::{BatchMaterial, BatchParameter, BatchRecord, BatchStep, StepKind};
pub use error::{IngestError, InvalidIntervalError};
pub use interval::Interval;
