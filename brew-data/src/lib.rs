//! Analytics over consolidated batch records.
//!
//! This crate turns [`brew_core::BatchRecord`]s into the series, tables and
//! alerts shown to plant operators: duration degradation, statistical
//! process control, capability indices, parameter trends, material
//! waste per recipe and per-batch process views.

pub mod capability;
pub mod comparison;
pub mod config;
pub mod control_chart;
pub mod degradation;
pub mod materials;
pub mod process;
pub mod selection;

pub use comparison::Filter;
pub use config::{AnalysisConfig, AnalysisConfigError};
