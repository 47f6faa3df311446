/// Error types for the brew core library
use thiserror::Error;

/// An interval rejected by the merger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidIntervalError {
    /// A bound is NaN or infinite
    #[error("interval {index} has a non-finite bound (start: {start}, end: {end})")]
    NonFinite { index: usize, start: f64, end: f64 },

    /// The interval ends before it starts
    #[error("interval {index} ends before it starts (start: {start}, end: {end})")]
    Reversed { index: usize, start: f64, end: f64 },
}

/// Errors raised while turning spreadsheet exports into batch records.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Failed to parse CSV data
    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// A column the export must carry is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Step timing could not be reconciled
    #[error(transparent)]
    Interval(#[from] InvalidIntervalError),
}

/// Type alias for Results using IngestError
pub type Result<T> = std::result::Result<T, IngestError>;
