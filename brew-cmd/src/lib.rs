//! Command implementations for the brew CLI.
//!
//! Provides subcommands for turning brewhouse spreadsheet exports into
//! batch records and for querying timing, delay and quality analytics
//! over them. Results are printed as pretty JSON or written as CSV.

use brew_core::BatchRecord;
use brew_db::Database;
use clap::Subcommand;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub mod config;
pub mod detail;
pub mod export;
pub mod ingest;
pub mod report;

pub use config::BrewConfig;
pub use export::Report;

#[derive(Subcommand)]
pub enum Command {
    /// Parse step-event CSV exports and consolidate them into batch records
    Ingest {
        /// Input CSV files (at most 4)
        #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output path for the batch records JSON
        #[arg(short = 'o', long)]
        output: PathBuf,
    },

    /// Merge millisecond intervals from a CSV of start,end pairs
    Merge {
        /// CSV with one interval per row, with or without a start,end header
        #[arg(short = 'i', long)]
        input: PathBuf,
    },

    /// Dashboard KPIs, machine averages, recipe and shift statistics, material waste
    Summary {
        /// Batch records JSON written by `ingest`
        #[arg(short = 'd', long)]
        data: PathBuf,
    },

    /// Delay alerts, degradation alerts and problematic batches
    Alerts {
        #[arg(short = 'd', long)]
        data: PathBuf,

        /// Minimum total delta (minutes) for a delay alert
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Timing, merged steps, anomalies and full process of one batch
    Batch {
        #[arg(short = 'd', long)]
        data: PathBuf,

        /// Batch number
        #[arg(short = 'b', long)]
        batch: String,

        /// Only this equipment group
        #[arg(short = 'm', long)]
        machine: Option<String>,
    },

    /// Control chart of one parameter over the batches of a product
    ControlChart {
        #[arg(short = 'd', long)]
        data: PathBuf,

        #[arg(short = 'p', long)]
        product: String,

        /// Parameter name
        #[arg(short = 'n', long = "param")]
        param: String,

        /// Step the parameter was measured in
        #[arg(short = 's', long)]
        step: String,
    },

    /// Process capability (Cp/Cpk) of parameter deviations from target
    Capability {
        #[arg(short = 'd', long)]
        data: PathBuf,

        /// JSON object mapping parameter name to {"lsl": .., "usl": ..}
        #[arg(short = 's', long)]
        specs: PathBuf,

        #[arg(long)]
        machine: Option<String>,

        #[arg(long)]
        step: Option<String>,

        #[arg(long)]
        parameter: Option<String>,
    },

    /// Trend of a parameter within one batch or across batches
    Trend {
        #[arg(short = 'd', long)]
        data: PathBuf,

        #[arg(long)]
        param: String,

        #[arg(long)]
        machine: Option<String>,

        #[arg(long)]
        recipe: Option<String>,

        #[arg(long)]
        batch: Option<String>,
    },

    /// Write one report as CSV
    Export {
        #[arg(short = 'd', long)]
        data: PathBuf,

        #[arg(short = 'r', long, value_enum)]
        report: Report,

        /// Output CSV path
        #[arg(short = 'o', long)]
        output: PathBuf,
    },

    /// Update and reconcile the persisted recipe/batch/machine selection
    Select {
        /// SQLite file holding the selection (created when missing)
        #[arg(long)]
        state: PathBuf,

        /// Batch records JSON; when omitted the dataset saved in the state is used
        #[arg(short = 'd', long)]
        data: Option<PathBuf>,

        /// Recipe filter ("ALL" selects every recipe)
        #[arg(long)]
        recipe: Option<String>,

        #[arg(long)]
        batch: Option<String>,

        #[arg(long)]
        machine: Option<String>,
    },
}

pub fn run(command: Command, config: &BrewConfig) -> anyhow::Result<()> {
    match command {
        Command::Ingest { inputs, output } => ingest::run_ingest(&inputs, &output, config),
        Command::Merge { input } => ingest::run_merge(&input),
        Command::Summary { data } => report::run_summary(&data, config),
        Command::Alerts { data, threshold } => report::run_alerts(&data, threshold, config),
        Command::Batch {
            data,
            batch,
            machine,
        } => detail::run_batch(&data, &batch, machine.as_deref(), config),
        Command::ControlChart {
            data,
            product,
            param,
            step,
        } => detail::run_control_chart(&data, &product, &param, &step, config),
        Command::Capability {
            data,
            specs,
            machine,
            step,
            parameter,
        } => detail::run_capability(
            &data,
            &specs,
            brew_data::capability::CapabilityFilter {
                machine,
                step_name: step,
                parameter,
            },
        ),
        Command::Trend {
            data,
            param,
            machine,
            recipe,
            batch,
        } => detail::run_trend(
            &data,
            &param,
            machine.into(),
            recipe.into(),
            batch.into(),
        ),
        Command::Export {
            data,
            report,
            output,
        } => export::run_export(&data, report, &output, config),
        Command::Select {
            state,
            data,
            recipe,
            batch,
            machine,
        } => detail::run_select(
            &state,
            data.as_deref(),
            recipe.as_deref(),
            batch.as_deref(),
            machine.as_deref(),
        ),
    }
}

/// Batch records read from an `ingest` JSON file, also loaded into an
/// in-memory database for the aggregate queries.
pub struct Dataset {
    pub records: Vec<BatchRecord>,
    pub db: Database,
}

impl Dataset {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let records = BatchRecord::from_json(json)?;
        let db = Database::new()?;
        db.load_batches(&records)?;
        Ok(Dataset { records, db })
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let dataset = Self::from_json(&json)?;
        info!(
            "Loaded {} batch records from {}",
            dataset.records.len(),
            path.display()
        );
        Ok(dataset)
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
