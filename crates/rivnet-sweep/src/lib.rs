//! Period sweeps over a river network
//!
//! Runs the periodic-forcing experiment of `rivnet` at log-spaced periods for
//! sediment and water forcing, calibrates the network equilibration time from
//! the sediment-forced outlet gains and writes the results to disk.

pub mod config;
pub mod output;
pub mod sweep;

use std::path::Path;

use rivnet::ResponseError;
use thiserror::Error;

pub use config::{NetworkConfig, SweepConfig};
pub use output::{create_timestamped_output_dir, default_output_root};
pub use sweep::{run_sweep, ForcingKind, PeriodRecord, SweepResult};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Run the sweep and write `periods.csv`, `nodes.csv` and `summary.json` into `output_dir`
pub fn run_sweep_into_dir(
    config: &SweepConfig,
    output_dir: &Path,
) -> Result<SweepResult, SweepError> {
    let result = run_sweep(config)?;
    output::write_periods_csv(&output_dir.join("periods.csv"), &result)?;
    output::write_nodes_csv(&output_dir.join("nodes.csv"), &result)?;
    output::write_summary_json(&output_dir.join("summary.json"), config, &result)?;
    Ok(result)
}
