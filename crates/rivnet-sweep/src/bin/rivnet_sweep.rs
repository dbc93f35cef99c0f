use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rivnet_sweep::{
    create_timestamped_output_dir, default_output_root, run_sweep_into_dir, SweepConfig,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Sweep forcing periods over a river network and calibrate its equilibration time
#[derive(Parser)]
#[command(name = "rivnet_sweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Periodic-forcing sweep of a river network",
    long_about = "Loads --config, else rivnet_sweep.json in the current directory, \
                  else the built-in confluence sweep."
)]
struct Cli {
    /// JSON sweep configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root under which a timestamped run directory is created
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SweepConfig::resolve(cli.config.as_deref()).context("loading sweep config")?;
    config.validate().context("validating sweep config")?;

    let output_root = cli.output.unwrap_or_else(default_output_root);
    let output_dir = create_timestamped_output_dir(&output_root)
        .with_context(|| format!("creating run directory under {}", output_root.display()))?;
    run_sweep_into_dir(&config, &output_dir).context("running sweep")?;

    println!("Output directory: {}", output_dir.display());
    Ok(())
}
