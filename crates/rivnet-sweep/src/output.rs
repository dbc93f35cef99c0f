use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use rivnet::calibrate::Calibration;
use rivnet::{LinearValley, Measure};
use serde::Serialize;

use crate::config::SweepConfig;
use crate::sweep::SweepResult;
use crate::SweepError;

pub fn default_output_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|path| path.parent())
        .map(Path::to_path_buf)
        .unwrap_or(manifest_dir)
        .join("output-rivnet-sweep")
}

pub fn create_timestamped_output_dir(output_root: &Path) -> Result<PathBuf, SweepError> {
    fs::create_dir_all(output_root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = output_root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = output_root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

fn fmt_measure(value: Measure) -> String {
    value.value().map(fmt_f64).unwrap_or_default()
}

fn fmt_reason(value: Measure) -> String {
    value
        .unknown_reason()
        .map(|reason| reason.label().to_string())
        .unwrap_or_default()
}

pub fn write_periods_csv(path: &Path, result: &SweepResult) -> Result<(), SweepError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "period",
        "normalized_period",
        "forcing",
        "outlet_gain",
        "outlet_gain_reason",
        "outlet_lag",
        "outlet_lag_reason",
    ])?;

    for record in &result.records {
        writer.write_record([
            fmt_f64(record.period),
            fmt_f64(record.normalized_period),
            record.forcing.label().to_string(),
            fmt_measure(record.outlet_gain),
            fmt_reason(record.outlet_gain),
            fmt_measure(record.outlet_lag),
            fmt_reason(record.outlet_lag),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_nodes_csv(path: &Path, result: &SweepResult) -> Result<(), SweepError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "period",
        "forcing",
        "segment",
        "node",
        "x",
        "elevation_gain",
        "elevation_lag",
        "elevation_lag_reason",
        "sediment_discharge_gain",
    ])?;

    for record in &result.records {
        for segment in result.topology.segments() {
            let seg = segment.id;
            for (node, &x) in segment.x.iter().enumerate() {
                let lag = record.elevation_lag[seg][node];
                writer.write_record([
                    fmt_f64(record.period),
                    record.forcing.label().to_string(),
                    seg.to_string(),
                    node.to_string(),
                    fmt_f64(x),
                    fmt_measure(record.elevation_gain[seg][node]),
                    fmt_measure(lag),
                    fmt_reason(lag),
                    fmt_measure(record.sediment_discharge_gain[seg][node]),
                ])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    config: &'a SweepConfig,
    reference: &'a LinearValley,
    reference_equilibration_time: f64,
    periods: &'a [f64],
    calibration: Option<&'a Calibration>,
}

pub fn write_summary_json(
    path: &Path,
    config: &SweepConfig,
    result: &SweepResult,
) -> Result<(), SweepError> {
    let summary = Summary {
        config,
        reference: &result.reference,
        reference_equilibration_time: result.reference_equilibration_time,
        periods: &result.periods,
        calibration: result.calibration.as_ref(),
    };

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &summary)?;
    Ok(())
}
