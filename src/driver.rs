//! Periodic-forcing experiments
//!
//! One experiment drives a private copy of a network through several cycles
//! of sinusoidal supply forcing, records elevation and sediment discharge at
//! every node, then measures gain over the steady second half of the record
//! and lag over the whole record.

use ndarray::{s, Array2, ArrayView2};
use serde::Serialize;
use tracing::debug;

use crate::error::{ensure_len, ResponseError};
use crate::gain::compute_network_gain;
use crate::integrator::Integrator;
use crate::lag::find_lag_time;
use crate::measure::{Measure, Unmeasurable};
use crate::params::{ForcingParams, ForcingSeries};
use crate::resolver::find_network_lag_times;
use crate::topology::SegmentId;

/// Everything recorded and measured in one experiment
#[derive(Debug, Clone, Serialize)]
pub struct PeriodicResponse {
    pub forcing: ForcingParams,
    pub time: Vec<f64>,
    pub sediment_scale: Vec<f64>,
    pub water_scale: Vec<f64>,
    pub slope_scale: Vec<f64>,
    /// Per segment, indexed `[time, node]`
    pub elevation: Vec<Array2<f64>>,
    /// Per segment, indexed `[time, node]`
    pub sediment_discharge: Vec<Array2<f64>>,
    pub elevation_gain: Vec<Vec<Measure>>,
    pub sediment_discharge_gain: Vec<Vec<Measure>>,
    /// Elevation lag behind the inlet slope forcing, in time units
    pub elevation_lag: Vec<Vec<Measure>>,
    pub outlet: SegmentId,
    pub outlet_gain: Measure,
    /// Outlet sediment-discharge lag behind the inlet slope forcing, in time units
    pub outlet_lag: Measure,
}

impl PeriodicResponse {
    pub fn period(&self) -> f64 {
        self.forcing.period
    }

    /// Elevation lag as a fraction of the period
    pub fn normalized_elevation_lag(&self) -> Vec<Vec<Measure>> {
        let period = self.period();
        self.elevation_lag
            .iter()
            .map(|seg| seg.iter().map(|lag| lag.map(|v| v / period)).collect())
            .collect()
    }

    /// Outlet lag as a fraction of the period
    pub fn normalized_outlet_lag(&self) -> Measure {
        let period = self.period();
        self.outlet_lag.map(|v| v / period)
    }
}

/// Drive `integrator` through `forcing`, recording state at every sample
///
/// The first sample is the initial state; every later sample installs its
/// forcing and advances once across the grid spacing.
pub fn evolve_network<I: Integrator + ?Sized>(
    integrator: &mut I,
    forcing: &ForcingSeries,
) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>), ResponseError> {
    let n = forcing.len();
    ensure_len("sediment scale", n, forcing.sediment_scale.len())?;
    ensure_len("water scale", n, forcing.water_scale.len())?;
    ensure_len("slope scale", n, forcing.slope_scale.len())?;

    let shapes: Vec<(usize, usize)> = integrator
        .topology()
        .segments()
        .iter()
        .map(|segment| (n, segment.node_count()))
        .collect();
    let mut elevation: Vec<Array2<f64>> = shapes.iter().map(|&dim| Array2::zeros(dim)).collect();
    let mut discharge: Vec<Array2<f64>> = shapes.iter().map(|&dim| Array2::zeros(dim)).collect();

    for i in 0..n {
        if i > 0 {
            let dt = forcing.time[i] - forcing.time[i - 1];
            integrator.set_boundary_supply(forcing.sediment_scale[i], forcing.water_scale[i]);
            integrator.set_boundary_slope(forcing.slope_scale[i]);
            integrator.advance(dt, 1)?;
        }
        integrator.recompute_derived_discharge();

        for seg in 0..shapes.len() {
            record_row(&mut elevation[seg], i, integrator.elevation(seg), "elevation")?;
            record_row(
                &mut discharge[seg],
                i,
                integrator.sediment_discharge(seg),
                "sediment discharge",
            )?;
        }
    }

    Ok((elevation, discharge))
}

fn record_row(
    target: &mut Array2<f64>,
    row: usize,
    values: &[f64],
    context: &'static str,
) -> Result<(), ResponseError> {
    ensure_len(context, target.ncols(), values.len())?;
    for (cell, &value) in target.row_mut(row).iter_mut().zip(values) {
        *cell = value;
    }
    Ok(())
}

fn steady_window(states: &[Array2<f64>], start: usize) -> Vec<ArrayView2<'_, f64>> {
    states.iter().map(|a| a.slice(s![start.., ..])).collect()
}

/// Run one periodic-forcing experiment on a copy of `network`
pub fn evolve_network_periodic<I: Integrator + Clone>(
    network: &I,
    params: &ForcingParams,
) -> Result<PeriodicResponse, ResponseError> {
    params.validate()?;

    let mut working = network.clone();
    let series = params.forcing_series(working.slope_exponent());
    let (elevation, sediment_discharge) = evolve_network(&mut working, &series)?;

    let start = params.steady_start();
    let amplitude = params.forcing_amplitude();
    let elevation_gain = compute_network_gain(&steady_window(&elevation, start), amplitude);
    let sediment_discharge_gain =
        compute_network_gain(&steady_window(&sediment_discharge, start), amplitude);

    let topology = working.topology();
    let views: Vec<ArrayView2<'_, f64>> = elevation.iter().map(|a| a.view()).collect();
    let elevation_lag = find_network_lag_times(
        topology,
        &views,
        &series.time,
        &series.slope_scale,
        params.period,
        false,
    )?;

    let outlet = topology.outlet();
    let outlet_series: Vec<f64> = sediment_discharge[outlet]
        .column(topology.node_count(outlet) - 1)
        .to_vec();
    let outlet_gain = sediment_discharge_gain[outlet]
        .last()
        .copied()
        .unwrap_or(Measure::Unknown(Unmeasurable::DegenerateMean));
    let outlet_lag = find_lag_time(
        &series.slope_scale,
        &outlet_series,
        &series.time,
        params.period,
        params.can_lead(),
    )?;

    debug!(
        period = params.period,
        sediment_amplitude = params.sediment_amplitude,
        water_amplitude = params.water_amplitude,
        outlet_gain = ?outlet_gain,
        outlet_lag = ?outlet_lag,
        "periodic experiment finished"
    );

    let ForcingSeries {
        time,
        sediment_scale,
        water_scale,
        slope_scale,
    } = series;

    Ok(PeriodicResponse {
        forcing: *params,
        time,
        sediment_scale,
        water_scale,
        slope_scale,
        elevation,
        sediment_discharge,
        elevation_gain,
        sediment_discharge_gain,
        elevation_lag,
        outlet,
        outlet_gain,
        outlet_lag,
    })
}
