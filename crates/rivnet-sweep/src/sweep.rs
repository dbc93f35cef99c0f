use rayon::prelude::*;
use rivnet::calibrate::{find_network_equilibration_time, Calibration, GoldenSectionMinimizer};
use rivnet::params::logspace;
use rivnet::{
    evolve_network_periodic, DiffusionNetwork, ForcingParams, Integrator, LinearValley, Measure,
    NetworkTopology, ReferenceModel,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SweepConfig;
use crate::SweepError;

/// Which boundary supply oscillates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcingKind {
    Sediment,
    Water,
}

impl ForcingKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sediment => "sediment",
            Self::Water => "water",
        }
    }

    fn params(self, period: f64, amplitude: f64) -> ForcingParams {
        match self {
            Self::Sediment => ForcingParams::sediment(period, amplitude),
            Self::Water => ForcingParams::water(period, amplitude),
        }
    }
}

/// Measurements from one period and forcing; lags are fractions of the period
#[derive(Debug, Clone, Serialize)]
pub struct PeriodRecord {
    pub period_index: usize,
    pub period: f64,
    /// Period over the reference equilibration time
    pub normalized_period: f64,
    pub forcing: ForcingKind,
    pub outlet_gain: Measure,
    pub outlet_lag: Measure,
    pub elevation_gain: Vec<Vec<Measure>>,
    pub elevation_lag: Vec<Vec<Measure>>,
    pub sediment_discharge_gain: Vec<Vec<Measure>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub topology: NetworkTopology,
    pub reference: LinearValley,
    pub reference_equilibration_time: f64,
    pub periods: Vec<f64>,
    /// Ordered by period, then forcing
    pub records: Vec<PeriodRecord>,
    /// Present when sediment forcing was run
    pub calibration: Option<Calibration>,
}

impl SweepResult {
    /// Outlet gains of one forcing, in period order
    pub fn outlet_gains(&self, forcing: ForcingKind) -> Vec<Measure> {
        self.records
            .iter()
            .filter(|record| record.forcing == forcing)
            .map(|record| record.outlet_gain)
            .collect()
    }
}

struct Job {
    period_index: usize,
    period: f64,
    forcing: ForcingKind,
}

pub fn run_sweep(config: &SweepConfig) -> Result<SweepResult, SweepError> {
    config.validate()?;

    let network = config.network.build()?;
    let reference = network.equivalent_valley()?;
    let teq = reference.equilibration_time();
    let periods: Vec<f64> = logspace(
        config.min_period_exponent,
        config.max_period_exponent,
        config.num_periods,
    )
    .into_iter()
    .map(|p| p * teq)
    .collect();

    let mut forcings = Vec::new();
    if config.run_sediment {
        forcings.push(ForcingKind::Sediment);
    }
    if config.run_water {
        forcings.push(ForcingKind::Water);
    }

    let jobs: Vec<Job> = periods
        .iter()
        .enumerate()
        .flat_map(|(period_index, &period)| {
            forcings.iter().map(move |&forcing| Job {
                period_index,
                period,
                forcing,
            })
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()?;
    let records = pool.install(|| {
        jobs.par_iter()
            .map(|job| run_job(&network, config, job, teq))
            .collect::<Result<Vec<_>, SweepError>>()
    })?;

    let calibration = if config.run_sediment {
        let gains: Vec<Measure> = records
            .iter()
            .filter(|record| record.forcing == ForcingKind::Sediment)
            .map(|record| record.outlet_gain)
            .collect();
        let calibration = find_network_equilibration_time(
            &periods,
            &gains,
            &reference,
            &GoldenSectionMinimizer::default(),
        )?;
        info!(
            equilibration_time = calibration.equilibration_time,
            reference_equilibration_time = teq,
            misfit = calibration.misfit,
            "calibrated network equilibration time"
        );
        Some(calibration)
    } else {
        warn!("sediment forcing disabled, skipping calibration");
        None
    };

    Ok(SweepResult {
        topology: network.topology().clone(),
        reference,
        reference_equilibration_time: teq,
        periods,
        records,
        calibration,
    })
}

fn run_job(
    network: &DiffusionNetwork,
    config: &SweepConfig,
    job: &Job,
    teq: f64,
) -> Result<PeriodRecord, SweepError> {
    let params = job
        .forcing
        .params(job.period, config.amplitude)
        .with_cycles(config.cycles)
        .with_samples_per_period(config.samples_per_period);
    let response = evolve_network_periodic(network, &params)?;

    info!(
        period = job.period,
        forcing = job.forcing.label(),
        outlet_gain = ?response.outlet_gain,
        "period finished"
    );

    Ok(PeriodRecord {
        period_index: job.period_index,
        period: job.period,
        normalized_period: job.period / teq,
        forcing: job.forcing,
        outlet_gain: response.outlet_gain,
        outlet_lag: response.normalized_outlet_lag(),
        elevation_lag: response.normalized_elevation_lag(),
        elevation_gain: response.elevation_gain,
        sediment_discharge_gain: response.sediment_discharge_gain,
    })
}
