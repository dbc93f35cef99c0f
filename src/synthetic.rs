//! Synthetic periodic signals
//!
//! Generates forcing and lagged response series with known lag and optional
//! Gaussian noise, for exercising the gain and lag measurements against exact
//! answers.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::ResponseError;
use crate::params::linspace;

/// Synthetic signal configuration
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub period: f64,
    pub cycles: usize,
    pub samples_per_period: usize,
    /// Mean of the response series
    pub mean: f64,
    /// Absolute amplitude of the response oscillation
    pub amplitude: f64,
    /// Standard deviation of additive response noise
    pub sigma_noise: f64,
    pub seed: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            period: 1.0,
            cycles: 4,
            samples_per_period: 1000,
            mean: 1.0,
            amplitude: 0.1,
            sigma_noise: 0.0,
            seed: 42,
        }
    }
}

impl SignalConfig {
    /// Inclusive time grid, matching the experiment driver's grid
    pub fn time_grid(&self) -> Vec<f64> {
        let n = self.samples_per_period * self.cycles;
        linspace(0.0, self.period * self.cycles as f64, n)
    }

    fn noise(&self, salt: u64) -> Result<Option<(StdRng, Normal<f64>)>, ResponseError> {
        if self.sigma_noise == 0.0 {
            return Ok(None);
        }

        let normal = Normal::new(0.0, self.sigma_noise)
            .map_err(|err| ResponseError::InvalidParams(format!("sigma_noise: {err}")))?;
        let rng = StdRng::seed_from_u64(self.seed ^ salt);
        Ok(Some((rng, normal)))
    }
}

/// `mean + amplitude * sin(2π (t - lag) / period)`
pub fn sinusoid(time: &[f64], period: f64, mean: f64, amplitude: f64, lag: f64) -> Vec<f64> {
    let omega = std::f64::consts::TAU / period;
    time.iter()
        .map(|&t| mean + amplitude * (omega * (t - lag)).sin())
        .collect()
}

/// Unit-mean forcing scale factor `1 + relative_amplitude * sin(2πt / period)`
pub fn forcing(time: &[f64], period: f64, relative_amplitude: f64) -> Vec<f64> {
    sinusoid(time, period, 1.0, relative_amplitude, 0.0)
}

/// Response lagging the forcing by `lag`, with configured noise
pub fn noisy_response(
    config: &SignalConfig,
    time: &[f64],
    lag: f64,
) -> Result<Vec<f64>, ResponseError> {
    let mut values = sinusoid(time, config.period, config.mean, config.amplitude, lag);

    if let Some((mut rng, normal)) = config.noise(0)? {
        for value in values.iter_mut() {
            *value += normal.sample(&mut rng);
        }
    }

    Ok(values)
}

/// Time x node response array with one lag per node
///
/// Each node draws noise from its own seeded stream.
pub fn along_stream_response(
    config: &SignalConfig,
    time: &[f64],
    lags: &[f64],
) -> Result<Array2<f64>, ResponseError> {
    let mut response = Array2::zeros((time.len(), lags.len()));

    for (node, &lag) in lags.iter().enumerate() {
        let mut column = sinusoid(time, config.period, config.mean, config.amplitude, lag);
        if let Some((mut rng, normal)) = config.noise(node as u64 + 1)? {
            for value in column.iter_mut() {
                *value += normal.sample(&mut rng);
            }
        }

        for (row, value) in column.into_iter().enumerate() {
            response[[row, node]] = value;
        }
    }

    Ok(response)
}

/// Constant response with no turning points, used for unmeasurable nodes
pub fn flat_response(time: &[f64], value: f64) -> Vec<f64> {
    vec![value; time.len()]
}
