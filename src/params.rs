//! Periodic forcing parameters
//!
//! Parameters for one periodic-forcing experiment and the forcing series they
//! generate.

use serde::{Deserialize, Serialize};

use crate::error::ResponseError;

/// Default number of forcing cycles simulated per experiment
pub const DEFAULT_CYCLES: usize = 4;
/// Default number of time-grid samples per forcing cycle
pub const DEFAULT_SAMPLES_PER_PERIOD: usize = 1000;
/// Default share of the time grid discarded as transient before measuring gain
pub const DEFAULT_TRANSIENT_FRACTION: f64 = 0.5;

/// Parameters for one periodic-forcing experiment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForcingParams {
    /// Forcing period
    pub period: f64,
    /// Relative amplitude of the sediment-supply oscillation (0 <= A < 1)
    pub sediment_amplitude: f64,
    /// Relative amplitude of the water-supply oscillation (0 <= A < 1)
    pub water_amplitude: f64,
    /// Number of forcing cycles to simulate
    pub cycles: usize,
    /// Time-grid samples per cycle
    pub samples_per_period: usize,
    /// Leading share of the time grid ignored when measuring gain
    pub transient_fraction: f64,
}

impl ForcingParams {
    /// Create parameters with the default grid for the given period and amplitudes
    pub fn new(period: f64, sediment_amplitude: f64, water_amplitude: f64) -> Self {
        Self {
            period,
            sediment_amplitude,
            water_amplitude,
            cycles: DEFAULT_CYCLES,
            samples_per_period: DEFAULT_SAMPLES_PER_PERIOD,
            transient_fraction: DEFAULT_TRANSIENT_FRACTION,
        }
    }

    /// Sediment-supply forcing only
    pub fn sediment(period: f64, amplitude: f64) -> Self {
        Self::new(period, amplitude, 0.0)
    }

    /// Water-supply forcing only
    pub fn water(period: f64, amplitude: f64) -> Self {
        Self::new(period, 0.0, amplitude)
    }

    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_samples_per_period(mut self, samples: usize) -> Self {
        self.samples_per_period = samples;
        self
    }

    pub fn validate(&self) -> Result<(), ResponseError> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(ResponseError::InvalidParams(
                "period must be finite and > 0".to_string(),
            ));
        }

        for (name, amplitude) in [
            ("sediment_amplitude", self.sediment_amplitude),
            ("water_amplitude", self.water_amplitude),
        ] {
            if !(0.0..1.0).contains(&amplitude) {
                return Err(ResponseError::InvalidParams(format!(
                    "{name} must be in [0, 1)"
                )));
            }
        }

        if self.cycles == 0 {
            return Err(ResponseError::InvalidParams(
                "cycles must be greater than zero".to_string(),
            ));
        }

        if self.samples_per_period < 4 {
            return Err(ResponseError::InvalidParams(
                "samples_per_period must be at least 4".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.transient_fraction) {
            return Err(ResponseError::InvalidParams(
                "transient_fraction must be in [0, 1)".to_string(),
            ));
        }

        Ok(())
    }

    /// Amplitude used to normalise gains
    pub fn forcing_amplitude(&self) -> f64 {
        self.sediment_amplitude.max(self.water_amplitude)
    }

    /// Water-driven discharge responses may anticipate the slope forcing
    pub fn can_lead(&self) -> bool {
        self.water_amplitude > 0.0
    }

    pub fn sample_count(&self) -> usize {
        self.samples_per_period * self.cycles
    }

    /// First sample index of the steady window used for gain
    pub fn steady_start(&self) -> usize {
        (self.sample_count() as f64 * self.transient_fraction).floor() as usize
    }

    /// Evenly spaced grid from 0 to `cycles * period` inclusive
    pub fn time_grid(&self) -> Vec<f64> {
        linspace(0.0, self.period * self.cycles as f64, self.sample_count())
    }

    /// Build the sediment, water and slope scale-factor series
    ///
    /// `slope_exponent` links supply ratio to inlet slope:
    /// `slope_scale = (sediment_scale / water_scale)^slope_exponent`.
    pub fn forcing_series(&self, slope_exponent: f64) -> ForcingSeries {
        let time = self.time_grid();
        let omega = std::f64::consts::TAU / self.period;

        let sediment_scale: Vec<f64> = time
            .iter()
            .map(|&t| 1.0 + self.sediment_amplitude * (omega * t).sin())
            .collect();
        let water_scale: Vec<f64> = time
            .iter()
            .map(|&t| 1.0 + self.water_amplitude * (omega * t).sin())
            .collect();
        let slope_scale = sediment_scale
            .iter()
            .zip(water_scale.iter())
            .map(|(&qs, &q)| (qs / q).powf(slope_exponent))
            .collect();

        ForcingSeries {
            time,
            sediment_scale,
            water_scale,
            slope_scale,
        }
    }
}

impl Default for ForcingParams {
    fn default() -> Self {
        Self::sediment(1.0, 0.2)
    }
}

/// Time grid and boundary scale factors for one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingSeries {
    pub time: Vec<f64>,
    pub sediment_scale: Vec<f64>,
    pub water_scale: Vec<f64>,
    pub slope_scale: Vec<f64>,
}

impl ForcingSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|idx| start + step * idx as f64).collect()
        }
    }
}

/// `n` log-spaced values from `10^lo` to `10^hi` inclusive
pub fn logspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    linspace(lo, hi, n)
        .into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_grid_shape() {
        let params = ForcingParams::sediment(2.0, 0.2);
        let time = params.time_grid();
        assert_eq!(time.len(), 4000);
        assert_eq!(time[0], 0.0);
        assert_abs_diff_eq!(time[3999], 8.0, epsilon = 1e-12);
        assert_eq!(params.steady_start(), 2000);
    }

    #[test]
    fn test_slope_scale_follows_supply_ratio() {
        let params = ForcingParams::new(1.0, 0.2, 0.1).with_samples_per_period(8);
        let series = params.forcing_series(6.0 / 7.0);
        for idx in 0..series.len() {
            let ratio = series.sediment_scale[idx] / series.water_scale[idx];
            assert_abs_diff_eq!(
                series.slope_scale[idx],
                ratio.powf(6.0 / 7.0),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_amplitude() {
        assert!(ForcingParams::sediment(1.0, 1.0).validate().is_err());
        assert!(ForcingParams::water(1.0, -0.1).validate().is_err());
        assert!(ForcingParams::sediment(0.0, 0.2).validate().is_err());
        assert!(ForcingParams::sediment(1.0, 0.2).validate().is_ok());
    }

    #[test]
    fn test_can_lead_only_with_water_forcing() {
        assert!(!ForcingParams::sediment(1.0, 0.2).can_lead());
        assert!(ForcingParams::water(1.0, 0.2).can_lead());
    }

    #[test]
    fn test_logspace_endpoints() {
        let values = logspace(-2.0, 2.0, 5);
        assert_abs_diff_eq!(values[0], 0.01, epsilon = 1e-15);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[4], 100.0, epsilon = 1e-9);
    }
}
