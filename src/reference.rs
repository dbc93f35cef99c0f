//! Closed-form single-valley reference
//!
//! A linear-diffusion valley of length `L` and diffusivity `κ` with sediment
//! flux `Q = -κ ∂z/∂x`, an imposed inlet flux and a fraction `f` of the total
//! supply delivered uniformly along the valley. Forcing both supplies by
//! `1 + A sin(ωt)` gives an outlet flux oscillation with transfer function
//!
//! `H(ω) = ((1 - f) + f sinh(kL) / (kL)) / cosh(kL)`, `k = sqrt(iω / κ)`
//!
//! which is evaluated here in exponential form so that short periods never
//! overflow.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ResponseError;
use crate::measure::{Measure, Unmeasurable};

/// Single-segment model with closed-form periodic response
pub trait ReferenceModel {
    /// Characteristic relaxation time
    fn equilibration_time(&self) -> f64;

    /// Outlet sediment-discharge gain at `period`
    fn analytic_gain(&self, period: f64) -> f64;

    /// Outlet sediment-discharge lag at `period`, in `[0, period)`
    fn analytic_lag(&self, period: f64) -> f64;
}

/// Linear-diffusion valley
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearValley {
    pub length: f64,
    pub diffusivity: f64,
    /// Share of the sediment supply delivered along the valley rather than at the inlet
    pub along_stream_fraction: f64,
}

impl Default for LinearValley {
    fn default() -> Self {
        Self {
            length: 1.0,
            diffusivity: 1.0,
            along_stream_fraction: 0.0,
        }
    }
}

impl LinearValley {
    pub fn new(
        length: f64,
        diffusivity: f64,
        along_stream_fraction: f64,
    ) -> Result<Self, ResponseError> {
        let valley = Self {
            length,
            diffusivity,
            along_stream_fraction,
        };
        valley.validate()?;
        Ok(valley)
    }

    /// Valley fed only at its inlet
    pub fn upstream_fed(length: f64, diffusivity: f64) -> Result<Self, ResponseError> {
        Self::new(length, diffusivity, 0.0)
    }

    /// Valley fed only along its length
    pub fn along_stream_fed(length: f64, diffusivity: f64) -> Result<Self, ResponseError> {
        Self::new(length, diffusivity, 1.0)
    }

    pub fn validate(&self) -> Result<(), ResponseError> {
        if !(self.length.is_finite() && self.length > 0.0) {
            return Err(ResponseError::InvalidParams(
                "valley length must be finite and > 0".to_string(),
            ));
        }
        if !(self.diffusivity.is_finite() && self.diffusivity > 0.0) {
            return Err(ResponseError::InvalidParams(
                "diffusivity must be finite and > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.along_stream_fraction) {
            return Err(ResponseError::InvalidParams(
                "along_stream_fraction must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    fn wavenumber(&self, omega: f64) -> Complex64 {
        (Complex64::i() * omega / self.diffusivity).sqrt()
    }

    /// Outlet flux transfer function; `None` for an infinite period
    pub fn transfer(&self, period: f64) -> Option<Complex64> {
        let omega = angular_frequency(period)?;
        let f = self.along_stream_fraction;
        let u = self.wavenumber(omega) * self.length;
        let e1 = (-u).exp();
        let e2 = (-2.0 * u).exp();

        Some(((1.0 - f) * 2.0 * e1 + f * (1.0 - e2) / u) / (1.0 + e2))
    }

    /// Elevation gain at distance `x` from the inlet
    pub fn elevation_gain(&self, period: f64, x: f64) -> Measure {
        match self.elevation_response(period, x) {
            Some((amplitude, _)) => Measure::Known(amplitude.norm()),
            None if period.is_infinite() && x < self.length => Measure::Known(1.0),
            None => Measure::Unknown(Unmeasurable::DegenerateMean),
        }
    }

    /// Elevation lag at distance `x` from the inlet, in `[0, period)`
    pub fn elevation_lag(&self, period: f64, x: f64) -> Measure {
        match self.elevation_response(period, x) {
            Some((amplitude, omega)) => Measure::Known(phase_lag(amplitude, omega)),
            None if period.is_infinite() && x < self.length => Measure::Known(0.0),
            None => Measure::Unknown(Unmeasurable::DegenerateMean),
        }
    }

    /// Complex elevation amplitude relative to the mean elevation, with `ω`
    fn elevation_response(&self, period: f64, x: f64) -> Option<(Complex64, f64)> {
        let omega = angular_frequency(period)?;
        let length = self.length;
        let remaining = length - x;
        if !(0.0..length).contains(&x) {
            return None;
        }

        // Flux units with unit total supply; diffusivity cancels in the ratio.
        let inlet = 1.0 - self.along_stream_fraction;
        let supply = self.along_stream_fraction / length;
        let mean = inlet * remaining + supply * (length * length - x * x) / 2.0;
        if mean <= 0.0 {
            return None;
        }

        let k = self.wavenumber(omega);
        let sinh_ratio = sinh_over_cosh(k * remaining, k * length);
        let cosh_ratio = cosh_over_cosh(k * x, k * length);
        let amplitude = (inlet * sinh_ratio + supply / k * (1.0 - cosh_ratio)) / k;

        Some((amplitude / mean, omega))
    }
}

impl ReferenceModel for LinearValley {
    fn equilibration_time(&self) -> f64 {
        self.length * self.length / self.diffusivity
    }

    fn analytic_gain(&self, period: f64) -> f64 {
        if period == 0.0 {
            return 0.0;
        }
        self.transfer(period).map_or(1.0, |h| h.norm())
    }

    fn analytic_lag(&self, period: f64) -> f64 {
        match (self.transfer(period), angular_frequency(period)) {
            (Some(h), Some(omega)) => phase_lag(h, omega),
            _ => 0.0,
        }
    }
}

/// `2π / |period|`, or `None` when the period is infinite or zero
fn angular_frequency(period: f64) -> Option<f64> {
    let period = period.abs();
    (period.is_finite() && period > 0.0).then(|| std::f64::consts::TAU / period)
}

fn phase_lag(response: Complex64, omega: f64) -> f64 {
    (-response.arg()).rem_euclid(std::f64::consts::TAU) / omega
}

// Both ratios assume Re(a) <= Re(b), so every exponential is bounded.
fn sinh_over_cosh(a: Complex64, b: Complex64) -> Complex64 {
    ((a - b).exp() - (-a - b).exp()) / (1.0 + (-2.0 * b).exp())
}

fn cosh_over_cosh(a: Complex64, b: Complex64) -> Complex64 {
    ((a - b).exp() + (-a - b).exp()) / (1.0 + (-2.0 * b).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gain_and_lag_at_equilibration_period() {
        let upstream = LinearValley::upstream_fed(1.0, 1.0).expect("valley");
        let along = LinearValley::along_stream_fed(1.0, 1.0).expect("valley");
        let period = upstream.equilibration_time();

        assert_abs_diff_eq!(upstream.analytic_gain(period), 0.3491, epsilon = 1e-3);
        assert_abs_diff_eq!(upstream.analytic_lag(period), 0.2839, epsilon = 1e-3);
        assert_abs_diff_eq!(along.analytic_gain(period), 0.4207, epsilon = 1e-3);
        assert_abs_diff_eq!(along.analytic_lag(period), 0.1286, epsilon = 1e-3);
    }

    #[test]
    fn test_equilibration_time_scales_with_length() {
        let valley = LinearValley::new(3.0, 2.0, 0.5).expect("valley");
        assert_abs_diff_eq!(valley.equilibration_time(), 4.5);

        // Gain depends on period only through period / Teq.
        let unit = LinearValley::new(1.0, 1.0, 0.5).expect("valley");
        assert_abs_diff_eq!(
            valley.analytic_gain(4.5 * 0.3),
            unit.analytic_gain(0.3),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_period_limits() {
        let valley = LinearValley::default();
        assert_abs_diff_eq!(valley.analytic_gain(1e6), 1.0, epsilon = 1e-2);
        assert_eq!(valley.analytic_gain(f64::INFINITY), 1.0);
        assert_eq!(valley.analytic_gain(0.0), 0.0);

        let short = valley.analytic_gain(1e-8);
        assert!(short.is_finite() && short < 1e-6);
        assert!(valley.analytic_lag(1e-8).is_finite());
    }

    #[test]
    fn test_elevation_response() {
        let valley = LinearValley::default();
        let gain = valley.elevation_gain(1e6, 0.0).value().expect("gain");
        assert_abs_diff_eq!(gain, 1.0, epsilon = 1e-2);

        // Elevation lag grows downstream towards the outlet flux lag.
        let inlet = valley.elevation_lag(1.0, 0.0).value().expect("lag");
        let lower = valley.elevation_lag(1.0, 0.99).value().expect("lag");
        assert!(inlet > 0.0 && inlet < lower);
        assert_abs_diff_eq!(lower, valley.analytic_lag(1.0), epsilon = 1e-3);

        assert_eq!(
            valley.elevation_gain(1.0, 1.0),
            Measure::Unknown(Unmeasurable::DegenerateMean)
        );
        assert_eq!(valley.elevation_gain(f64::INFINITY, 0.5), Measure::Known(1.0));
    }

    #[test]
    fn test_rejects_invalid_geometry() {
        assert!(LinearValley::new(0.0, 1.0, 0.0).is_err());
        assert!(LinearValley::new(1.0, -1.0, 0.0).is_err());
        assert!(LinearValley::new(1.0, 1.0, 1.5).is_err());
    }
}
