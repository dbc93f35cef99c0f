//! Network equilibration-time calibration
//!
//! Outlet gain falls off with `period / Teq` in the same way for a network
//! and a single valley, so the network timescale can be read off by
//! stretching the measured gain curve onto the reference curve. The stretch
//! factor `scale = Teq_reference / Teq_network` is found by a 1-D search
//! minimising the RMS gain misfit, seeded at `scale = 1`.
//!
//! The search is local. A multimodal misfit can trap it, and no convergence
//! test is applied to the result.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ensure_len, ResponseError};
use crate::measure::Measure;
use crate::reference::ReferenceModel;

/// Golden ratio conjugate, `(sqrt(5) - 1) / 2`
const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Best point found by a minimizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub cost: f64,
    pub evaluations: usize,
}

/// Unconstrained minimisation of a scalar function of one variable
pub trait ScalarMinimizer {
    fn minimize(&self, cost: &dyn Fn(f64) -> f64, seed: f64) -> Result<Minimum, ResponseError>;
}

/// Downhill bracketing from the seed followed by golden-section refinement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoldenSectionMinimizer {
    /// First trial step away from the seed
    pub initial_step: f64,
    /// Step growth factor while bracketing
    pub growth: f64,
    /// Relative bracket width at which refinement stops
    pub tolerance: f64,
    pub max_evaluations: usize,
}

impl Default for GoldenSectionMinimizer {
    fn default() -> Self {
        Self {
            initial_step: 0.1,
            growth: 1.0 + INV_PHI,
            tolerance: 1e-8,
            max_evaluations: 500,
        }
    }
}

/// Cost evaluations with a running best
struct Tracker<'a> {
    cost: &'a dyn Fn(f64) -> f64,
    evaluations: usize,
    best: Minimum,
}

impl<'a> Tracker<'a> {
    fn new(cost: &'a dyn Fn(f64) -> f64) -> Self {
        Self {
            cost,
            evaluations: 0,
            best: Minimum {
                x: f64::NAN,
                cost: f64::INFINITY,
                evaluations: 0,
            },
        }
    }

    fn eval(&mut self, x: f64) -> f64 {
        let value = (self.cost)(x);
        self.evaluations += 1;
        if value < self.best.cost || self.best.x.is_nan() {
            self.best = Minimum {
                x,
                cost: value,
                evaluations: 0,
            };
        }
        value
    }

    fn finish(self) -> Minimum {
        Minimum {
            evaluations: self.evaluations,
            ..self.best
        }
    }
}

impl GoldenSectionMinimizer {
    fn validate(&self) -> Result<(), ResponseError> {
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(ResponseError::InvalidParams(
                "initial_step must be finite and > 0".to_string(),
            ));
        }
        if !(self.growth > 1.0) {
            return Err(ResponseError::InvalidParams(
                "growth must be > 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) || self.max_evaluations < 3 {
            return Err(ResponseError::InvalidParams(
                "tolerance must be > 0 and max_evaluations at least 3".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScalarMinimizer for GoldenSectionMinimizer {
    fn minimize(&self, cost: &dyn Fn(f64) -> f64, seed: f64) -> Result<Minimum, ResponseError> {
        self.validate()?;
        if !seed.is_finite() {
            return Err(ResponseError::InvalidParams(
                "minimizer seed must be finite".to_string(),
            ));
        }

        let mut tracker = Tracker::new(cost);

        // Bracket: walk downhill with growing steps until the cost rises.
        let (mut a, mut b) = (seed, seed + self.initial_step);
        let (mut fa, mut fb) = (tracker.eval(a), tracker.eval(b));
        if fb > fa {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
        let mut c = b + self.growth * (b - a);
        let mut fc = tracker.eval(c);
        while fc < fb {
            if tracker.evaluations >= self.max_evaluations || !c.is_finite() {
                warn!(x = c, "no bracket found, keeping best point");
                return Ok(tracker.finish());
            }
            a = b;
            b = c;
            fb = fc;
            c = b + self.growth * (b - a);
            fc = tracker.eval(c);
        }

        // Refine within [lo, hi], which holds the bracketed minimum at `b`.
        let (mut lo, mut hi) = if a < c { (a, c) } else { (c, a) };
        let mut x1 = hi - INV_PHI * (hi - lo);
        let mut x2 = lo + INV_PHI * (hi - lo);
        let mut f1 = tracker.eval(x1);
        let mut f2 = tracker.eval(x2);

        while (hi - lo) > self.tolerance * (1.0 + b.abs())
            && tracker.evaluations < self.max_evaluations
        {
            if f1 < f2 {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - INV_PHI * (hi - lo);
                f1 = tracker.eval(x1);
            } else {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + INV_PHI * (hi - lo);
                f2 = tracker.eval(x2);
            }
        }

        Ok(tracker.finish())
    }
}

/// Calibrated network timescale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// `Teq_reference / Teq_network`
    pub scale: f64,
    pub equilibration_time: f64,
    /// RMS gain misfit at the best scale
    pub misfit: f64,
    pub evaluations: usize,
    /// Periods with a measurable gain
    pub periods_used: usize,
}

/// RMS difference between measured gains and the reference gain at `period * scale`
pub fn gain_misfit<R: ReferenceModel + ?Sized>(
    scale: f64,
    periods: &[f64],
    gains: &[f64],
    reference: &R,
) -> f64 {
    if periods.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = periods
        .iter()
        .zip(gains)
        .map(|(&period, &gain)| {
            let residual = gain - reference.analytic_gain(period * scale);
            residual * residual
        })
        .sum();
    (sum_sq / periods.len() as f64).sqrt()
}

/// Fit the network equilibration time to measured outlet gains
///
/// Periods whose gain could not be measured are left out of the misfit.
pub fn find_network_equilibration_time<R, M>(
    periods: &[f64],
    gains: &[Measure],
    reference: &R,
    minimizer: &M,
) -> Result<Calibration, ResponseError>
where
    R: ReferenceModel + ?Sized,
    M: ScalarMinimizer + ?Sized,
{
    ensure_len("calibration gains", periods.len(), gains.len())?;

    let (used_periods, used_gains): (Vec<f64>, Vec<f64>) = periods
        .iter()
        .zip(gains)
        .filter_map(|(&period, gain)| gain.value().map(|g| (period, g)))
        .filter(|(period, gain)| period.is_finite() && gain.is_finite())
        .unzip();
    if used_periods.is_empty() {
        return Err(ResponseError::Calibration(
            "no measurable outlet gains".to_string(),
        ));
    }

    let cost = |scale: f64| gain_misfit(scale, &used_periods, &used_gains, reference);
    let best = minimizer.minimize(&cost, 1.0)?;

    // The misfit is even in the scale, so a negative optimum is its mirror.
    if best.x <= 0.0 {
        warn!(scale = best.x, "calibration settled on a non-positive scale");
    }
    let scale = best.x.abs();
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ResponseError::Calibration(format!(
            "degenerate timescale scale {}",
            best.x
        )));
    }

    let equilibration_time = reference.equilibration_time() / scale;
    debug!(
        scale,
        equilibration_time,
        misfit = best.cost,
        evaluations = best.evaluations,
        "calibrated equilibration time"
    );

    Ok(Calibration {
        scale,
        equilibration_time,
        misfit: best.cost,
        evaluations: best.evaluations,
        periods_used: used_periods.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::Unmeasurable;
    use crate::params::logspace;
    use crate::reference::LinearValley;
    use approx::assert_abs_diff_eq;

    fn scaled_gains(reference: &LinearValley, periods: &[f64], k: f64) -> Vec<Measure> {
        periods
            .iter()
            .map(|&p| Measure::Known(reference.analytic_gain(p * k)))
            .collect()
    }

    #[test]
    fn test_minimizes_quadratic() {
        let minimizer = GoldenSectionMinimizer::default();
        let cost = |x: f64| (x - 3.0) * (x - 3.0) + 2.0;
        let best = minimizer.minimize(&cost, 1.0).expect("minimum");
        assert_abs_diff_eq!(best.x, 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(best.cost, 2.0, epsilon = 1e-8);

        let cost = |x: f64| (x + 0.5).abs();
        let best = minimizer.minimize(&cost, 1.0).expect("minimum");
        assert_abs_diff_eq!(best.x, -0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_recovers_known_timescale() {
        let reference = LinearValley::new(1.0, 1.0, 0.5).expect("valley");
        let teq = reference.equilibration_time();
        let periods: Vec<f64> = logspace(-2.0, 2.0, 7).iter().map(|p| p * teq).collect();

        for k in [2.5, 0.5] {
            let gains = scaled_gains(&reference, &periods, k);
            let calibration = find_network_equilibration_time(
                &periods,
                &gains,
                &reference,
                &GoldenSectionMinimizer::default(),
            )
            .expect("calibration");

            let expected = teq / k;
            assert!(
                (calibration.equilibration_time - expected).abs() <= 0.01 * expected,
                "k = {k}: {} vs {expected}",
                calibration.equilibration_time
            );
            assert_eq!(calibration.periods_used, 7);
        }
    }

    #[test]
    fn test_unknown_gains_are_skipped() {
        let reference = LinearValley::default();
        let periods = logspace(-1.0, 1.0, 5);
        let mut gains = scaled_gains(&reference, &periods, 2.0);
        gains[1] = Measure::Unknown(Unmeasurable::DegenerateMean);

        let calibration = find_network_equilibration_time(
            &periods,
            &gains,
            &reference,
            &GoldenSectionMinimizer::default(),
        )
        .expect("calibration");
        assert_eq!(calibration.periods_used, 4);
        assert_abs_diff_eq!(calibration.equilibration_time, 0.5, epsilon = 5e-3);
    }

    #[test]
    fn test_no_usable_gains_is_an_error() {
        let reference = LinearValley::default();
        let gains = vec![Measure::Unknown(Unmeasurable::DegenerateMean); 3];
        let result = find_network_equilibration_time(
            &[0.1, 1.0, 10.0],
            &gains,
            &reference,
            &GoldenSectionMinimizer::default(),
        );
        assert!(matches!(result, Err(ResponseError::Calibration(_))));
    }

    #[test]
    fn test_misfit_vanishes_at_true_scale() {
        let reference = LinearValley::default();
        let periods = [0.1, 1.0, 10.0];
        let gains: Vec<f64> = periods.iter().map(|&p| reference.analytic_gain(p * 1.5)).collect();
        assert_abs_diff_eq!(gain_misfit(1.5, &periods, &gains, &reference), 0.0);
        assert!(gain_misfit(1.0, &periods, &gains, &reference) > 0.0);
    }
}
