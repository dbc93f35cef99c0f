//! Amplitude gain of a response relative to its forcing
//!
//! Gain is the half peak-to-peak amplitude of a node's series, normalised by
//! the series mean and the relative forcing amplitude. Amplitude ratios have
//! no phase ambiguity, so no cycle-skip correction is needed.

use ndarray::ArrayView2;

use crate::measure::{Measure, Unmeasurable};

/// Gain of one series over its full length
pub fn series_gain(values: &[f64], forcing_amplitude: f64) -> Measure {
    if values.is_empty() || forcing_amplitude == 0.0 || !forcing_amplitude.is_finite() {
        return Measure::Unknown(Unmeasurable::DegenerateMean);
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    if mean == 0.0 || !mean.is_finite() {
        return Measure::Unknown(Unmeasurable::DegenerateMean);
    }

    let amplitude = (max - min) / 2.0;
    Measure::Known(amplitude / (forcing_amplitude * mean))
}

/// Per-node gain of one segment
///
/// `state` is indexed `[time, node]` and should already be restricted to
/// the steady window.
pub fn compute_gain(state: ArrayView2<'_, f64>, forcing_amplitude: f64) -> Vec<Measure> {
    state
        .columns()
        .into_iter()
        .map(|column| series_gain(&column.to_vec(), forcing_amplitude))
        .collect()
}

/// Per-node gain of every segment, in segment order
pub fn compute_network_gain(
    states: &[ArrayView2<'_, f64>],
    forcing_amplitude: f64,
) -> Vec<Vec<Measure>> {
    states
        .iter()
        .map(|state| compute_gain(state.view(), forcing_amplitude))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{self, SignalConfig};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_scaled_forcing_recovers_gain() {
        // Whole number of periods without the closing endpoint keeps the
        // sampled mean exact.
        let n = 4000;
        let time: Vec<f64> = (0..n).map(|i| 4.0 * i as f64 / n as f64).collect();
        let forcing_amplitude = 0.2;
        for (mean, gain) in [(1.0, 0.5), (3.5, 1.3)] {
            let amplitude = mean * forcing_amplitude * gain;
            let response = synthetic::sinusoid(&time, 1.0, mean, amplitude, 0.1);
            let measured = series_gain(&response, forcing_amplitude)
                .value()
                .expect("measurable gain");
            assert_relative_eq!(measured, gain, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        let zero_mean = [-1.0, 1.0, -1.0, 1.0];
        assert_eq!(
            series_gain(&zero_mean, 0.2),
            Measure::Unknown(Unmeasurable::DegenerateMean)
        );
        assert_eq!(
            series_gain(&[1.0, 2.0], 0.0),
            Measure::Unknown(Unmeasurable::DegenerateMean)
        );
        assert_eq!(
            series_gain(&[], 0.2),
            Measure::Unknown(Unmeasurable::DegenerateMean)
        );
    }

    #[test]
    fn test_network_gain_shapes_follow_segments() {
        let config = SignalConfig::default();
        let time = config.time_grid();
        let a = synthetic::along_stream_response(&config, &time, &[0.1, 0.2, 0.3]).expect("a");
        let b = Array2::from_elem((time.len(), 2), 2.0);

        let gains = compute_network_gain(&[a.view(), b.view()], 0.2);
        assert_eq!(gains.len(), 2);
        assert_eq!(gains[0].len(), 3);
        assert!(gains[0].iter().all(|gain| gain.is_known()));
        assert_eq!(gains[1], vec![Measure::Known(0.0); 2]);
    }
}
