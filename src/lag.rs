//! Lag measurement between a forcing and its response
//!
//! A lag is the mean time between index-paired turning points of the forcing
//! and the response. Along a segment, per-node lags are then checked for
//! cycle skipping: a jump of more than [`CYCLE_SKIP_THRESHOLD`] periods
//! between neighbouring nodes is taken as a half-period aliasing artefact.

use ndarray::ArrayView2;

use crate::error::{ensure_len, ResponseError};
use crate::extrema::TurningPoints;
use crate::measure::{known_difference, Measure, Unmeasurable};

/// Jump between neighbouring lags, in periods, treated as cycle skipping
pub const CYCLE_SKIP_THRESHOLD: f64 = 0.4;
/// Correction applied per cycle skip, in periods
pub const HALF_CYCLE: f64 = 0.5;
/// Lags below `-IMPLAUSIBLE_LEAD * period` are rejected
pub const IMPLAUSIBLE_LEAD: f64 = 0.3;
/// Leading pairs dropped as transient
const TRANSIENT_PAIRS: usize = 2;
/// Fewest turning-point pairs yielding a lag
const MIN_PAIRS: usize = 4;

/// Measure the lag of `response` behind `forcing`
///
/// # Arguments
/// * `forcing` - Forcing series
/// * `response` - Response series on the same time grid
/// * `time` - Sample times
/// * `period` - Nominal forcing period
/// * `can_lead` - Keep response turning points that precede the first
///   forcing turning point
///
/// # Returns
/// The mean lag in time units, or the reason it could not be measured
pub fn find_lag_time(
    forcing: &[f64],
    response: &[f64],
    time: &[f64],
    period: f64,
    can_lead: bool,
) -> Result<Measure, ResponseError> {
    ensure_len("lag forcing", time.len(), forcing.len())?;
    ensure_len("lag response", time.len(), response.len())?;

    let forcing_tps = TurningPoints::detect(forcing).merged();
    // Equal peak and trough counts average out any peak/trough asymmetry.
    let mut response_tps = TurningPoints::detect(response).balanced().merged();

    let Some(&first_forcing) = forcing_tps.first() else {
        return Ok(Measure::Unknown(Unmeasurable::InsufficientExtrema));
    };

    if !can_lead {
        response_tps.retain(|&idx| idx >= first_forcing);
    }

    let lags: Vec<f64> = forcing_tps
        .iter()
        .zip(response_tps.iter())
        .map(|(&f, &r)| time[r] - time[f])
        .collect();

    if lags.len() < MIN_PAIRS {
        return Ok(Measure::Unknown(Unmeasurable::InsufficientExtrema));
    }

    let steady = &lags[TRANSIENT_PAIRS..];
    let lag = steady.iter().sum::<f64>() / steady.len() as f64;

    // A lead this large implies response turning points before the series began.
    if lag < -IMPLAUSIBLE_LEAD * period {
        return Ok(Measure::Unknown(Unmeasurable::ImplausibleLag));
    }

    Ok(Measure::Known(lag))
}

/// Measure lags at every node of one segment and remove cycle skipping
///
/// `response` is indexed `[time, node]`.
pub fn find_along_stream_lag_times(
    forcing: &[f64],
    response: ArrayView2<'_, f64>,
    time: &[f64],
    period: f64,
    can_lead: bool,
) -> Result<Vec<Measure>, ResponseError> {
    ensure_len("along-stream response rows", time.len(), response.nrows())?;

    let mut lags = Vec::with_capacity(response.ncols());
    for column in response.columns() {
        let series = column.to_vec();
        lags.push(find_lag_time(forcing, &series, time, period, can_lead)?);
    }

    correct_along_stream(&mut lags, period);
    Ok(lags)
}

/// Post-process one segment's lags: mask unbridged nodes, then remove cycle skips
pub fn correct_along_stream(lags: &mut [Measure], period: f64) {
    mask_unbridged(lags);
    if period.is_finite() && period > 0.0 {
        remove_cycle_skips(lags, period);
    }
}

/// Mark nodes with unknown lags on both sides as unknown
///
/// Such nodes cannot be compared with a trusted neighbour, so their phase
/// cannot be checked for cycle skipping.
pub fn mask_unbridged(lags: &mut [Measure]) {
    let first = lags.iter().position(|lag| lag.is_unknown());
    let last = lags.iter().rposition(|lag| lag.is_unknown());

    if let (Some(first), Some(last)) = (first, last) {
        for lag in lags.iter_mut().take(last).skip(first + 1) {
            lag.invalidate(Unmeasurable::Unbridged);
        }
    }
}

/// Remove half-period jumps between neighbouring nodes
///
/// Scans downstream, lowering a node that sits more than the threshold above
/// its upstream neighbour (together with the following nodes up to the next
/// unknown entry), then scans upstream doing the same against the
/// downstream neighbour.
pub fn remove_cycle_skips(lags: &mut [Measure], period: f64) {
    let threshold = CYCLE_SKIP_THRESHOLD * period;
    let step = HALF_CYCLE * period;
    let unknown: Vec<usize> = lags
        .iter()
        .enumerate()
        .filter(|(_, lag)| lag.is_unknown())
        .map(|(idx, _)| idx)
        .collect();
    let n = lags.len();

    for i in 1..n {
        let end = unknown.iter().copied().find(|&u| u > i).unwrap_or(n);
        let drop = excess_half_cycles(known_difference(lags[i], lags[i - 1]), threshold, step);
        if drop > 0.0 {
            for lag in &mut lags[i..end] {
                lag.shift(-drop);
            }
        }
    }

    for i in (0..n.saturating_sub(1)).rev() {
        let start = unknown.iter().copied().rev().find(|&u| u < i).unwrap_or(0);
        let drop = excess_half_cycles(known_difference(lags[i], lags[i + 1]), threshold, step);
        if drop > 0.0 {
            for lag in &mut lags[start..=i] {
                lag.shift(-drop);
            }
        }
    }
}

/// Whole number of `step`s taking `jump` down to at most `threshold`
///
/// Zero when the jump is missing, non-finite or already within the threshold.
pub(crate) fn excess_half_cycles(jump: Option<f64>, threshold: f64, step: f64) -> f64 {
    match jump {
        Some(jump) if jump.is_finite() && jump > threshold => {
            ((jump - threshold) / step).ceil() * step
        }
        _ => 0.0,
    }
}

/// Largest absolute jump between neighbouring known lags
pub fn max_jump(lags: &[Measure]) -> f64 {
    lags.windows(2)
        .filter_map(|pair| known_difference(pair[1], pair[0]))
        .map(f64::abs)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{self, SignalConfig};
    use approx::assert_abs_diff_eq;

    fn known(values: &[f64]) -> Vec<Measure> {
        values.iter().map(|&v| Measure::Known(v)).collect()
    }

    fn values(lags: &[Measure]) -> Vec<Option<f64>> {
        lags.iter().map(|lag| lag.value()).collect()
    }

    #[test]
    fn test_recovers_clean_lag_within_one_sample() {
        let config = SignalConfig::default();
        let time = config.time_grid();
        let dt = time[1] - time[0];
        let forcing = synthetic::forcing(&time, config.period, 0.2);

        for true_lag in [0.05, 0.2, 0.3, 0.45] {
            let response = synthetic::noisy_response(&config, &time, true_lag).expect("response");
            let lag = find_lag_time(&forcing, &response, &time, config.period, false)
                .expect("lag")
                .value()
                .expect("measurable lag");
            assert!(
                (lag - true_lag).abs() <= dt,
                "lag {lag} vs expected {true_lag}"
            );
        }
    }

    #[test]
    fn test_flat_response_is_insufficient() {
        let config = SignalConfig::default();
        let time = config.time_grid();
        let forcing = synthetic::forcing(&time, config.period, 0.2);
        let response = synthetic::flat_response(&time, 1.0);
        let lag = find_lag_time(&forcing, &response, &time, 1.0, false).expect("lag");
        assert_eq!(lag, Measure::Unknown(Unmeasurable::InsufficientExtrema));
    }

    #[test]
    fn test_flat_forcing_is_insufficient() {
        let config = SignalConfig::default();
        let time = config.time_grid();
        let forcing = synthetic::flat_response(&time, 1.0);
        let response = synthetic::noisy_response(&config, &time, 0.1).expect("response");
        let lag = find_lag_time(&forcing, &response, &time, 1.0, true).expect("lag");
        assert_eq!(lag, Measure::Unknown(Unmeasurable::InsufficientExtrema));
    }

    #[test]
    fn test_exactly_four_pairs_is_measured() {
        // Two forcing cycles give four turning points at 0.25, 0.75, 1.25, 1.75.
        let config = SignalConfig {
            cycles: 2,
            ..Default::default()
        };
        let time = config.time_grid();
        let forcing = synthetic::forcing(&time, config.period, 0.2);
        let response = synthetic::noisy_response(&config, &time, 0.1).expect("response");
        let lag = find_lag_time(&forcing, &response, &time, 1.0, false).expect("lag");
        assert!(lag.is_known());
    }

    #[test]
    fn test_spurious_early_extrema_are_implausible() {
        // A spike and a dip near t = 0 add four early turning points, so
        // every pair is shifted by two forcing cycles.
        let config = SignalConfig::default();
        let time = config.time_grid();
        let forcing = synthetic::forcing(&time, config.period, 0.2);
        let mut response = synthetic::noisy_response(&config, &time, 0.05).expect("response");
        response[10] += 1.0;
        response[20] -= 1.0;
        let lag = find_lag_time(&forcing, &response, &time, 1.0, true).expect("lag");
        assert_eq!(lag, Measure::Unknown(Unmeasurable::ImplausibleLag));
    }

    #[test]
    fn test_small_lead_allowed_when_leading_permitted() {
        let config = SignalConfig::default();
        let time = config.time_grid();
        let dt = time[1] - time[0];
        let forcing = synthetic::forcing(&time, config.period, 0.2);
        let response = synthetic::noisy_response(&config, &time, -0.1).expect("response");
        let lag = find_lag_time(&forcing, &response, &time, 1.0, true)
            .expect("lag")
            .value()
            .expect("measurable lead");
        assert!((lag + 0.1).abs() <= dt);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let time = [0.0, 1.0, 2.0];
        let result = find_lag_time(&[1.0, 2.0], &[1.0, 2.0, 3.0], &time, 1.0, false);
        assert!(matches!(
            result,
            Err(ResponseError::LengthMismatch { expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn test_along_stream_lags_track_nodes() {
        let config = SignalConfig {
            amplitude: 0.2,
            sigma_noise: 1e-7,
            seed: 7,
            ..Default::default()
        };
        let time = config.time_grid();
        let dt = time[1] - time[0];
        let forcing = synthetic::forcing(&time, config.period, 0.2);
        let expected = [0.15, 0.2, 0.25];
        let response =
            synthetic::along_stream_response(&config, &time, &expected).expect("response");
        let lags = find_along_stream_lag_times(&forcing, response.view(), &time, 1.0, false)
            .expect("lags");

        assert_eq!(lags.len(), expected.len());
        for (lag, truth) in lags.iter().zip(expected) {
            let lag = lag.value().expect("measurable lag");
            assert!((lag - truth).abs() <= 2.0 * dt, "lag {lag} vs {truth}");
        }
    }

    #[test]
    fn test_mask_unbridged_only_between_unknowns() {
        let u = Measure::Unknown(Unmeasurable::InsufficientExtrema);
        let mut lags = vec![
            Measure::Known(0.1),
            u,
            Measure::Known(0.2),
            Measure::Known(0.3),
            u,
            Measure::Known(0.4),
        ];
        mask_unbridged(&mut lags);
        assert_eq!(
            values(&lags),
            vec![Some(0.1), None, None, None, None, Some(0.4)]
        );
        assert_eq!(lags[2].unknown_reason(), Some(Unmeasurable::Unbridged));
        assert_eq!(
            lags[1].unknown_reason(),
            Some(Unmeasurable::InsufficientExtrema)
        );
    }

    #[test]
    fn test_interior_alias_is_removed() {
        let period = 1.0;
        let mut lags = known(&[0.10, 0.12, 0.14, 0.66, 0.18, 0.20]);
        correct_along_stream(&mut lags, period);

        assert!(max_jump(&lags) <= CYCLE_SKIP_THRESHOLD * period);
        let corrected: Vec<f64> = lags.iter().filter_map(|lag| lag.value()).collect();
        for pair in corrected.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], 0.02, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_negative_alias_is_removed() {
        let period = 2.0;
        let mut lags = known(&[0.20, 0.24, 0.28, -0.68, 0.36, 0.40]);
        correct_along_stream(&mut lags, period);
        assert!(max_jump(&lags) <= CYCLE_SKIP_THRESHOLD * period);
    }

    #[test]
    fn test_correction_is_idempotent() {
        let period = 1.0;
        let u = Measure::Unknown(Unmeasurable::InsufficientExtrema);
        let mut lags = known(&[0.10, 0.62, 0.15, 1.2, 0.22]);
        lags.push(u);
        correct_along_stream(&mut lags, period);

        let once = lags.clone();
        correct_along_stream(&mut lags, period);
        assert_eq!(lags, once);
    }

    #[test]
    fn test_correction_stops_at_unknown() {
        let period = 1.0;
        let u = Measure::Unknown(Unmeasurable::InsufficientExtrema);
        let mut lags = vec![
            Measure::Known(0.1),
            Measure::Known(0.7),
            Measure::Known(0.75),
            u,
            Measure::Known(0.9),
        ];
        remove_cycle_skips(&mut lags, period);
        for (lag, expected) in lags.iter().take(3).zip([0.1, 0.2, 0.25]) {
            assert_abs_diff_eq!(lag.value().expect("known"), expected, epsilon = 1e-12);
        }
        assert!(lags[3].is_unknown());
        assert_eq!(lags[4], Measure::Known(0.9));
    }

    #[test]
    fn test_extreme_lags_terminate() {
        let mut lags = known(&[0.1, f64::INFINITY]);
        correct_along_stream(&mut lags, 1.0);
        assert_eq!(lags[0], Measure::Known(0.1));
        assert_eq!(lags[1], Measure::Known(f64::INFINITY));

        // Too large for a single half-cycle subtraction to change the value.
        let mut lags = known(&[0.0, 1e17]);
        correct_along_stream(&mut lags, 1.0);
        assert!(lags.iter().all(|lag| lag.value().is_some_and(f64::is_finite)));
        assert!(max_jump(&lags) <= CYCLE_SKIP_THRESHOLD);
    }

    #[test]
    fn test_multiple_skips_removed_at_once() {
        let mut lags = known(&[0.1, 1.65]);
        remove_cycle_skips(&mut lags, 1.0);
        assert_abs_diff_eq!(lags[1].value().expect("known"), 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_period_skips_cycle_correction() {
        let mut lags = known(&[0.1, 5.0]);
        correct_along_stream(&mut lags, 0.0);
        assert_eq!(values(&lags), vec![Some(0.1), Some(5.0)]);
    }
}
