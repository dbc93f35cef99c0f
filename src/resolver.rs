//! Network-wide lag resolution
//!
//! Segment-local lags carry arbitrary half-period offsets. The resolver
//! anchors every channel head to a small non-negative lag, then walks the
//! segment tree reconciling each junction: downstream segments are aligned
//! with the segment draining into them, and the other upstream branches of
//! every fully known segment are aligned back against it.
//!
//! Nodes never reached from a channel head cannot be tied to a trusted phase
//! and are reported as [`Unmeasurable::Unanchored`].

use ndarray::ArrayView2;
use tracing::{debug, warn};

use crate::error::{ensure_len, ResponseError};
use crate::lag::{
    excess_half_cycles, find_along_stream_lag_times, CYCLE_SKIP_THRESHOLD, HALF_CYCLE,
};
use crate::measure::{known_difference, Measure, Unmeasurable};
use crate::topology::{NetworkTopology, SegmentId};

/// Lags under correction plus the record of nodes tied to a channel head
#[derive(Debug, Clone, PartialEq)]
pub struct LagField {
    lags: Vec<Vec<Measure>>,
    checked: Vec<Vec<bool>>,
}

impl LagField {
    /// Wrap segment-local lags; no node starts out checked
    pub fn new(lags: Vec<Vec<Measure>>) -> Self {
        let checked = lags.iter().map(|seg| vec![false; seg.len()]).collect();
        Self { lags, checked }
    }

    pub fn lags(&self, seg: SegmentId) -> &[Measure] {
        &self.lags[seg]
    }

    pub fn is_checked(&self, seg: SegmentId, node: usize) -> bool {
        self.checked[seg][node]
    }

    /// Mark every unchecked node unanchored and return the lags
    pub fn finish(self) -> Vec<Vec<Measure>> {
        let mut lags = self.lags;
        for (seg, checked) in lags.iter_mut().zip(&self.checked) {
            for (lag, &ok) in seg.iter_mut().zip(checked) {
                if !ok {
                    lag.invalidate(Unmeasurable::Unanchored);
                }
            }
        }
        lags
    }

    fn first_unknown(&self, seg: SegmentId) -> usize {
        let lags = &self.lags[seg];
        lags.iter()
            .position(|lag| lag.is_unknown())
            .unwrap_or(lags.len())
    }

    /// Start of the known run that ends the segment
    fn trusted_suffix_start(&self, seg: SegmentId) -> usize {
        self.lags[seg]
            .iter()
            .rposition(|lag| lag.is_unknown())
            .map_or(0, |idx| idx + 1)
    }

    fn fully_known(&self, seg: SegmentId) -> bool {
        self.lags[seg].iter().all(|lag| lag.is_known())
    }

    fn shift(&mut self, seg: SegmentId, nodes: std::ops::Range<usize>, delta: f64) {
        for lag in &mut self.lags[seg][nodes] {
            lag.shift(delta);
        }
    }

    fn mark(&mut self, seg: SegmentId, nodes: std::ops::Range<usize>) {
        for flag in &mut self.checked[seg][nodes] {
            *flag = true;
        }
    }
}

/// Step size and tolerance for half-period corrections
#[derive(Debug, Clone, Copy)]
struct Correction {
    threshold: f64,
    step: f64,
    period: f64,
}

impl Correction {
    fn new(period: f64) -> Self {
        Self {
            threshold: CYCLE_SKIP_THRESHOLD * period,
            step: HALF_CYCLE * period,
            period,
        }
    }

    /// Shift `nodes` of `seg` by whole half periods so that its entry at
    /// `probe` lies within the threshold of `reference`
    fn align(
        &self,
        field: &mut LagField,
        seg: SegmentId,
        nodes: std::ops::Range<usize>,
        probe: usize,
        reference: Measure,
    ) {
        if nodes.is_empty() || !nodes.contains(&probe) {
            return;
        }

        let jump = known_difference(field.lags[seg][probe], reference);
        let drop = excess_half_cycles(jump, self.threshold, self.step);
        let raise = excess_half_cycles(jump.map(|j| -j), self.threshold, self.step);
        if drop > 0.0 {
            field.shift(seg, nodes, -drop);
        } else if raise > 0.0 {
            field.shift(seg, nodes, raise);
        }
    }

    /// Force a channel head's leading known run into `[0, period / 2]`
    fn anchor_head(&self, field: &mut LagField, head: SegmentId) {
        let prefix = 0..field.first_unknown(head);
        if prefix.is_empty() {
            return;
        }

        let first = field.lags[head][0].value();
        let raise = excess_half_cycles(first.map(|v| -v), 0.0, self.step);
        let drop = excess_half_cycles(first, HALF_CYCLE * self.period, self.step);
        if raise > 0.0 {
            field.shift(head, prefix.clone(), raise);
        } else if drop > 0.0 {
            field.shift(head, prefix.clone(), -drop);
        }

        field.mark(head, prefix);
    }

    /// Align the trusted suffix of every branch upstream of `root` with the
    /// segment it drains into, continuing up through fully known branches
    fn reconcile_upstream(
        &self,
        topology: &NetworkTopology,
        field: &mut LagField,
        root: SegmentId,
    ) {
        let mut visited = vec![false; topology.len()];
        visited[root] = true;
        let mut stack = vec![root];

        while let Some(seg) = stack.pop() {
            let reference = field.lags[seg][0];
            if reference.is_unknown() {
                continue;
            }

            for &up in topology.upstream(seg) {
                let suffix = field.trusted_suffix_start(up)..field.lags[up].len();
                let last = field.lags[up].len() - 1;
                self.align(field, up, suffix.clone(), last, reference);
                field.mark(up, suffix);

                if field.fully_known(up) {
                    if visited[up] {
                        warn!(segment = up, "segment revisited while reconciling upstream");
                        continue;
                    }
                    visited[up] = true;
                    stack.push(up);
                }
            }
        }
    }

    /// Walk downstream from `start`, reconciling each junction on the way
    fn walk_downstream(
        &self,
        topology: &NetworkTopology,
        field: &mut LagField,
        start: SegmentId,
    ) {
        let mut visited = vec![false; topology.len()];
        let mut current = start;

        loop {
            if visited[current] {
                warn!(segment = current, "segment revisited while walking downstream");
                break;
            }
            visited[current] = true;

            if field.lags[current][0].is_known() {
                self.reconcile_upstream(topology, field, current);
            }

            // An unknown node breaks the phase chain.
            if !field.fully_known(current) {
                break;
            }
            let Some(down) = topology.downstream(current) else {
                break;
            };

            let reference = field.lags[current][field.lags[current].len() - 1];
            let prefix = 0..field.first_unknown(down);
            self.align(field, down, prefix.clone(), 0, reference);
            field.mark(down, prefix);
            current = down;
        }
    }
}

/// Reconcile segment-local lags into one network-wide lag field
///
/// `initial` holds one lag array per segment, in segment order, as produced
/// by [`find_along_stream_lag_times`].
pub fn resolve_network_lags(
    topology: &NetworkTopology,
    initial: Vec<Vec<Measure>>,
    period: f64,
) -> Result<Vec<Vec<Measure>>, ResponseError> {
    if !(period.is_finite() && period > 0.0) {
        return Err(ResponseError::InvalidParams(
            "period must be finite and > 0".to_string(),
        ));
    }
    ensure_len("segment lag arrays", topology.len(), initial.len())?;
    for (segment, lags) in topology.segments().iter().zip(&initial) {
        ensure_len("segment lag nodes", segment.node_count(), lags.len())?;
    }

    let correction = Correction::new(period);
    let mut field = LagField::new(initial);

    for head in topology.channel_heads() {
        correction.anchor_head(&mut field, head);
        correction.walk_downstream(topology, &mut field, head);
    }

    let lags = field.finish();
    let unanchored = lags
        .iter()
        .flatten()
        .filter(|lag| lag.unknown_reason() == Some(Unmeasurable::Unanchored))
        .count();
    debug!(segments = topology.len(), unanchored, "resolved network lags");

    Ok(lags)
}

/// Measure and reconcile lags for one state variable across the network
///
/// `series` holds one `[time, node]` array per segment.
pub fn find_network_lag_times(
    topology: &NetworkTopology,
    series: &[ArrayView2<'_, f64>],
    time: &[f64],
    forcing: &[f64],
    period: f64,
    can_lead: bool,
) -> Result<Vec<Vec<Measure>>, ResponseError> {
    ensure_len("segment series", topology.len(), series.len())?;

    let initial = series
        .iter()
        .map(|state| find_along_stream_lag_times(forcing, state.view(), time, period, can_lead))
        .collect::<Result<Vec<_>, _>>()?;

    resolve_network_lags(topology, initial, period)
}
