//! Explicit linear-diffusion network integrator
//!
//! Each node is a cell of width `dx`. Sediment flux across a cell face is
//! `κ · water_scale · slope`. Channel heads receive an imposed inlet slope,
//! every cell gains a distributed supply scaled by the sediment scale, and
//! the outlet's last cell drains to a fixed base level one cell further
//! downstream. Junction cells collect the outflow of all their upstream
//! segments.
//!
//! With a unit slope exponent the inlet flux follows the sediment scale
//! exactly, so a single segment of `n` cells behaves like a
//! [`LinearValley`] of length `(n + 0.5) · dx`.

use serde::{Deserialize, Serialize};

use crate::error::ResponseError;
use crate::integrator::Integrator;
use crate::reference::LinearValley;
use crate::topology::{NetworkTopology, SegmentId};

/// Slope exponent of a linear transport law
pub const LINEAR_SLOPE_EXPONENT: f64 = 1.0;

/// Relative tolerance on node spacing uniformity
const SPACING_TOLERANCE: f64 = 1e-9;

/// Transport and supply parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffusionParams {
    /// Transport diffusivity at the reference water supply
    pub diffusivity: f64,
    /// Reference sediment flux entering each channel head
    pub inlet_supply: f64,
    /// Reference sediment supply per unit channel length
    pub along_stream_supply: f64,
    /// Fraction of the explicit stability limit used per substep
    pub courant: f64,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            diffusivity: 1.0,
            inlet_supply: 1.0,
            along_stream_supply: 0.0,
            courant: 0.9,
        }
    }
}

impl DiffusionParams {
    pub fn validate(&self) -> Result<(), ResponseError> {
        if !(self.diffusivity.is_finite() && self.diffusivity > 0.0) {
            return Err(ResponseError::InvalidParams(
                "diffusivity must be finite and > 0".to_string(),
            ));
        }
        if !(self.inlet_supply.is_finite() && self.inlet_supply >= 0.0)
            || !(self.along_stream_supply.is_finite() && self.along_stream_supply >= 0.0)
        {
            return Err(ResponseError::InvalidParams(
                "supplies must be finite and >= 0".to_string(),
            ));
        }
        if self.inlet_supply == 0.0 && self.along_stream_supply == 0.0 {
            return Err(ResponseError::InvalidParams(
                "network needs a non-zero sediment supply".to_string(),
            ));
        }
        if !(self.courant > 0.0 && self.courant <= 1.0) {
            return Err(ResponseError::InvalidParams(
                "courant must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Linear-diffusion state on a segment tree
#[derive(Debug, Clone)]
pub struct DiffusionNetwork {
    topology: NetworkTopology,
    params: DiffusionParams,
    dx: f64,
    /// Segments ordered outlet first; every segment precedes its upstream neighbours
    order: Vec<SegmentId>,
    /// Most faces shared by any one cell
    max_degree: usize,
    elevation: Vec<Vec<f64>>,
    discharge: Vec<Vec<f64>>,
    sediment_scale: f64,
    water_scale: f64,
    slope_scale: f64,
}

impl DiffusionNetwork {
    /// Network at its reference steady state
    ///
    /// Node spacing must be uniform across the whole network.
    pub fn new(topology: NetworkTopology, params: DiffusionParams) -> Result<Self, ResponseError> {
        params.validate()?;
        let dx = uniform_spacing(&topology)?;

        let mut order = vec![topology.outlet()];
        let mut cursor = 0;
        while cursor < order.len() {
            order.extend_from_slice(topology.upstream(order[cursor]));
            cursor += 1;
        }

        let max_degree = topology
            .segments()
            .iter()
            .map(|s| s.upstream.len() + 1)
            .chain(std::iter::once(2))
            .max()
            .unwrap_or(2);

        let empty: Vec<Vec<f64>> = topology
            .segments()
            .iter()
            .map(|s| vec![0.0; s.node_count()])
            .collect();

        let mut network = Self {
            topology,
            params,
            dx,
            order,
            max_degree,
            elevation: empty.clone(),
            discharge: empty,
            sediment_scale: 1.0,
            water_scale: 1.0,
            slope_scale: 1.0,
        };
        network.set_steady_state();
        Ok(network)
    }

    /// One unbranched segment of `nodes` cells spaced `dx` apart
    pub fn single_segment(
        nodes: usize,
        dx: f64,
        params: DiffusionParams,
    ) -> Result<Self, ResponseError> {
        let x = (0..nodes).map(|i| i as f64 * dx).collect();
        Self::new(NetworkTopology::single(x)?, params)
    }

    pub fn params(&self) -> &DiffusionParams {
        &self.params
    }

    pub fn node_spacing(&self) -> f64 {
        self.dx
    }

    /// Reference valley spanning the longest head-to-outlet path
    ///
    /// Exact for a single segment; for a branched network it is the prior
    /// that calibration corrects.
    pub fn equivalent_valley(&self) -> Result<LinearValley, ResponseError> {
        let longest_path = self
            .topology
            .channel_heads()
            .into_iter()
            .map(|head| {
                let mut nodes = self.topology.node_count(head);
                let mut current = head;
                while let Some(down) = self.topology.downstream(current) {
                    nodes += self.topology.node_count(down);
                    current = down;
                }
                nodes
            })
            .max()
            .unwrap_or(0);

        let heads = self.topology.channel_heads().len() as f64;
        let distributed =
            self.params.along_stream_supply * self.topology.total_nodes() as f64 * self.dx;
        let total = heads * self.params.inlet_supply + distributed;

        LinearValley::new(
            (longest_path as f64 + 0.5) * self.dx,
            self.params.diffusivity,
            distributed / total,
        )
    }

    fn inlet_slope(&self) -> f64 {
        self.params.inlet_supply / self.params.diffusivity
    }

    /// Flux across the downstream face of every cell
    fn face_fluxes(&self, elevation: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let conductance = self.params.diffusivity * self.water_scale / self.dx;

        self.topology
            .segments()
            .iter()
            .map(|segment| {
                let z = &elevation[segment.id];
                let below = match segment.downstream {
                    Some(down) => elevation[down][0],
                    None => 0.0,
                };
                (0..z.len())
                    .map(|i| {
                        let next = z.get(i + 1).copied().unwrap_or(below);
                        conductance * (z[i] - next)
                    })
                    .collect()
            })
            .collect()
    }

    fn inflow(&self, seg: SegmentId, fluxes: &[Vec<f64>]) -> f64 {
        let upstream = self.topology.upstream(seg);
        if upstream.is_empty() {
            self.params.diffusivity * self.water_scale * self.inlet_slope() * self.slope_scale
        } else {
            upstream
                .iter()
                .filter_map(|&up| fluxes[up].last())
                .sum()
        }
    }

    /// Reference steady state: every cell passes on what it receives plus its own supply
    fn set_steady_state(&mut self) {
        let supply = self.params.along_stream_supply * self.dx;
        let mut fluxes: Vec<Vec<f64>> = self.discharge.clone();

        for &seg in self.order.iter().rev() {
            let mut carried = match self.topology.upstream(seg) {
                [] => self.params.inlet_supply,
                upstream => upstream.iter().filter_map(|&up| fluxes[up].last()).sum(),
            };
            for flux in fluxes[seg].iter_mut() {
                carried += supply;
                *flux = carried;
            }
        }

        let resistance = self.dx / self.params.diffusivity;
        for &seg in &self.order {
            let mut below = match self.topology.downstream(seg) {
                Some(down) => self.elevation[down][0],
                None => 0.0,
            };
            for i in (0..fluxes[seg].len()).rev() {
                below += fluxes[seg][i] * resistance;
                self.elevation[seg][i] = below;
            }
        }

        self.discharge = fluxes;
    }

    /// Largest stable explicit substep at the current water scale
    fn max_substep(&self) -> f64 {
        let rate = self.max_degree as f64 * self.params.diffusivity * self.water_scale;
        self.params.courant * self.dx * self.dx / rate
    }

    fn substep(&mut self, h: f64) {
        let fluxes = self.face_fluxes(&self.elevation);
        let supply = self.params.along_stream_supply * self.sediment_scale;

        for seg in 0..self.topology.len() {
            let mut incoming = self.inflow(seg, &fluxes);
            for (i, z) in self.elevation[seg].iter_mut().enumerate() {
                let outgoing = fluxes[seg][i];
                *z += h * ((incoming - outgoing) / self.dx + supply);
                incoming = outgoing;
            }
        }
    }
}

impl Integrator for DiffusionNetwork {
    fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    fn set_boundary_supply(&mut self, sediment_scale: f64, water_scale: f64) {
        self.sediment_scale = sediment_scale;
        self.water_scale = water_scale;
    }

    fn set_boundary_slope(&mut self, slope_scale: f64) {
        self.slope_scale = slope_scale;
    }

    fn advance(&mut self, dt: f64, steps: usize) -> Result<(), ResponseError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ResponseError::Integrator(format!(
                "time step must be finite and > 0, got {dt}"
            )));
        }
        if !(self.water_scale.is_finite() && self.water_scale > 0.0) {
            return Err(ResponseError::Integrator(format!(
                "water scale must be finite and > 0, got {}",
                self.water_scale
            )));
        }

        let substeps = (dt / self.max_substep()).ceil().max(1.0) as usize;
        let h = dt / substeps as f64;
        for _ in 0..steps {
            for _ in 0..substeps {
                self.substep(h);
            }
        }

        if self.elevation.iter().flatten().any(|z| !z.is_finite()) {
            return Err(ResponseError::Integrator(
                "elevation became non-finite".to_string(),
            ));
        }
        Ok(())
    }

    fn recompute_derived_discharge(&mut self) {
        self.discharge = self.face_fluxes(&self.elevation);
    }

    fn elevation(&self, seg: SegmentId) -> &[f64] {
        &self.elevation[seg]
    }

    fn sediment_discharge(&self, seg: SegmentId) -> &[f64] {
        &self.discharge[seg]
    }

    fn slope_exponent(&self) -> f64 {
        LINEAR_SLOPE_EXPONENT
    }
}

fn uniform_spacing(topology: &NetworkTopology) -> Result<f64, ResponseError> {
    let mut spacing: Option<f64> = None;

    for segment in topology.segments() {
        for pair in segment.x.windows(2) {
            let dx = pair[1] - pair[0];
            match spacing {
                None => spacing = Some(dx),
                Some(reference) if (dx - reference).abs() > SPACING_TOLERANCE * reference => {
                    return Err(ResponseError::InvalidTopology(format!(
                        "segment {} spacing {dx} differs from {reference}",
                        segment.id
                    )));
                }
                Some(_) => {}
            }
        }
    }

    spacing.ok_or_else(|| {
        ResponseError::InvalidTopology("no segment has two nodes to fix the spacing".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn confluence() -> DiffusionNetwork {
        let x = |n: usize| (0..n).map(|i| i as f64 * 0.1).collect::<Vec<_>>();
        let topology =
            NetworkTopology::from_downstream(&[Some(2), Some(2), None], vec![x(4), x(3), x(5)])
                .expect("topology");
        let params = DiffusionParams {
            along_stream_supply: 0.5,
            ..Default::default()
        };
        DiffusionNetwork::new(topology, params).expect("network")
    }

    #[test]
    fn test_steady_state_is_stationary() {
        let mut network = confluence();
        let before: Vec<Vec<f64>> = (0..3).map(|s| network.elevation(s).to_vec()).collect();
        network.advance(0.01, 50).expect("advance");

        for (seg, reference) in before.iter().enumerate() {
            for (z, z0) in network.elevation(seg).iter().zip(reference) {
                assert_abs_diff_eq!(*z, *z0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_outlet_discharge_balances_supply() {
        let mut network = confluence();
        network.recompute_derived_discharge();

        // Two heads plus 12 cells of distributed supply.
        let expected = 2.0 * 1.0 + 0.5 * 12.0 * 0.1;
        let outlet = network.sediment_discharge(2);
        assert_abs_diff_eq!(outlet[outlet.len() - 1], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_raised_supply_aggrades() {
        let mut network = DiffusionNetwork::single_segment(10, 0.1, DiffusionParams::default())
            .expect("network");
        let z0 = network.elevation(0)[0];
        network.set_boundary_supply(1.2, 1.0);
        network.set_boundary_slope(1.2);
        network.advance(0.05, 20).expect("advance");
        assert!(network.elevation(0)[0] > z0);
    }

    #[test]
    fn test_equivalent_valley_of_single_segment() {
        let network = DiffusionNetwork::single_segment(20, 0.05, DiffusionParams::default())
            .expect("network");
        let valley = network.equivalent_valley().expect("valley");
        assert_abs_diff_eq!(valley.length, 20.5 * 0.05, epsilon = 1e-12);
        assert_eq!(valley.along_stream_fraction, 0.0);
    }

    #[test]
    fn test_rejects_non_uniform_spacing() {
        let topology = NetworkTopology::single(vec![0.0, 0.1, 0.3]).expect("topology");
        let result = DiffusionNetwork::new(topology, DiffusionParams::default());
        assert!(matches!(result, Err(ResponseError::InvalidTopology(_))));
    }

    #[test]
    fn test_bad_time_step_is_an_integrator_error() {
        let mut network = confluence();
        assert!(matches!(
            network.advance(0.0, 1),
            Err(ResponseError::Integrator(_))
        ));
    }
}
