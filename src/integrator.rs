//! Time-stepping contract consumed by the periodic driver
//!
//! The driver never touches transport physics. It installs scaled boundary
//! forcing, advances the state and reads per-node series back through this
//! trait.

use crate::error::ResponseError;
use crate::topology::{NetworkTopology, SegmentId};

/// Slope exponent of the threshold-width gravel transport law
pub const GRAVEL_SLOPE_EXPONENT: f64 = 6.0 / 7.0;

/// A network state that can be advanced under periodic boundary forcing
pub trait Integrator {
    /// Segment graph the state is defined on
    fn topology(&self) -> &NetworkTopology;

    /// Scale sediment and water supply relative to their reference values
    fn set_boundary_supply(&mut self, sediment_scale: f64, water_scale: f64);

    /// Scale the inlet slope at every channel head relative to its reference
    fn set_boundary_slope(&mut self, slope_scale: f64);

    /// Advance the state by `steps` steps of size `dt`
    fn advance(&mut self, dt: f64, steps: usize) -> Result<(), ResponseError>;

    /// Refresh sediment discharge from the current state
    fn recompute_derived_discharge(&mut self);

    /// Node elevations of one segment
    fn elevation(&self, seg: SegmentId) -> &[f64];

    /// Node sediment discharges of one segment, as of the last recompute
    fn sediment_discharge(&self, seg: SegmentId) -> &[f64];

    /// Exponent `p` in `slope_scale = (sediment_scale / water_scale)^p`
    fn slope_exponent(&self) -> f64 {
        GRAVEL_SLOPE_EXPONENT
    }
}
