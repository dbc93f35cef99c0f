//! rivnet - periodic response of river networks
//!
//! Measures how a segmented river network responds to sinusoidal forcing of
//! its sediment and water supply: the gain and lag of elevation at every
//! node, the gain and lag of sediment discharge at the outlet, and a single
//! network equilibration time calibrated against a closed-form valley.
//!
//! Unmeasurable entries are ordinary data ([`Measure::Unknown`]); contract
//! violations are [`ResponseError`]s.

pub mod calibrate;
pub mod diffusion;
pub mod driver;
pub mod error;
pub mod extrema;
pub mod gain;
pub mod integrator;
pub mod lag;
pub mod measure;
pub mod params;
pub mod reference;
pub mod resolver;
pub mod synthetic;
pub mod topology;

// Re-export main types
pub use calibrate::{
    find_network_equilibration_time, Calibration, GoldenSectionMinimizer, ScalarMinimizer,
};
pub use diffusion::{DiffusionNetwork, DiffusionParams};
pub use driver::{evolve_network, evolve_network_periodic, PeriodicResponse};
pub use error::ResponseError;
pub use gain::compute_network_gain;
pub use integrator::Integrator;
pub use lag::{find_along_stream_lag_times, find_lag_time};
pub use measure::{Measure, Unmeasurable};
pub use params::{ForcingParams, ForcingSeries};
pub use reference::{LinearValley, ReferenceModel};
pub use resolver::{find_network_lag_times, resolve_network_lags};
pub use topology::{NetworkTopology, Segment, SegmentId};
