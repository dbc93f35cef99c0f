use std::fs;
use std::path::{Path, PathBuf};

use rivnet::{DiffusionNetwork, DiffusionParams, NetworkTopology};
use serde::{Deserialize, Serialize};

use crate::SweepError;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "rivnet_sweep.json";

/// Sweep settings; missing or `null` fields take the value of [`SweepConfig::default`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartialSweepConfig")]
pub struct SweepConfig {
    pub num_periods: usize,
    /// Shortest period as a base-10 exponent of the reference equilibration time
    pub min_period_exponent: f64,
    pub max_period_exponent: f64,
    pub amplitude: f64,
    pub run_sediment: bool,
    pub run_water: bool,
    pub cycles: usize,
    pub samples_per_period: usize,
    /// Worker threads; 0 lets the pool decide
    pub workers: usize,
    pub network: NetworkConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            num_periods: 7,
            min_period_exponent: -2.0,
            max_period_exponent: 2.0,
            amplitude: 0.2,
            run_sediment: true,
            run_water: true,
            cycles: rivnet::params::DEFAULT_CYCLES,
            samples_per_period: rivnet::params::DEFAULT_SAMPLES_PER_PERIOD,
            workers: 0,
            network: NetworkConfig::default(),
        }
    }
}

/// On-disk form of [`SweepConfig`]; `None` covers both absent and `null`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialSweepConfig {
    num_periods: Option<usize>,
    min_period_exponent: Option<f64>,
    max_period_exponent: Option<f64>,
    amplitude: Option<f64>,
    run_sediment: Option<bool>,
    run_water: Option<bool>,
    cycles: Option<usize>,
    samples_per_period: Option<usize>,
    workers: Option<usize>,
    network: Option<NetworkConfig>,
}

impl From<PartialSweepConfig> for SweepConfig {
    fn from(partial: PartialSweepConfig) -> Self {
        let defaults = Self::default();
        Self {
            num_periods: partial.num_periods.unwrap_or(defaults.num_periods),
            min_period_exponent: partial
                .min_period_exponent
                .unwrap_or(defaults.min_period_exponent),
            max_period_exponent: partial
                .max_period_exponent
                .unwrap_or(defaults.max_period_exponent),
            amplitude: partial.amplitude.unwrap_or(defaults.amplitude),
            run_sediment: partial.run_sediment.unwrap_or(defaults.run_sediment),
            run_water: partial.run_water.unwrap_or(defaults.run_water),
            cycles: partial.cycles.unwrap_or(defaults.cycles),
            samples_per_period: partial
                .samples_per_period
                .unwrap_or(defaults.samples_per_period),
            workers: partial.workers.unwrap_or(defaults.workers),
            network: partial.network.unwrap_or(defaults.network),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.num_periods == 0 {
            return Err(SweepError::InvalidConfig(
                "num_periods must be greater than zero".to_string(),
            ));
        }

        if !self.min_period_exponent.is_finite() || !self.max_period_exponent.is_finite() {
            return Err(SweepError::InvalidConfig(
                "period exponents must be finite".to_string(),
            ));
        }

        if self.max_period_exponent < self.min_period_exponent {
            return Err(SweepError::InvalidConfig(
                "max_period_exponent must be greater than or equal to min_period_exponent"
                    .to_string(),
            ));
        }

        if !(self.amplitude > 0.0 && self.amplitude < 1.0) {
            return Err(SweepError::InvalidConfig(
                "amplitude must be in (0, 1)".to_string(),
            ));
        }

        if !self.run_sediment && !self.run_water {
            return Err(SweepError::InvalidConfig(
                "enable at least one of run_sediment and run_water".to_string(),
            ));
        }

        if self.cycles == 0 || self.samples_per_period < 4 {
            return Err(SweepError::InvalidConfig(
                "cycles must be > 0 and samples_per_period at least 4".to_string(),
            ));
        }

        self.network.validate()
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let raw = fs::read_to_string(path)?;
        let config: SweepConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Load `path`, else `rivnet_sweep.json` in the working directory, else defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self, SweepError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
        if cwd_config.exists() {
            return Self::load(&cwd_config);
        }

        Ok(Self::default())
    }
}

/// Segment tree and transport parameters of the swept network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartialNetworkConfig")]
pub struct NetworkConfig {
    /// Downstream segment of each segment; `null` marks the outlet
    pub downstream: Vec<Option<usize>>,
    pub nodes_per_segment: Vec<usize>,
    pub node_spacing: f64,
    pub diffusivity: f64,
    pub inlet_supply: f64,
    pub along_stream_supply: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            downstream: vec![Some(2), Some(2), None],
            nodes_per_segment: vec![8, 8, 12],
            node_spacing: 0.05,
            diffusivity: 1.0,
            inlet_supply: 1.0,
            along_stream_supply: 0.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialNetworkConfig {
    downstream: Option<Vec<Option<usize>>>,
    nodes_per_segment: Option<Vec<usize>>,
    node_spacing: Option<f64>,
    diffusivity: Option<f64>,
    inlet_supply: Option<f64>,
    along_stream_supply: Option<f64>,
}

impl From<PartialNetworkConfig> for NetworkConfig {
    fn from(partial: PartialNetworkConfig) -> Self {
        let defaults = Self::default();
        Self {
            downstream: partial.downstream.unwrap_or(defaults.downstream),
            nodes_per_segment: partial
                .nodes_per_segment
                .unwrap_or(defaults.nodes_per_segment),
            node_spacing: partial.node_spacing.unwrap_or(defaults.node_spacing),
            diffusivity: partial.diffusivity.unwrap_or(defaults.diffusivity),
            inlet_supply: partial.inlet_supply.unwrap_or(defaults.inlet_supply),
            along_stream_supply: partial
                .along_stream_supply
                .unwrap_or(defaults.along_stream_supply),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.downstream.len() != self.nodes_per_segment.len() {
            return Err(SweepError::InvalidConfig(format!(
                "{} downstream links but {} node counts",
                self.downstream.len(),
                self.nodes_per_segment.len()
            )));
        }

        if self.nodes_per_segment.iter().any(|&n| n == 0) {
            return Err(SweepError::InvalidConfig(
                "nodes_per_segment must contain only values greater than zero".to_string(),
            ));
        }

        if !(self.node_spacing.is_finite() && self.node_spacing > 0.0) {
            return Err(SweepError::InvalidConfig(
                "node_spacing must be finite and > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn params(&self) -> DiffusionParams {
        DiffusionParams {
            diffusivity: self.diffusivity,
            inlet_supply: self.inlet_supply,
            along_stream_supply: self.along_stream_supply,
            ..DiffusionParams::default()
        }
    }

    /// Build the network at its steady reference state
    pub fn build(&self) -> Result<DiffusionNetwork, SweepError> {
        self.validate()?;
        let x = self
            .nodes_per_segment
            .iter()
            .map(|&n| (0..n).map(|i| i as f64 * self.node_spacing).collect())
            .collect();
        let topology = NetworkTopology::from_downstream(&self.downstream, x)?;
        Ok(DiffusionNetwork::new(topology, self.params())?)
    }
}
