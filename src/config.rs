//! Simulator configuration

use serde::{Deserialize, Serialize};

/// Configuration shared by a circuit and its engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random number generator seed for measurement sampling
    ///
    /// If None, the generator is seeded from system entropy. Set to
    /// Some(seed) for reproducible measurement outcomes.
    ///
    /// Default: None
    pub seed: Option<u64>,

    /// Allowed deviation of a squared norm (or probability total) from 1
    ///
    /// Default: 1e-8
    pub normalization_tolerance: f64,

    /// Probability at or below which a sampled outcome is treated as a
    /// floating-point artifact rather than a real outcome
    ///
    /// Default: 1e-14
    pub degeneracy_threshold: f64,

    /// Minimum number of qubits before contractions fan out over rayon
    ///
    /// Default: 14
    pub parallel_threshold: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            normalization_tolerance: 1e-8,
            degeneracy_threshold: 1e-14,
            parallel_threshold: 14,
        }
    }
}

impl SimulatorConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the normalization tolerance
    pub fn with_normalization_tolerance(mut self, tolerance: f64) -> Self {
        self.normalization_tolerance = tolerance;
        self
    }

    /// Set the degeneracy threshold
    pub fn with_degeneracy_threshold(mut self, threshold: f64) -> Self {
        self.degeneracy_threshold = threshold;
        self
    }

    /// Set the parallel threshold in qubits
    pub fn with_parallel_threshold(mut self, qubits: usize) -> Self {
        self.parallel_threshold = qubits;
        self
    }
}
