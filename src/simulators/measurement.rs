//! Projective measurement in the computational basis
//!
//! Outcomes over k measured qubits are indexed like matrix sub-indices: the
//! first listed qubit is the most significant bit of the outcome.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use num_complex::Complex64;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SimulatorConfig;
use crate::error::{Result, SimError};
use crate::quantum::state::{bit_position, StateVector};

use super::check_qubits;

/// The result of one measurement gate execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Measured qubits, in the order given to the gate
    pub qubits: Vec<usize>,
    /// Probability of each of the 2^k outcomes before collapse
    pub probabilities: Vec<f64>,
    /// Sampled value of each measured qubit
    pub bitstring: Vec<u8>,
    /// Sampled outcome as an index into `probabilities`
    pub outcome: usize,
}

impl MeasurementRecord {
    /// Probability of the sampled outcome
    pub fn probability(&self) -> f64 {
        self.probabilities[self.outcome]
    }
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bitstring {
            write!(f, "{}", bit)?;
        }
        write!(f, " (p={})", self.probability())
    }
}

/// Split an outcome index into one bit per measured qubit
pub fn outcome_bits(outcome: usize, measured: usize) -> Vec<u8> {
    (0..measured)
        .map(|j| ((outcome >> (measured - 1 - j)) & 1) as u8)
        .collect()
}

/// Outcome index of basis `index` restricted to the measured qubits
#[inline]
fn outcome_of(index: usize, positions: &[usize]) -> usize {
    positions
        .iter()
        .fold(0, |outcome, &p| (outcome << 1) | ((index >> p) & 1))
}

/// Computes marginals, samples outcomes and collapses states
#[derive(Debug, Clone)]
pub struct MeasurementEngine {
    normalization_tolerance: f64,
    degeneracy_threshold: f64,
}

impl Default for MeasurementEngine {
    fn default() -> Self {
        Self::new(&SimulatorConfig::default())
    }
}

impl MeasurementEngine {
    pub fn new(config: &SimulatorConfig) -> Self {
        MeasurementEngine {
            normalization_tolerance: config.normalization_tolerance,
            degeneracy_threshold: config.degeneracy_threshold,
        }
    }

    /// Marginal probability of each outcome on `qubits`
    ///
    /// Fails with `NotNormalized` if the probabilities do not sum to 1.
    pub fn probabilities(&self, state: &StateVector, qubits: &[usize]) -> Result<Array1<f64>> {
        let qubit_count = state.qubit_count();
        check_qubits(qubits, qubit_count)?;

        let positions: Vec<usize> = qubits.iter().map(|&q| bit_position(qubit_count, q)).collect();
        let mut probabilities = Array1::zeros(1usize << qubits.len());
        for (index, amp) in state.amplitudes().iter().enumerate() {
            probabilities[outcome_of(index, &positions)] += amp.norm_sqr();
        }

        let total: f64 = probabilities.sum();
        if (total - 1.0).abs() > self.normalization_tolerance {
            return Err(SimError::NotNormalized { norm: total.sqrt() });
        }

        Ok(probabilities)
    }

    /// Draw one outcome index from `probabilities`
    pub fn sample<R: Rng + ?Sized>(&self, probabilities: &Array1<f64>, rng: &mut R) -> Result<usize> {
        let distribution = WeightedIndex::new(probabilities.iter()).map_err(|_| {
            SimError::NotNormalized {
                norm: probabilities.sum().max(0.0).sqrt(),
            }
        })?;
        let outcome = distribution.sample(rng);

        let probability = probabilities[outcome];
        if probability <= self.degeneracy_threshold {
            warn!(outcome, probability, "degenerate measurement outcome");
            return Err(SimError::NumericalDegeneracy {
                outcome,
                probability,
            });
        }
        Ok(outcome)
    }

    /// Project `state` onto `outcome` of `qubits` and renormalize
    pub fn collapse(&self, state: &StateVector, qubits: &[usize], outcome: usize) -> Result<StateVector> {
        let qubit_count = state.qubit_count();
        check_qubits(qubits, qubit_count)?;
        if outcome >= 1usize << qubits.len() {
            return Err(SimError::DimensionMismatch {
                expected: 1usize << qubits.len(),
                actual: outcome + 1,
            });
        }

        let projected = project(state.amplitudes().view(), qubit_count, qubits, outcome);
        let probability: f64 = projected.iter().map(|amp| amp.norm_sqr()).sum();
        if probability <= self.degeneracy_threshold {
            warn!(outcome, probability, "degenerate measurement outcome");
            return Err(SimError::NumericalDegeneracy {
                outcome,
                probability,
            });
        }

        let scale = 1.0 / probability.sqrt();
        Ok(StateVector::from_raw(qubit_count, projected.mapv(|amp| amp * scale)))
    }

    /// Measure `qubits`: compute marginals, sample, collapse
    pub fn measure<R: Rng + ?Sized>(
        &self,
        state: &StateVector,
        qubits: &[usize],
        rng: &mut R,
    ) -> Result<(StateVector, MeasurementRecord)> {
        let probabilities = self.probabilities(state, qubits)?;
        let outcome = self.sample(&probabilities, rng)?;
        let collapsed = self.collapse(state, qubits, outcome)?;

        let record = MeasurementRecord {
            qubits: qubits.to_vec(),
            probabilities: probabilities.to_vec(),
            bitstring: outcome_bits(outcome, qubits.len()),
            outcome,
        };
        debug!(?qubits, outcome, probability = record.probability(), "measured qubits");

        Ok((collapsed, record))
    }
}

/// Zero every amplitude whose measured bits disagree with `outcome`
///
/// Qubits must already be validated against `qubit_count`.
pub(crate) fn project(
    amplitudes: ArrayView1<Complex64>,
    qubit_count: usize,
    qubits: &[usize],
    outcome: usize,
) -> Array1<Complex64> {
    let positions: Vec<usize> = qubits.iter().map(|&q| bit_position(qubit_count, q)).collect();
    amplitudes
        .iter()
        .enumerate()
        .map(|(index, &amp)| {
            if outcome_of(index, &positions) == outcome {
                amp
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
        .collect()
}
