//! Tensor contraction of small operators against a state vector
//!
//! The amplitude array is treated as an order-n tensor with one binary axis
//! per qubit. Applying a `2^k × 2^k` matrix to k axes touches every output
//! amplitude once and reads `2^k` inputs for it, so a contraction costs
//! O(2^n · 2^k) and never materializes a `2^n × 2^n` operator.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::trace;

use crate::config::SimulatorConfig;
use crate::error::{Result, SimError};
use crate::quantum::state::{bit_position, StateVector};

use super::check_qubits;

/// Bit layout of a contraction over a fixed set of qubits
struct Layout {
    /// Bit position of each target, in caller order
    positions: Vec<usize>,
    /// Index offset of every target sub-index relative to its base index
    offsets: Vec<usize>,
    target_mask: usize,
    control_mask: usize,
}

impl Layout {
    fn new(qubit_count: usize, controls: &[usize], targets: &[usize]) -> Self {
        let positions: Vec<usize> = targets
            .iter()
            .map(|&q| bit_position(qubit_count, q))
            .collect();
        let k = positions.len();

        // First listed target is the most significant bit of the sub-index.
        let offsets = (0..1usize << k)
            .map(|sub| {
                positions
                    .iter()
                    .enumerate()
                    .fold(0, |acc, (j, &p)| acc | (((sub >> (k - 1 - j)) & 1) << p))
            })
            .collect();

        let target_mask = positions.iter().fold(0, |mask, &p| mask | (1 << p));
        let control_mask = controls
            .iter()
            .fold(0, |mask, &q| mask | (1 << bit_position(qubit_count, q)));

        Layout {
            positions,
            offsets,
            target_mask,
            control_mask,
        }
    }

    /// Matrix row selected by the target bits of `index`
    #[inline]
    fn row(&self, index: usize) -> usize {
        self.positions
            .iter()
            .fold(0, |row, &p| (row << 1) | ((index >> p) & 1))
    }
}

/// Applies k-qubit operators to designated axes of a state tensor
#[derive(Debug, Clone)]
pub struct ContractionEngine {
    parallel_threshold: usize,
}

impl Default for ContractionEngine {
    fn default() -> Self {
        Self::new(&SimulatorConfig::default())
    }
}

impl ContractionEngine {
    pub fn new(config: &SimulatorConfig) -> Self {
        ContractionEngine {
            parallel_threshold: config.parallel_threshold,
        }
    }

    /// Apply `matrix` to the `targets` axes of `state`
    ///
    /// The returned state has the same norm as the input for any unitary
    /// matrix; no unitarity check is made here.
    pub fn apply(
        &self,
        state: &StateVector,
        matrix: &Array2<Complex64>,
        targets: &[usize],
    ) -> Result<StateVector> {
        let amplitudes = self.contract(state.amplitudes().view(), state.qubit_count(), matrix, targets)?;
        Ok(StateVector::from_raw(state.qubit_count(), amplitudes))
    }

    /// Apply `matrix` to `targets` on the subspace where every control is 1
    pub fn apply_controlled(
        &self,
        state: &StateVector,
        matrix: &Array2<Complex64>,
        controls: &[usize],
        targets: &[usize],
    ) -> Result<StateVector> {
        let amplitudes = self.contract_controlled(
            state.amplitudes().view(),
            state.qubit_count(),
            matrix,
            controls,
            targets,
        )?;
        Ok(StateVector::from_raw(state.qubit_count(), amplitudes))
    }

    /// Contract `matrix` against arbitrary (not necessarily normalized)
    /// amplitudes
    pub fn contract(
        &self,
        amplitudes: ArrayView1<Complex64>,
        qubit_count: usize,
        matrix: &Array2<Complex64>,
        targets: &[usize],
    ) -> Result<Array1<Complex64>> {
        self.contract_controlled(amplitudes, qubit_count, matrix, &[], targets)
    }

    /// Controlled variant of [`ContractionEngine::contract`]; amplitudes with
    /// any control bit equal to 0 pass through unchanged
    pub fn contract_controlled(
        &self,
        amplitudes: ArrayView1<Complex64>,
        qubit_count: usize,
        matrix: &Array2<Complex64>,
        controls: &[usize],
        targets: &[usize],
    ) -> Result<Array1<Complex64>> {
        let dim = 1usize << qubit_count;
        if amplitudes.len() != dim {
            return Err(SimError::DimensionMismatch {
                expected: dim,
                actual: amplitudes.len(),
            });
        }

        let all_qubits: Vec<usize> = controls.iter().chain(targets).copied().collect();
        check_qubits(&all_qubits, qubit_count)?;

        let block_dim = 1usize << targets.len();
        if matrix.nrows() != block_dim || matrix.ncols() != block_dim {
            return Err(SimError::DimensionMismatch {
                expected: block_dim,
                actual: if matrix.nrows() != block_dim { matrix.nrows() } else { matrix.ncols() },
            });
        }

        let layout = Layout::new(qubit_count, controls, targets);
        let element = |index: usize| -> Complex64 {
            if index & layout.control_mask != layout.control_mask {
                return amplitudes[index];
            }
            let base = index & !layout.target_mask;
            matrix
                .row(layout.row(index))
                .iter()
                .zip(layout.offsets.iter())
                .map(|(u, &offset)| u * amplitudes[base | offset])
                .sum()
        };

        let parallel = qubit_count >= self.parallel_threshold;
        trace!(qubit_count, ?controls, ?targets, parallel, "contracting operator");

        let output: Vec<Complex64> = if parallel {
            (0..dim).into_par_iter().map(element).collect()
        } else {
            (0..dim).map(element).collect()
        };

        Ok(Array1::from(output))
    }
}
