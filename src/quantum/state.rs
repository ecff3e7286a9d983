// src/quantum/state.rs
//! Pure quantum states as dense amplitude vectors
//!
//! Basis indices use a big-endian qubit convention: qubit 0 is the most
//! significant bit of the index, so qubit `q` of an `n`-qubit register
//! lives at bit position `n - 1 - q`. Every engine in the crate relies on
//! this mapping.

use std::fmt::{self, Display};

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::error::{Result, SimError};

/// Default tolerance on `|‖ψ‖² - 1|` when validating a state
pub const NORM_TOLERANCE: f64 = 1e-8;

/// Bit position of `qubit` inside a basis index of an `qubit_count`-qubit state
#[inline]
pub fn bit_position(qubit_count: usize, qubit: usize) -> usize {
    qubit_count - 1 - qubit
}

/// State vector representation of a pure quantum state
#[derive(Clone, Debug, PartialEq)]
pub struct StateVector {
    /// Number of qubits
    qubit_count: usize,

    /// The state vector as an array of complex amplitudes
    amplitudes: Array1<Complex64>,
}

impl StateVector {
    /// Create a new state vector with the given amplitudes
    ///
    /// Fails if the length is not `2^qubit_count` or the vector is not
    /// normalized within [`NORM_TOLERANCE`].
    pub fn new(qubit_count: usize, amplitudes: Array1<Complex64>) -> Result<Self> {
        Self::with_tolerance(qubit_count, amplitudes, NORM_TOLERANCE)
    }

    /// Like [`StateVector::new`] with an explicit normalization tolerance
    pub fn with_tolerance(
        qubit_count: usize,
        amplitudes: Array1<Complex64>,
        tolerance: f64,
    ) -> Result<Self> {
        let expected_dim = 1usize << qubit_count;
        if amplitudes.len() != expected_dim {
            return Err(SimError::DimensionMismatch {
                expected: expected_dim,
                actual: amplitudes.len(),
            });
        }

        let state = StateVector {
            qubit_count,
            amplitudes,
        };

        if !state.is_normalized(tolerance) {
            return Err(SimError::NotNormalized { norm: state.norm() });
        }

        Ok(state)
    }

    /// Build a state from a vector whose length must be a power of two
    pub fn from_amplitudes(amplitudes: Array1<Complex64>) -> Result<Self> {
        let len = amplitudes.len();
        if len == 0 || !len.is_power_of_two() {
            return Err(SimError::DimensionMismatch {
                expected: len.max(1).next_power_of_two(),
                actual: len,
            });
        }
        Self::new(len.trailing_zeros() as usize, amplitudes)
    }

    /// Wrap amplitudes produced by a norm-preserving kernel
    pub(crate) fn from_raw(qubit_count: usize, amplitudes: Array1<Complex64>) -> Self {
        debug_assert_eq!(amplitudes.len(), 1usize << qubit_count);
        StateVector {
            qubit_count,
            amplitudes,
        }
    }

    /// Create the computational basis state |index⟩
    pub fn computational_basis(qubit_count: usize, index: usize) -> Result<Self> {
        let dim = 1usize << qubit_count;

        if index >= dim {
            return Err(SimError::DimensionMismatch {
                expected: dim,
                actual: index + 1,
            });
        }

        let mut amplitudes = Array1::zeros(dim);
        amplitudes[index] = Complex64::new(1.0, 0.0);

        Ok(StateVector {
            qubit_count,
            amplitudes,
        })
    }

    /// Create the zero state |00...0⟩
    pub fn zero_state(qubit_count: usize) -> Self {
        let mut amplitudes = Array1::zeros(1usize << qubit_count);
        amplitudes[0] = Complex64::new(1.0, 0.0);
        StateVector {
            qubit_count,
            amplitudes,
        }
    }

    /// Create the basis state whose qubit `q` holds `bits[q]`
    pub fn from_bits(bits: &[u8]) -> Result<Self> {
        let qubit_count = bits.len();
        let mut index = 0usize;
        for (qubit, &bit) in bits.iter().enumerate() {
            if bit > 1 {
                return Err(SimError::DimensionMismatch {
                    expected: 2,
                    actual: bit as usize + 1,
                });
            }
            index |= (bit as usize) << bit_position(qubit_count, qubit);
        }
        Self::computational_basis(qubit_count, index)
    }

    /// Number of qubits
    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// Dimension of the Hilbert space (2^n)
    pub fn dimension(&self) -> usize {
        self.amplitudes.len()
    }

    /// Get a reference to the amplitudes
    pub fn amplitudes(&self) -> &Array1<Complex64> {
        &self.amplitudes
    }

    /// Consume the state and return its amplitudes
    pub fn into_amplitudes(self) -> Array1<Complex64> {
        self.amplitudes
    }

    /// Euclidean norm of the amplitude vector
    pub fn norm(&self) -> f64 {
        self.amplitudes
            .iter()
            .map(|amp| amp.norm_sqr())
            .sum::<f64>()
            .sqrt()
    }

    /// Whether the squared norm is within `tolerance` of 1
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        let norm_sqr: f64 = self.amplitudes.iter().map(|amp| amp.norm_sqr()).sum();
        (norm_sqr - 1.0).abs() <= tolerance
    }

    /// Calculate the probability of measuring the given basis index
    pub fn probability(&self, index: usize) -> f64 {
        if index >= self.dimension() {
            return 0.0;
        }
        self.amplitudes[index].norm_sqr()
    }

    /// Probabilities of every basis index
    pub fn probabilities(&self) -> Array1<f64> {
        self.amplitudes.mapv(|amp| amp.norm_sqr())
    }

    /// Inner product ⟨self|other⟩
    pub fn inner_product(&self, other: &Self) -> Result<Complex64> {
        if self.qubit_count != other.qubit_count {
            return Err(SimError::DimensionMismatch {
                expected: self.dimension(),
                actual: other.dimension(),
            });
        }

        Ok(self
            .amplitudes
            .iter()
            .zip(other.amplitudes.iter())
            .map(|(a, b)| a.conj() * b)
            .sum())
    }

    /// Squared overlap |⟨self|other⟩|²
    pub fn fidelity(&self, other: &Self) -> Result<f64> {
        Ok(self.inner_product(other)?.norm_sqr())
    }

    /// Expectation value ⟨ψ|O|ψ⟩ of a dense operator
    pub fn expectation(&self, operator: &Array2<Complex64>) -> Result<Complex64> {
        let dim = self.dimension();
        if operator.shape() != [dim, dim] {
            return Err(SimError::DimensionMismatch {
                expected: dim,
                actual: operator.nrows(),
            });
        }

        let o_psi = operator.dot(&self.amplitudes);
        Ok(self
            .amplitudes
            .iter()
            .zip(o_psi.iter())
            .map(|(a, b)| a.conj() * b)
            .sum())
    }

    /// Tensor product |self⟩ ⊗ |other⟩; `self` supplies the leading qubits
    pub fn tensor(&self, other: &Self) -> Self {
        let other_dim = other.dimension();
        let mut amplitudes = Array1::zeros(self.dimension() * other_dim);

        for (i, a) in self.amplitudes.iter().enumerate() {
            for (j, b) in other.amplitudes.iter().enumerate() {
                amplitudes[i * other_dim + j] = a * b;
            }
        }

        StateVector {
            qubit_count: self.qubit_count + other.qubit_count,
            amplitudes,
        }
    }
}

impl Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}-qubit state:", self.qubit_count)?;

        let threshold = 1e-10;
        let mut has_entries = false;

        for (i, amp) in self.amplitudes.iter().enumerate() {
            if amp.norm_sqr() > threshold {
                has_entries = true;
                let bit_string = format!("{:0width$b}", i, width = self.qubit_count);
                writeln!(
                    f,
                    "  ({:.6}{:+.6}i) |{}⟩ [{:.1}%]",
                    amp.re,
                    amp.im,
                    bit_string,
                    amp.norm_sqr() * 100.0
                )?;
            }
        }

        if !has_entries {
            writeln!(f, "  (zero state)")?;
        }

        Ok(())
    }
}
