//! Numerical engines behind circuit execution
//!
//! The contraction engine applies unitaries to qubit subsets; the
//! measurement engine computes marginal probabilities, samples outcomes and
//! collapses states.

pub mod contraction;
pub mod measurement;

pub use contraction::ContractionEngine;
pub use measurement::{MeasurementEngine, MeasurementRecord};

use crate::error::{Result, SimError};

/// Check that every qubit is in range and none repeats
pub(crate) fn check_qubits(qubits: &[usize], qubit_count: usize) -> Result<()> {
    for (i, &q) in qubits.iter().enumerate() {
        if q >= qubit_count {
            return Err(SimError::IndexOutOfRange {
                index: q,
                qubit_count,
            });
        }
        if qubits[..i].contains(&q) {
            return Err(SimError::DuplicateIndex { index: q });
        }
    }
    Ok(())
}
