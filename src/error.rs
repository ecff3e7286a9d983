//! Error types for circuit construction and simulation

use thiserror::Error;

/// Result type used throughout the simulator
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while building or running a circuit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Qubit index not below the qubit count
    #[error("Qubit index {index} out of range for {qubit_count}-qubit circuit")]
    IndexOutOfRange { index: usize, qubit_count: usize },

    /// The same qubit appears twice in one gate
    #[error("Qubit index {index} appears more than once in a single gate")]
    DuplicateIndex { index: usize },

    /// Matrix or vector size does not match the qubits it acts on
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A fixed gate matrix failed the unitarity check
    #[error("Matrix is not unitary (max deviation from identity {deviation:e})")]
    NonUnitaryMatrix { deviation: f64 },

    /// No gate rule registered under this name
    #[error("No gate registered under the name '{0}'")]
    UnregisteredGateName(String),

    /// A gate rule is already registered under this name
    #[error("A gate named '{0}' is already registered")]
    NameCollision(String),

    /// The sampled measurement outcome has (numerically) zero probability
    #[error("Measurement outcome {outcome} has degenerate probability {probability:e}")]
    NumericalDegeneracy { outcome: usize, probability: f64 },

    /// `to_unitary` was called on a circuit containing a measurement
    #[error("Cannot extract a unitary from a circuit containing measurement gates")]
    UnsupportedUnitaryExtraction,

    /// Vector or probability distribution does not have unit norm
    #[error("State is not normalized, norm = {norm}")]
    NotNormalized { norm: f64 },

    /// Wrong number of parameters supplied to a gate
    #[error("Gate '{gate}' takes {expected} parameter(s), got {actual}")]
    ParameterCount {
        gate: String,
        expected: usize,
        actual: usize,
    },
}
