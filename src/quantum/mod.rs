// src/quantum/mod.rs
//! Quantum states, gates and circuits
//!
//! This module implements pure-state simulation: state vectors, gate
//! definitions and the registry that names them, circuits that execute gates
//! in order, and reverse-mode differentiation of circuit parameters.

pub mod state;
pub mod gate;
pub mod registry;
pub mod circuit;
pub mod differentiation;

pub use state::StateVector;
pub use gate::{CustomMatrixGate, GateKind, GateSpec, ParametrizedGate, QuantumGate, StandardGate};
pub use registry::{GateRegistry, GateRule};
pub use circuit::{Circuit, Execution, GateId};
pub use differentiation::{Expectation, Fidelity, GateGradient, GradientResult, Objective};

/// Re-export commonly used types and traits
pub mod prelude {
    pub use super::{Circuit, GateId, StateVector};
    pub use super::{CustomMatrixGate, GateRule, QuantumGate, StandardGate, ParametrizedGate};
    pub use super::{Expectation, Fidelity, Objective};
}
