//! Differentiable quantum state-vector simulation
//!
//! This crate represents an n-qubit pure state as a vector of 2^n complex
//! amplitudes, applies gates to arbitrary qubit subsets by tensor
//! contraction, performs projective measurement with collapse, and computes
//! gradients of real objectives with respect to gate parameters.
//!
//! Qubit 0 is the most significant bit of every basis index.

pub mod config;
pub mod error;
pub mod quantum;
pub mod simulators;

pub use config::SimulatorConfig;
pub use error::{Result, SimError};

// Create a prelude module for convenient imports
pub mod prelude {
    pub use crate::quantum::prelude::*;
    pub use crate::simulators::MeasurementRecord;
    pub use crate::{Result, SimError, SimulatorConfig};
}

// Version and crate information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
