// src/quantum/differentiation.rs
//! Reverse-mode differentiation of circuits
//!
//! The forward pass stores the input amplitudes of every gate. The reverse
//! pass walks the gates backwards carrying the cotangent λ = ∂L/∂ψ of the
//! real objective L, accumulating Re⟨λ|∂U/∂θ·ψ_in⟩ for each trainable
//! parameter and pulling λ back through U†. Measurements keep the sampled
//! outcome fixed and pull λ back through the projection and through the
//! 1/√p renormalization, whose probability p depends on the parameters.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rand::rngs::StdRng;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::simulators::measurement::project;
use crate::simulators::MeasurementRecord;
use super::circuit::{Circuit, GateId};
use super::gate::{adjoint, embed_block};
use super::state::StateVector;

/// A real-valued function of the final state
///
/// `evaluate` returns the value together with its cotangent
/// g = ∂L/∂Re ψ + i·∂L/∂Im ψ, so that dL = Re⟨g|dψ⟩.
pub trait Objective {
    fn evaluate(&self, state: &StateVector) -> Result<(f64, Array1<Complex64>)>;
}

impl<F> Objective for F
where
    F: Fn(&StateVector) -> Result<(f64, Array1<Complex64>)>,
{
    fn evaluate(&self, state: &StateVector) -> Result<(f64, Array1<Complex64>)> {
        self(state)
    }
}

/// |⟨target|ψ⟩|²
#[derive(Debug, Clone)]
pub struct Fidelity {
    target: StateVector,
}

impl Fidelity {
    pub fn new(target: StateVector) -> Self {
        Fidelity { target }
    }

    pub fn target(&self) -> &StateVector {
        &self.target
    }
}

impl Objective for Fidelity {
    fn evaluate(&self, state: &StateVector) -> Result<(f64, Array1<Complex64>)> {
        let overlap = self.target.inner_product(state)?;
        let cotangent = self.target.amplitudes().mapv(|t| overlap * t * 2.0);
        Ok((overlap.norm_sqr(), cotangent))
    }
}

/// ⟨ψ|O|ψ⟩ for a Hermitian operator O over the whole register
#[derive(Debug, Clone)]
pub struct Expectation {
    operator: Array2<Complex64>,
}

impl Expectation {
    /// The operator is assumed Hermitian; only its shape is checked against
    /// the state at evaluation time
    pub fn new(operator: Array2<Complex64>) -> Self {
        Expectation { operator }
    }

    pub fn operator(&self) -> &Array2<Complex64> {
        &self.operator
    }
}

impl Objective for Expectation {
    fn evaluate(&self, state: &StateVector) -> Result<(f64, Array1<Complex64>)> {
        let value = state.expectation(&self.operator)?;
        let applied = self.operator.dot(state.amplitudes());
        Ok((value.re, applied.mapv(|x| x * 2.0)))
    }
}

/// Gradient of one trainable gate, one entry per parameter
#[derive(Debug, Clone, PartialEq)]
pub struct GateGradient {
    pub gate: GateId,
    pub values: Vec<f64>,
}

/// Output of [`Circuit::value_and_grad`]
#[derive(Debug, Clone)]
pub struct GradientResult {
    /// Objective value at the final state
    pub value: f64,
    /// Final state of the forward pass
    pub state: StateVector,
    /// Gradients of the trainable gates in append order
    pub gradients: Vec<GateGradient>,
}

impl GradientResult {
    /// Gradients flattened in the order of [`Circuit::parameters`]
    pub fn flat(&self) -> Vec<f64> {
        self.gradients
            .iter()
            .flat_map(|g| g.values.iter().copied())
            .collect()
    }

    /// Gradient of a single gate, if it is trainable
    pub fn gate(&self, id: GateId) -> Option<&[f64]> {
        self.gradients
            .iter()
            .find(|g| g.gate == id)
            .map(|g| g.values.as_slice())
    }
}

enum Step {
    Unitary,
    Collapse {
        outcome: usize,
        probability: f64,
        collapsed: Array1<Complex64>,
    },
}

struct Tape {
    inputs: Vec<Array1<Complex64>>,
    steps: Vec<Step>,
    state: StateVector,
    records: Vec<(GateId, MeasurementRecord)>,
}

impl Circuit {
    /// Run the circuit from `initial`, evaluate `objective` on the final
    /// state and return its gradient with respect to every trainable
    /// parameter
    ///
    /// Measurement records are stored, and cleared on failure, as with
    /// [`Circuit::apply_state`].
    pub fn value_and_grad<O: Objective + ?Sized>(
        &mut self,
        initial: &StateVector,
        objective: &O,
    ) -> Result<GradientResult> {
        self.clear_measurements();
        let tape = self.with_rng(|circuit, rng| circuit.record_forward(initial, rng))?;
        let (value, cotangent) = objective.evaluate(&tape.state)?;
        let gradients = self.backward(&tape, cotangent)?;
        debug!(value, trainable = gradients.len(), "computed circuit gradient");

        let Tape { state, records, .. } = tape;
        self.store_measurements(records);
        Ok(GradientResult {
            value,
            state,
            gradients,
        })
    }

    fn record_forward(&self, initial: &StateVector, rng: &mut StdRng) -> Result<Tape> {
        self.check_initial(initial)?;

        let mut inputs = Vec::with_capacity(self.gate_count());
        let mut steps = Vec::with_capacity(self.gate_count());
        let mut records = Vec::new();
        let mut state = initial.clone();

        for (index, gate) in self.gates().iter().enumerate() {
            inputs.push(state.amplitudes().clone());
            if gate.is_measurement() {
                let (collapsed, record) = self.measurement().measure(&state, gate.qubits(), rng)?;
                steps.push(Step::Collapse {
                    outcome: record.outcome,
                    probability: record.probability(),
                    collapsed: collapsed.amplitudes().clone(),
                });
                records.push((GateId(index), record));
                state = collapsed;
            } else {
                steps.push(Step::Unitary);
                state = self.apply_gate(&state, gate)?;
            }
        }

        Ok(Tape {
            inputs,
            steps,
            state,
            records,
        })
    }

    fn backward(&self, tape: &Tape, cotangent: Array1<Complex64>) -> Result<Vec<GateGradient>> {
        let n = self.qubit_count();
        if cotangent.len() != tape.state.dimension() {
            return Err(SimError::DimensionMismatch {
                expected: tape.state.dimension(),
                actual: cotangent.len(),
            });
        }

        let mut lambda = cotangent;
        let mut gradients = Vec::new();

        for (index, gate) in self.gates().iter().enumerate().rev() {
            match &tape.steps[index] {
                Step::Collapse {
                    outcome,
                    probability,
                    collapsed,
                } => {
                    // ψ_out = Pψ/√p with p = ‖Pψ‖², so
                    // λ_in = (Pλ − Re⟨ψ_out|λ⟩·ψ_out)/√p
                    let projected = project(lambda.view(), n, gate.qubits(), *outcome);
                    let overlap: f64 = collapsed
                        .iter()
                        .zip(lambda.iter())
                        .map(|(c, l)| (c.conj() * l).re)
                        .sum();
                    let scale = 1.0 / probability.sqrt();
                    lambda = (&projected - &collapsed.mapv(|c| c * overlap)).mapv(|x| x * scale);
                }
                Step::Unitary => {
                    if gate.requires_grad() {
                        let input = &tape.inputs[index];
                        let controls = gate.controls().len();
                        let derivatives = gate.operator_derivatives();
                        if derivatives.len() != gate.parameters().len() {
                            return Err(SimError::ParameterCount {
                                gate: gate.name().to_string(),
                                expected: gate.parameters().len(),
                                actual: derivatives.len(),
                            });
                        }
                        let values = derivatives
                            .iter()
                            .map(|derivative| {
                                // Zero outside the controlled block: the
                                // inactive subspace does not depend on θ.
                                let full = embed_block(controls, derivative, false);
                                let moved = self.contraction().contract(input.view(), n, &full, gate.qubits())?;
                                Ok(lambda
                                    .iter()
                                    .zip(moved.iter())
                                    .map(|(l, m)| (l.conj() * m).re)
                                    .sum::<f64>())
                            })
                            .collect::<Result<Vec<f64>>>()?;
                        gradients.push(GateGradient {
                            gate: GateId(index),
                            values,
                        });
                    }

                    let matrix = gate
                        .operator_matrix()
                        .ok_or(SimError::UnsupportedUnitaryExtraction)?;
                    lambda = self.contract_gate(lambda.view(), gate, &adjoint(&matrix))?;
                }
            }
        }

        gradients.reverse();
        Ok(gradients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fidelity_objective_value_and_cotangent() {
        let target = StateVector::from_bits(&[1]).unwrap();
        let objective = Fidelity::new(target);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let state = StateVector::new(
            1,
            Array1::from(vec![Complex64::new(s, 0.0), Complex64::new(0.0, s)]),
        )
        .unwrap();

        let (value, cotangent) = objective.evaluate(&state).unwrap();
        assert!((value - 0.5).abs() < 1e-12);
        assert!(cotangent[0].norm() < 1e-12);
        assert!((cotangent[1] - Complex64::new(0.0, 2.0 * s)).norm() < 1e-12);
    }

    #[test]
    fn test_ry_gradient_is_analytic() {
        // ⟨Z⟩ after Ry(θ)|0⟩ is cos θ
        let z = Array2::from_diag(&Array1::from(vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(-1.0, 0.0),
        ]));
        let mut circuit = Circuit::new(1, true);
        let id = circuit.ry(0, 0.7).unwrap();

        let result = circuit
            .value_and_grad(&StateVector::zero_state(1), &Expectation::new(z))
            .unwrap();
        assert!((result.value - 0.7f64.cos()).abs() < 1e-12);
        assert!((result.gate(id).unwrap()[0] + 0.7f64.sin()).abs() < 1e-10);
    }

    #[test]
    fn test_frozen_gates_report_no_gradient() {
        let mut circuit = Circuit::new(1, false);
        circuit.rx(0, 0.3).unwrap();
        let objective = Fidelity::new(StateVector::zero_state(1));
        let result = circuit.value_and_grad(&StateVector::zero_state(1), &objective).unwrap();
        assert!(result.gradients.is_empty());
        assert!(result.flat().is_empty());
    }

    #[test]
    fn test_cotangent_length_is_checked() {
        let mut circuit = Circuit::new(2, true);
        circuit.rx(0, 0.3).unwrap();
        let short = |_: &StateVector| -> Result<(f64, Array1<Complex64>)> { Ok((0.0, Array1::zeros(2))) };
        let err = circuit.value_and_grad(&StateVector::zero_state(2), &short).unwrap_err();
        assert_eq!(err, SimError::DimensionMismatch { expected: 4, actual: 2 });
    }
}
