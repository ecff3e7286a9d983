// src/quantum/circuit.rs
//! Quantum circuits: ordered gate lists executed over a state vector

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::SimulatorConfig;
use crate::error::{Result, SimError};
use crate::simulators::{check_qubits, ContractionEngine, MeasurementEngine, MeasurementRecord};
use super::gate::{CustomMatrixGate, GateSpec};
use super::registry::{GateRegistry, GateRule};
use super::state::StateVector;

/// Position of a gate inside its circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GateId(pub(crate) usize);

impl GateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Output of a single circuit execution
#[derive(Debug, Clone)]
pub struct Execution {
    /// Final state
    pub state: StateVector,
    /// One record per measurement gate, in execution order
    pub records: Vec<(GateId, MeasurementRecord)>,
}

/// A quantum circuit consisting of a sequence of gates
#[derive(Debug, Clone)]
pub struct Circuit {
    qubit_count: usize,
    default_requires_grad: bool,
    gates: Vec<GateSpec>,
    registry: Arc<GateRegistry>,
    config: SimulatorConfig,
    rng: StdRng,
    contraction: ContractionEngine,
    measurement: MeasurementEngine,
}

impl Circuit {
    /// Create an empty circuit on `qubit_count` qubits using the global
    /// registry and default configuration
    pub fn new(qubit_count: usize, default_requires_grad: bool) -> Self {
        Self::with_config(qubit_count, default_requires_grad, SimulatorConfig::default())
    }

    /// Create an empty circuit with an explicit configuration
    pub fn with_config(qubit_count: usize, default_requires_grad: bool, config: SimulatorConfig) -> Self {
        Self::with_registry(qubit_count, default_requires_grad, config, GateRegistry::global())
    }

    /// Create an empty circuit resolving names through `registry`
    pub fn with_registry(
        qubit_count: usize,
        default_requires_grad: bool,
        config: SimulatorConfig,
        registry: Arc<GateRegistry>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Circuit {
            qubit_count,
            default_requires_grad,
            gates: Vec::new(),
            registry,
            contraction: ContractionEngine::new(&config),
            measurement: MeasurementEngine::new(&config),
            config,
            rng,
        }
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// Get the number of gates in the circuit
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn default_requires_grad(&self) -> bool {
        self.default_requires_grad
    }

    pub fn gates(&self) -> &[GateSpec] {
        &self.gates
    }

    pub fn gate(&self, id: GateId) -> Option<&GateSpec> {
        self.gates.get(id.0)
    }

    pub fn registry(&self) -> &GateRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Whether any gate is a measurement
    pub fn has_measurement(&self) -> bool {
        self.gates.iter().any(GateSpec::is_measurement)
    }

    /// Reseed the circuit's own random generator
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Register a custom gate rule for this circuit
    ///
    /// The registry is shared copy-on-write: other circuits holding the same
    /// registry never observe the new entry.
    pub fn register_custom_gate(&mut self, name: impl Into<String>, rule: GateRule) -> Result<()> {
        Arc::make_mut(&mut self.registry).register(name, rule)
    }

    /// Append a named gate with the circuit's default differentiability
    pub fn append(&mut self, name: &str, qubits: &[usize], params: &[f64]) -> Result<GateId> {
        self.append_with_grad(name, qubits, params, self.default_requires_grad)
    }

    /// Append a named gate with an explicit differentiability flag
    pub fn append_with_grad(
        &mut self,
        name: &str,
        qubits: &[usize],
        params: &[f64],
        requires_grad: bool,
    ) -> Result<GateId> {
        check_qubits(qubits, self.qubit_count)?;
        let spec = self.registry.build(name, qubits, params, requires_grad)?;
        self.append_spec(spec)
    }

    /// Append an already-built gate specification
    pub fn append_spec(&mut self, spec: GateSpec) -> Result<GateId> {
        check_qubits(spec.qubits(), self.qubit_count)?;
        trace!(gate = spec.name(), qubits = ?spec.qubits(), "appending gate");
        self.gates.push(spec);
        Ok(GateId(self.gates.len() - 1))
    }

    /// Append every gate of `other`, which must have the same qubit count
    pub fn extend(&mut self, other: &Circuit) -> Result<()> {
        if other.qubit_count != self.qubit_count {
            return Err(SimError::DimensionMismatch {
                expected: self.qubit_count,
                actual: other.qubit_count,
            });
        }
        for gate in &other.gates {
            let mut gate = gate.clone();
            gate.clear_record();
            self.gates.push(gate);
        }
        Ok(())
    }

    /// Add a Hadamard gate
    pub fn h(&mut self, qubit: usize) -> Result<GateId> {
        self.append("h", &[qubit], &[])
    }

    /// Add a Pauli-X gate
    pub fn x(&mut self, qubit: usize) -> Result<GateId> {
        self.append("x", &[qubit], &[])
    }

    /// Add a Pauli-Y gate
    pub fn y(&mut self, qubit: usize) -> Result<GateId> {
        self.append("y", &[qubit], &[])
    }

    /// Add a Pauli-Z gate
    pub fn z(&mut self, qubit: usize) -> Result<GateId> {
        self.append("z", &[qubit], &[])
    }

    pub fn s(&mut self, qubit: usize) -> Result<GateId> {
        self.append("s", &[qubit], &[])
    }

    pub fn t(&mut self, qubit: usize) -> Result<GateId> {
        self.append("t", &[qubit], &[])
    }

    /// Add a SWAP gate
    pub fn swap(&mut self, qubit1: usize, qubit2: usize) -> Result<GateId> {
        self.append("swap", &[qubit1, qubit2], &[])
    }

    /// Add a CNOT gate
    pub fn cnot(&mut self, control: usize, target: usize) -> Result<GateId> {
        self.append("cnot", &[control, target], &[])
    }

    pub fn cy(&mut self, control: usize, target: usize) -> Result<GateId> {
        self.append("cy", &[control, target], &[])
    }

    pub fn cz(&mut self, control: usize, target: usize) -> Result<GateId> {
        self.append("cz", &[control, target], &[])
    }

    /// Add a Toffoli gate (CCNOT)
    pub fn toffoli(&mut self, control1: usize, control2: usize, target: usize) -> Result<GateId> {
        self.append("toffoli", &[control1, control2, target], &[])
    }

    /// Add an Rx gate
    pub fn rx(&mut self, qubit: usize, theta: f64) -> Result<GateId> {
        self.append("rx", &[qubit], &[theta])
    }

    /// Add an Ry gate
    pub fn ry(&mut self, qubit: usize, theta: f64) -> Result<GateId> {
        self.append("ry", &[qubit], &[theta])
    }

    /// Add an Rz gate
    pub fn rz(&mut self, qubit: usize, theta: f64) -> Result<GateId> {
        self.append("rz", &[qubit], &[theta])
    }

    pub fn phase(&mut self, qubit: usize, theta: f64) -> Result<GateId> {
        self.append("phase", &[qubit], &[theta])
    }

    pub fn u3(&mut self, qubit: usize, theta: f64, phi: f64, lambda: f64) -> Result<GateId> {
        self.append("u3", &[qubit], &[theta, phi, lambda])
    }

    pub fn crx(&mut self, control: usize, target: usize, theta: f64) -> Result<GateId> {
        self.append("crx", &[control, target], &[theta])
    }

    pub fn cry(&mut self, control: usize, target: usize, theta: f64) -> Result<GateId> {
        self.append("cry", &[control, target], &[theta])
    }

    /// Add a controlled Rz gate
    pub fn crz(&mut self, control: usize, target: usize, theta: f64) -> Result<GateId> {
        self.append("crz", &[control, target], &[theta])
    }

    /// Add a measurement of `qubits`; its record is readable after execution
    pub fn measure(&mut self, qubits: &[usize]) -> Result<GateId> {
        self.append("measure", qubits, &[])
    }

    /// Add a fixed unitary given as a dense matrix over `qubits`
    pub fn unitary(&mut self, matrix: Array2<Complex64>, qubits: &[usize]) -> Result<GateId> {
        check_qubits(qubits, self.qubit_count)?;
        let dim = 1usize << qubits.len();
        if matrix.nrows() != dim || matrix.ncols() != dim {
            return Err(SimError::DimensionMismatch {
                expected: dim,
                actual: if matrix.nrows() != dim { matrix.nrows() } else { matrix.ncols() },
            });
        }
        let gate = Arc::new(CustomMatrixGate::fixed("unitary", matrix));
        let spec = GateSpec::custom("unitary", gate, qubits, &[], false)?;
        self.append_spec(spec)
    }

    /// The latest record of a measurement gate
    pub fn measurement_record(&self, id: GateId) -> Option<&MeasurementRecord> {
        self.gate(id).and_then(GateSpec::record)
    }

    /// Concatenated parameters of every gate that requires gradients
    pub fn parameters(&self) -> Vec<f64> {
        self.gates
            .iter()
            .filter(|gate| gate.requires_grad())
            .flat_map(|gate| gate.parameters().iter().copied())
            .collect()
    }

    /// Number of entries in [`Circuit::parameters`]
    pub fn trainable_parameter_count(&self) -> usize {
        self.gates
            .iter()
            .filter(|gate| gate.requires_grad())
            .map(|gate| gate.parameters().len())
            .sum()
    }

    /// Overwrite the trainable parameters, in the order of [`Circuit::parameters`]
    pub fn set_parameters(&mut self, values: &[f64]) -> Result<()> {
        let expected = self.trainable_parameter_count();
        if values.len() != expected {
            return Err(SimError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }

        let mut offset = 0;
        for gate in self.gates.iter_mut().filter(|gate| gate.requires_grad()) {
            let count = gate.parameters().len();
            gate.set_parameters(&values[offset..offset + count]);
            offset += count;
        }
        Ok(())
    }

    /// Run the circuit on `initial` with the circuit's own random generator
    ///
    /// Measurement records are stored on their gates. Records from earlier
    /// runs are cleared first, so a failed run leaves every record empty.
    pub fn apply_state(&mut self, initial: &StateVector) -> Result<StateVector> {
        self.clear_measurements();
        let execution = self.with_rng(|circuit, rng| circuit.execute(initial, rng))?;
        Ok(self.store_records(execution))
    }

    /// Run the circuit with a caller-supplied random generator
    pub fn apply_state_with_rng<R: Rng + ?Sized>(
        &mut self,
        initial: &StateVector,
        rng: &mut R,
    ) -> Result<StateVector> {
        self.clear_measurements();
        let execution = self.execute(initial, rng)?;
        Ok(self.store_records(execution))
    }

    /// Run the circuit on a raw amplitude vector
    pub fn apply_vector(&mut self, amplitudes: &Array1<Complex64>) -> Result<Array1<Complex64>> {
        self.clear_measurements();
        let initial = StateVector::with_tolerance(
            self.qubit_count,
            amplitudes.clone(),
            self.config.normalization_tolerance,
        )?;
        Ok(self.apply_state(&initial)?.into_amplitudes())
    }

    /// Run the circuit without touching stored records
    pub fn execute<R: Rng + ?Sized>(&self, initial: &StateVector, rng: &mut R) -> Result<Execution> {
        self.check_initial(initial)?;
        debug!(qubits = self.qubit_count, gates = self.gates.len(), "executing circuit");

        let mut state = initial.clone();
        let mut records = Vec::new();
        for (index, gate) in self.gates.iter().enumerate() {
            trace!(index, gate = gate.name(), qubits = ?gate.qubits(), "applying gate");
            if gate.is_measurement() {
                let (collapsed, record) = self.measurement.measure(&state, gate.qubits(), rng)?;
                records.push((GateId(index), record));
                state = collapsed;
            } else {
                state = self.apply_gate(&state, gate)?;
            }
        }

        debug!(measurements = records.len(), "circuit execution finished");
        Ok(Execution { state, records })
    }

    /// The dense `2^n × 2^n` unitary of the circuit
    ///
    /// Column j is the circuit applied to basis state |j⟩, so the result
    /// follows exactly the conventions of [`Circuit::apply_state`].
    pub fn to_unitary(&self) -> Result<Array2<Complex64>> {
        if self.has_measurement() {
            return Err(SimError::UnsupportedUnitaryExtraction);
        }

        let matrices = self
            .gates
            .iter()
            .map(|gate| gate.operator_matrix().ok_or(SimError::UnsupportedUnitaryExtraction))
            .collect::<Result<Vec<_>>>()?;

        let dim = 1usize << self.qubit_count;
        let columns = (0..dim)
            .into_par_iter()
            .map(|j| {
                let mut column = Array1::zeros(dim);
                column[j] = Complex64::new(1.0, 0.0);
                for (gate, matrix) in self.gates.iter().zip(&matrices) {
                    column = self.contract_gate(column.view(), gate, matrix)?;
                }
                Ok(column)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut unitary = Array2::zeros((dim, dim));
        for (j, column) in columns.iter().enumerate() {
            unitary.column_mut(j).assign(column);
        }
        Ok(unitary)
    }

    pub(crate) fn check_initial(&self, initial: &StateVector) -> Result<()> {
        if initial.qubit_count() != self.qubit_count {
            return Err(SimError::DimensionMismatch {
                expected: 1usize << self.qubit_count,
                actual: initial.dimension(),
            });
        }
        if !initial.is_normalized(self.config.normalization_tolerance) {
            return Err(SimError::NotNormalized { norm: initial.norm() });
        }
        Ok(())
    }

    fn store_records(&mut self, execution: Execution) -> StateVector {
        self.store_measurements(execution.records);
        execution.state
    }

    /// Lend the circuit's generator to `f` alongside a shared borrow of the
    /// circuit
    pub(crate) fn with_rng<T>(&mut self, f: impl FnOnce(&Self, &mut StdRng) -> T) -> T {
        let mut rng = std::mem::replace(&mut self.rng, StdRng::seed_from_u64(0));
        let result = f(self, &mut rng);
        self.rng = rng;
        result
    }

    pub(crate) fn clear_measurements(&mut self) {
        for gate in self.gates.iter_mut().filter(|gate| gate.is_measurement()) {
            gate.clear_record();
        }
    }

    pub(crate) fn store_measurements(&mut self, records: Vec<(GateId, MeasurementRecord)>) {
        for (id, record) in records {
            self.gates[id.0].set_record(record);
        }
    }

    pub(crate) fn contraction(&self) -> &ContractionEngine {
        &self.contraction
    }

    pub(crate) fn measurement(&self) -> &MeasurementEngine {
        &self.measurement
    }

    /// Apply one non-measurement gate to `state`
    pub(crate) fn apply_gate(&self, state: &StateVector, gate: &GateSpec) -> Result<StateVector> {
        let matrix = gate
            .operator_matrix()
            .ok_or(SimError::UnsupportedUnitaryExtraction)?;
        let amplitudes = self.contract_gate(state.amplitudes().view(), gate, &matrix)?;
        Ok(StateVector::from_raw(self.qubit_count, amplitudes))
    }

    /// Contract `matrix` (the gate's operator block, or a variant of it)
    /// using the gate's control/target layout
    pub(crate) fn contract_gate(
        &self,
        amplitudes: ArrayView1<Complex64>,
        gate: &GateSpec,
        matrix: &Array2<Complex64>,
    ) -> Result<Array1<Complex64>> {
        self.contraction.contract_controlled(
            amplitudes,
            self.qubit_count,
            matrix,
            gate.controls(),
            gate.targets(),
        )
    }
}
