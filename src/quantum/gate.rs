// src/quantum/gate.rs
//! Gate matrices and gate specifications
//!
//! A [`QuantumGate`] is a matrix-valued function of zero or more real
//! parameters. A [`GateSpec`] binds a gate to concrete qubits and parameter
//! values inside a circuit. Matrix rows and columns use the same big-endian
//! convention as [`StateVector`](super::state::StateVector): the first listed
//! qubit is the most significant bit of the sub-index.

use std::fmt::{self, Debug};
use std::sync::Arc;

use ndarray::{array, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::simulators::measurement::MeasurementRecord;

/// Common complex numbers used in quantum gates
pub mod constants {
    use num_complex::Complex64;

    /// The imaginary unit i
    pub const I: Complex64 = Complex64::new(0.0, 1.0);

    /// Complex zero
    pub const ZERO: Complex64 = Complex64::new(0.0, 0.0);

    /// Complex one
    pub const ONE: Complex64 = Complex64::new(1.0, 0.0);

    /// 1/sqrt(2)
    pub const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;
}

/// Maximum entry-wise deviation of U·U† from I accepted for fixed gates
pub const UNITARITY_TOLERANCE: f64 = 1e-8;

/// Step used by the default central-difference derivative
const FINITE_DIFFERENCE_STEP: f64 = 1e-6;

/// Trait for quantum gates
///
/// Implementations must return a `2^k × 2^k` matrix for `k = qubit_count()`
/// and must be smooth in their parameters when used with gradients.
pub trait QuantumGate: Debug + Send + Sync {
    /// Returns the number of qubits this gate acts on
    fn qubit_count(&self) -> usize;

    /// Returns the number of real parameters the matrix depends on
    fn parameter_count(&self) -> usize {
        0
    }

    /// Returns the matrix for the given parameter values
    ///
    /// `params` must hold exactly `parameter_count()` values. Implementations
    /// may index into it directly. [`GateSpec`] checks the count when a gate
    /// is built and whenever its parameters are replaced.
    fn matrix(&self, params: &[f64]) -> Array2<Complex64>;

    /// Returns ∂U/∂θ_j for every parameter, in parameter order
    ///
    /// Takes `parameter_count()` values, as [`QuantumGate::matrix`] does.
    ///
    /// The default uses central finite differences of [`QuantumGate::matrix`].
    fn derivatives(&self, params: &[f64]) -> Vec<Array2<Complex64>> {
        finite_difference_derivatives(|p| self.matrix(p), params)
    }

    /// Returns a display name for this gate
    fn name(&self) -> String;
}

/// Central-difference derivatives of a matrix-valued function
pub fn finite_difference_derivatives<F>(matrix_fn: F, params: &[f64]) -> Vec<Array2<Complex64>>
where
    F: Fn(&[f64]) -> Array2<Complex64>,
{
    let h = FINITE_DIFFERENCE_STEP;
    let mut shifted = params.to_vec();

    (0..params.len())
        .map(|j| {
            shifted[j] = params[j] + h;
            let forward = matrix_fn(&shifted);
            shifted[j] = params[j] - h;
            let backward = matrix_fn(&shifted);
            shifted[j] = params[j];
            (forward - backward).mapv(|x| x / (2.0 * h))
        })
        .collect()
}

/// Conjugate transpose of a matrix
pub fn adjoint(matrix: &Array2<Complex64>) -> Array2<Complex64> {
    matrix.t().mapv(|x| x.conj())
}

/// Largest entry-wise deviation of U·U† from the identity
pub fn unitarity_deviation(matrix: &Array2<Complex64>) -> f64 {
    if matrix.nrows() != matrix.ncols() {
        return f64::INFINITY;
    }
    let product = matrix.dot(&adjoint(matrix));
    product
        .indexed_iter()
        .map(|((i, j), value)| {
            let expected = if i == j { constants::ONE } else { constants::ZERO };
            (value - expected).norm()
        })
        .fold(0.0, f64::max)
}

/// Expand a target block into the full matrix of a gate with `controls`
/// leading control qubits: block-diagonal with identity blocks followed by
/// `block` on the all-controls-set subspace.
pub fn controlled_matrix(controls: usize, block: &Array2<Complex64>) -> Array2<Complex64> {
    embed_block(controls, block, true)
}

/// Same layout as [`controlled_matrix`], filling the inactive subspace with
/// identity (`identity = true`) or zeros.
pub(crate) fn embed_block(
    controls: usize,
    block: &Array2<Complex64>,
    identity: bool,
) -> Array2<Complex64> {
    let block_dim = block.nrows();
    let dim = block_dim << controls;
    let offset = dim - block_dim;

    let mut full = Array2::zeros((dim, dim));
    if identity {
        for i in 0..offset {
            full[[i, i]] = constants::ONE;
        }
    }
    full.slice_mut(ndarray::s![offset.., offset..]).assign(block);
    full
}

/// Fixed (parameter-free) standard gates
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StandardGate {
    /// Identity gate on the given number of qubits
    I(usize),

    /// Pauli-X gate (NOT gate)
    X,

    /// Pauli-Y gate
    Y,

    /// Pauli-Z gate
    Z,

    /// Hadamard gate
    H,

    /// Phase gate (S gate)
    S,

    /// π/8 gate (T gate)
    T,

    /// SWAP gate
    SWAP,
}

impl QuantumGate for StandardGate {
    fn qubit_count(&self) -> usize {
        match self {
            StandardGate::I(n) => *n,
            StandardGate::X | StandardGate::Y | StandardGate::Z |
            StandardGate::H | StandardGate::S | StandardGate::T => 1,
            StandardGate::SWAP => 2,
        }
    }

    fn matrix(&self, _params: &[f64]) -> Array2<Complex64> {
        use constants::*;
        match self {
            StandardGate::I(n) => Array2::eye(1 << n),
            StandardGate::X => array![[ZERO, ONE], [ONE, ZERO]],
            StandardGate::Y => array![[ZERO, -I], [I, ZERO]],
            StandardGate::Z => array![[ONE, ZERO], [ZERO, -ONE]],
            StandardGate::H => {
                let factor = Complex64::new(FRAC_1_SQRT_2, 0.0);
                array![[factor, factor], [factor, -factor]]
            }
            StandardGate::S => array![[ONE, ZERO], [ZERO, I]],
            StandardGate::T => array![
                [ONE, ZERO],
                [ZERO, Complex64::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2)]
            ],
            StandardGate::SWAP => array![
                [ONE, ZERO, ZERO, ZERO],
                [ZERO, ZERO, ONE, ZERO],
                [ZERO, ONE, ZERO, ZERO],
                [ZERO, ZERO, ZERO, ONE]
            ],
        }
    }

    fn derivatives(&self, _params: &[f64]) -> Vec<Array2<Complex64>> {
        Vec::new()
    }

    fn name(&self) -> String {
        match self {
            StandardGate::I(n) => format!("I({})", n),
            StandardGate::X => "X".to_string(),
            StandardGate::Y => "Y".to_string(),
            StandardGate::Z => "Z".to_string(),
            StandardGate::H => "H".to_string(),
            StandardGate::S => "S".to_string(),
            StandardGate::T => "T".to_string(),
            StandardGate::SWAP => "SWAP".to_string(),
        }
    }
}

/// Single-qubit gates parameterized by rotation angles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParametrizedGate {
    /// Rotation around X-axis, exp(-iθX/2)
    Rx,

    /// Rotation around Y-axis, exp(-iθY/2)
    Ry,

    /// Rotation around Z-axis, exp(-iθZ/2)
    Rz,

    /// Phase gate diag(1, e^{iθ})
    Phase,

    /// General single-qubit unitary with Euler angles (θ, φ, λ)
    U3,
}

impl QuantumGate for ParametrizedGate {
    fn qubit_count(&self) -> usize {
        1
    }

    fn parameter_count(&self) -> usize {
        match self {
            ParametrizedGate::U3 => 3,
            _ => 1,
        }
    }

    fn matrix(&self, params: &[f64]) -> Array2<Complex64> {
        use constants::*;
        debug_assert_eq!(params.len(), self.parameter_count(), "{} parameter count", self.name());
        match self {
            ParametrizedGate::Rx => {
                let (sin, cos) = (params[0] / 2.0).sin_cos();
                array![
                    [Complex64::new(cos, 0.0), Complex64::new(0.0, -sin)],
                    [Complex64::new(0.0, -sin), Complex64::new(cos, 0.0)]
                ]
            }
            ParametrizedGate::Ry => {
                let (sin, cos) = (params[0] / 2.0).sin_cos();
                array![
                    [Complex64::new(cos, 0.0), Complex64::new(-sin, 0.0)],
                    [Complex64::new(sin, 0.0), Complex64::new(cos, 0.0)]
                ]
            }
            ParametrizedGate::Rz => {
                let phase = Complex64::from_polar(1.0, params[0] / 2.0);
                array![[phase.conj(), ZERO], [ZERO, phase]]
            }
            ParametrizedGate::Phase => {
                array![[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, params[0])]]
            }
            ParametrizedGate::U3 => {
                let (theta, phi, lambda) = (params[0], params[1], params[2]);
                let (sin, cos) = (theta / 2.0).sin_cos();
                array![
                    [Complex64::new(cos, 0.0), -Complex64::from_polar(sin, lambda)],
                    [Complex64::from_polar(sin, phi), Complex64::from_polar(cos, phi + lambda)]
                ]
            }
        }
    }

    fn derivatives(&self, params: &[f64]) -> Vec<Array2<Complex64>> {
        use constants::*;
        debug_assert_eq!(params.len(), self.parameter_count(), "{} parameter count", self.name());
        match self {
            ParametrizedGate::Rx => {
                let (sin, cos) = (params[0] / 2.0).sin_cos();
                vec![array![
                    [Complex64::new(-sin / 2.0, 0.0), Complex64::new(0.0, -cos / 2.0)],
                    [Complex64::new(0.0, -cos / 2.0), Complex64::new(-sin / 2.0, 0.0)]
                ]]
            }
            ParametrizedGate::Ry => {
                let (sin, cos) = (params[0] / 2.0).sin_cos();
                vec![array![
                    [Complex64::new(-sin / 2.0, 0.0), Complex64::new(-cos / 2.0, 0.0)],
                    [Complex64::new(cos / 2.0, 0.0), Complex64::new(-sin / 2.0, 0.0)]
                ]]
            }
            ParametrizedGate::Rz => {
                let phase = Complex64::from_polar(1.0, params[0] / 2.0);
                vec![array![
                    [-I * phase.conj() / 2.0, ZERO],
                    [ZERO, I * phase / 2.0]
                ]]
            }
            ParametrizedGate::Phase => {
                vec![array![[ZERO, ZERO], [ZERO, I * Complex64::from_polar(1.0, params[0])]]]
            }
            ParametrizedGate::U3 => {
                let (theta, phi, lambda) = (params[0], params[1], params[2]);
                let (sin, cos) = (theta / 2.0).sin_cos();
                let d_theta = array![
                    [Complex64::new(-sin / 2.0, 0.0), -Complex64::from_polar(cos / 2.0, lambda)],
                    [Complex64::from_polar(cos / 2.0, phi), -Complex64::from_polar(sin / 2.0, phi + lambda)]
                ];
                let d_phi = array![
                    [ZERO, ZERO],
                    [I * Complex64::from_polar(sin, phi), I * Complex64::from_polar(cos, phi + lambda)]
                ];
                let d_lambda = array![
                    [ZERO, -I * Complex64::from_polar(sin, lambda)],
                    [ZERO, I * Complex64::from_polar(cos, phi + lambda)]
                ];
                vec![d_theta, d_phi, d_lambda]
            }
        }
    }

    fn name(&self) -> String {
        match self {
            ParametrizedGate::Rx => "Rx",
            ParametrizedGate::Ry => "Ry",
            ParametrizedGate::Rz => "Rz",
            ParametrizedGate::Phase => "P",
            ParametrizedGate::U3 => "U3",
        }
        .to_string()
    }
}

type MatrixFn = dyn Fn(&[f64]) -> Array2<Complex64> + Send + Sync;
type DerivativeFn = dyn Fn(&[f64]) -> Vec<Array2<Complex64>> + Send + Sync;

/// A gate defined by a user-supplied matrix function
#[derive(Clone)]
pub struct CustomMatrixGate {
    name: String,
    qubits: usize,
    parameter_count: usize,
    matrix_fn: Arc<MatrixFn>,
    derivative_fn: Option<Arc<DerivativeFn>>,
}

impl CustomMatrixGate {
    /// Wrap a parameter → matrix closure
    pub fn new<F>(name: impl Into<String>, qubits: usize, parameter_count: usize, matrix_fn: F) -> Self
    where
        F: Fn(&[f64]) -> Array2<Complex64> + Send + Sync + 'static,
    {
        CustomMatrixGate {
            name: name.into(),
            qubits,
            parameter_count,
            matrix_fn: Arc::new(matrix_fn),
            derivative_fn: None,
        }
    }

    /// A parameter-free gate with a constant matrix
    ///
    /// The qubit count is inferred from the row count; a matrix whose size
    /// is not a power of two is rejected later, when the gate is bound.
    pub fn fixed(name: impl Into<String>, matrix: Array2<Complex64>) -> Self {
        let qubits = matrix.nrows().max(1).trailing_zeros() as usize;
        Self::new(name, qubits, 0, move |_| matrix.clone())
    }

    /// Supply closed-form derivative matrices instead of finite differences
    pub fn with_derivatives<F>(mut self, derivative_fn: F) -> Self
    where
        F: Fn(&[f64]) -> Vec<Array2<Complex64>> + Send + Sync + 'static,
    {
        self.derivative_fn = Some(Arc::new(derivative_fn));
        self
    }
}

impl Debug for CustomMatrixGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMatrixGate")
            .field("name", &self.name)
            .field("qubits", &self.qubits)
            .field("parameter_count", &self.parameter_count)
            .field("closed_form_derivatives", &self.derivative_fn.is_some())
            .finish()
    }
}

impl QuantumGate for CustomMatrixGate {
    fn qubit_count(&self) -> usize {
        self.qubits
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn matrix(&self, params: &[f64]) -> Array2<Complex64> {
        (self.matrix_fn)(params)
    }

    fn derivatives(&self, params: &[f64]) -> Vec<Array2<Complex64>> {
        match &self.derivative_fn {
            Some(derivative_fn) => derivative_fn(params),
            None => finite_difference_derivatives(|p| (self.matrix_fn)(p), params),
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// How a gate specification is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    /// A built-in unitary (fixed or parameterized)
    Unitary,
    /// A unitary on the trailing qubits, active when the leading `controls`
    /// qubits are all 1
    Controlled { controls: usize },
    /// Projective measurement in the computational basis
    Measurement,
    /// A user-registered gate
    Custom,
}

/// One operation of a circuit bound to concrete qubits and parameters
#[derive(Debug, Clone)]
pub struct GateSpec {
    name: String,
    kind: GateKind,
    qubits: Vec<usize>,
    parameters: Vec<f64>,
    operator: Option<Arc<dyn QuantumGate>>,
    requires_grad: bool,
    record: Option<MeasurementRecord>,
}

impl GateSpec {
    /// Bind a unitary gate to `qubits`
    pub fn unitary(
        name: impl Into<String>,
        gate: Arc<dyn QuantumGate>,
        qubits: &[usize],
        parameters: &[f64],
        requires_grad: bool,
    ) -> Result<Self> {
        Self::build(name.into(), GateKind::Unitary, qubits, parameters, gate, requires_grad)
    }

    /// Bind a user-registered gate to `qubits`
    pub fn custom(
        name: impl Into<String>,
        gate: Arc<dyn QuantumGate>,
        qubits: &[usize],
        parameters: &[f64],
        requires_grad: bool,
    ) -> Result<Self> {
        Self::build(name.into(), GateKind::Custom, qubits, parameters, gate, requires_grad)
    }

    /// Bind a controlled gate: the first `controls` entries of `qubits` are
    /// controls, the rest are the targets of `gate`
    pub fn controlled(
        name: impl Into<String>,
        controls: usize,
        gate: Arc<dyn QuantumGate>,
        qubits: &[usize],
        parameters: &[f64],
        requires_grad: bool,
    ) -> Result<Self> {
        if controls == 0 || controls >= qubits.len() {
            return Err(SimError::DimensionMismatch {
                expected: controls + gate.qubit_count(),
                actual: qubits.len(),
            });
        }
        Self::build(
            name.into(),
            GateKind::Controlled { controls },
            qubits,
            parameters,
            gate,
            requires_grad,
        )
    }

    /// A computational-basis measurement of `qubits`
    pub fn measurement(qubits: &[usize]) -> Result<Self> {
        if qubits.is_empty() {
            return Err(SimError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        check_distinct(qubits)?;

        Ok(GateSpec {
            name: "measure".to_string(),
            kind: GateKind::Measurement,
            qubits: qubits.to_vec(),
            parameters: Vec::new(),
            operator: None,
            requires_grad: false,
            record: None,
        })
    }

    fn build(
        name: String,
        kind: GateKind,
        qubits: &[usize],
        parameters: &[f64],
        gate: Arc<dyn QuantumGate>,
        requires_grad: bool,
    ) -> Result<Self> {
        check_distinct(qubits)?;

        let controls = match kind {
            GateKind::Controlled { controls } => controls,
            _ => 0,
        };
        let targets = qubits.len().saturating_sub(controls);
        if targets == 0 || gate.qubit_count() != targets {
            return Err(SimError::DimensionMismatch {
                expected: gate.qubit_count() + controls,
                actual: qubits.len(),
            });
        }

        if parameters.len() != gate.parameter_count() {
            return Err(SimError::ParameterCount {
                gate: name,
                expected: gate.parameter_count(),
                actual: parameters.len(),
            });
        }

        let matrix = gate.matrix(parameters);
        let dim = 1usize << targets;
        if matrix.nrows() != dim || matrix.ncols() != dim {
            return Err(SimError::DimensionMismatch {
                expected: dim,
                actual: if matrix.nrows() != dim { matrix.nrows() } else { matrix.ncols() },
            });
        }

        // Parameterized matrices are trusted once their shape checks out.
        if gate.parameter_count() == 0 {
            let deviation = unitarity_deviation(&matrix);
            if deviation > UNITARITY_TOLERANCE {
                return Err(SimError::NonUnitaryMatrix { deviation });
            }
        }

        Ok(GateSpec {
            name,
            kind,
            qubits: qubits.to_vec(),
            parameters: parameters.to_vec(),
            requires_grad: requires_grad && gate.parameter_count() > 0,
            operator: Some(gate),
            record: None,
        })
    }

    /// Registry name of this gate
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// All qubits this gate touches, controls first
    pub fn qubits(&self) -> &[usize] {
        &self.qubits
    }

    /// Control qubits (empty unless the gate is controlled)
    pub fn controls(&self) -> &[usize] {
        &self.qubits[..self.control_count()]
    }

    /// Qubits the operator matrix acts on
    pub fn targets(&self) -> &[usize] {
        &self.qubits[self.control_count()..]
    }

    fn control_count(&self) -> usize {
        match self.kind {
            GateKind::Controlled { controls } => controls,
            _ => 0,
        }
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn is_measurement(&self) -> bool {
        self.kind == GateKind::Measurement
    }

    /// The matrix acting on [`GateSpec::targets`], or `None` for measurements
    pub fn operator_matrix(&self) -> Option<Array2<Complex64>> {
        self.operator.as_ref().map(|gate| gate.matrix(&self.parameters))
    }

    /// ∂(operator matrix)/∂θ_j for each parameter
    pub fn operator_derivatives(&self) -> Vec<Array2<Complex64>> {
        self.operator
            .as_ref()
            .map(|gate| gate.derivatives(&self.parameters))
            .unwrap_or_default()
    }

    /// The full matrix over [`GateSpec::qubits`], controls expanded
    pub fn matrix(&self) -> Option<Array2<Complex64>> {
        let block = self.operator_matrix()?;
        Some(match self.kind {
            GateKind::Controlled { controls } => controlled_matrix(controls, &block),
            _ => block,
        })
    }

    /// The most recent measurement record, if this is a measurement gate
    /// that has been executed
    pub fn record(&self) -> Option<&MeasurementRecord> {
        self.record.as_ref()
    }

    pub(crate) fn set_record(&mut self, record: MeasurementRecord) {
        self.record = Some(record);
    }

    pub(crate) fn clear_record(&mut self) {
        self.record = None;
    }

    pub(crate) fn set_parameters(&mut self, parameters: &[f64]) {
        self.parameters.copy_from_slice(parameters);
    }
}

fn check_distinct(qubits: &[usize]) -> Result<()> {
    for (i, &q) in qubits.iter().enumerate() {
        if qubits[..i].contains(&q) {
            return Err(SimError::DuplicateIndex { index: q });
        }
    }
    Ok(())
}
