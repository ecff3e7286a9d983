//! Property-based tests for qubit-sim using proptest
//!
//! Random circuits over a small register must preserve the norm, agree with
//! their extracted unitary, and keep measurement records consistent.

use ndarray::Array1;
use num_complex::Complex64;
use proptest::prelude::*;
use std::f64::consts::PI;

use qubit_sim::quantum::gate::unitarity_deviation;
use qubit_sim::quantum::{Circuit, StateVector};
use qubit_sim::SimulatorConfig;

const QUBITS: usize = 3;

/// (gate selector, first qubit, qubit offset, angle)
type Op = (usize, usize, usize, f64);

fn op_strategy() -> impl Strategy<Value = Op> {
    (0usize..10, 0..QUBITS, 1..QUBITS, -PI..PI)
}

fn state_strategy() -> impl Strategy<Value = StateVector> {
    prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0), 1 << QUBITS)
        .prop_filter("non-zero vector", |v| v.iter().any(|(re, im)| re.abs() + im.abs() > 1e-3))
        .prop_map(|v| {
            let raw: Array1<Complex64> = v.into_iter().map(|(re, im)| Complex64::new(re, im)).collect();
            let norm = raw.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
            StateVector::new(QUBITS, raw.mapv(|a| a / norm)).unwrap()
        })
}

fn build_circuit(ops: &[Op]) -> Circuit {
    let mut circuit = Circuit::new(QUBITS, true);
    for &(kind, a, offset, angle) in ops {
        let b = (a + offset) % QUBITS;
        let c = (b + 1) % QUBITS;
        let c = if c == a { (c + 1) % QUBITS } else { c };
        let appended = match kind {
            0 => circuit.h(a),
            1 => circuit.rx(a, angle),
            2 => circuit.ry(a, angle),
            3 => circuit.rz(a, angle),
            4 => circuit.u3(a, angle, angle / 2.0, -angle),
            5 => circuit.cnot(a, b),
            6 => circuit.cz(a, b),
            7 => circuit.swap(a, b),
            8 => circuit.crx(a, b, angle),
            _ => circuit.toffoli(a, b, c),
        };
        appended.unwrap();
    }
    circuit
}

fn max_diff(a: &Array1<Complex64>, b: &Array1<Complex64>) -> f64 {
    (a - b).iter().map(|x| x.norm()).fold(0.0, f64::max)
}

proptest! {
    /// Property: unitary circuits preserve the norm of any unit vector
    #[test]
    fn norm_is_preserved(
        ops in prop::collection::vec(op_strategy(), 1..24),
        input in state_strategy()
    ) {
        let mut circuit = build_circuit(&ops);
        let output = circuit.apply_state(&input).unwrap();
        prop_assert!((output.norm() - 1.0).abs() < 1e-7);
    }

    /// Property: the extracted unitary is unitary and reproduces execution
    #[test]
    fn unitary_agrees_with_execution(
        ops in prop::collection::vec(op_strategy(), 1..16),
        input in state_strategy()
    ) {
        let mut circuit = build_circuit(&ops);
        let unitary = circuit.to_unitary().unwrap();
        prop_assert!(unitarity_deviation(&unitary) < 1e-7);

        let expected = unitary.dot(input.amplitudes());
        let actual = circuit.apply_state(&input).unwrap();
        prop_assert!(max_diff(actual.amplitudes(), &expected) < 1e-7);
    }

    /// Property: a record's probabilities sum to one and its outcome is possible
    #[test]
    fn measurement_record_is_consistent(
        ops in prop::collection::vec(op_strategy(), 0..12),
        input in state_strategy(),
        seed in any::<u64>(),
        measured in prop::sample::subsequence(vec![0usize, 1, 2], 1..=QUBITS)
    ) {
        let mut circuit = Circuit::with_config(QUBITS, false, SimulatorConfig::new().with_seed(seed));
        circuit.extend(&build_circuit(&ops)).unwrap();
        let measure = circuit.measure(&measured).unwrap();

        let state = circuit.apply_state(&input).unwrap();
        let record = circuit.measurement_record(measure).unwrap();

        let total: f64 = record.probabilities.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-7);
        prop_assert!(record.probability() > 0.0);
        prop_assert_eq!(record.bitstring.len(), measured.len());
        prop_assert!((state.norm() - 1.0).abs() < 1e-7);

        // Post-measurement state is an eigenstate of the measurement
        let after = qubit_sim::simulators::MeasurementEngine::default()
            .probabilities(&state, &measured)
            .unwrap();
        prop_assert!((after[record.outcome] - 1.0).abs() < 1e-7);
    }

    /// Property: bit strings round-trip through basis indices
    #[test]
    fn basis_bits_round_trip(bits in prop::collection::vec(0u8..2, 1..8)) {
        let state = StateVector::from_bits(&bits).unwrap();
        let index = bits.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize);
        prop_assert!((state.probability(index) - 1.0).abs() < 1e-15);
    }
}
