use ndarray::Array1;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use qubit_sim::quantum::{Circuit, GateId, StateVector};
use qubit_sim::{SimError, SimulatorConfig};

/// Helper function for comparing f64 with tolerance
fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn assert_probabilities(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!(approx_eq(*a, *e, 1e-7), "probabilities {:?} != {:?}", actual, expected);
    }
}

fn bell_circuit(seed: u64) -> (Circuit, GateId) {
    let mut circuit = Circuit::with_config(2, false, SimulatorConfig::new().with_seed(seed));
    circuit.h(0).unwrap();
    circuit.cnot(0, 1).unwrap();
    let measure = circuit.measure(&[0, 1]).unwrap();
    (circuit, measure)
}

#[test]
fn test_bell_measurement_outcomes_are_correlated() {
    for seed in 0..20 {
        let (mut circuit, measure) = bell_circuit(seed);
        let state = circuit.apply_state(&StateVector::zero_state(2)).unwrap();
        let record = circuit.measurement_record(measure).unwrap();

        assert_probabilities(&record.probabilities, &[0.5, 0.0, 0.0, 0.5]);
        assert_eq!(record.qubits, vec![0, 1]);
        assert_eq!(record.bitstring[0], record.bitstring[1]);
        assert!(record.outcome == 0 || record.outcome == 3);

        let expected = StateVector::from_bits(&record.bitstring).unwrap();
        assert!(approx_eq(state.fidelity(&expected).unwrap(), 1.0, 1e-7));
    }
}

#[test]
fn test_bell_measurement_sees_both_outcomes() {
    let mut seen = [false; 2];
    for seed in 0..40 {
        let (mut circuit, measure) = bell_circuit(seed);
        circuit.apply_state(&StateVector::zero_state(2)).unwrap();
        seen[circuit.measurement_record(measure).unwrap().bitstring[0] as usize] = true;
    }
    assert_eq!(seen, [true, true]);
}

#[test]
fn test_ghz_measurement() {
    let mut circuit = Circuit::with_config(3, false, SimulatorConfig::new().with_seed(11));
    circuit.h(0).unwrap();
    circuit.cnot(0, 1).unwrap();
    circuit.cnot(1, 2).unwrap();
    let measure = circuit.measure(&[0, 1, 2]).unwrap();

    for _ in 0..10 {
        let state = circuit.apply_state(&StateVector::zero_state(3)).unwrap();
        let record = circuit.measurement_record(measure).unwrap();

        assert!(approx_eq(record.probabilities[0], 0.5, 1e-7));
        assert!(approx_eq(record.probabilities[7], 0.5, 1e-7));
        assert!(record.bitstring == vec![0, 0, 0] || record.bitstring == vec![1, 1, 1]);

        let expected = StateVector::from_bits(&record.bitstring).unwrap();
        assert!(approx_eq(state.fidelity(&expected).unwrap(), 1.0, 1e-7));
    }
}

#[test]
fn test_partial_measurement_collapses_partner() {
    let mut circuit = Circuit::with_config(3, false, SimulatorConfig::new().with_seed(5));
    circuit.h(0).unwrap();
    circuit.cnot(0, 2).unwrap();
    let measure = circuit.measure(&[2]).unwrap();

    let state = circuit.apply_state(&StateVector::zero_state(3)).unwrap();
    let record = circuit.measurement_record(measure).unwrap();
    assert_probabilities(&record.probabilities, &[0.5, 0.5]);

    let bit = record.bitstring[0];
    let expected = StateVector::from_bits(&[bit, 0, bit]).unwrap();
    assert!(approx_eq(state.fidelity(&expected).unwrap(), 1.0, 1e-7));
}

#[test]
fn test_fixed_seed_reproduces_outcomes() {
    let build = || {
        let mut circuit = Circuit::with_config(4, false, SimulatorConfig::new().with_seed(1234));
        for q in 0..4 {
            circuit.h(q).unwrap();
        }
        let measure = circuit.measure(&[0, 1, 2, 3]).unwrap();
        (circuit, measure)
    };

    let (mut a, ma) = build();
    let (mut b, mb) = build();
    for _ in 0..10 {
        let sa = a.apply_state(&StateVector::zero_state(4)).unwrap();
        let sb = b.apply_state(&StateVector::zero_state(4)).unwrap();
        assert_eq!(sa, sb);
        assert_eq!(a.measurement_record(ma), b.measurement_record(mb));
    }
}

#[test]
fn test_set_seed_restarts_the_sequence() {
    let mut circuit = Circuit::new(3, false);
    for q in 0..3 {
        circuit.h(q).unwrap();
    }
    let measure = circuit.measure(&[0, 1, 2]).unwrap();

    circuit.set_seed(99);
    let first: Vec<usize> = (0..8)
        .map(|_| {
            circuit.apply_state(&StateVector::zero_state(3)).unwrap();
            circuit.measurement_record(measure).unwrap().outcome
        })
        .collect();

    circuit.set_seed(99);
    let second: Vec<usize> = (0..8)
        .map(|_| {
            circuit.apply_state(&StateVector::zero_state(3)).unwrap();
            circuit.measurement_record(measure).unwrap().outcome
        })
        .collect();

    assert_eq!(first, second);
}

#[test]
fn test_injected_rng_drives_sampling() {
    let (mut circuit, measure) = bell_circuit(0);

    let mut rng_a = StdRng::seed_from_u64(42);
    let mut rng_b = StdRng::seed_from_u64(42);
    let a = circuit.apply_state_with_rng(&StateVector::zero_state(2), &mut rng_a).unwrap();
    let record_a = circuit.measurement_record(measure).cloned();
    let b = circuit.apply_state_with_rng(&StateVector::zero_state(2), &mut rng_b).unwrap();
    let record_b = circuit.measurement_record(measure).cloned();

    assert_eq!(a, b);
    assert_eq!(record_a, record_b);
}

#[test]
fn test_execute_leaves_records_untouched() {
    let (circuit, measure) = bell_circuit(3);
    let mut rng = StdRng::seed_from_u64(8);
    let execution = circuit.execute(&StateVector::zero_state(2), &mut rng).unwrap();

    assert_eq!(execution.records.len(), 1);
    assert_eq!(execution.records[0].0, measure);
    assert!(circuit.measurement_record(measure).is_none());
}

#[test]
fn test_measurement_frequencies_follow_probabilities() {
    let mut circuit = Circuit::with_config(1, false, SimulatorConfig::new().with_seed(2024));
    circuit.ry(0, std::f64::consts::PI / 3.0).unwrap();
    let measure = circuit.measure(&[0]).unwrap();

    let shots = 2000;
    let mut ones = 0;
    for _ in 0..shots {
        circuit.apply_state(&StateVector::zero_state(1)).unwrap();
        ones += circuit.measurement_record(measure).unwrap().outcome;
    }

    // sin²(π/6) = 0.25
    let frequency = ones as f64 / shots as f64;
    assert!(approx_eq(frequency, 0.25, 0.05), "frequency {}", frequency);
}

#[test]
fn test_apply_vector_validates_input() {
    let mut circuit = Circuit::new(1, false);
    circuit.x(0).unwrap();

    let unnormalized = Array1::from(vec![Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)]);
    assert!(matches!(
        circuit.apply_vector(&unnormalized),
        Err(SimError::NotNormalized { .. })
    ));

    let wrong_length = Array1::from(vec![Complex64::new(1.0, 0.0); 4]);
    assert!(matches!(
        circuit.apply_vector(&wrong_length),
        Err(SimError::DimensionMismatch { .. })
    ));

    let zero = Array1::from(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]);
    let out = circuit.apply_vector(&zero).unwrap();
    assert!(approx_eq(out[1].norm(), 1.0, 1e-12));
}

#[test]
fn test_measurement_of_impossible_outcome_cannot_be_sampled() {
    // Marginal probabilities of |1⟩ on qubit 0 are exactly [0, 1]
    let mut circuit = Circuit::with_config(1, false, SimulatorConfig::new().with_seed(0));
    circuit.x(0).unwrap();
    let measure = circuit.measure(&[0]).unwrap();

    for _ in 0..20 {
        circuit.apply_state(&StateVector::zero_state(1)).unwrap();
        assert_eq!(circuit.measurement_record(measure).unwrap().bitstring, vec![1]);
    }
}

#[test]
fn test_degenerate_outcome_is_reported() {
    let config = SimulatorConfig::new().with_seed(0).with_degeneracy_threshold(0.9);
    let mut circuit = Circuit::with_config(1, false, config);
    circuit.h(0).unwrap();
    circuit.measure(&[0]).unwrap();

    assert!(matches!(
        circuit.apply_state(&StateVector::zero_state(1)),
        Err(SimError::NumericalDegeneracy { .. })
    ));
}

#[test]
fn test_failed_run_clears_previous_records() {
    let config = SimulatorConfig::new().with_seed(0).with_degeneracy_threshold(0.9);
    let mut circuit = Circuit::with_config(2, false, config);
    let first = circuit.measure(&[0]).unwrap();
    circuit.append_with_grad("ry", &[1], &[0.0], true).unwrap();
    let second = circuit.measure(&[1]).unwrap();

    // Every sampled outcome is certain
    circuit.apply_state(&StateVector::zero_state(2)).unwrap();
    assert_eq!(circuit.measurement_record(first).unwrap().outcome, 0);
    assert_eq!(circuit.measurement_record(second).unwrap().outcome, 0);

    // The first measurement succeeds again, the second is now a coin flip
    circuit.set_parameters(&[std::f64::consts::FRAC_PI_2]).unwrap();
    assert!(matches!(
        circuit.apply_state(&StateVector::zero_state(2)),
        Err(SimError::NumericalDegeneracy { .. })
    ));
    assert!(circuit.measurement_record(first).is_none());
    assert!(circuit.measurement_record(second).is_none());

    // Rejected input also leaves nothing behind
    circuit.set_parameters(&[0.0]).unwrap();
    circuit.apply_state(&StateVector::zero_state(2)).unwrap();
    assert!(circuit.measurement_record(first).is_some());
    let unnormalized = Array1::from(vec![Complex64::new(1.0, 0.0); 4]);
    assert!(circuit.apply_vector(&unnormalized).is_err());
    assert!(circuit.measurement_record(first).is_none());
}
