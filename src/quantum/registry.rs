// src/quantum/registry.rs
//! Named gate-construction rules
//!
//! A [`GateRegistry`] maps gate names to [`GateRule`]s. Circuits resolve every
//! named append through their registry, so a registered custom gate behaves
//! exactly like a built-in one.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, SimError};
use super::gate::{GateSpec, ParametrizedGate, QuantumGate, StandardGate};

/// How a named gate turns qubits and parameters into a [`GateSpec`]
#[derive(Clone, Debug)]
pub enum GateRule {
    /// A parameter-free standard gate
    Fixed(StandardGate),
    /// A rotation-style gate with real parameters
    Parameterized(ParametrizedGate),
    /// `base` acting on the trailing qubits, controlled by the leading ones
    Controlled {
        controls: usize,
        base: Arc<dyn QuantumGate>,
    },
    /// Computational-basis measurement of any number of qubits
    Measurement,
    /// A user-supplied gate
    Custom(Arc<dyn QuantumGate>),
}

impl GateRule {
    /// Rule for a user-supplied gate
    pub fn custom<G: QuantumGate + 'static>(gate: G) -> Self {
        GateRule::Custom(Arc::new(gate))
    }

    /// Rule for `gate` controlled by `controls` leading qubits
    pub fn controlled<G: QuantumGate + 'static>(controls: usize, gate: G) -> Self {
        GateRule::Controlled {
            controls,
            base: Arc::new(gate),
        }
    }

    /// Instantiate the rule on concrete qubits and parameters
    pub fn build(
        &self,
        name: &str,
        qubits: &[usize],
        params: &[f64],
        requires_grad: bool,
    ) -> Result<GateSpec> {
        match self {
            GateRule::Fixed(gate) => {
                GateSpec::unitary(name, Arc::new(gate.clone()), qubits, params, false)
            }
            GateRule::Parameterized(gate) => {
                GateSpec::unitary(name, Arc::new(*gate), qubits, params, requires_grad)
            }
            GateRule::Controlled { controls, base } => {
                GateSpec::controlled(name, *controls, Arc::clone(base), qubits, params, requires_grad)
            }
            GateRule::Measurement => {
                if !params.is_empty() {
                    return Err(SimError::ParameterCount {
                        gate: name.to_string(),
                        expected: 0,
                        actual: params.len(),
                    });
                }
                GateSpec::measurement(qubits)
            }
            GateRule::Custom(gate) => {
                GateSpec::custom(name, Arc::clone(gate), qubits, params, requires_grad)
            }
        }
    }
}

/// Mapping from gate name to construction rule
#[derive(Clone, Debug, Default)]
pub struct GateRegistry {
    rules: HashMap<String, GateRule>,
}

impl GateRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard gate set
    pub fn with_standard_gates() -> Self {
        let fixed = [
            ("i", StandardGate::I(1)),
            ("x", StandardGate::X),
            ("y", StandardGate::Y),
            ("z", StandardGate::Z),
            ("h", StandardGate::H),
            ("s", StandardGate::S),
            ("t", StandardGate::T),
            ("swap", StandardGate::SWAP),
        ];
        let parameterized = [
            ("rx", ParametrizedGate::Rx),
            ("ry", ParametrizedGate::Ry),
            ("rz", ParametrizedGate::Rz),
            ("phase", ParametrizedGate::Phase),
            ("u3", ParametrizedGate::U3),
        ];

        let mut rules = HashMap::new();
        for (name, gate) in fixed {
            rules.insert(name.to_string(), GateRule::Fixed(gate));
        }
        for (name, gate) in parameterized {
            rules.insert(name.to_string(), GateRule::Parameterized(gate));
        }

        rules.insert("cnot".to_string(), GateRule::controlled(1, StandardGate::X));
        rules.insert("cy".to_string(), GateRule::controlled(1, StandardGate::Y));
        rules.insert("cz".to_string(), GateRule::controlled(1, StandardGate::Z));
        rules.insert("toffoli".to_string(), GateRule::controlled(2, StandardGate::X));
        rules.insert("crx".to_string(), GateRule::controlled(1, ParametrizedGate::Rx));
        rules.insert("cry".to_string(), GateRule::controlled(1, ParametrizedGate::Ry));
        rules.insert("crz".to_string(), GateRule::controlled(1, ParametrizedGate::Rz));
        rules.insert("measure".to_string(), GateRule::Measurement);

        GateRegistry { rules }
    }

    fn global_cell() -> &'static RwLock<Arc<GateRegistry>> {
        static GLOBAL: OnceLock<RwLock<Arc<GateRegistry>>> = OnceLock::new();
        GLOBAL.get_or_init(|| RwLock::new(Arc::new(GateRegistry::with_standard_gates())))
    }

    /// A snapshot of the process-wide registry, used by every circuit that
    /// does not bring its own
    ///
    /// Circuits keep the snapshot they were created with; later calls to
    /// [`GateRegistry::register_global`] are seen by circuits created after
    /// them.
    pub fn global() -> Arc<GateRegistry> {
        let guard = Self::global_cell().read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Register `rule` under `name` in the process-wide registry; fails if
    /// the name is taken
    pub fn register_global(name: impl Into<String>, rule: GateRule) -> Result<()> {
        let mut guard = Self::global_cell().write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut *guard).register(name, rule)
    }

    /// Register `rule` under `name`; fails if the name is taken
    pub fn register(&mut self, name: impl Into<String>, rule: GateRule) -> Result<()> {
        let name = name.into();
        if self.rules.contains_key(&name) {
            return Err(SimError::NameCollision(name));
        }
        debug!(gate = %name, "registered gate rule");
        self.rules.insert(name, rule);
        Ok(())
    }

    /// Look up the rule registered under `name`
    pub fn get(&self, name: &str) -> Result<&GateRule> {
        self.rules
            .get(name)
            .ok_or_else(|| SimError::UnregisteredGateName(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered names in alphabetical order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve `name` and build a gate from it
    pub fn build(
        &self,
        name: &str,
        qubits: &[usize],
        params: &[f64],
        requires_grad: bool,
    ) -> Result<GateSpec> {
        self.get(name)?.build(name, qubits, params, requires_grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::gate::{CustomMatrixGate, GateKind};
    use ndarray::Array2;

    #[test]
    fn test_standard_registry_contents() {
        let registry = GateRegistry::with_standard_gates();
        for name in ["h", "cnot", "toffoli", "rx", "u3", "crz", "measure"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.names().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_registration_is_a_collision() {
        let mut registry = GateRegistry::new();
        let gate = CustomMatrixGate::fixed("id", Array2::eye(2));
        registry.register("id", GateRule::custom(gate.clone())).unwrap();
        assert_eq!(
            registry.register("id", GateRule::custom(gate)).unwrap_err(),
            SimError::NameCollision("id".to_string())
        );
    }

    #[test]
    fn test_unknown_name() {
        let registry = GateRegistry::with_standard_gates();
        assert_eq!(
            registry.build("warp", &[0], &[], false).unwrap_err(),
            SimError::UnregisteredGateName("warp".to_string())
        );
    }

    #[test]
    fn test_controlled_rule_builds_controlled_kind() {
        let registry = GateRegistry::with_standard_gates();
        let spec = registry.build("crz", &[1, 0], &[0.5], true).unwrap();
        assert_eq!(spec.kind(), GateKind::Controlled { controls: 1 });
        assert!(spec.requires_grad());
        assert_eq!(spec.controls(), &[1]);
    }

    #[test]
    fn test_fixed_rule_rejects_parameters() {
        let registry = GateRegistry::with_standard_gates();
        assert!(matches!(
            registry.build("h", &[0], &[1.0], false),
            Err(SimError::ParameterCount { expected: 0, actual: 1, .. })
        ));
        assert!(matches!(
            registry.build("measure", &[0], &[1.0], false),
            Err(SimError::ParameterCount { .. })
        ));
    }

    #[test]
    fn test_global_registry_starts_with_standard_gates() {
        let global = GateRegistry::global();
        for name in ["h", "cnot", "toffoli", "u3", "measure"] {
            assert!(global.contains(name), "{} missing", name);
        }
    }

    #[test]
    fn test_global_registration_extends_later_snapshots() {
        let before = GateRegistry::global();
        GateRegistry::register_global("registry_test_sx", GateRule::Fixed(StandardGate::T)).unwrap();

        assert!(!before.contains("registry_test_sx"));
        assert!(GateRegistry::global().contains("registry_test_sx"));
        assert!(matches!(
            GateRegistry::register_global("registry_test_sx", GateRule::Fixed(StandardGate::X)),
            Err(SimError::NameCollision(_))
        ));
        assert!(matches!(
            GateRegistry::register_global("h", GateRule::Fixed(StandardGate::X)),
            Err(SimError::NameCollision(_))
        ));
    }
}
