//! Do-nothing baseline: zero delta, zero message, regardless of input.

use consensus_core::{ControllerFactory, Phenotype, SimulationConfig};
use serde::{Deserialize, Serialize};

/// Ignores every input and outputs zeros. Leaves the initial heading spread
/// untouched, which makes it the negative control for fitness tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InertController {
    input_len: usize,
    output_len: usize,
}

impl InertController {
    /// Identifier used in diagnostics.
    pub const KIND: &'static str = "baseline.inert";

    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let layout = config.io_layout();
        Self {
            input_len: layout.input_len,
            output_len: layout.output_len,
        }
    }

    /// Factory spawning an independent instance per agent.
    #[must_use]
    pub fn factory(config: &SimulationConfig) -> impl ControllerFactory {
        let template = Self::new(config);
        move || Box::new(template.clone()) as Box<dyn Phenotype>
    }
}

impl Phenotype for InertController {
    fn input_arity(&self) -> usize {
        self.input_len
    }

    fn output_arity(&self) -> usize {
        self.output_len
    }

    fn activate(&mut self, _inputs: &[f32]) -> Vec<f32> {
        vec![0.0; self.output_len]
    }
}
