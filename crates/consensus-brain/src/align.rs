//! Averaging baseline: broadcast own heading, steer toward the received mean.

use consensus_core::{
    ControllerFactory, HeadingEncoding, Phenotype, SimulationConfig, signed_delta, wrap_heading,
};
use serde::{Deserialize, Serialize};

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Steers toward the mean received heading and broadcasts its own normalized
/// heading (`θ / 2π`) in every message slot.
///
/// Built for `Mean` aggregation: the first slot of the aggregated message
/// block is read back as the normalized target heading. With other
/// aggregations the controller still runs, interpreting that slot the same
/// way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanHeadingController {
    encoding: HeadingEncoding,
    message_size: usize,
    input_len: usize,
    output_len: usize,
    gain: f32,
}

impl MeanHeadingController {
    /// Identifier used in diagnostics.
    pub const KIND: &'static str = "baseline.mean-heading";

    /// Build a controller matching the experiment's input/output layout.
    /// `gain` scales the correction toward the target each step; `1.0` snaps
    /// straight onto it (subject to the adapter's turn clamp).
    #[must_use]
    pub fn new(config: &SimulationConfig, gain: f32) -> Self {
        let layout = config.io_layout();
        Self {
            encoding: config.heading_encoding,
            message_size: config.message_size,
            input_len: layout.input_len,
            output_len: layout.output_len,
            gain,
        }
    }

    /// Factory spawning an independent instance per agent.
    #[must_use]
    pub fn factory(config: &SimulationConfig, gain: f32) -> impl ControllerFactory {
        let template = Self::new(config, gain);
        move || Box::new(template.clone()) as Box<dyn Phenotype>
    }

    fn own_heading(&self, inputs: &[f32]) -> f32 {
        match self.encoding {
            HeadingEncoding::Raw => wrap_heading(inputs[0] * FULL_TURN),
            HeadingEncoding::SinCos => wrap_heading(inputs[0].atan2(inputs[1])),
        }
    }
}

impl Phenotype for MeanHeadingController {
    fn input_arity(&self) -> usize {
        self.input_len
    }

    fn output_arity(&self) -> usize {
        self.output_len
    }

    fn activate(&mut self, inputs: &[f32]) -> Vec<f32> {
        let own = self.own_heading(inputs);
        let target = wrap_heading(inputs[self.encoding.width()] * FULL_TURN);
        let delta = self.gain * signed_delta(own, target);

        let mut outputs = Vec::with_capacity(self.output_len);
        outputs.push(delta);
        outputs.resize(self.output_len, own / FULL_TURN);
        outputs
    }
}
