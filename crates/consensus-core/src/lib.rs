//! Core types for the orientation consensus harness: heading arithmetic, the
//! bandwidth-limited communication channel, the controller adapter binding
//! external phenotypes to agents, and the synchronous simulation engine.
//!
//! One episode advances a fixed population of agents in lockstep. Every step
//! reads only the previous step's state: the channel delivers last-step
//! messages, every controller is evaluated against that snapshot (the stage is
//! order-independent and runs on rayon), and all heading deltas and next
//! messages are applied at once.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Fixed-size vector of real numbers broadcast by an agent each step.
pub type Message = Vec<f32>;

/// Normalize a heading into `[0, 2π)`. NaN collapses to `0.0`.
#[must_use]
pub fn wrap_heading(angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    let mut wrapped = angle % FULL_TURN;
    if wrapped < 0.0 {
        wrapped += FULL_TURN;
    }
    if wrapped >= FULL_TURN {
        wrapped -= FULL_TURN;
    }
    wrapped
}

/// Shortest signed rotation carrying `from` onto `to`, in `(-π, π]`.
#[must_use]
pub fn signed_delta(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % FULL_TURN;
    if delta <= -HALF_TURN {
        delta += FULL_TURN;
    }
    if delta > HALF_TURN {
        delta -= FULL_TURN;
    }
    delta
}

/// Angular distance between two headings, wraparound aware, in `[0, π]`.
#[must_use]
pub fn circular_distance(a: f32, b: f32) -> f32 {
    signed_delta(a, b).abs()
}

/// Direction of the resultant vector of all headings, wrapped into `[0, 2π)`.
///
/// Returns `0.0` for an empty slice or a perfectly balanced population whose
/// resultant vanishes.
#[must_use]
pub fn circular_mean(headings: &[f32]) -> f32 {
    let (sin_sum, cos_sum) = headings
        .iter()
        .fold((0.0_f32, 0.0_f32), |(s, c), &h| (s + h.sin(), c + h.cos()));
    if sin_sum.abs() < f32::EPSILON && cos_sum.abs() < f32::EPSILON {
        return 0.0;
    }
    wrap_heading(sin_sum.atan2(cos_sum))
}

/// Circular variance `1 - R̄` of the headings, clamped into `[0, 1]`.
///
/// `0.0` means perfect agreement; `1.0` means the resultant vector vanished
/// (headings balanced around the circle).
#[must_use]
pub fn circular_variance(headings: &[f32]) -> f32 {
    if headings.is_empty() {
        return 0.0;
    }
    let (sin_sum, cos_sum) = headings
        .iter()
        .fold((0.0_f32, 0.0_f32), |(s, c), &h| (s + h.sin(), c + h.cos()));
    let resultant = (sin_sum * sin_sum + cos_sum * cos_sum).sqrt() / headings.len() as f32;
    (1.0 - resultant).clamp(0.0, 1.0)
}

/// Mean pairwise angular distance across all unordered agent pairs, in
/// `[0, π]`. Returns `0.0` for fewer than two headings.
#[must_use]
pub fn mean_pairwise_distance(headings: &[f32]) -> f32 {
    let n = headings.len();
    if n < 2 {
        return 0.0;
    }
    let mut total = 0.0_f32;
    let mut pairs = 0_usize;
    for i in 0..n {
        for j in (i + 1)..n {
            total += circular_distance(headings[i], headings[j]);
            pairs += 1;
        }
    }
    total / pairs as f32
}

/// Errors raised while validating configuration or binding controllers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Fatal configuration violation detected before any trial runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A phenotype's declared arity does not match the experiment layout.
    #[error(
        "phenotype arity {actual_inputs}->{actual_outputs} does not match experiment layout {expected_inputs}->{expected_outputs}"
    )]
    PhenotypeShape {
        expected_inputs: usize,
        expected_outputs: usize,
        actual_inputs: usize,
        actual_outputs: usize,
    },
    /// A controller returned the wrong number of outputs at runtime.
    #[error("controller returned {actual} outputs, layout requires {expected}")]
    OutputArity { expected: usize, actual: usize },
}

/// Executable decision function bound to one agent role.
///
/// Implemented by phenotypes compiled from genomes by an external
/// evolutionary-computation library, and by the hand-written baselines in
/// `consensus-brain`. A recurrent phenotype owns its hidden state across the
/// steps of one trial; the engine calls [`Phenotype::reset`] at trial start.
pub trait Phenotype: Send {
    /// Input vector length this phenotype was built for.
    fn input_arity(&self) -> usize;

    /// Output vector length this phenotype was built for.
    fn output_arity(&self) -> usize;

    /// Evaluate the decision function. The returned vector must have exactly
    /// [`Phenotype::output_arity`] elements.
    fn activate(&mut self, inputs: &[f32]) -> Vec<f32>;

    /// Clear any recurrent hidden state. Stateless phenotypes keep the
    /// default no-op.
    fn reset(&mut self) {}
}

/// Spawns fresh phenotype instances, one per agent per trial.
///
/// Homogeneous runs hand the harness a single factory used for every agent;
/// each agent still receives its own instance so recurrent hidden state is
/// never shared between agents.
pub trait ControllerFactory: Send + Sync {
    fn spawn(&self) -> Box<dyn Phenotype>;
}

impl<F> ControllerFactory for F
where
    F: Fn() -> Box<dyn Phenotype> + Send + Sync,
{
    fn spawn(&self) -> Box<dyn Phenotype> {
        self()
    }
}

/// Neighbor-visibility relation over agent indices, fixed for one trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Topology {
    /// Every agent sees every other agent.
    FullBroadcast,
    /// Each agent sees its two ring neighbors.
    Ring,
    /// Each agent sees all agents within ring index distance `radius`.
    BoundedRange { radius: usize },
}

impl Topology {
    /// Build per-agent neighbor lists for a population of `agent_count`.
    ///
    /// Lists are ascending by index and never contain the agent itself.
    pub fn neighbor_lists(&self, agent_count: usize) -> Result<NeighborLists, WorldError> {
        let radius = match self {
            Self::FullBroadcast => {
                let lists = (0..agent_count)
                    .map(|i| (0..agent_count).filter(|&j| j != i).collect())
                    .collect();
                return Ok(NeighborLists { lists });
            }
            Self::Ring => 1,
            Self::BoundedRange { radius } => {
                if *radius == 0 {
                    return Err(WorldError::InvalidConfig(
                        "bounded-range radius must be at least one",
                    ));
                }
                if radius * 2 >= agent_count {
                    return Err(WorldError::InvalidConfig(
                        "bounded-range radius must be smaller than half the ring; use full-broadcast instead",
                    ));
                }
                *radius
            }
        };
        let lists = (0..agent_count)
            .map(|i| {
                let mut neighbors: Vec<usize> = (1..=radius)
                    .flat_map(|d| {
                        [
                            (i + d) % agent_count,
                            (i + agent_count - d) % agent_count,
                        ]
                    })
                    .filter(|&j| j != i)
                    .collect();
                neighbors.sort_unstable();
                neighbors.dedup();
                neighbors
            })
            .collect();
        Ok(NeighborLists { lists })
    }
}

/// Precomputed neighbor lists, invariant for the duration of a trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NeighborLists {
    lists: Vec<Vec<usize>>,
}

impl NeighborLists {
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub fn lists(&self) -> &[Vec<usize>] {
        &self.lists
    }

    #[must_use]
    pub fn neighbors_of(&self, agent: usize) -> &[usize] {
        &self.lists[agent]
    }
}

/// How many of an agent's visible neighbors deliver a message each step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Every visible neighbor's previous message is delivered.
    #[default]
    EveryNeighbor,
    /// Exactly one uniformly chosen visible neighbor delivers its message.
    SingleRandomNeighbor,
}

/// Bounded additive noise applied to message components before delivery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NoiseConfig {
    /// Each component is perturbed by a uniform draw in `[-amplitude, amplitude]`.
    pub amplitude: f32,
}

/// Channel behavior shared by every agent in a trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ChannelConfig {
    pub delivery: Delivery,
    pub noise: Option<NoiseConfig>,
}

/// Delivers previous-step messages according to topology, delivery policy,
/// and noise. The channel never alters message size, only visibility and
/// component values.
#[derive(Debug, Clone)]
pub struct CommChannel {
    config: ChannelConfig,
    neighbors: NeighborLists,
}

impl CommChannel {
    #[must_use]
    pub fn new(config: ChannelConfig, neighbors: NeighborLists) -> Self {
        Self { config, neighbors }
    }

    #[must_use]
    pub fn neighbors(&self) -> &NeighborLists {
        &self.neighbors
    }

    /// Compute each agent's received message set from the *previous* step's
    /// emitted messages.
    ///
    /// All randomness (neighbor selection, noise) is drawn sequentially from
    /// `rng` in agent index order, so results do not depend on how the later
    /// controller stage is scheduled.
    pub fn gather(&self, previous: &[Message], rng: &mut SmallRng) -> Vec<Vec<Message>> {
        let mut inbox = Vec::with_capacity(previous.len());
        for list in &self.neighbors.lists {
            let mut received: Vec<Message> = match self.config.delivery {
                Delivery::EveryNeighbor => list.iter().map(|&j| previous[j].clone()).collect(),
                Delivery::SingleRandomNeighbor => {
                    if list.is_empty() {
                        Vec::new()
                    } else {
                        let pick = list[rng.random_range(0..list.len())];
                        vec![previous[pick].clone()]
                    }
                }
            };
            if let Some(noise) = &self.config.noise {
                for message in &mut received {
                    for value in message.iter_mut() {
                        *value += rng.random_range(-noise.amplitude..=noise.amplitude);
                    }
                }
            }
            inbox.push(received);
        }
        inbox
    }
}

/// How an agent's own heading appears in the controller input vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HeadingEncoding {
    /// One component, `θ / 2π` in `[0, 1)`.
    Raw,
    /// Two components, `[sin θ, cos θ]`; continuous across the 0/2π seam.
    #[default]
    SinCos,
}

impl HeadingEncoding {
    #[must_use]
    pub const fn width(&self) -> usize {
        match self {
            Self::Raw => 1,
            Self::SinCos => 2,
        }
    }

    fn encode(&self, heading: f32, out: &mut Vec<f32>) {
        match self {
            Self::Raw => out.push(heading / FULL_TURN),
            Self::SinCos => {
                out.push(heading.sin());
                out.push(heading.cos());
            }
        }
    }
}

/// How the received message set is folded into the controller input vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MessageAggregation {
    /// Component-wise mean over received messages; zeros when none arrived.
    #[default]
    Mean,
    /// Component-wise sum over received messages.
    Sum,
    /// First `max_neighbors` messages concatenated, zero-padded to a fixed
    /// width. Excess messages beyond `max_neighbors` are dropped.
    Concat { max_neighbors: usize },
}

impl MessageAggregation {
    #[must_use]
    pub const fn width(&self, message_size: usize) -> usize {
        match self {
            Self::Mean | Self::Sum => message_size,
            Self::Concat { max_neighbors } => message_size * *max_neighbors,
        }
    }

    fn aggregate(&self, received: &[Message], message_size: usize, out: &mut Vec<f32>) {
        match self {
            Self::Mean | Self::Sum => {
                let base = out.len();
                out.resize(base + message_size, 0.0);
                for message in received {
                    for (slot, value) in out[base..].iter_mut().zip(message) {
                        *slot += value;
                    }
                }
                if matches!(self, Self::Mean) && !received.is_empty() {
                    let count = received.len() as f32;
                    for slot in &mut out[base..] {
                        *slot /= count;
                    }
                }
            }
            Self::Concat { max_neighbors } => {
                let base = out.len();
                out.resize(base + message_size * max_neighbors, 0.0);
                for (chunk, message) in received.iter().take(*max_neighbors).enumerate() {
                    let start = base + chunk * message_size;
                    out[start..start + message_size].copy_from_slice(message);
                }
            }
        }
    }
}

/// Input/output vector lengths negotiated once per experiment.
///
/// Input layout, in order: heading encoding (`Raw` = 1 value, `SinCos` = 2),
/// then the aggregated message block. Output layout: `[0]` heading delta,
/// `[1..]` next message. The same layout is used at evaluation time and at
/// replay time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IoLayout {
    pub input_len: usize,
    pub output_len: usize,
}

/// Static configuration for one simulated world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Number of agents in the population.
    pub agent_count: usize,
    /// Components per emitted message; fixed for the life of an experiment.
    pub message_size: usize,
    /// Neighbor-visibility relation.
    pub topology: Topology,
    /// Delivery policy and noise.
    pub channel: ChannelConfig,
    /// How the agent's own heading enters the input vector.
    pub heading_encoding: HeadingEncoding,
    /// How received messages enter the input vector.
    pub aggregation: MessageAggregation,
    /// Per-step heading delta bound, in `(0, π]`.
    pub max_turn: f32,
    /// Snap emitted message components to this many evenly spaced levels in
    /// `[0, 1]`. `None` broadcasts components verbatim.
    pub quantization_levels: Option<u8>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent_count: 10,
            message_size: 2,
            topology: Topology::FullBroadcast,
            channel: ChannelConfig::default(),
            heading_encoding: HeadingEncoding::SinCos,
            aggregation: MessageAggregation::Mean,
            max_turn: std::f32::consts::FRAC_PI_6,
            quantization_levels: None,
        }
    }
}

impl SimulationConfig {
    /// Validate the configuration, failing fast before any trial runs.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.agent_count < 2 {
            return Err(WorldError::InvalidConfig(
                "consensus needs at least two agents",
            ));
        }
        if self.message_size == 0 {
            return Err(WorldError::InvalidConfig("message_size must be non-zero"));
        }
        if !(self.max_turn > 0.0 && self.max_turn <= HALF_TURN) {
            return Err(WorldError::InvalidConfig("max_turn must lie in (0, pi]"));
        }
        if let Some(noise) = &self.channel.noise
            && !(noise.amplitude > 0.0 && noise.amplitude.is_finite())
        {
            return Err(WorldError::InvalidConfig(
                "noise amplitude must be positive and finite",
            ));
        }
        if let Some(levels) = self.quantization_levels
            && levels < 2
        {
            return Err(WorldError::InvalidConfig(
                "quantization needs at least two levels",
            ));
        }
        if let MessageAggregation::Concat { max_neighbors } = self.aggregation
            && max_neighbors == 0
        {
            return Err(WorldError::InvalidConfig(
                "concat aggregation needs max_neighbors of at least one",
            ));
        }
        self.topology.neighbor_lists(self.agent_count)?;
        Ok(())
    }

    /// Input/output vector lengths implied by this configuration.
    #[must_use]
    pub const fn io_layout(&self) -> IoLayout {
        IoLayout {
            input_len: self.heading_encoding.width() + self.aggregation.width(self.message_size),
            output_len: 1 + self.message_size,
        }
    }
}

/// One agent's action for the current step, already bounded and fail-softed.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Heading change to apply, clipped to `[-max_turn, max_turn]`.
    pub heading_delta: f32,
    /// Message broadcast for the *following* step.
    pub next_message: Message,
    /// `false` when the raw controller output contained a non-finite value
    /// and zero substitution was applied.
    pub finite: bool,
}

/// Binds one phenotype to the fixed per-agent input/output contract.
pub struct ControllerAdapter {
    phenotype: Box<dyn Phenotype>,
    layout: IoLayout,
    encoding: HeadingEncoding,
    aggregation: MessageAggregation,
    message_size: usize,
    max_turn: f32,
    quantization_levels: Option<u8>,
    input_scratch: Vec<f32>,
}

impl std::fmt::Debug for ControllerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerAdapter")
            .field("layout", &self.layout)
            .field("message_size", &self.message_size)
            .finish()
    }
}

impl ControllerAdapter {
    /// Bind a phenotype, checking its declared arity against the experiment
    /// layout. A mismatch is fatal and surfaced immediately, never padded.
    pub fn bind(
        phenotype: Box<dyn Phenotype>,
        config: &SimulationConfig,
    ) -> Result<Self, WorldError> {
        let layout = config.io_layout();
        if phenotype.input_arity() != layout.input_len
            || phenotype.output_arity() != layout.output_len
        {
            return Err(WorldError::PhenotypeShape {
                expected_inputs: layout.input_len,
                expected_outputs: layout.output_len,
                actual_inputs: phenotype.input_arity(),
                actual_outputs: phenotype.output_arity(),
            });
        }
        Ok(Self {
            phenotype,
            layout,
            encoding: config.heading_encoding,
            aggregation: config.aggregation,
            message_size: config.message_size,
            max_turn: config.max_turn,
            quantization_levels: config.quantization_levels,
            input_scratch: Vec::with_capacity(layout.input_len),
        })
    }

    /// Clear recurrent phenotype state. Invoked by the engine at trial start.
    pub fn reset(&mut self) {
        self.phenotype.reset();
    }

    /// Evaluate one decision from the agent's pre-step view of the world.
    ///
    /// Non-finite controller output is substituted with a zero delta and a
    /// zero message; the caller flags the trial as degraded. A wrong-length
    /// output vector is fatal.
    pub fn decide(&mut self, own_heading: f32, received: &[Message]) -> Result<Decision, WorldError> {
        self.input_scratch.clear();
        self.encoding.encode(own_heading, &mut self.input_scratch);
        self.aggregation
            .aggregate(received, self.message_size, &mut self.input_scratch);
        debug_assert_eq!(self.input_scratch.len(), self.layout.input_len);

        let outputs = self.phenotype.activate(&self.input_scratch);
        if outputs.len() != self.layout.output_len {
            return Err(WorldError::OutputArity {
                expected: self.layout.output_len,
                actual: outputs.len(),
            });
        }
        if outputs.iter().any(|value| !value.is_finite()) {
            return Ok(Decision {
                heading_delta: 0.0,
                next_message: vec![0.0; self.message_size],
                finite: false,
            });
        }

        let heading_delta = outputs[0].clamp(-self.max_turn, self.max_turn);
        let mut next_message = outputs[1..].to_vec();
        if let Some(levels) = self.quantization_levels {
            let span = f32::from(levels - 1);
            for value in &mut next_message {
                *value = (value.clamp(0.0, 1.0) * span).round() / span;
            }
        }
        Ok(Decision {
            heading_delta,
            next_message,
            finite: true,
        })
    }
}

/// Why a trial's outcome is untrustworthy and must be penalized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DegradedReason {
    /// A controller emitted a non-finite value; zero substitution applied.
    NonFinite,
    /// The trial exceeded its wall-clock budget and was aborted early.
    Timeout,
}

/// Raw outcome of one trial, read-only once the episode ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    /// Steps actually executed (may undercut the episode length on early
    /// stop or timeout).
    pub steps_run: u32,
    /// Heading of every agent at the final executed step.
    pub terminal_headings: Vec<f32>,
    /// Heading delta applied to every agent on the final executed step.
    pub terminal_turn_rates: Vec<f32>,
    /// Per-step headings (initial state first), when recording was enabled.
    pub history: Option<Vec<Vec<f32>>>,
    /// Set when fail-soft substitution or a timeout occurred.
    pub degraded: Option<DegradedReason>,
}

impl Trajectory {
    /// Whether the trial completed without degradation.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.degraded.is_none()
    }
}

/// Advances one episode for one trial: fixed population, fixed topology,
/// synchronous steps.
pub struct World {
    config: SimulationConfig,
    channel: CommChannel,
    adapters: Vec<ControllerAdapter>,
    headings: Vec<f32>,
    messages: Vec<Message>,
    turn_rates: Vec<f32>,
    rng: SmallRng,
    step: u32,
    degraded: Option<DegradedReason>,
    history: Option<Vec<Vec<f32>>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("agent_count", &self.headings.len())
            .field("step", &self.step)
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl World {
    /// Build a world from validated configuration, initial headings, and one
    /// controller per agent. Controllers are reset here — trial start is the
    /// one place recurrent state is cleared.
    ///
    /// `seed` drives every random draw the world makes (channel noise,
    /// single-neighbor selection); two worlds built with identical arguments
    /// evolve identically.
    pub fn new(
        config: SimulationConfig,
        initial_headings: &[f32],
        controllers: Vec<Box<dyn Phenotype>>,
        seed: u64,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        if initial_headings.len() != config.agent_count {
            return Err(WorldError::InvalidConfig(
                "initial headings must match agent_count",
            ));
        }
        if controllers.len() != config.agent_count {
            return Err(WorldError::InvalidConfig(
                "controller count must match agent_count",
            ));
        }
        let neighbors = config.topology.neighbor_lists(config.agent_count)?;
        let channel = CommChannel::new(config.channel, neighbors);
        let mut adapters = controllers
            .into_iter()
            .map(|phenotype| ControllerAdapter::bind(phenotype, &config))
            .collect::<Result<Vec<_>, _>>()?;
        for adapter in &mut adapters {
            adapter.reset();
        }
        let headings: Vec<f32> = initial_headings.iter().copied().map(wrap_heading).collect();
        let agent_count = config.agent_count;
        Ok(Self {
            messages: vec![vec![0.0; config.message_size]; agent_count],
            turn_rates: vec![0.0; agent_count],
            channel,
            adapters,
            headings,
            rng: SmallRng::seed_from_u64(seed),
            step: 0,
            degraded: None,
            history: None,
            config,
        })
    }

    /// Record full per-step heading history, starting with the initial state.
    /// Required for cumulative scoring and replay.
    pub fn enable_history(&mut self) {
        if self.history.is_none() {
            self.history = Some(vec![self.headings.clone()]);
        }
    }

    /// Execute one synchronous step.
    ///
    /// Stage order is fixed: gather previous-step messages, evaluate every
    /// controller against that snapshot (rayon; evaluation order cannot
    /// affect results since each computation reads only pre-step state),
    /// then apply all deltas and next messages simultaneously.
    pub fn step(&mut self) -> Result<(), WorldError> {
        let inbox = self.channel.gather(&self.messages, &mut self.rng);

        let headings = &self.headings;
        let decisions = self
            .adapters
            .par_iter_mut()
            .enumerate()
            .map(|(idx, adapter)| adapter.decide(headings[idx], &inbox[idx]))
            .collect::<Result<Vec<Decision>, WorldError>>()?;

        for (idx, decision) in decisions.into_iter().enumerate() {
            if !decision.finite && self.degraded.is_none() {
                self.degraded = Some(DegradedReason::NonFinite);
            }
            self.headings[idx] = wrap_heading(self.headings[idx] + decision.heading_delta);
            self.turn_rates[idx] = decision.heading_delta;
            self.messages[idx] = decision.next_message;
        }
        if let Some(history) = &mut self.history {
            history.push(self.headings.clone());
        }
        self.step += 1;
        Ok(())
    }

    /// Run `steps` synchronous steps back to back.
    pub fn run_episode(&mut self, steps: u32) -> Result<(), WorldError> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Sticky degradation marker; the first reason wins.
    pub fn flag_degraded(&mut self, reason: DegradedReason) {
        if self.degraded.is_none() {
            self.degraded = Some(reason);
        }
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn headings(&self) -> &[f32] {
        &self.headings
    }

    /// Messages emitted on the previous step (what the channel will deliver
    /// next step).
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn step_count(&self) -> u32 {
        self.step
    }

    #[must_use]
    pub const fn degraded(&self) -> Option<DegradedReason> {
        self.degraded
    }

    /// Consume the world into its read-only trial outcome.
    #[must_use]
    pub fn into_trajectory(self) -> Trajectory {
        Trajectory {
            steps_run: self.step,
            terminal_headings: self.headings,
            terminal_turn_rates: self.turn_rates,
            history: self.history,
            degraded: self.degraded,
        }
    }
}
