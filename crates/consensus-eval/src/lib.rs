//! Trial orchestration and fitness evaluation.
//!
//! The [`Evaluator`] is the harness's contract with an external
//! evolutionary-computation library: hand it a [`ControllerFactory`] per
//! genome, get back one scalar fitness. Each evaluation runs a fixed number
//! of independently seeded trials (parallel over rayon), converts every
//! trajectory into a consensus error, and aggregates across trials. Degraded
//! trials — non-finite controller output or a blown wall-clock budget — are
//! pinned to the worst possible error so they can never outscore an honest
//! run, and are flagged in the logs so they stay distinguishable from
//! converged trials.

use consensus_core::{
    ControllerFactory, DegradedReason, Phenotype, SimulationConfig, Trajectory, World, WorldError,
    circular_variance, mean_pairwise_distance,
};
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Which part of a trajectory feeds the consensus error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// Score the terminal step only.
    #[default]
    Terminal,
    /// Score the mean consensus error over every executed step. Rewards
    /// converging early, not just arriving.
    Cumulative,
}

/// Scalar measure of how far a set of headings is from agreement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ErrorMetric {
    /// Circular variance `1 - R̄`, in `[0, 1]`.
    #[default]
    CircularVariance,
    /// Mean pairwise angular distance, in `[0, π]` radians.
    MeanPairwise,
}

impl ErrorMetric {
    /// Evaluate the metric over a set of headings.
    #[must_use]
    pub fn measure(&self, headings: &[f32]) -> f32 {
        match self {
            Self::CircularVariance => circular_variance(headings),
            Self::MeanPairwise => mean_pairwise_distance(headings),
        }
    }

    /// Largest value the metric can take; degraded trials are pinned here.
    #[must_use]
    pub const fn max_value(&self) -> f32 {
        match self {
            Self::CircularVariance => 1.0,
            Self::MeanPairwise => std::f32::consts::PI,
        }
    }
}

/// How per-trial scores combine into the genome's fitness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TrialStatistic {
    /// Mean over trials.
    #[default]
    Mean,
    /// Worst trial wins; discourages genomes that only work by luck.
    Worst,
}

/// Everything fixed for the life of one evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    /// World model shared by every trial.
    pub simulation: SimulationConfig,
    /// Steps per episode; constant across generations so fitness stays
    /// comparable.
    pub episode_steps: u32,
    /// Trials per genome; constant across generations.
    pub trial_count: u32,
    /// Top-level experiment seed; every trial seed derives from it.
    pub rng_seed: u64,
    pub scoring: ScoringMode,
    pub metric: ErrorMetric,
    pub statistic: TrialStatistic,
    /// Scale each clean trial's score by how still the agents ended up
    /// (`1 - mean |terminal turn| / max_turn`). Off by default.
    pub penalize_residual_turn: bool,
    /// Stop an episode early once the consensus error drops to this value.
    /// `None` always runs the full episode.
    pub convergence_threshold: Option<f32>,
    /// Wall-clock budget per trial; a trial that exceeds it is aborted and
    /// scored as degraded.
    pub trial_budget: Option<Duration>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            episode_steps: 600,
            trial_count: 5,
            rng_seed: 0,
            scoring: ScoringMode::default(),
            metric: ErrorMetric::default(),
            statistic: TrialStatistic::default(),
            penalize_residual_turn: false,
            convergence_threshold: None,
            trial_budget: None,
        }
    }
}

impl EvaluationConfig {
    /// Validate once, before any trial runs.
    pub fn validate(&self) -> Result<(), WorldError> {
        self.simulation.validate()?;
        if self.episode_steps == 0 {
            return Err(WorldError::InvalidConfig("episode_steps must be non-zero"));
        }
        if self.trial_count == 0 {
            return Err(WorldError::InvalidConfig("trial_count must be non-zero"));
        }
        if let Some(threshold) = self.convergence_threshold
            && !(threshold >= 0.0 && threshold.is_finite())
        {
            return Err(WorldError::InvalidConfig(
                "convergence_threshold must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// Deterministic per-trial seed derived from the experiment seed.
///
/// Splitmix-style mix: re-running any single trial in isolation (replay)
/// reproduces the scoring run exactly.
#[must_use]
pub fn trial_seed(experiment_seed: u64, trial: u32) -> u64 {
    let mut z = experiment_seed.wrapping_add((u64::from(trial) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Scored outcome of one trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialOutcome {
    pub trial: u32,
    pub seed: u64,
    /// Consensus error in the configured metric's units.
    pub consensus_error: f32,
    /// This trial's score component, in `[0, 1]`; degraded trials score 0.
    pub fitness: f32,
    pub steps_run: u32,
    pub degraded: Option<DegradedReason>,
}

/// Aggregate result of one genome evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    /// Scalar returned to the evolutionary library. Monotonically decreasing
    /// in consensus error; 1.0 at perfect consensus on every trial.
    pub fitness: f64,
    pub outcomes: Vec<TrialOutcome>,
}

impl EvaluationReport {
    /// Number of trials that ended degraded.
    #[must_use]
    pub fn degraded_trials(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.degraded.is_some())
            .count()
    }
}

/// Controller assignment for one evaluation: one factory shared by every
/// agent, or one factory per agent role.
#[derive(Clone, Copy)]
enum Roles<'a> {
    Shared(&'a dyn ControllerFactory),
    PerAgent(&'a [Box<dyn ControllerFactory>]),
}

impl Roles<'_> {
    fn spawn_population(&self, agent_count: usize) -> Vec<Box<dyn Phenotype>> {
        match self {
            Self::Shared(factory) => (0..agent_count).map(|_| factory.spawn()).collect(),
            Self::PerAgent(factories) => factories.iter().map(|f| f.spawn()).collect(),
        }
    }

    fn probe(&self, config: &SimulationConfig) -> Result<(), WorldError> {
        let layout = config.io_layout();
        let check = |phenotype: Box<dyn Phenotype>| {
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
            Ok(())
        };
        match self {
            Self::Shared(factory) => check(factory.spawn()),
            Self::PerAgent(factories) => {
                for factory in *factories {
                    check(factory.spawn())?;
                }
                Ok(())
            }
        }
    }
}

/// Runs seeded trials for a fitness request and scores the outcomes.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluationConfig,
}

impl Evaluator {
    /// Build an evaluator from validated configuration. Configuration
    /// violations are fatal here, before any trial runs.
    pub fn new(config: EvaluationConfig) -> Result<Self, WorldError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Fitness callback for a homogeneous population: every agent runs an
    /// instance spawned from the same factory.
    pub fn evaluate(&self, factory: &dyn ControllerFactory) -> Result<EvaluationReport, WorldError> {
        self.evaluate_roles(Roles::Shared(factory))
    }

    /// Fitness callback for heterogeneous controller roles, one factory per
    /// agent.
    pub fn evaluate_heterogeneous(
        &self,
        factories: &[Box<dyn ControllerFactory>],
    ) -> Result<EvaluationReport, WorldError> {
        if factories.len() != self.config.simulation.agent_count {
            return Err(WorldError::InvalidConfig(
                "one controller factory per agent role is required",
            ));
        }
        self.evaluate_roles(Roles::PerAgent(factories))
    }

    fn evaluate_roles(&self, roles: Roles<'_>) -> Result<EvaluationReport, WorldError> {
        roles.probe(&self.config.simulation)?;
        let trajectories = (0..self.config.trial_count)
            .into_par_iter()
            .map(|trial| self.run_trial(roles, trial, false))
            .collect::<Result<Vec<_>, WorldError>>()?;
        Ok(self.score(&trajectories))
    }

    /// Re-run one trial with full history recording, reproducing the scoring
    /// run bit-for-bit. Exposed for external visualization.
    pub fn replay(
        &self,
        factory: &dyn ControllerFactory,
        trial: u32,
    ) -> Result<Trajectory, WorldError> {
        self.replay_roles(Roles::Shared(factory), trial)
    }

    /// [`Evaluator::replay`] for heterogeneous controller roles.
    pub fn replay_heterogeneous(
        &self,
        factories: &[Box<dyn ControllerFactory>],
        trial: u32,
    ) -> Result<Trajectory, WorldError> {
        if factories.len() != self.config.simulation.agent_count {
            return Err(WorldError::InvalidConfig(
                "one controller factory per agent role is required",
            ));
        }
        self.replay_roles(Roles::PerAgent(factories), trial)
    }

    fn replay_roles(&self, roles: Roles<'_>, trial: u32) -> Result<Trajectory, WorldError> {
        if trial >= self.config.trial_count {
            return Err(WorldError::InvalidConfig(
                "replay trial index exceeds trial_count",
            ));
        }
        roles.probe(&self.config.simulation)?;
        self.run_trial(roles, trial, true)
    }

    fn run_trial(
        &self,
        roles: Roles<'_>,
        trial: u32,
        record_history: bool,
    ) -> Result<Trajectory, WorldError> {
        let seed = trial_seed(self.config.rng_seed, trial);
        let mut rng = SmallRng::seed_from_u64(seed);
        let agent_count = self.config.simulation.agent_count;
        let initial_headings: Vec<f32> = (0..agent_count)
            .map(|_| rng.random_range(0.0..FULL_TURN))
            .collect();
        let world_seed = rng.next_u64();

        let controllers = roles.spawn_population(agent_count);
        let mut world = World::new(
            self.config.simulation.clone(),
            &initial_headings,
            controllers,
            world_seed,
        )?;
        if record_history || self.config.scoring == ScoringMode::Cumulative {
            world.enable_history();
        }

        let deadline = self.config.trial_budget.map(|budget| Instant::now() + budget);
        for _ in 0..self.config.episode_steps {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                world.flag_degraded(DegradedReason::Timeout);
                break;
            }
            world.step()?;
            if let Some(threshold) = self.config.convergence_threshold
                && self.config.metric.measure(world.headings()) <= threshold
            {
                break;
            }
        }

        let trajectory = world.into_trajectory();
        if let Some(reason) = trajectory.degraded {
            warn!(trial, seed, ?reason, "trial degraded; scoring as worst case");
        }
        Ok(trajectory)
    }

    /// Convert raw trajectories into per-trial scores and one scalar fitness.
    ///
    /// Trajectories are assumed ordered by trial index (as produced by
    /// evaluation); the returned fitness is monotonically decreasing in
    /// consensus error.
    #[must_use]
    pub fn score(&self, trajectories: &[Trajectory]) -> EvaluationReport {
        let outcomes: Vec<TrialOutcome> = trajectories
            .iter()
            .enumerate()
            .map(|(index, trajectory)| self.score_trial(index as u32, trajectory))
            .collect();
        let fitness = match self.config.statistic {
            TrialStatistic::Mean => {
                let total: f64 = outcomes.iter().map(|o| f64::from(o.fitness)).sum();
                if outcomes.is_empty() {
                    0.0
                } else {
                    total / outcomes.len() as f64
                }
            }
            TrialStatistic::Worst => {
                if outcomes.is_empty() {
                    0.0
                } else {
                    outcomes
                        .iter()
                        .map(|o| f64::from(o.fitness))
                        .fold(f64::INFINITY, f64::min)
                }
            }
        };
        EvaluationReport { fitness, outcomes }
    }

    fn score_trial(&self, trial: u32, trajectory: &Trajectory) -> TrialOutcome {
        let metric = self.config.metric;
        let consensus_error = if trajectory.degraded.is_some() {
            metric.max_value()
        } else {
            match self.config.scoring {
                ScoringMode::Terminal => metric.measure(&trajectory.terminal_headings),
                ScoringMode::Cumulative => cumulative_error(trajectory, metric),
            }
        };

        let mut fitness = 1.0 - consensus_error / metric.max_value();
        if self.config.penalize_residual_turn && trajectory.degraded.is_none() {
            let max_turn = self.config.simulation.max_turn;
            let mean_turn = trajectory
                .terminal_turn_rates
                .iter()
                .map(|delta| delta.abs())
                .sum::<f32>()
                / trajectory.terminal_turn_rates.len().max(1) as f32;
            fitness *= (1.0 - mean_turn / max_turn).clamp(0.0, 1.0);
        }
        let fitness = fitness.clamp(0.0, 1.0);

        debug!(
            trial,
            consensus_error,
            fitness,
            steps = trajectory.steps_run,
            "trial scored",
        );
        TrialOutcome {
            trial,
            seed: trial_seed(self.config.rng_seed, trial),
            consensus_error,
            fitness,
            steps_run: trajectory.steps_run,
            degraded: trajectory.degraded,
        }
    }
}

/// Mean consensus error over every executed step (initial state excluded).
fn cumulative_error(trajectory: &Trajectory, metric: ErrorMetric) -> f32 {
    match &trajectory.history {
        Some(history) if history.len() > 1 => {
            let total: f32 = history[1..].iter().map(|row| metric.measure(row)).sum();
            total / (history.len() - 1) as f32
        }
        // Without history there is nothing cumulative to integrate.
        _ => metric.measure(&trajectory.terminal_headings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::{ChannelConfig, Delivery, NoiseConfig};

    const EPS: f32 = 1e-5;

    /// Minimal stateless phenotype steering by a constant.
    struct Constant {
        inputs: usize,
        outputs: usize,
        delta: f32,
    }

    impl Phenotype for Constant {
        fn input_arity(&self) -> usize {
            self.inputs
        }
        fn output_arity(&self) -> usize {
            self.outputs
        }
        fn activate(&mut self, _inputs: &[f32]) -> Vec<f32> {
            let mut out = vec![0.0; self.outputs];
            out[0] = self.delta;
            out
        }
    }

    fn constant_factory(config: &SimulationConfig, delta: f32) -> impl ControllerFactory + use<> {
        let layout = config.io_layout();
        move || {
            Box::new(Constant {
                inputs: layout.input_len,
                outputs: layout.output_len,
                delta,
            }) as Box<dyn Phenotype>
        }
    }

    fn small_eval_config() -> EvaluationConfig {
        EvaluationConfig {
            simulation: SimulationConfig {
                agent_count: 4,
                message_size: 1,
                ..SimulationConfig::default()
            },
            episode_steps: 20,
            trial_count: 3,
            rng_seed: 0xC0FFEE,
            ..EvaluationConfig::default()
        }
    }

    fn clean_trajectory(headings: Vec<f32>) -> Trajectory {
        let turn_rates = vec![0.0; headings.len()];
        Trajectory {
            steps_run: 10,
            terminal_headings: headings,
            terminal_turn_rates: turn_rates,
            history: None,
            degraded: None,
        }
    }

    #[test]
    fn trial_seeds_are_stable_and_distinct() {
        let a = trial_seed(42, 0);
        let b = trial_seed(42, 1);
        assert_eq!(a, trial_seed(42, 0));
        assert_ne!(a, b);
        assert_ne!(trial_seed(42, 0), trial_seed(43, 0));
    }

    #[test]
    fn validate_rejects_zero_trials_and_steps() {
        let mut config = small_eval_config();
        config.trial_count = 0;
        assert_eq!(
            config.validate(),
            Err(WorldError::InvalidConfig("trial_count must be non-zero"))
        );
        let mut config = small_eval_config();
        config.episode_steps = 0;
        assert_eq!(
            config.validate(),
            Err(WorldError::InvalidConfig("episode_steps must be non-zero"))
        );
    }

    #[test]
    fn perfect_consensus_scores_maximum_fitness() {
        let evaluator = Evaluator::new(EvaluationConfig {
            metric: ErrorMetric::MeanPairwise,
            ..small_eval_config()
        })
        .expect("evaluator");
        let report = evaluator.score(&[clean_trajectory(vec![1.3, 1.3, 1.3, 1.3])]);
        assert_eq!(report.outcomes[0].consensus_error, 0.0);
        assert_eq!(report.fitness, 1.0);
    }

    #[test]
    fn degraded_trial_is_pinned_to_worst_case() {
        let evaluator = Evaluator::new(small_eval_config()).expect("evaluator");

        let mut poisoned = clean_trajectory(vec![2.0, 2.0, 2.0, 2.0]);
        poisoned.degraded = Some(DegradedReason::NonFinite);
        let degraded_report = evaluator.score(std::slice::from_ref(&poisoned));
        assert_eq!(
            degraded_report.outcomes[0].consensus_error,
            ErrorMetric::CircularVariance.max_value()
        );
        assert_eq!(degraded_report.fitness, 0.0);

        // A finite trial with real spread still beats it.
        let spread = evaluator.score(&[clean_trajectory(vec![0.0, 1.57, 3.14, 1.0])]);
        assert!(spread.fitness > degraded_report.fitness);
        assert_eq!(degraded_report.degraded_trials(), 1);
    }

    #[test]
    fn worst_statistic_takes_the_weakest_trial() {
        let tight = clean_trajectory(vec![1.0, 1.0, 1.01, 1.0]);
        let loose = clean_trajectory(vec![0.0, 2.0, 4.0, 5.5]);
        let base = small_eval_config();

        let mean_eval = Evaluator::new(EvaluationConfig {
            statistic: TrialStatistic::Mean,
            ..base.clone()
        })
        .expect("evaluator");
        let worst_eval = Evaluator::new(EvaluationConfig {
            statistic: TrialStatistic::Worst,
            ..base
        })
        .expect("evaluator");

        let trajectories = vec![tight, loose];
        let mean_report = mean_eval.score(&trajectories);
        let worst_report = worst_eval.score(&trajectories);
        assert!(worst_report.fitness < mean_report.fitness);
        let weakest = mean_report
            .outcomes
            .iter()
            .map(|o| f64::from(o.fitness))
            .fold(f64::INFINITY, f64::min);
        assert!((worst_report.fitness - weakest).abs() < 1e-9);
    }

    #[test]
    fn cumulative_scoring_punishes_late_convergence() {
        let mut trajectory = clean_trajectory(vec![1.0, 1.0, 1.0, 1.0]);
        trajectory.history = Some(vec![
            vec![0.0, 1.57, 3.14, 4.0], // initial, excluded
            vec![0.0, 1.57, 3.14, 4.0],
            vec![0.5, 1.2, 2.0, 2.5],
            vec![1.0, 1.0, 1.0, 1.0],
        ]);
        let base = small_eval_config();
        let terminal = Evaluator::new(EvaluationConfig {
            scoring: ScoringMode::Terminal,
            ..base.clone()
        })
        .expect("evaluator");
        let cumulative = Evaluator::new(EvaluationConfig {
            scoring: ScoringMode::Cumulative,
            ..base
        })
        .expect("evaluator");

        let terminal_report = terminal.score(std::slice::from_ref(&trajectory));
        let cumulative_report = cumulative.score(std::slice::from_ref(&trajectory));
        assert!(terminal_report.outcomes[0].consensus_error < EPS);
        assert!(
            cumulative_report.outcomes[0].consensus_error
                > terminal_report.outcomes[0].consensus_error
        );
        assert!(cumulative_report.fitness < terminal_report.fitness);
    }

    #[test]
    fn residual_turn_penalty_scales_fitness() {
        let mut spinning = clean_trajectory(vec![1.0, 1.0, 1.0, 1.0]);
        let max_turn = SimulationConfig::default().max_turn;
        spinning.terminal_turn_rates = vec![max_turn; 4];

        // MeanPairwise is exactly zero for identical headings, so the only
        // thing separating the two reports is the turn penalty.
        let base = EvaluationConfig {
            metric: ErrorMetric::MeanPairwise,
            ..small_eval_config()
        };
        let plain = Evaluator::new(base.clone()).expect("evaluator");
        let penalized = Evaluator::new(EvaluationConfig {
            penalize_residual_turn: true,
            ..base
        })
        .expect("evaluator");

        assert_eq!(plain.score(std::slice::from_ref(&spinning)).fitness, 1.0);
        assert_eq!(penalized.score(std::slice::from_ref(&spinning)).fitness, 0.0);
    }

    #[test]
    fn evaluate_is_deterministic_per_seed() {
        let config = EvaluationConfig {
            simulation: SimulationConfig {
                agent_count: 4,
                message_size: 1,
                channel: ChannelConfig {
                    delivery: Delivery::SingleRandomNeighbor,
                    noise: Some(NoiseConfig { amplitude: 0.05 }),
                },
                ..SimulationConfig::default()
            },
            episode_steps: 25,
            trial_count: 4,
            rng_seed: 0xFEED,
            ..EvaluationConfig::default()
        };
        let factory = constant_factory(&config.simulation, 0.02);
        let evaluator = Evaluator::new(config).expect("evaluator");

        let first = evaluator.evaluate(&factory).expect("evaluate");
        let second = evaluator.evaluate(&factory).expect("evaluate");
        assert_eq!(first, second);

        let reseeded = Evaluator::new(EvaluationConfig {
            rng_seed: 0xBEEF,
            ..evaluator.config().clone()
        })
        .expect("evaluator");
        let third = reseeded.evaluate(&factory).expect("evaluate");
        assert_ne!(first.outcomes, third.outcomes);
    }

    #[test]
    fn replay_reproduces_the_scoring_run() {
        let config = small_eval_config();
        let factory = constant_factory(&config.simulation, 0.05);
        let evaluator = Evaluator::new(config).expect("evaluator");

        let report = evaluator.evaluate(&factory).expect("evaluate");
        let replayed = evaluator.replay(&factory, 1).expect("replay");
        let again = evaluator.replay(&factory, 1).expect("replay");
        assert_eq!(replayed, again, "replay is bit-for-bit reproducible");

        let history = replayed.history.as_ref().expect("history");
        assert_eq!(history.len() as u32, replayed.steps_run + 1);
        // The replayed terminal state scores exactly what the trial scored.
        let error = evaluator.config().metric.measure(&replayed.terminal_headings);
        assert_eq!(error.to_bits(), report.outcomes[1].consensus_error.to_bits());
    }

    #[test]
    fn replay_rejects_out_of_range_trial() {
        let config = small_eval_config();
        let factory = constant_factory(&config.simulation, 0.0);
        let evaluator = Evaluator::new(config).expect("evaluator");
        assert_eq!(
            evaluator.replay(&factory, 99).err(),
            Some(WorldError::InvalidConfig(
                "replay trial index exceeds trial_count",
            ))
        );
    }

    #[test]
    fn shape_mismatch_is_fatal_before_any_trial() {
        let config = small_eval_config();
        let layout = config.simulation.io_layout();
        let wrong = move || {
            Box::new(Constant {
                inputs: layout.input_len + 2,
                outputs: layout.output_len,
                delta: 0.0,
            }) as Box<dyn Phenotype>
        };
        let evaluator = Evaluator::new(config).expect("evaluator");
        match evaluator.evaluate(&wrong) {
            Err(WorldError::PhenotypeShape { actual_inputs, .. }) => {
                assert_eq!(actual_inputs, layout.input_len + 2);
            }
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn zero_budget_times_out_every_trial() {
        let config = EvaluationConfig {
            trial_budget: Some(Duration::ZERO),
            ..small_eval_config()
        };
        let factory = constant_factory(&config.simulation, 0.1);
        let evaluator = Evaluator::new(config).expect("evaluator");
        let report = evaluator.evaluate(&factory).expect("evaluate");
        assert_eq!(report.degraded_trials(), report.outcomes.len());
        assert_eq!(report.fitness, 0.0);
        for outcome in &report.outcomes {
            assert_eq!(outcome.degraded, Some(DegradedReason::Timeout));
            assert_eq!(outcome.steps_run, 0);
        }
    }

    #[test]
    fn heterogeneous_roles_require_one_factory_per_agent() {
        let config = small_eval_config();
        let factory = constant_factory(&config.simulation, 0.0);
        let evaluator = Evaluator::new(config).expect("evaluator");
        let factories: Vec<Box<dyn ControllerFactory>> = vec![Box::new(factory)];
        assert_eq!(
            evaluator.evaluate_heterogeneous(&factories).err(),
            Some(WorldError::InvalidConfig(
                "one controller factory per agent role is required",
            ))
        );
    }

    #[test]
    fn convergence_threshold_stops_episodes_early() {
        // Zero-delta controllers never converge, so the threshold only fires
        // when it is trivially satisfied by the initial spread.
        let config = EvaluationConfig {
            convergence_threshold: Some(ErrorMetric::CircularVariance.max_value()),
            ..small_eval_config()
        };
        let factory = constant_factory(&config.simulation, 0.0);
        let evaluator = Evaluator::new(config).expect("evaluator");
        let report = evaluator.evaluate(&factory).expect("evaluate");
        for outcome in &report.outcomes {
            assert_eq!(outcome.steps_run, 1, "threshold met after the first step");
        }
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = EvaluationConfig {
            trial_budget: Some(Duration::from_millis(250)),
            convergence_threshold: Some(0.01),
            metric: ErrorMetric::MeanPairwise,
            statistic: TrialStatistic::Worst,
            ..small_eval_config()
        };
        let encoded = serde_json::to_string(&config).expect("serialize");
        let decoded: EvaluationConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(config, decoded);
    }
}
