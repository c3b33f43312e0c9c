//! Time-stepping loop

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crate::{
    config::{streams, SimulationConfig},
    connectivity::Connectivity,
    dynamics::{DynamicsRule, StabilityGuard, StepContext},
    error::*,
    plasticity::{Plasticity, StateWindow},
    recorder::{Recorder, RunMetadata, Trajectory},
    rng::RandomStream,
    stimulation::{build_schedule, StimulationSchedule},
};

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Built, no step taken
    Initialized,
    /// At least one step taken, not finished
    Running,
    /// All configured steps taken
    Completed,
    /// Stopped at a step boundary on request
    Cancelled,
    /// Stopped by an error
    Failed,
}

impl RunStatus {
    /// True for states from which no further step is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Cooperative cancellation flag checked between steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters collected during a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Steps fully executed
    pub steps_completed: u64,
    /// Time spent in the stepping loop
    pub wall_clock: Duration,
    /// Plasticity updates applied
    pub plasticity_updates: u64,
    /// Edges removed by pruning
    pub edges_pruned: u64,
    /// Random words drawn, setup included
    pub draws: u64,
}

/// Output of a run that completed or was cancelled
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// `Completed` or `Cancelled`
    pub status: RunStatus,
    /// Sealed trajectory
    pub trajectory: Trajectory,
    /// Connectivity at the end of the run
    pub connectivity: Connectivity,
    /// Run counters
    pub stats: RunStats,
}

/// Orchestrates one simulation run.
///
/// One step at time `t`:
/// 1. sum the additive stimulation for `t`
/// 2. advance the dynamics rule into the spare buffer
/// 3. apply overrides for `t`
/// 4. check the stability guard
/// 5. update plasticity, if enabled, on a staged copy of the connectivity
/// 6. publish the new state and connectivity together
/// 7. record spikes, and the state when `t % sampling_stride == 0`
#[derive(Debug)]
pub struct SimulationDriver {
    total_steps: u64,
    sampling_stride: u64,
    connectivity: Connectivity,
    dynamics: Box<dyn DynamicsRule>,
    schedule: Arc<StimulationSchedule>,
    plasticity: Option<Plasticity>,
    window: Option<StateWindow>,
    guard: StabilityGuard,
    rng: RandomStream,
    setup_draws: u64,
    state: Vec<f32>,
    next: Vec<f32>,
    input: Vec<f64>,
    recorder: Recorder,
    time: u64,
    status: RunStatus,
    failure: Option<EngineError>,
    stats: RunStats,
}

impl SimulationDriver {
    /// Build topology, initial state, schedule and rules from a configuration.
    ///
    /// Every parameter is validated here; no step runs until [`step`](Self::step)
    /// or one of the `run` methods is called.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let root = RandomStream::new(config.seed);

        let mut topology_rng = root.derive(streams::TOPOLOGY);
        let connectivity = config.topology_builder()?.build(&mut topology_rng)?;

        let mut initial_rng = root.derive(streams::INITIAL);
        let initial = config.initial.materialize(config.node_count, &mut initial_rng)?;

        let mut stimulation_rng = root.derive(streams::STIMULATION);
        let schedule = build_schedule(
            config.node_count,
            &config.stimulation,
            config.total_steps,
            config.reject_override_conflicts,
            &mut stimulation_rng,
        )?;

        let dynamics = config.dynamics.build()?;
        let plasticity = config.plasticity.as_ref().map(|p| p.build()).transpose()?;
        let setup_draws = topology_rng.draws() + initial_rng.draws() + stimulation_rng.draws();

        let mut driver = Self::from_parts(
            config,
            connectivity,
            dynamics,
            schedule,
            plasticity,
            initial,
            root.derive(streams::DYNAMICS),
        )?;
        driver.setup_draws = setup_draws;
        Ok(driver)
    }

    /// Assemble a driver from prebuilt components.
    ///
    /// `config` supplies the step count, stride, seed, guard bound and
    /// plasticity window; its topology and stimulation fields are recorded in
    /// the metadata but not used to build anything.
    pub fn from_parts(
        config: SimulationConfig,
        connectivity: Connectivity,
        dynamics: Box<dyn DynamicsRule>,
        schedule: impl Into<Arc<StimulationSchedule>>,
        plasticity: Option<Plasticity>,
        initial_state: Vec<f32>,
        rng: RandomStream,
    ) -> Result<Self> {
        let schedule = schedule.into();
        let n = connectivity.node_count();
        if config.node_count != n {
            return Err(EngineError::dimension_mismatch("connectivity", config.node_count, n));
        }
        if initial_state.len() != n {
            return Err(EngineError::dimension_mismatch("initial state", n, initial_state.len()));
        }
        if schedule.node_count() != n {
            return Err(EngineError::dimension_mismatch("schedule", n, schedule.node_count()));
        }
        if config.total_steps == 0 {
            return Err(EngineError::invalid_spec("total_steps", 0, "> 0"));
        }
        if config.sampling_stride == 0 {
            return Err(EngineError::invalid_spec("sampling_stride", 0, "> 0"));
        }
        let guard = StabilityGuard::new(config.instability_bound)?;

        let window = plasticity
            .as_ref()
            .map(|p| StateWindow::new(p.window_len(config.plasticity_window)));
        let metadata = RunMetadata::new(
            &config,
            connectivity.edge_count(),
            dynamics.name(),
            plasticity.as_ref().map(|p| p.rule().name()),
        );
        let mut recorder = Recorder::new(metadata, config.expected_samples());
        recorder.set_initial_state(&initial_state)?;

        Ok(Self {
            total_steps: config.total_steps,
            sampling_stride: config.sampling_stride,
            connectivity,
            dynamics,
            schedule,
            plasticity,
            window,
            guard,
            rng,
            setup_draws: 0,
            next: vec![0.0; n],
            input: vec![0.0; n],
            state: initial_state,
            recorder,
            time: 0,
            status: RunStatus::Initialized,
            failure: None,
            stats: RunStats::default(),
        })
    }

    /// Current lifecycle state
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Index of the next step to execute
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Current state
    pub fn state(&self) -> &[f32] {
        &self.state
    }

    /// Current connectivity
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Shared stimulation schedule
    pub fn schedule(&self) -> &Arc<StimulationSchedule> {
        &self.schedule
    }

    /// Counters so far
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Error that moved the driver to `Failed`
    pub fn failure(&self) -> Option<&EngineError> {
        self.failure.as_ref()
    }

    /// Execute one step.
    ///
    /// On error the driver moves to `Failed`, the state and connectivity are
    /// left at the last completed step and no further step is accepted.
    pub fn step(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(EngineError::RunFinished { status: self.status });
        }
        self.status = RunStatus::Running;

        match self.advance() {
            Ok(()) => {
                self.time += 1;
                self.stats.steps_completed = self.time;
                if self.time >= self.total_steps {
                    self.status = RunStatus::Completed;
                }
                Ok(())
            }
            Err(error) => {
                self.status = RunStatus::Failed;
                self.failure = Some(error.clone());
                Err(error)
            }
        }
    }

    fn advance(&mut self) -> Result<()> {
        let t = self.time;
        self.schedule.external_input(t, &mut self.input)?;

        let mut ctx = StepContext::new(t, &mut self.rng);
        self.dynamics
            .advance(&mut ctx, &self.state, &self.connectivity, &self.input, &mut self.next)?;
        self.schedule.apply_overrides(t, &mut self.next);
        self.guard.check(t, &self.next)?;

        if let (Some(plasticity), Some(window)) = (&self.plasticity, &mut self.window) {
            window.push(t, &self.next);
            let mut staged = self.connectivity.clone();
            let update = plasticity.apply(&mut staged, window)?;
            self.connectivity = staged;
            self.stats.plasticity_updates += 1;
            self.stats.edges_pruned += update.pruned as u64;
        }

        std::mem::swap(&mut self.state, &mut self.next);

        if let Some(fired) = self.dynamics.spikes() {
            self.recorder.record_spikes(t, fired)?;
        }
        if t % self.sampling_stride == 0 {
            self.recorder.append(t, &self.state)?;
        }
        Ok(())
    }

    /// Run all remaining steps
    pub fn run(self) -> std::result::Result<SimulationResult, RunFailure> {
        self.drive(None, |_, _| {})
    }

    /// Run until completion or until `cancel` is set, checked between steps
    pub fn run_until_cancelled(
        self,
        cancel: &CancelToken,
    ) -> std::result::Result<SimulationResult, RunFailure> {
        self.drive(Some(cancel), |_, _| {})
    }

    /// Like [`run_until_cancelled`](Self::run_until_cancelled), calling
    /// `progress(steps_done, total_steps)` after every step
    pub fn run_with_progress(
        self,
        cancel: Option<&CancelToken>,
        progress: impl FnMut(u64, u64),
    ) -> std::result::Result<SimulationResult, RunFailure> {
        self.drive(cancel, progress)
    }

    fn drive(
        mut self,
        cancel: Option<&CancelToken>,
        mut progress: impl FnMut(u64, u64),
    ) -> std::result::Result<SimulationResult, RunFailure> {
        info!(
            "Starting simulation: {} nodes, {} edges, {} steps, dynamics {}",
            self.connectivity.node_count(),
            self.connectivity.edge_count(),
            self.total_steps,
            self.dynamics.name()
        );
        let start = Instant::now();
        let report_every = (self.total_steps / 10).max(1);

        while !self.status.is_terminal() {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                self.status = RunStatus::Cancelled;
                warn!("Simulation cancelled after {} steps", self.time);
                break;
            }

            if let Err(error) = self.step() {
                warn!("Simulation failed at step {}: {}", self.time, error);
                self.stats.wall_clock = start.elapsed();
                return Err(self.into_failure(error));
            }

            progress(self.time, self.total_steps);
            if self.time % report_every == 0 {
                debug!(
                    "Simulation progress: {:.1}%",
                    self.time as f64 / self.total_steps as f64 * 100.0
                );
            }
        }

        self.stats.wall_clock = start.elapsed();
        if let Some(error) = self.failure.take() {
            return Err(self.into_failure(error));
        }
        let status = self.status;
        let result = self.finish(status);
        info!(
            "Simulation {:?} after {} steps in {:.2?}: {} samples",
            result.status,
            result.stats.steps_completed,
            result.stats.wall_clock,
            result.trajectory.len()
        );
        Ok(result)
    }

    fn finish(mut self, status: RunStatus) -> SimulationResult {
        self.stats.draws = self.setup_draws + self.rng.draws();
        let end_step = self.time;
        let final_edge_count = self.connectivity.edge_count();
        let trajectory = self.recorder.into_trajectory(|metadata| {
            metadata.end_step = end_step;
            metadata.final_edge_count = final_edge_count;
            metadata.status = status;
        });
        SimulationResult {
            status,
            trajectory,
            connectivity: self.connectivity,
            stats: self.stats,
        }
    }

    fn into_failure(self, error: EngineError) -> RunFailure {
        let steps_completed = self.time;
        let result = self.finish(RunStatus::Failed);
        RunFailure {
            error,
            trajectory: result.trajectory,
            steps_completed,
            wall_clock: result.stats.wall_clock,
        }
    }
}
