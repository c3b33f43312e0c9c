//! Time-indexed external stimulation

use serde::{Deserialize, Serialize};

use crate::{error::*, rng::RandomStream, NodeId};

/// What an event does to its targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// Added to the external input of each target, one value per target or a
    /// single value broadcast to all targets
    Input(Vec<f32>),
    /// Target state is set to this value after the dynamics step
    Override(f32),
}

/// One external perturbation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulationEvent {
    /// Step at which the event applies
    pub time: u64,
    /// Affected nodes
    pub targets: Vec<NodeId>,
    /// Effect on the targets
    pub payload: Payload,
}

impl StimulationEvent {
    /// Additive pulse of `amount` to a single node
    pub fn pulse(time: u64, node: NodeId, amount: f32) -> Self {
        Self {
            time,
            targets: vec![node],
            payload: Payload::Input(vec![amount]),
        }
    }

    /// Additive input, one value per target
    pub fn input(time: u64, targets: Vec<NodeId>, values: Vec<f32>) -> Self {
        Self {
            time,
            targets,
            payload: Payload::Input(values),
        }
    }

    /// Override of every target's state
    pub fn clamp(time: u64, targets: Vec<NodeId>, value: f32) -> Self {
        Self {
            time,
            targets,
            payload: Payload::Override(value),
        }
    }

    fn validate(&self, node_count: usize) -> Result<()> {
        for target in &self.targets {
            if target.index() >= node_count {
                return Err(EngineError::NodeOutOfRange {
                    node: target.index(),
                    node_count,
                });
            }
        }
        match &self.payload {
            Payload::Input(values) => {
                if values.len() != 1 && values.len() != self.targets.len() {
                    return Err(EngineError::dimension_mismatch(
                        format!("input payload at time {}", self.time),
                        self.targets.len(),
                        values.len(),
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(EngineError::invalid_spec(
                        "payload",
                        format!("{:?}", values),
                        "finite values",
                    ));
                }
            }
            Payload::Override(value) => {
                if !value.is_finite() {
                    return Err(EngineError::invalid_spec("payload", value, "finite value"));
                }
            }
        }
        Ok(())
    }
}

/// Ordered list of stimulation events.
///
/// Events are kept sorted by time; events sharing a time keep their insertion
/// order. The schedule is read-only during a run and can be shared by several
/// drivers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StimulationSchedule {
    node_count: usize,
    events: Vec<StimulationEvent>,
    reject_override_conflicts: bool,
}

impl StimulationSchedule {
    /// Empty schedule for a network of `node_count` nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            events: Vec::new(),
            reject_override_conflicts: false,
        }
    }

    /// Fail on two overrides of the same node at the same time
    pub fn with_conflict_rejection(mut self, reject: bool) -> Self {
        self.reject_override_conflicts = reject;
        self
    }

    /// Insert an event after all events with time <= its time
    pub fn push(&mut self, event: StimulationEvent) -> Result<()> {
        event.validate(self.node_count)?;

        if self.reject_override_conflicts {
            if let Payload::Override(_) = event.payload {
                for existing in self.events_at(event.time) {
                    if !matches!(existing.payload, Payload::Override(_)) {
                        continue;
                    }
                    if let Some(node) = event.targets.iter().find(|t| existing.targets.contains(t)) {
                        return Err(EngineError::ScheduleConflict {
                            time: event.time,
                            node: node.index(),
                        });
                    }
                }
                // duplicate targets inside one override event also conflict
                let mut seen = event.targets.clone();
                seen.sort_unstable();
                if let Some(w) = seen.windows(2).find(|w| w[0] == w[1]) {
                    return Err(EngineError::ScheduleConflict {
                        time: event.time,
                        node: w[0].index(),
                    });
                }
            }
        }

        let pos = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(pos, event);
        Ok(())
    }

    /// Insert several events in order
    pub fn extend(&mut self, events: impl IntoIterator<Item = StimulationEvent>) -> Result<()> {
        for event in events {
            self.push(event)?;
        }
        Ok(())
    }

    /// Events at time `t`, in insertion order
    pub fn events_at(&self, t: u64) -> impl Iterator<Item = &StimulationEvent> + '_ {
        let start = self.events.partition_point(|e| e.time < t);
        self.events[start..].iter().take_while(move |e| e.time == t)
    }

    /// All events, ordered by time
    pub fn events(&self) -> &[StimulationEvent] {
        &self.events
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when there are no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Node count the schedule was validated against
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Write the summed additive input for time `t` into `out`
    pub fn external_input(&self, t: u64, out: &mut [f64]) -> Result<()> {
        if out.len() != self.node_count {
            return Err(EngineError::dimension_mismatch(
                "external input",
                self.node_count,
                out.len(),
            ));
        }
        out.iter_mut().for_each(|x| *x = 0.0);
        for event in self.events_at(t) {
            if let Payload::Input(values) = &event.payload {
                for (i, target) in event.targets.iter().enumerate() {
                    let value = if values.len() == 1 { values[0] } else { values[i] };
                    out[target.index()] += value as f64;
                }
            }
        }
        Ok(())
    }

    /// Apply override events for time `t`; later events win
    pub fn apply_overrides(&self, t: u64, state: &mut [f32]) -> usize {
        let mut applied = 0;
        for event in self.events_at(t) {
            if let Payload::Override(value) = event.payload {
                for target in &event.targets {
                    if let Some(slot) = state.get_mut(target.index()) {
                        *slot = value;
                        applied += 1;
                    }
                }
            }
        }
        applied
    }

    /// True if any override event exists at `t`
    pub fn has_overrides_at(&self, t: u64) -> bool {
        self.events_at(t)
            .any(|e| matches!(e.payload, Payload::Override(_)))
    }
}

/// Stimulation pattern as configured; expanded into events at setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StimulusSpec {
    /// Single additive pulse
    Pulse {
        /// Step of the pulse
        time: u64,
        /// Affected nodes
        targets: Vec<NodeId>,
        /// Added input
        amount: f32,
    },
    /// Constant additive input over a window of steps
    Constant {
        /// Affected nodes
        targets: Vec<NodeId>,
        /// Added input per step
        amount: f32,
        /// First step
        start: u64,
        /// Number of steps
        duration: u64,
    },
    /// Independent Poisson pulse trains per target
    Poisson {
        /// Affected nodes
        targets: Vec<NodeId>,
        /// Expected pulses per step for each target
        rate: f64,
        /// Input added by each pulse
        amount: f32,
        /// First step
        start: u64,
        /// Number of steps
        duration: u64,
    },
    /// State override at one step
    Clamp {
        /// Step of the override
        time: u64,
        /// Affected nodes
        targets: Vec<NodeId>,
        /// Forced value
        value: f32,
    },
}

impl StimulusSpec {
    /// Materialize the pattern into explicit events.
    ///
    /// Windowed patterns stop at `total_steps`, so a run never materializes
    /// events it cannot reach. Only `Poisson` draws from the stream: per
    /// target, exponential inter-pulse intervals are accumulated from `start`
    /// until the window ends.
    pub fn expand(&self, total_steps: u64, rng: &mut RandomStream) -> Result<Vec<StimulationEvent>> {
        Ok(match self {
            Self::Pulse { time, targets, amount } => {
                vec![StimulationEvent::input(*time, targets.clone(), vec![*amount])]
            }
            Self::Constant {
                targets,
                amount,
                start,
                duration,
            } => (*start..window_end(*start, *duration, total_steps))
                .map(|t| StimulationEvent::input(t, targets.clone(), vec![*amount]))
                .collect(),
            Self::Poisson {
                targets,
                rate,
                amount,
                start,
                duration,
            } => {
                if !(*rate > 0.0) || !rate.is_finite() {
                    return Err(EngineError::invalid_spec("rate", rate, "> 0"));
                }
                let end = window_end(*start, *duration, total_steps) as f64;
                let mut events = Vec::new();
                for &target in targets {
                    let mut t = *start as f64 + rng.exponential(*rate);
                    while t < end {
                        events.push(StimulationEvent::pulse(t.floor() as u64, target, *amount));
                        t += rng.exponential(*rate);
                    }
                }
                events.sort_by_key(|e| e.time);
                events
            }
            Self::Clamp { time, targets, value } => {
                vec![StimulationEvent::clamp(*time, targets.clone(), *value)]
            }
        })
    }
}

fn window_end(start: u64, duration: u64, total_steps: u64) -> u64 {
    start.saturating_add(duration).min(total_steps)
}

/// Build a schedule for a run of `total_steps` from configured patterns, in
/// configuration order
pub fn build_schedule(
    node_count: usize,
    specs: &[StimulusSpec],
    total_steps: u64,
    reject_override_conflicts: bool,
    rng: &mut RandomStream,
) -> Result<StimulationSchedule> {
    let mut schedule =
        StimulationSchedule::new(node_count).with_conflict_rejection(reject_override_conflicts);
    for spec in specs {
        schedule.extend(spec.expand(total_steps, rng)?)?;
    }
    Ok(schedule)
}
