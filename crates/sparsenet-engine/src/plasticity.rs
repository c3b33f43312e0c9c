//! Activity-dependent weight adaptation

use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;

use crate::{connectivity::Connectivity, error::*};

/// Bounded trailing window of recent states, newest last
#[derive(Debug, Clone, PartialEq)]
pub struct StateWindow {
    capacity: usize,
    states: VecDeque<Vec<f32>>,
    latest_step: Option<u64>,
}

impl StateWindow {
    /// Window holding at most `capacity` states (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            states: VecDeque::with_capacity(capacity),
            latest_step: None,
        }
    }

    /// Copy `state`, produced by `step`, into the window, evicting the oldest
    pub fn push(&mut self, step: u64, state: &[f32]) {
        if self.states.len() == self.capacity {
            if let Some(mut recycled) = self.states.pop_front() {
                recycled.clear();
                recycled.extend_from_slice(state);
                self.states.push_back(recycled);
                self.latest_step = Some(step);
                return;
            }
        }
        self.states.push_back(state.to_vec());
        self.latest_step = Some(step);
    }

    /// State `lag` steps back from the newest (`lag = 0` is the newest)
    pub fn lagged(&self, lag: usize) -> Option<&[f32]> {
        let len = self.states.len();
        if lag >= len {
            return None;
        }
        self.states.get(len - 1 - lag).map(Vec::as_slice)
    }

    /// Newest state
    pub fn latest(&self) -> Option<&[f32]> {
        self.lagged(0)
    }

    /// Step that produced the newest state
    pub fn latest_step(&self) -> Option<u64> {
        self.latest_step
    }

    /// States oldest first
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.states.iter().map(Vec::as_slice)
    }

    /// Number of stored states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when no state has been pushed
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Maximum number of stored states
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Outcome of one plasticity update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlasticityStats {
    /// Edges whose weight changed
    pub updated: usize,
    /// Edges removed by pruning
    pub pruned: usize,
    /// Mean absolute weight change over all edges
    pub mean_abs_change: f64,
}

/// Weight update rule applied after each dynamics step
pub trait PlasticityRule: Debug + Send + Sync {
    /// Rule name for metadata and logs
    fn name(&self) -> &'static str;

    /// Minimum number of states the rule reads from the window
    fn window_len(&self) -> usize;

    /// Update weights in place; the edge set is left unchanged
    fn update(&self, connectivity: &mut Connectivity, window: &StateWindow) -> Result<PlasticityStats>;
}

/// Correlation-based magnitude update.
///
/// `|w| += rate * mean(post * pre) - decay * |w|`, clamped to `[0, w_max]`,
/// with the sign of each edge preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Hebbian {
    rate: f64,
    decay: f64,
    w_max: f64,
}

impl Hebbian {
    /// Create a Hebbian rule with validation
    pub fn new(rate: f64, decay: f64, w_max: f64) -> Result<Self> {
        if !(rate >= 0.0) || !rate.is_finite() {
            return Err(EngineError::invalid_spec("rate", rate, ">= 0"));
        }
        if !(0.0..=1.0).contains(&decay) {
            return Err(EngineError::invalid_spec("decay", decay, "in [0, 1]"));
        }
        if !(w_max > 0.0) || !w_max.is_finite() {
            return Err(EngineError::invalid_spec("w_max", w_max, "> 0"));
        }
        Ok(Self { rate, decay, w_max })
    }
}

impl PlasticityRule for Hebbian {
    fn name(&self) -> &'static str {
        "hebbian"
    }

    fn window_len(&self) -> usize {
        1
    }

    fn update(&self, connectivity: &mut Connectivity, window: &StateWindow) -> Result<PlasticityStats> {
        let samples = window.len();
        if samples == 0 {
            return Ok(PlasticityStats::default());
        }
        check_window(connectivity, window)?;

        let mut tally = Tally::default();
        connectivity.map_weights(|source, target, w| {
            let corr = window
                .iter()
                .map(|s| s[target.index()] as f64 * s[source.index()] as f64)
                .sum::<f64>()
                / samples as f64;
            let magnitude = w.abs() as f64;
            let next = (magnitude + self.rate * corr - self.decay * magnitude).clamp(0.0, self.w_max);
            tally.record(w, with_sign(w, next))
        });
        Ok(tally.finish(connectivity.edge_count()))
    }
}

/// Pair-based timing rule over lagged states.
///
/// For every lag `k` in the window, presynaptic activity `k` steps before
/// postsynaptic activity potentiates by `a_plus * exp(-k / tau)`; the
/// reverse order depresses by `a_minus * exp(-k / tau)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stdp {
    a_plus: f64,
    a_minus: f64,
    tau: f64,
    w_max: f64,
}

impl Stdp {
    /// Create a timing rule with validation
    pub fn new(a_plus: f64, a_minus: f64, tau: f64, w_max: f64) -> Result<Self> {
        if !(a_plus >= 0.0) {
            return Err(EngineError::invalid_spec("a_plus", a_plus, ">= 0"));
        }
        if !(a_minus >= 0.0) {
            return Err(EngineError::invalid_spec("a_minus", a_minus, ">= 0"));
        }
        if !(tau > 0.0) || !tau.is_finite() {
            return Err(EngineError::invalid_spec("tau", tau, "> 0"));
        }
        if !(w_max > 0.0) || !w_max.is_finite() {
            return Err(EngineError::invalid_spec("w_max", w_max, "> 0"));
        }
        Ok(Self {
            a_plus,
            a_minus,
            tau,
            w_max,
        })
    }

    fn kernel(&self, lag: usize) -> f64 {
        (-(lag as f64) / self.tau).exp()
    }
}

impl PlasticityRule for Stdp {
    fn name(&self) -> &'static str {
        "stdp"
    }

    fn window_len(&self) -> usize {
        2
    }

    fn update(&self, connectivity: &mut Connectivity, window: &StateWindow) -> Result<PlasticityStats> {
        let now = match window.latest() {
            Some(state) if window.len() >= 2 => state,
            _ => return Ok(PlasticityStats::default()),
        };
        check_window(connectivity, window)?;

        let kernels: Vec<f64> = (1..window.len()).map(|k| self.kernel(k)).collect();
        let mut tally = Tally::default();
        connectivity.map_weights(|source, target, w| {
            let (pre, post) = (source.index(), target.index());
            let mut dw = 0.0;
            for (k, kernel) in kernels.iter().enumerate() {
                let Some(past) = window.lagged(k + 1) else { break };
                dw += self.a_plus * kernel * past[pre] as f64 * now[post] as f64;
                dw -= self.a_minus * kernel * now[pre] as f64 * past[post] as f64;
            }
            let next = (w.abs() as f64 + dw).clamp(0.0, self.w_max);
            tally.record(w, with_sign(w, next))
        });
        Ok(tally.finish(connectivity.edge_count()))
    }
}

/// Structural removal of weak edges after an update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PruningPolicy {
    /// Edges with `|w| < threshold` are removed
    pub threshold: f32,
}

impl PruningPolicy {
    /// Remove edges below the threshold; returns the number removed
    pub fn apply(&self, connectivity: &mut Connectivity) -> usize {
        let threshold = self.threshold;
        connectivity.retain(|_, _, w| w.abs() >= threshold)
    }
}

/// Plasticity rule family as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlasticityKind {
    /// Correlation-based update
    Hebbian {
        /// Learning rate
        rate: f64,
        /// Relative magnitude decay per step
        #[serde(default)]
        decay: f64,
        /// Magnitude ceiling
        w_max: f64,
    },
    /// Timing-based update
    Stdp {
        /// Potentiation amplitude
        a_plus: f64,
        /// Depression amplitude
        a_minus: f64,
        /// Decay constant of the lag kernel, in steps
        tau: f64,
        /// Magnitude ceiling
        w_max: f64,
    },
}

/// Plasticity configuration: a rule plus optional pruning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlasticitySpec {
    /// Weight update rule
    pub rule: PlasticityKind,
    /// Edge removal; structure is fixed when absent
    #[serde(default)]
    pub pruning: Option<PruningPolicy>,
}

impl PlasticitySpec {
    /// Spec without pruning
    pub fn new(rule: PlasticityKind) -> Self {
        Self { rule, pruning: None }
    }

    /// Enable pruning below `threshold`
    pub fn with_pruning(mut self, threshold: f32) -> Self {
        self.pruning = Some(PruningPolicy { threshold });
        self
    }

    /// Check parameters without building
    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    /// Instantiate the configured rule
    pub fn build(&self) -> Result<Plasticity> {
        let rule: Box<dyn PlasticityRule> = match &self.rule {
            PlasticityKind::Hebbian { rate, decay, w_max } => {
                Box::new(Hebbian::new(*rate, *decay, *w_max)?)
            }
            PlasticityKind::Stdp {
                a_plus,
                a_minus,
                tau,
                w_max,
            } => Box::new(Stdp::new(*a_plus, *a_minus, *tau, *w_max)?),
        };
        if let Some(policy) = &self.pruning {
            if !(policy.threshold >= 0.0) || !policy.threshold.is_finite() {
                return Err(EngineError::invalid_spec(
                    "pruning.threshold",
                    policy.threshold,
                    ">= 0",
                ));
            }
        }
        Ok(Plasticity {
            rule,
            pruning: self.pruning,
        })
    }
}

/// A built rule together with its pruning policy
#[derive(Debug)]
pub struct Plasticity {
    rule: Box<dyn PlasticityRule>,
    pruning: Option<PruningPolicy>,
}

impl Plasticity {
    /// Wrap a custom rule
    pub fn new(rule: Box<dyn PlasticityRule>, pruning: Option<PruningPolicy>) -> Self {
        Self { rule, pruning }
    }

    /// Underlying rule
    pub fn rule(&self) -> &dyn PlasticityRule {
        self.rule.as_ref()
    }

    /// Window length needed, given the configured minimum
    pub fn window_len(&self, configured: usize) -> usize {
        configured.max(self.rule.window_len()).max(1)
    }

    /// True when edges may be removed
    pub fn prunes(&self) -> bool {
        self.pruning.is_some()
    }

    /// Update weights, reject non-finite results, then prune if configured
    pub fn apply(&self, connectivity: &mut Connectivity, window: &StateWindow) -> Result<PlasticityStats> {
        let mut stats = self.rule.update(connectivity, window)?;

        let step = window.latest_step().unwrap_or(0);
        for edge in connectivity.edges() {
            if !edge.weight.is_finite() {
                return Err(EngineError::NonFiniteWeight {
                    step,
                    source_node: edge.source.index(),
                    target_node: edge.target.index(),
                    value: edge.weight as f64,
                });
            }
        }

        if let Some(policy) = &self.pruning {
            stats.pruned = policy.apply(connectivity);
        }
        trace!(
            "{} update at step {}: {} changed, {} pruned, mean |dw| {:.3e}",
            self.rule.name(),
            step,
            stats.updated,
            stats.pruned,
            stats.mean_abs_change
        );
        Ok(stats)
    }
}

#[derive(Default)]
struct Tally {
    updated: usize,
    total_change: f64,
}

impl Tally {
    fn record(&mut self, old: f32, new: f32) -> f32 {
        if new != old {
            self.updated += 1;
            self.total_change += (new as f64 - old as f64).abs();
        }
        new
    }

    fn finish(self, edge_count: usize) -> PlasticityStats {
        PlasticityStats {
            updated: self.updated,
            pruned: 0,
            mean_abs_change: if edge_count > 0 {
                self.total_change / edge_count as f64
            } else {
                0.0
            },
        }
    }
}

fn with_sign(original: f32, magnitude: f64) -> f32 {
    let magnitude = magnitude as f32;
    if original < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

fn check_window(connectivity: &Connectivity, window: &StateWindow) -> Result<()> {
    for state in window.iter() {
        if state.len() != connectivity.node_count() {
            return Err(EngineError::dimension_mismatch(
                "plasticity window state",
                connectivity.node_count(),
                state.len(),
            ));
        }
    }
    Ok(())
}
