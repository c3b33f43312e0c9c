//! Pluggable per-step dynamics rules
//!
//! Every rule computes the next activation vector from the current one, the
//! connectivity and the external input. The recurrent drive `W · s` is always
//! the sparse product from [`Connectivity::mul_vec`], accumulated in f64.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;

use crate::{connectivity::Connectivity, error::*, rng::RandomStream};

/// Per-step context handed to a rule by the driver
#[derive(Debug)]
pub struct StepContext<'a> {
    /// Index of the step being computed
    pub step: u64,
    /// The run's random stream
    pub rng: &'a mut RandomStream,
}

impl<'a> StepContext<'a> {
    /// Create a new step context
    pub fn new(step: u64, rng: &'a mut RandomStream) -> Self {
        Self { step, rng }
    }
}

/// Transition function from one state to the next
pub trait DynamicsRule: Debug + Send + Sync {
    /// Short identifier recorded in run metadata
    fn name(&self) -> &'static str;

    /// Write the next state into `next`.
    ///
    /// `state`, `input` and `next` all have length `connectivity.node_count()`.
    fn advance(
        &mut self,
        ctx: &mut StepContext<'_>,
        state: &[f32],
        connectivity: &Connectivity,
        input: &[f64],
        next: &mut [f32],
    ) -> Result<()>;

    /// Nodes that fired during the last [`advance`](Self::advance), for rules
    /// with discrete spike events
    fn spikes(&self) -> Option<&[bool]> {
        None
    }
}

/// How the linear-threshold rule maps drive to activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// 1 when the drive exceeds the cutoff, else 0
    #[default]
    Step,
    /// The drive itself when it exceeds the cutoff, else 0
    Rectified,
}

/// Dynamics family and parameters, as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DynamicsSpec {
    /// `next = threshold(W · s + input)`
    LinearThreshold {
        /// Activation cutoff
        cutoff: f64,
        /// Output mapping
        #[serde(default)]
        mode: ThresholdMode,
    },
    /// `next = (1 - leak) * s + W · s + input`
    LeakyIntegrator {
        /// Leak factor in [0, 1]
        leak: f64,
    },
    /// Node becomes active with probability `logistic(gain * (W · s + input - bias))`
    StochasticBinary {
        /// Slope of the logistic
        gain: f64,
        /// Drive at which the activation probability is one half
        #[serde(default)]
        bias: f64,
    },
    /// Pulse-coupled leaky integrate-and-fire units in phase representation
    PhaseOscillator {
        /// Constant driving current (threshold reached when current > 1)
        current: f64,
        /// Leak rate of the membrane
        gamma: f64,
        /// Phase advance per step
        dt: f64,
        /// Steps between a spike and its arrival at the targets
        #[serde(default)]
        delay_steps: usize,
    },
}

impl DynamicsSpec {
    /// Check parameters and build the rule
    pub fn build(&self) -> Result<Box<dyn DynamicsRule>> {
        Ok(match self {
            Self::LinearThreshold { cutoff, mode } => Box::new(LinearThreshold::new(*cutoff, *mode)?),
            Self::LeakyIntegrator { leak } => Box::new(LeakyIntegrator::new(*leak)?),
            Self::StochasticBinary { gain, bias } => Box::new(StochasticBinary::new(*gain, *bias)?),
            Self::PhaseOscillator {
                current,
                gamma,
                dt,
                delay_steps,
            } => Box::new(PhaseOscillator::new(*current, *gamma, *dt)?.with_delay(*delay_steps)),
        })
    }

    /// Validate without building
    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }
}

fn check_finite(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::invalid_spec(parameter, value, "finite"));
    }
    Ok(())
}

fn check_dims(connectivity: &Connectivity, state: &[f32], input: &[f64], next: &[f32]) -> Result<()> {
    let n = connectivity.node_count();
    for (what, len) in [("state", state.len()), ("input", input.len()), ("next", next.len())] {
        if len != n {
            return Err(EngineError::dimension_mismatch(what, n, len));
        }
    }
    Ok(())
}

/// Recurrent drive `W · s + input`
fn drive(state: &[f32], connectivity: &Connectivity, input: &[f64]) -> Result<Vec<f64>> {
    let mut acc = vec![0.0f64; state.len()];
    connectivity.mul_vec(state, &mut acc)?;
    for (a, &x) in acc.iter_mut().zip(input) {
        *a += x;
    }
    Ok(acc)
}

/// Thresholded linear rule
#[derive(Debug, Clone, PartialEq)]
pub struct LinearThreshold {
    cutoff: f64,
    mode: ThresholdMode,
}

impl LinearThreshold {
    /// Create a linear-threshold rule
    pub fn new(cutoff: f64, mode: ThresholdMode) -> Result<Self> {
        check_finite("cutoff", cutoff)?;
        Ok(Self { cutoff, mode })
    }
}

impl DynamicsRule for LinearThreshold {
    fn name(&self) -> &'static str {
        "linear_threshold"
    }

    fn advance(
        &mut self,
        _ctx: &mut StepContext<'_>,
        state: &[f32],
        connectivity: &Connectivity,
        input: &[f64],
        next: &mut [f32],
    ) -> Result<()> {
        check_dims(connectivity, state, input, next)?;
        let u = drive(state, connectivity, input)?;
        for (out, &x) in next.iter_mut().zip(&u) {
            *out = match (x > self.cutoff, self.mode) {
                (true, ThresholdMode::Step) => 1.0,
                (true, ThresholdMode::Rectified) => x as f32,
                (false, _) => 0.0,
            };
        }
        Ok(())
    }
}

/// Leaky integrator rule
#[derive(Debug, Clone, PartialEq)]
pub struct LeakyIntegrator {
    leak: f64,
}

impl LeakyIntegrator {
    /// Create a leaky integrator with `leak` in [0, 1]
    pub fn new(leak: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&leak) {
            return Err(EngineError::invalid_spec("leak", leak, "in [0, 1]"));
        }
        Ok(Self { leak })
    }
}

impl DynamicsRule for LeakyIntegrator {
    fn name(&self) -> &'static str {
        "leaky_integrator"
    }

    fn advance(
        &mut self,
        _ctx: &mut StepContext<'_>,
        state: &[f32],
        connectivity: &Connectivity,
        input: &[f64],
        next: &mut [f32],
    ) -> Result<()> {
        check_dims(connectivity, state, input, next)?;
        let u = drive(state, connectivity, input)?;
        let retain = 1.0 - self.leak;
        for ((out, &s), &x) in next.iter_mut().zip(state).zip(&u) {
            *out = (retain * s as f64 + x) as f32;
        }
        Ok(())
    }
}

/// Stochastic binary units with logistic activation probability
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticBinary {
    gain: f64,
    bias: f64,
}

impl StochasticBinary {
    /// Create a stochastic binary rule
    pub fn new(gain: f64, bias: f64) -> Result<Self> {
        check_finite("gain", gain)?;
        check_finite("bias", bias)?;
        Ok(Self { gain, bias })
    }

    /// Activation probability for a given drive
    pub fn probability(&self, drive: f64) -> f64 {
        1.0 / (1.0 + (-self.gain * (drive - self.bias)).exp())
    }
}

impl DynamicsRule for StochasticBinary {
    fn name(&self) -> &'static str {
        "stochastic_binary"
    }

    fn advance(
        &mut self,
        ctx: &mut StepContext<'_>,
        state: &[f32],
        connectivity: &Connectivity,
        input: &[f64],
        next: &mut [f32],
    ) -> Result<()> {
        check_dims(connectivity, state, input, next)?;
        let u = drive(state, connectivity, input)?;
        // one draw per node, in node index order
        for (out, &x) in next.iter_mut().zip(&u) {
            *out = if ctx.rng.uniform() < self.probability(x) {
                1.0
            } else {
                0.0
            };
        }
        Ok(())
    }
}

/// Leaky integrate-and-fire units in phase representation.
///
/// Each step the phases advance freely by `dt` plus the external input. Units
/// whose phase reaches 1 fire and reset to 0. Spikes reach their targets
/// `delay_steps` steps later; every receiving unit's phase then jumps by the
/// transfer function `H(phi, eps) = -ln(exp(-gamma*phi) - gamma/current*eps) / gamma`.
/// Inhibitory input can push phases below 0. A jump past threshold leaves the
/// phase at 1 so the unit fires next step.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOscillator {
    current: f64,
    gamma: f64,
    dt: f64,
    delay_steps: usize,
    in_flight: VecDeque<Vec<bool>>,
    fired: Vec<bool>,
}

impl PhaseOscillator {
    /// Create a phase oscillator rule with immediate spike delivery
    pub fn new(current: f64, gamma: f64, dt: f64) -> Result<Self> {
        if !(current > 0.0) || !current.is_finite() {
            return Err(EngineError::invalid_spec("current", current, "> 0"));
        }
        if !(gamma > 0.0) || !gamma.is_finite() {
            return Err(EngineError::invalid_spec("gamma", gamma, "> 0"));
        }
        if !(dt > 0.0 && dt < 1.0) {
            return Err(EngineError::invalid_spec("dt", dt, "in (0, 1)"));
        }
        Ok(Self {
            current,
            gamma,
            dt,
            delay_steps: 0,
            in_flight: VecDeque::new(),
            fired: Vec::new(),
        })
    }

    /// Deliver spikes `delay_steps` steps after they are emitted
    pub fn with_delay(mut self, delay_steps: usize) -> Self {
        self.delay_steps = delay_steps;
        self
    }

    /// Configured synaptic delay in steps
    pub fn delay_steps(&self) -> usize {
        self.delay_steps
    }

    /// Phase after a potential jump of `eps`
    pub fn transfer(&self, phase: f64, eps: f64) -> f64 {
        let arg = (-self.gamma * phase).exp() - self.gamma / self.current * eps;
        if arg <= 0.0 {
            return 1.0;
        }
        -arg.ln() / self.gamma
    }
}

impl DynamicsRule for PhaseOscillator {
    fn name(&self) -> &'static str {
        "phase_oscillator"
    }

    fn advance(
        &mut self,
        _ctx: &mut StepContext<'_>,
        state: &[f32],
        connectivity: &Connectivity,
        input: &[f64],
        next: &mut [f32],
    ) -> Result<()> {
        check_dims(connectivity, state, input, next)?;

        let advanced: Vec<f64> = state
            .iter()
            .zip(input)
            .map(|(&phi, &x)| phi as f64 + self.dt + x)
            .collect();
        self.fired.clear();
        self.fired.extend(advanced.iter().map(|&phi| phi >= 1.0));
        self.in_flight.push_back(self.fired.clone());

        let mut eps = vec![0.0f64; state.len()];
        if self.in_flight.len() > self.delay_steps {
            if let Some(arriving) = self.in_flight.pop_front() {
                connectivity.mul_mask(&arriving, &mut eps)?;
            }
        }

        for (i, out) in next.iter_mut().enumerate() {
            *out = if self.fired[i] {
                0.0
            } else if eps[i] != 0.0 {
                self.transfer(advanced[i], eps[i]).min(1.0) as f32
            } else {
                advanced[i] as f32
            };
        }
        Ok(())
    }

    fn spikes(&self) -> Option<&[bool]> {
        Some(&self.fired)
    }
}

/// Magnitude guard applied after each dynamics step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StabilityGuard {
    bound: Option<f64>,
}

impl StabilityGuard {
    /// Guard with the given bound; `None` disables the check
    pub fn new(bound: Option<f64>) -> Result<Self> {
        if let Some(b) = bound {
            if !(b > 0.0) {
                return Err(EngineError::invalid_spec("instability_bound", b, "> 0"));
            }
        }
        Ok(Self { bound })
    }

    /// The configured bound
    pub fn bound(&self) -> Option<f64> {
        self.bound
    }

    /// Fail on the first value that is non-finite or exceeds the bound
    pub fn check(&self, step: u64, state: &[f32]) -> Result<()> {
        let Some(bound) = self.bound else {
            return Ok(());
        };
        match state
            .iter()
            .position(|&v| !v.is_finite() || (v as f64).abs() > bound)
        {
            Some(node) => Err(EngineError::NumericalInstability {
                step,
                node,
                value: state[node] as f64,
                bound,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connectivity::Edge, NodeId};

    fn ctx(rng: &mut RandomStream) -> StepContext<'_> {
        StepContext::new(0, rng)
    }

    fn pair(weight: f32) -> Connectivity {
        Connectivity::from_edges(
            2,
            vec![Edge::new(NodeId::new(0), NodeId::new(1), weight)],
        )
        .unwrap()
    }

    #[test]
    fn test_spec_validation() {
        assert!(DynamicsSpec::LeakyIntegrator { leak: 1.5 }.validate().is_err());
        assert!(DynamicsSpec::LeakyIntegrator { leak: 0.3 }.validate().is_ok());
        assert!(DynamicsSpec::PhaseOscillator { current: 4.0, gamma: 1.0, dt: 1.5, delay_steps: 0 }
            .validate()
            .is_err());
        assert!(DynamicsSpec::StochasticBinary { gain: f64::NAN, bias: 0.0 }
            .validate()
            .is_err());
    }

    #[test]
    fn test_linear_threshold_step() {
        let mut rng = RandomStream::new(0);
        let mut rule = LinearThreshold::new(0.5, ThresholdMode::Step).unwrap();
        let mut next = [0.0f32; 2];
        rule.advance(&mut ctx(&mut rng), &[1.0, 0.0], &pair(1.0), &[0.0, 0.0], &mut next)
            .unwrap();
        assert_eq!(next, [0.0, 1.0]);
    }

    #[test]
    fn test_linear_threshold_rectified() {
        let mut rng = RandomStream::new(0);
        let mut rule = LinearThreshold::new(0.5, ThresholdMode::Rectified).unwrap();
        let mut next = [0.0f32; 2];
        rule.advance(&mut ctx(&mut rng), &[1.0, 0.0], &pair(2.0), &[0.75, 0.0], &mut next)
            .unwrap();
        assert_eq!(next, [0.75, 2.0]);
    }

    #[test]
    fn test_leaky_integrator() {
        let mut rng = RandomStream::new(0);
        let mut rule = LeakyIntegrator::new(0.5).unwrap();
        let mut next = [0.0f32; 2];
        rule.advance(&mut ctx(&mut rng), &[2.0, 1.0], &pair(0.25), &[0.0, 1.0], &mut next)
            .unwrap();
        // node 0: 0.5 * 2; node 1: 0.5 * 1 + 0.25 * 2 + 1
        assert_eq!(next, [1.0, 2.0]);
    }

    #[test]
    fn test_leaky_integrator_identity_without_leak() {
        let mut rng = RandomStream::new(0);
        let mut rule = LeakyIntegrator::new(0.0).unwrap();
        let empty = Connectivity::empty(3);
        let mut next = [0.0f32; 3];
        rule.advance(&mut ctx(&mut rng), &[0.1, -0.2, 0.3], &empty, &[0.0; 3], &mut next)
            .unwrap();
        assert_eq!(next, [0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_stochastic_binary_reproducible() {
        let c = Connectivity::empty(64);
        let state = vec![0.0f32; 64];
        let input = vec![0.0f64; 64];

        let run = |seed| {
            let mut rule = StochasticBinary::new(4.0, 0.0).unwrap();
            let mut rng = RandomStream::new(seed);
            let mut next = vec![0.0f32; 64];
            rule.advance(&mut ctx(&mut rng), &state, &c, &input, &mut next)
                .unwrap();
            (next, rng.draws())
        };

        let (a, draws) = run(17);
        let (b, _) = run(17);
        assert_eq!(a, b);
        assert_eq!(draws, 64);
        assert!(a.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_stochastic_binary_probability() {
        let rule = StochasticBinary::new(2.0, 1.0).unwrap();
        assert!((rule.probability(1.0) - 0.5).abs() < 1e-12);
        assert!(rule.probability(10.0) > 0.99);
        assert!(rule.probability(-10.0) < 0.01);
    }

    #[test]
    fn test_phase_oscillator_fires_and_resets() {
        let mut rng = RandomStream::new(0);
        let mut rule = PhaseOscillator::new(4.0, 1.0, 0.1).unwrap();
        let c = Connectivity::from_edges(
            3,
            vec![
                Edge::new(NodeId::new(0), NodeId::new(1), -0.2),
                Edge::new(NodeId::new(0), NodeId::new(2), 0.2),
            ],
        )
        .unwrap();
        let mut next = [0.0f32; 3];
        rule.advance(&mut ctx(&mut rng), &[0.95, 0.5, 0.5], &c, &[0.0; 3], &mut next)
            .unwrap();

        assert_eq!(next[0], 0.0);
        // inhibitory pulse delays node 1, excitatory pulse advances node 2
        assert!((next[1] as f64) < 0.6);
        assert!((next[2] as f64) > 0.6);
        assert_eq!(rule.spikes(), Some(&[true, false, false][..]));
    }

    #[test]
    fn test_phase_inhibition_goes_below_zero() {
        let rule = PhaseOscillator::new(4.0, 1.0, 0.1).unwrap();
        let expected = -((-0.1f64).exp() + 0.25).ln();
        assert!((rule.transfer(0.1, -1.0) - expected).abs() < 1e-12);
        assert!((rule.transfer(0.1, -1.0) + 0.14396).abs() < 1e-5);

        let mut rng = RandomStream::new(0);
        let mut rule = rule;
        let c = Connectivity::from_edges(2, vec![Edge::new(NodeId::new(0), NodeId::new(1), -1.0)])
            .unwrap();
        let mut next = [0.0f32; 2];
        rule.advance(&mut ctx(&mut rng), &[0.95, 0.0], &c, &[0.0; 2], &mut next)
            .unwrap();
        assert!(next[1] < 0.0, "phase {} was clamped", next[1]);
    }

    #[test]
    fn test_phase_spikes_arrive_after_delay() {
        let c = Connectivity::from_edges(2, vec![Edge::new(NodeId::new(0), NodeId::new(1), 0.2)])
            .unwrap();
        let mut rule = PhaseOscillator::new(4.0, 1.0, 0.1).unwrap().with_delay(2);
        let mut rng = RandomStream::new(0);
        let mut state = [0.95f32, 0.0];
        let mut next = [0.0f32; 2];

        // node 0 fires at step 0; node 1 drifts freely until step 2
        let mut phases = Vec::new();
        for step in 0..3 {
            rule.advance(&mut StepContext::new(step, &mut rng), &state, &c, &[0.0; 2], &mut next)
                .unwrap();
            state = next;
            phases.push(state[1] as f64);
        }
        assert!((phases[0] - 0.1).abs() < 1e-6);
        assert!((phases[1] - 0.2).abs() < 1e-6);
        let free = 0.3;
        assert!((phases[2] - rule.transfer(free, 0.2)).abs() < 1e-6);
        assert!(phases[2] > free + 1e-3);
    }

    #[test]
    fn test_phase_transfer_saturates() {
        let rule = PhaseOscillator::new(1.0, 1.0, 0.1).unwrap();
        assert_eq!(rule.transfer(0.9, 5.0), 1.0);
        assert!((rule.transfer(0.3, 0.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_stability_guard() {
        let guard = StabilityGuard::new(Some(10.0)).unwrap();
        assert!(guard.check(0, &[1.0, -9.0]).is_ok());
        assert_eq!(
            guard.check(4, &[1.0, -11.0]),
            Err(EngineError::NumericalInstability {
                step: 4,
                node: 1,
                value: -11.0,
                bound: 10.0
            })
        );
        assert!(guard.check(0, &[f32::NAN]).is_err());

        let disabled = StabilityGuard::new(None).unwrap();
        assert!(disabled.check(0, &[f32::INFINITY]).is_ok());
        assert!(StabilityGuard::new(Some(0.0)).is_err());
    }
}
