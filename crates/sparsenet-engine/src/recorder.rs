//! In-memory trajectory recording

use serde::{Deserialize, Serialize};

use crate::{config::SimulationConfig, driver::RunStatus, error::*, NodeId, ENGINE_VERSION};

/// One recorded snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Index of the step that produced the state
    pub time: u64,
    /// Copy of the state after that step
    pub state: Vec<f32>,
}

/// A node firing at a step, for rules with discrete spike events.
///
/// Spikes are recorded at every step regardless of the sampling stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Spike {
    /// Step at which the node fired
    pub time: u64,
    /// Node that fired
    pub node: NodeId,
}

/// Run description stored with every trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Engine version that produced the run
    pub engine_version: String,
    /// Full configuration of the run
    pub config: SimulationConfig,
    /// Seed of the root random stream
    pub seed: u64,
    /// First step index
    pub start_step: u64,
    /// Number of steps completed when the recorder was sealed
    pub end_step: u64,
    /// Steps between samples
    pub sampling_stride: u64,
    /// Number of nodes
    pub node_count: usize,
    /// Edge count after topology generation
    pub edge_count: usize,
    /// Edge count at the end of the run
    pub final_edge_count: usize,
    /// Dynamics rule name
    pub dynamics: String,
    /// Plasticity rule name, if enabled
    pub plasticity: Option<String>,
    /// Final run status
    pub status: RunStatus,
}

impl RunMetadata {
    /// Metadata for a run that has not started
    pub fn new(config: &SimulationConfig, edge_count: usize, dynamics: &str, plasticity: Option<&str>) -> Self {
        Self {
            engine_version: ENGINE_VERSION.to_string(),
            config: config.clone(),
            seed: config.seed,
            start_step: 0,
            end_step: 0,
            sampling_stride: config.sampling_stride,
            node_count: config.node_count,
            edge_count,
            final_edge_count: edge_count,
            dynamics: dynamics.to_string(),
            plasticity: plasticity.map(str::to_string),
            status: RunStatus::Initialized,
        }
    }
}

/// Sealed, time-ordered record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    metadata: RunMetadata,
    initial_state: Vec<f32>,
    samples: Vec<Sample>,
    #[serde(default)]
    spikes: Vec<Spike>,
}

impl Trajectory {
    /// Reassemble a trajectory, e.g. after import.
    ///
    /// Every state must have `metadata.node_count` entries and sample times
    /// must be strictly increasing.
    pub fn from_parts(metadata: RunMetadata, initial_state: Vec<f32>, samples: Vec<Sample>) -> Result<Self> {
        let n = metadata.node_count;
        if initial_state.len() != n {
            return Err(EngineError::dimension_mismatch("initial state", n, initial_state.len()));
        }
        for (i, sample) in samples.iter().enumerate() {
            if sample.state.len() != n {
                return Err(EngineError::dimension_mismatch(
                    format!("sample at time {}", sample.time),
                    n,
                    sample.state.len(),
                ));
            }
            if i > 0 && samples[i - 1].time >= sample.time {
                return Err(EngineError::invalid_spec(
                    "sample time",
                    sample.time,
                    format!("> {}", samples[i - 1].time),
                ));
            }
        }
        Ok(Self {
            metadata,
            initial_state,
            samples,
            spikes: Vec::new(),
        })
    }

    /// Attach a spike raster, ordered by time then node
    pub fn with_spikes(mut self, spikes: Vec<Spike>) -> Result<Self> {
        let n = self.node_count();
        for (i, spike) in spikes.iter().enumerate() {
            if spike.node.index() >= n {
                return Err(EngineError::NodeOutOfRange {
                    node: spike.node.index(),
                    node_count: n,
                });
            }
            if i > 0 && spikes[i - 1] >= *spike {
                return Err(EngineError::invalid_spec(
                    "spike order",
                    format!("node {} at time {}", spike.node, spike.time),
                    "sorted by time then node, without duplicates",
                ));
            }
        }
        self.spikes = spikes;
        Ok(self)
    }

    /// Run metadata
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// State before the first step
    pub fn initial_state(&self) -> &[f32] {
        &self.initial_state
    }

    /// Recorded samples in time order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Every recorded spike, ordered by time then node
    pub fn spikes(&self) -> &[Spike] {
        &self.spikes
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample was recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of nodes per state
    pub fn node_count(&self) -> usize {
        self.metadata.node_count
    }

    /// Sample times
    pub fn times(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// State recorded at `time`, if sampled
    pub fn state_at(&self, time: u64) -> Option<&[f32]> {
        self.samples
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| self.samples[i].state.as_slice())
    }

    /// Value of one node across all samples
    pub fn node_series(&self, node: usize) -> Option<Vec<f32>> {
        if node >= self.node_count() {
            return None;
        }
        Some(self.samples.iter().map(|s| s.state[node]).collect())
    }

    /// Split into metadata, initial state, samples and spikes
    pub fn into_parts(self) -> (RunMetadata, Vec<f32>, Vec<Sample>, Vec<Spike>) {
        (self.metadata, self.initial_state, self.samples, self.spikes)
    }
}

/// Accumulates samples for one run until sealed
#[derive(Debug)]
pub struct Recorder {
    metadata: RunMetadata,
    initial_state: Vec<f32>,
    samples: Vec<Sample>,
    spikes: Vec<Spike>,
    sealed: bool,
}

impl Recorder {
    /// Create a recorder expecting about `capacity_hint` samples
    pub fn new(metadata: RunMetadata, capacity_hint: usize) -> Self {
        let n = metadata.node_count;
        Self {
            metadata,
            initial_state: vec![0.0; n],
            samples: Vec::with_capacity(capacity_hint),
            spikes: Vec::new(),
            sealed: false,
        }
    }

    /// Store a copy of the state before the first step
    pub fn set_initial_state(&mut self, state: &[f32]) -> Result<()> {
        if self.sealed {
            return Err(EngineError::SealedRecorder { time: 0 });
        }
        self.check_len("initial state", state.len())?;
        self.initial_state.clear();
        self.initial_state.extend_from_slice(state);
        Ok(())
    }

    /// Copy `state` into the trajectory at `time`
    pub fn append(&mut self, time: u64, state: &[f32]) -> Result<()> {
        if self.sealed {
            return Err(EngineError::SealedRecorder { time });
        }
        self.check_len("recorded state", state.len())?;
        if let Some(last) = self.samples.last() {
            if time <= last.time {
                return Err(EngineError::invalid_spec(
                    "sample time",
                    time,
                    format!("> {}", last.time),
                ));
            }
        }
        self.samples.push(Sample {
            time,
            state: state.to_vec(),
        });
        Ok(())
    }

    /// Record the nodes set in `fired` as spikes at `time`
    pub fn record_spikes(&mut self, time: u64, fired: &[bool]) -> Result<()> {
        if self.sealed {
            return Err(EngineError::SealedRecorder { time });
        }
        self.check_len("spike mask", fired.len())?;
        if let Some(last) = self.spikes.last() {
            if time <= last.time && fired.contains(&true) {
                return Err(EngineError::invalid_spec(
                    "spike time",
                    time,
                    format!("> {}", last.time),
                ));
            }
        }
        self.spikes.extend(
            fired
                .iter()
                .enumerate()
                .filter(|(_, f)| **f)
                .map(|(i, _)| Spike {
                    time,
                    node: NodeId::from_index(i),
                }),
        );
        Ok(())
    }

    /// Number of samples so far
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True after [`Recorder::seal`]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Finalize and hand out the trajectory; later calls fail
    pub fn seal(&mut self) -> Result<Trajectory> {
        if self.sealed {
            return Err(EngineError::SealedRecorder {
                time: self.metadata.end_step,
            });
        }
        self.sealed = true;
        Ok(Trajectory {
            metadata: self.metadata.clone(),
            initial_state: std::mem::take(&mut self.initial_state),
            samples: std::mem::take(&mut self.samples),
            spikes: std::mem::take(&mut self.spikes),
        })
    }

    /// Seal by value, letting `finalize` record the outcome in the metadata
    /// first. A recorder that was already sealed yields its metadata with no
    /// samples.
    pub fn into_trajectory(mut self, finalize: impl FnOnce(&mut RunMetadata)) -> Trajectory {
        finalize(&mut self.metadata);
        if self.sealed {
            self.samples.clear();
            self.spikes.clear();
        }
        Trajectory {
            metadata: self.metadata,
            initial_state: self.initial_state,
            samples: self.samples,
            spikes: self.spikes,
        }
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.metadata.node_count {
            return Err(EngineError::dimension_mismatch(what, self.metadata.node_count, len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DynamicsSpec, TopologySpec, WeightSpec};

    fn metadata(n: usize) -> RunMetadata {
        let config = SimulationConfig::new(
            n,
            TopologySpec::UniformRandom { density: 0.0 },
            WeightSpec::Fixed { scale: 1.0 },
            DynamicsSpec::LeakyIntegrator { leak: 0.0 },
            10,
            1,
        );
        RunMetadata::new(&config, 0, "leaky_integrator", None)
    }

    #[test]
    fn test_append_copies_state() {
        let mut rec = Recorder::new(metadata(2), 4);
        let mut buffer = vec![1.0f32, 2.0];
        rec.append(0, &buffer).unwrap();
        buffer[0] = 99.0;
        rec.append(1, &buffer).unwrap();

        let traj = rec.seal().unwrap();
        assert_eq!(traj.samples()[0].state, vec![1.0, 2.0]);
        assert_eq!(traj.state_at(1), Some(&[99.0f32, 2.0][..]));
        assert_eq!(traj.node_series(0), Some(vec![1.0, 99.0]));
    }

    #[test]
    fn test_sealed_recorder_rejects_appends() {
        let mut rec = Recorder::new(metadata(1), 0);
        rec.append(0, &[0.5]).unwrap();
        let traj = rec.seal().unwrap();
        let snapshot = traj.clone();

        assert_eq!(
            rec.append(1, &[1.0]).unwrap_err(),
            EngineError::SealedRecorder { time: 1 }
        );
        assert!(matches!(rec.seal(), Err(EngineError::SealedRecorder { .. })));
        assert!(rec.is_sealed());
        assert_eq!(traj, snapshot);
        assert_eq!(traj.len(), 1);
    }

    #[test]
    fn test_append_validates_shape_and_order() {
        let mut rec = Recorder::new(metadata(2), 0);
        assert!(matches!(
            rec.append(0, &[1.0]),
            Err(EngineError::DimensionMismatch { .. })
        ));
        rec.append(5, &[1.0, 1.0]).unwrap();
        assert!(rec.append(5, &[1.0, 1.0]).is_err());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_spike_raster() {
        let mut rec = Recorder::new(metadata(3), 0);
        rec.record_spikes(0, &[false, true, true]).unwrap();
        rec.record_spikes(1, &[false, false, false]).unwrap();
        rec.record_spikes(2, &[true, false, false]).unwrap();
        assert!(rec.record_spikes(2, &[true, false, false]).is_err());
        assert!(matches!(
            rec.record_spikes(3, &[true]),
            Err(EngineError::DimensionMismatch { .. })
        ));

        let traj = rec.seal().unwrap();
        let fired: Vec<(u64, u32)> = traj.spikes().iter().map(|s| (s.time, s.node.raw())).collect();
        assert_eq!(fired, vec![(0, 1), (0, 2), (2, 0)]);
        assert_eq!(
            rec.record_spikes(4, &[true, false, false]),
            Err(EngineError::SealedRecorder { time: 4 })
        );
    }

    #[test]
    fn test_with_spikes_validation() {
        let base = Trajectory::from_parts(metadata(2), vec![0.0, 0.0], vec![]).unwrap();
        let spike = |time, node| Spike {
            time,
            node: NodeId::new(node),
        };
        assert!(base.clone().with_spikes(vec![spike(0, 1), spike(3, 0)]).is_ok());
        assert!(base.clone().with_spikes(vec![spike(3, 0), spike(0, 1)]).is_err());
        assert!(matches!(
            base.with_spikes(vec![spike(0, 2)]),
            Err(EngineError::NodeOutOfRange { node: 2, node_count: 2 })
        ));
    }

    #[test]
    fn test_from_parts_validation() {
        let ok = Trajectory::from_parts(
            metadata(1),
            vec![0.0],
            vec![
                Sample { time: 0, state: vec![1.0] },
                Sample { time: 2, state: vec![2.0] },
            ],
        )
        .unwrap();
        assert_eq!(ok.times(), vec![0, 2]);

        let unordered = Trajectory::from_parts(
            metadata(1),
            vec![0.0],
            vec![
                Sample { time: 2, state: vec![1.0] },
                Sample { time: 1, state: vec![2.0] },
            ],
        );
        assert!(unordered.is_err());
        assert!(Trajectory::from_parts(metadata(2), vec![0.0], vec![]).is_err());
    }
}
