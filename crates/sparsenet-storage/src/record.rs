//! Self-describing trajectory export
//!
//! Two encodings carry the same [`TrajectoryRecord`]:
//! - JSON, human readable, one object with all fields
//! - bincode, prefixed by magic `SNTR` and a little-endian u32 version
//!
//! JSON has no representation for infinities or NaN, so records holding
//! non-finite states are only written as bincode.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sparsenet_engine::{RunFailure, RunMetadata, Sample, SimulationResult, Spike, Trajectory};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    error::{Result, StorageError},
    magic,
    schemas::{validate_magic, validate_version, ByteReader},
    TRAJECTORY_FORMAT, TRAJECTORY_VERSION,
};

/// On-disk encoding of a trajectory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON
    Json,
    /// Magic-prefixed bincode
    Bincode,
}

impl Format {
    /// Infer the format from a file extension (`.json`, `.bin`, `.bincode`)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.parse(),
            None => Err(StorageError::invalid_format(format!(
                "Cannot infer format of {}: no extension",
                path.display()
            ))),
        }
    }

    /// Canonical file extension
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bincode => "bin",
        }
    }
}

impl FromStr for Format {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bin" | "bincode" => Ok(Self::Bincode),
            other => Err(StorageError::invalid_format(format!("Unknown format '{}'", other))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Bincode => write!(f, "bincode"),
        }
    }
}

/// Everything downstream tooling needs without re-running the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Format name, always `sparsenet-trajectory`
    pub format: String,
    /// Record layout version
    pub format_version: u32,
    /// Run metadata including the full configuration
    pub metadata: RunMetadata,
    /// Wall-clock duration of the stepping loop
    pub wall_clock_ms: f64,
    /// Steps completed before the run ended
    pub steps_completed: u64,
    /// State before the first step
    pub initial_state: Vec<f32>,
    /// Recorded samples in time order
    pub samples: Vec<Sample>,
    /// Spike raster, every step, ordered by time then node
    #[serde(default)]
    pub spikes: Vec<Spike>,
}

impl TrajectoryRecord {
    /// Record from a sealed trajectory
    pub fn new(trajectory: &Trajectory, wall_clock: Duration, steps_completed: u64) -> Self {
        Self {
            format: TRAJECTORY_FORMAT.to_string(),
            format_version: TRAJECTORY_VERSION,
            metadata: trajectory.metadata().clone(),
            wall_clock_ms: wall_clock.as_secs_f64() * 1000.0,
            steps_completed,
            initial_state: trajectory.initial_state().to_vec(),
            samples: trajectory.samples().to_vec(),
            spikes: trajectory.spikes().to_vec(),
        }
    }

    /// Record of a completed or cancelled run
    pub fn from_result(result: &SimulationResult) -> Self {
        Self::new(
            &result.trajectory,
            result.stats.wall_clock,
            result.stats.steps_completed,
        )
    }

    /// Record of a failed run's partial trajectory
    pub fn from_failure(failure: &RunFailure) -> Self {
        Self::new(&failure.trajectory, failure.wall_clock, failure.steps_completed)
    }

    /// Rebuild the trajectory, validating shapes, sample and spike order
    pub fn into_trajectory(self) -> Result<Trajectory> {
        Ok(Trajectory::from_parts(self.metadata, self.initial_state, self.samples)?
            .with_spikes(self.spikes)?)
    }

    /// First non-finite state value, as `(time, node)`; `None` time is the
    /// initial state
    pub fn first_non_finite(&self) -> Option<(Option<u64>, usize)> {
        if let Some(node) = self.initial_state.iter().position(|v| !v.is_finite()) {
            return Some((None, node));
        }
        self.samples.iter().find_map(|sample| {
            sample
                .state
                .iter()
                .position(|v| !v.is_finite())
                .map(|node| (Some(sample.time), node))
        })
    }

    fn check_header(&self) -> Result<()> {
        if self.format != TRAJECTORY_FORMAT {
            return Err(StorageError::invalid_format(format!(
                "Unexpected record format '{}'",
                self.format
            )));
        }
        validate_version(self.format_version, TRAJECTORY_VERSION)
    }
}

/// Bincode body; metadata travels as JSON because its tagged enums need a
/// self-describing encoding
#[derive(Serialize, Deserialize)]
struct BinaryBody {
    metadata_json: String,
    wall_clock_ms: f64,
    steps_completed: u64,
    initial_state: Vec<f32>,
    samples: Vec<Sample>,
    spikes: Vec<Spike>,
}

/// Encode a record.
///
/// JSON encoding fails with [`StorageError::NonFiniteState`] when any state
/// value is infinite or NaN; bincode stores them exactly.
pub fn encode_trajectory(record: &TrajectoryRecord, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => {
            if let Some((time, node)) = record.first_non_finite() {
                return Err(StorageError::NonFiniteState { time, node });
            }
            Ok(serde_json::to_vec_pretty(record)?)
        }
        Format::Bincode => {
            let body = BinaryBody {
                metadata_json: serde_json::to_string(&record.metadata)?,
                wall_clock_ms: record.wall_clock_ms,
                steps_completed: record.steps_completed,
                initial_state: record.initial_state.clone(),
                samples: record.samples.clone(),
                spikes: record.spikes.clone(),
            };
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&magic::SNTR);
            bytes.extend_from_slice(&record.format_version.to_le_bytes());
            bytes.extend_from_slice(&bincode::serialize(&body)?);
            Ok(bytes)
        }
    }
}

/// Decode a record, detecting the encoding from its first bytes
pub fn decode_trajectory(data: &[u8]) -> Result<TrajectoryRecord> {
    if validate_magic(data, magic::SNTR).is_ok() {
        let mut reader = ByteReader::new(data);
        reader.take(4, "magic")?;
        let format_version = reader.u32("version")?;
        validate_version(format_version, TRAJECTORY_VERSION)?;
        let body: BinaryBody = bincode::deserialize(reader.rest())?;
        return Ok(TrajectoryRecord {
            format: TRAJECTORY_FORMAT.to_string(),
            format_version,
            metadata: serde_json::from_str(&body.metadata_json)?,
            wall_clock_ms: body.wall_clock_ms,
            steps_completed: body.steps_completed,
            initial_state: body.initial_state,
            samples: body.samples,
            spikes: body.spikes,
        });
    }

    let record: TrajectoryRecord = serde_json::from_slice(data)?;
    record.check_header()?;
    Ok(record)
}

/// Write a record to `path` in the given format
pub fn write_trajectory(path: impl AsRef<Path>, record: &TrajectoryRecord, format: Format) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_trajectory(record, format)?;
    fs::write(path, &bytes)?;
    info!(
        "Wrote {} samples to {} ({}, {} bytes)",
        record.samples.len(),
        path.display(),
        format,
        bytes.len()
    );
    Ok(())
}

/// Read a record written by [`write_trajectory`], in either format
pub fn read_trajectory(path: impl AsRef<Path>) -> Result<TrajectoryRecord> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let record = decode_trajectory(&bytes)?;
    debug!("Read {} samples from {}", record.samples.len(), path.display());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparsenet_engine::{DynamicsSpec, SimulationConfig, SimulationDriver, TopologySpec, WeightSpec};

    fn record() -> TrajectoryRecord {
        let config = SimulationConfig::new(
            6,
            TopologySpec::Clustered {
                cluster_count: 2,
                cluster_density: 0.5,
                inter_density: 0.1,
            },
            WeightSpec::Uniform { low: -0.3, high: 0.3 },
            DynamicsSpec::LeakyIntegrator { leak: 0.4 },
            12,
            5,
        )
        .with_sampling_stride(3);
        let result = SimulationDriver::new(config).unwrap().run().unwrap();
        TrajectoryRecord::from_result(&result)
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("bincode".parse::<Format>().unwrap(), Format::Bincode);
        assert!("npy".parse::<Format>().is_err());
        assert_eq!(Format::from_path("out/run.bin").unwrap(), Format::Bincode);
        assert!(Format::from_path("out/run").is_err());
        assert_eq!(Format::Json.extension(), "json");
    }

    #[test]
    fn test_both_encodings_decode_to_same_record() {
        let record = record();
        for format in [Format::Json, Format::Bincode] {
            let bytes = encode_trajectory(&record, format).unwrap();
            assert_eq!(decode_trajectory(&bytes).unwrap(), record, "{}", format);
        }
    }

    #[test]
    fn test_bincode_header() {
        let bytes = encode_trajectory(&record(), Format::Bincode).unwrap();
        assert_eq!(&bytes[..4], b"SNTR");

        let mut bumped = bytes.clone();
        bumped[4] = 7;
        assert!(matches!(
            decode_trajectory(&bumped),
            Err(StorageError::UnsupportedVersion { version: 7, .. })
        ));
    }

    #[test]
    fn test_json_header_checked() {
        let mut record = record();
        record.format = "something-else".to_string();
        let bytes = encode_trajectory(&record, Format::Json).unwrap();
        assert!(matches!(
            decode_trajectory(&bytes),
            Err(StorageError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_json_rejects_non_finite_state() {
        let mut record = record();
        record.samples[2].state[4] = f32::NEG_INFINITY;
        let err = encode_trajectory(&record, Format::Json).unwrap_err();
        assert!(matches!(
            err,
            StorageError::NonFiniteState {
                time: Some(6),
                node: 4
            }
        ));
        assert!(err.to_string().contains("bincode"));

        record.initial_state[1] = f32::NAN;
        assert_eq!(record.first_non_finite(), Some((None, 1)));

        let bytes = encode_trajectory(&record, Format::Bincode).unwrap();
        let decoded = decode_trajectory(&bytes).unwrap();
        assert!(decoded.initial_state[1].is_nan());
        assert_eq!(decoded.samples[2].state[4], f32::NEG_INFINITY);
    }

    #[test]
    fn test_into_trajectory() {
        let record = record();
        let times: Vec<u64> = record.samples.iter().map(|s| s.time).collect();
        let trajectory = record.into_trajectory().unwrap();
        assert_eq!(trajectory.times(), times);
        assert_eq!(trajectory.times(), vec![0, 3, 6, 9]);
    }
}
