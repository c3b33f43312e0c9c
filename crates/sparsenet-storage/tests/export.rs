use proptest::prelude::*;
use sparsenet_engine::{
    DynamicsSpec, InitialCondition, RandomStream, RunStatus, SimulationConfig, SimulationDriver,
    TopologyBuilder, TopologySpec, WeightSpec,
};
use sparsenet_storage::{
    decode_connectivity, encode_connectivity, read_connectivity, read_trajectory,
    write_connectivity, write_trajectory, Format, StorageError, TrajectoryRecord,
};
use tempfile::tempdir;

fn config() -> SimulationConfig {
    SimulationConfig::new(
        40,
        TopologySpec::DegreeConstrained { degree_target: 4 },
        WeightSpec::SignedSplit {
            scale: 0.2,
            sign_ratio: 0.3,
            jitter: 0.2,
        },
        DynamicsSpec::LinearThreshold {
            cutoff: 0.1,
            mode: Default::default(),
        },
        50,
        77,
    )
    .with_initial(InitialCondition::Bernoulli { p: 0.2, value: 1.0 })
    .with_sampling_stride(5)
}

#[test]
fn exported_trajectory_loads_without_rerun() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let result = SimulationDriver::new(config())?.run()?;
    let record = TrajectoryRecord::from_result(&result);

    for format in [Format::Json, Format::Bincode] {
        let path = dir.path().join(format!("traj.{}", format.extension()));
        write_trajectory(&path, &record, format)?;
        assert_eq!(Format::from_path(&path)?, format);

        let loaded = read_trajectory(&path)?;
        assert_eq!(loaded.metadata.config, config());
        assert_eq!(loaded.metadata.status, RunStatus::Completed);
        assert_eq!(loaded.steps_completed, 50);
        let trajectory = loaded.into_trajectory()?;
        assert_eq!(trajectory, result.trajectory);
    }
    Ok(())
}

#[test]
fn failed_run_exports_partial_trajectory() -> Result<(), Box<dyn std::error::Error>> {
    let diverging = SimulationConfig::new(
        5,
        TopologySpec::DegreeConstrained { degree_target: 2 },
        WeightSpec::Fixed { scale: 1.5 },
        DynamicsSpec::LeakyIntegrator { leak: 0.0 },
        100,
        3,
    )
    .with_initial(InitialCondition::Constant { value: 1.0 })
    .with_instability_bound(Some(1.0e4));

    let failure = SimulationDriver::new(diverging)?.run().unwrap_err();
    let record = TrajectoryRecord::from_failure(&failure);
    assert_eq!(record.metadata.status, RunStatus::Failed);

    let dir = tempdir()?;
    let path = dir.path().join("failed.json");
    write_trajectory(&path, &record, Format::Json)?;
    let loaded = read_trajectory(&path)?;
    assert_eq!(loaded.samples.len() as u64, failure.steps_completed);
    assert_eq!(loaded.wall_clock_ms, failure.wall_clock.as_secs_f64() * 1000.0);
    Ok(())
}

#[test]
fn unguarded_overflow_exports_only_as_bincode() -> Result<(), Box<dyn std::error::Error>> {
    let unguarded = SimulationConfig::new(
        6,
        TopologySpec::DegreeConstrained { degree_target: 1 },
        WeightSpec::Fixed { scale: 2.0 },
        DynamicsSpec::LeakyIntegrator { leak: 0.0 },
        200,
        9,
    )
    .with_initial(InitialCondition::Constant { value: 1.0 })
    .with_instability_bound(None);
    let result = SimulationDriver::new(unguarded)?.run()?;
    let record = TrajectoryRecord::from_result(&result);
    assert!(record.first_non_finite().is_some());

    let dir = tempdir()?;
    let json = dir.path().join("overflow.json");
    let err = write_trajectory(&json, &record, Format::Json).unwrap_err();
    assert!(matches!(err, StorageError::NonFiniteState { time: Some(_), .. }));
    assert!(!json.exists());

    let bin = dir.path().join("overflow.bin");
    write_trajectory(&bin, &record, Format::Bincode)?;
    let loaded = read_trajectory(&bin)?;
    assert_eq!(loaded.samples.last().map(|s| s.state[0]), Some(f32::INFINITY));
    assert_eq!(loaded.into_trajectory()?, result.trajectory);
    Ok(())
}

#[test]
fn spike_raster_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let oscillators = SimulationConfig::new(
        12,
        TopologySpec::UniformRandom { density: 0.2 },
        WeightSpec::Fixed { scale: 0.05 },
        DynamicsSpec::PhaseOscillator {
            current: 4.0,
            gamma: 1.0,
            dt: 0.05,
            delay_steps: 3,
        },
        120,
        4,
    )
    .with_initial(InitialCondition::Uniform { low: 0.0, high: 1.0 })
    .with_sampling_stride(10);
    let result = SimulationDriver::new(oscillators)?.run()?;
    assert!(!result.trajectory.spikes().is_empty());
    let record = TrajectoryRecord::from_result(&result);

    let dir = tempdir()?;
    for format in [Format::Json, Format::Bincode] {
        let path = dir.path().join(format!("spikes.{}", format.extension()));
        write_trajectory(&path, &record, format)?;
        let loaded = read_trajectory(&path)?;
        assert_eq!(loaded.spikes, result.trajectory.spikes());
        assert_eq!(loaded.into_trajectory()?.spikes(), result.trajectory.spikes());
    }
    Ok(())
}

#[test]
fn connectivity_snapshot_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("net.sncs");
    let result = SimulationDriver::new(config())?.run()?;

    write_connectivity(&path, &result.connectivity)?;
    assert_eq!(read_connectivity(&path)?, result.connectivity);
    Ok(())
}

#[test]
fn garbage_is_rejected() {
    let err = sparsenet_storage::decode_trajectory(b"not a trajectory").unwrap_err();
    assert!(matches!(err, StorageError::Json(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn payload_corruption_is_detected(seed in any::<u64>(), flip in any::<prop::sample::Index>(), bit in 0u8..8) {
        let c = TopologyBuilder::new(
            20,
            TopologySpec::UniformRandom { density: 0.2 },
            WeightSpec::Uniform { low: -1.0, high: 1.0 },
        )
        .unwrap()
        .build(&mut RandomStream::new(seed))
        .unwrap();

        let mut bytes = encode_connectivity(&c);
        let header = sparsenet_storage::snapshot::HEADER_LEN;
        let i = header + flip.index(bytes.len() - header);
        bytes[i] ^= 1 << bit;
        prop_assert!(
            matches!(decode_connectivity(&bytes), Err(StorageError::ChecksumMismatch { .. })),
            "flipping byte {} went unnoticed",
            i
        );
    }
}
