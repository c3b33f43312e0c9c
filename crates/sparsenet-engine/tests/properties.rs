use proptest::prelude::*;
use sparsenet_engine::{
    Connectivity, DynamicsSpec, EngineError, InitialCondition, NodeId, PlasticityKind,
    PlasticitySpec, RandomStream, Recorder, RunMetadata, RunStatus, SimulationConfig,
    SimulationDriver, StimulationSchedule, StimulusSpec, TopologyBuilder, TopologySpec,
    WeightSpec,
};

fn base_config(n: usize, seed: u64) -> SimulationConfig {
    SimulationConfig::new(
        n,
        TopologySpec::UniformRandom { density: 0.15 },
        WeightSpec::SignedSplit {
            scale: 0.3,
            sign_ratio: 0.25,
            jitter: 0.1,
        },
        DynamicsSpec::StochasticBinary { gain: 3.0, bias: 0.2 },
        60,
        seed,
    )
    .with_initial(InitialCondition::Bernoulli { p: 0.3, value: 1.0 })
    .with_stimulus(StimulusSpec::Poisson {
        targets: (0..n as u32).map(NodeId::new).collect(),
        rate: 0.05,
        amount: 0.5,
        start: 0,
        duration: 60,
    })
}

fn hebbian() -> PlasticitySpec {
    PlasticitySpec::new(PlasticityKind::Hebbian {
        rate: 0.01,
        decay: 0.05,
        w_max: 1.0,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn identical_config_and_seed_give_identical_trajectories(seed in any::<u64>(), n in 5usize..40) {
        let a = SimulationDriver::new(base_config(n, seed)).unwrap().run().unwrap();
        let b = SimulationDriver::new(base_config(n, seed)).unwrap().run().unwrap();
        prop_assert_eq!(&a.trajectory, &b.trajectory);
        prop_assert_eq!(a.connectivity, b.connectivity);
        prop_assert_eq!(a.stats.draws, b.stats.draws);
    }

    #[test]
    fn plasticity_without_pruning_keeps_edge_set(seed in any::<u64>()) {
        let config = base_config(24, seed).with_plasticity(hebbian()).with_plasticity_window(3);
        let mut driver = SimulationDriver::new(config).unwrap();
        let initial = driver.connectivity().edge_set();
        while !driver.status().is_terminal() {
            driver.step().unwrap();
            prop_assert_eq!(driver.connectivity().edge_set(), initial.clone());
        }
        prop_assert_eq!(driver.stats().plasticity_updates, 60);
    }

    #[test]
    fn generated_topologies_have_no_self_loops(seed in any::<u64>(), density in 0.0f64..1.0) {
        let builder = TopologyBuilder::new(
            30,
            TopologySpec::UniformRandom { density },
            WeightSpec::Fixed { scale: 1.0 },
        ).unwrap();
        let c = builder.build(&mut RandomStream::new(seed)).unwrap();
        prop_assert_eq!(c.self_loop_count(), 0);
        prop_assert!(c.edge_count() <= 30 * 29);
    }
}

#[test]
fn uniform_density_matches_expected_edge_count() {
    let n = 400usize;
    let density = 0.05;
    let builder = TopologyBuilder::new(
        n,
        TopologySpec::UniformRandom { density },
        WeightSpec::Fixed { scale: 1.0 },
    )
    .unwrap();
    let c = builder.build(&mut RandomStream::new(2024)).unwrap();

    let pairs = (n * (n - 1)) as f64;
    let expected = density * pairs;
    let sd = (pairs * density * (1.0 - density)).sqrt();
    let observed = c.edge_count() as f64;
    assert!(
        (observed - expected).abs() < 5.0 * sd,
        "observed {} edges, expected {} +- {}",
        observed,
        expected,
        5.0 * sd
    );
    assert_eq!(c.self_loop_count(), 0);
}

#[test]
fn pruning_only_removes_edges() {
    let spec = PlasticitySpec::new(PlasticityKind::Hebbian {
        rate: 0.0,
        decay: 0.2,
        w_max: 1.0,
    })
    .with_pruning(0.05);
    let config = base_config(24, 3).with_plasticity(spec);
    let mut driver = SimulationDriver::new(config).unwrap();
    let initial = driver.connectivity().edge_set();
    while !driver.status().is_terminal() {
        driver.step().unwrap();
    }
    let remaining = driver.connectivity().edge_set();
    assert!(remaining.len() < initial.len());
    assert!(remaining.iter().all(|pair| initial.binary_search(pair).is_ok()));
    assert!(driver.stats().edges_pruned > 0);
}

#[test]
fn no_input_no_leak_zero_weights_is_constant() {
    let config = SimulationConfig::new(
        12,
        TopologySpec::UniformRandom { density: 0.3 },
        WeightSpec::Fixed { scale: 0.0 },
        DynamicsSpec::LeakyIntegrator { leak: 0.0 },
        40,
        9,
    )
    .with_initial(InitialCondition::Uniform { low: -1.0, high: 1.0 });

    let result = SimulationDriver::new(config).unwrap().run().unwrap();
    let initial = result.trajectory.initial_state().to_vec();
    assert_eq!(result.trajectory.len(), 40);
    for sample in result.trajectory.samples() {
        assert_eq!(sample.state, initial, "state changed at time {}", sample.time);
    }
}

#[test]
fn additive_event_shifts_only_its_target() {
    let config = SimulationConfig::new(
        4,
        TopologySpec::UniformRandom { density: 0.0 },
        WeightSpec::Fixed { scale: 0.0 },
        DynamicsSpec::LeakyIntegrator { leak: 0.0 },
        5,
        0,
    )
    .with_initial(InitialCondition::Explicit {
        values: vec![0.5, 1.0, 1.5, 2.0],
    })
    .with_stimulus(StimulusSpec::Pulse {
        time: 2,
        targets: vec![NodeId::new(0)],
        amount: 1.0,
    });

    let result = SimulationDriver::new(config).unwrap().run().unwrap();
    let traj = &result.trajectory;
    let at = |t: u64| traj.state_at(t).unwrap().to_vec();

    assert_eq!(at(2)[0], at(1)[0] + 1.0);
    assert_eq!(at(2)[1..], at(1)[1..]);
    for t in [0, 1] {
        assert_eq!(at(t), traj.initial_state());
    }
    for t in [3, 4] {
        assert_eq!(at(t), at(2));
    }
}

#[test]
fn sealed_recorder_rejects_appends() {
    let config = base_config(3, 0);
    let mut recorder = Recorder::new(RunMetadata::new(&config, 0, "test", None), 2);
    recorder.append(0, &[1.0, 2.0, 3.0]).unwrap();
    let sealed = recorder.seal().unwrap();
    let before = sealed.clone();

    for t in 1..5 {
        assert_eq!(
            recorder.append(t, &[0.0, 0.0, 0.0]),
            Err(EngineError::SealedRecorder { time: t })
        );
    }
    assert_eq!(sealed, before);
}

#[test]
fn stride_ten_over_hundred_steps_records_ten_samples() {
    let config = base_config(10, 4).with_total_steps(100).with_sampling_stride(10);
    let result = SimulationDriver::new(config).unwrap().run().unwrap();
    assert_eq!(result.trajectory.len(), 10);
    assert_eq!(
        result.trajectory.times(),
        vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]
    );
    assert_eq!(result.status, RunStatus::Completed);
}

#[test]
fn setup_errors_surface_before_running() {
    let config = SimulationConfig::new(
        5,
        TopologySpec::DegreeConstrained { degree_target: 5 },
        WeightSpec::Fixed { scale: 1.0 },
        DynamicsSpec::LeakyIntegrator { leak: 0.1 },
        10,
        1,
    );
    let err = SimulationDriver::new(config).unwrap_err();
    assert!(err.is_configuration_error());

    let err = SimulationDriver::new(base_config(5, 1).with_stimulus(StimulusSpec::Clamp {
        time: 0,
        targets: vec![NodeId::new(2)],
        value: 0.0,
    }).with_stimulus(StimulusSpec::Clamp {
        time: 0,
        targets: vec![NodeId::new(2)],
        value: 1.0,
    }).with_conflict_rejection(true))
    .unwrap_err();
    assert_eq!(err, EngineError::ScheduleConflict { time: 0, node: 2 });
}

#[test]
fn phase_oscillator_populations_stay_below_threshold() {
    let config = SimulationConfig::new(
        60,
        TopologySpec::Populations {
            sizes: vec![30, 30],
            in_degree: 5.0,
        },
        WeightSpec::PopulationCoupling {
            matrix: vec![vec![-0.06, -0.03], vec![-0.03, -0.06]],
        },
        DynamicsSpec::PhaseOscillator {
            current: 4.0,
            gamma: 1.0,
            dt: 0.01,
            delay_steps: 0,
        },
        400,
        26,
    )
    .with_initial(InitialCondition::Uniform { low: 0.0, high: 1.0 })
    .with_sampling_stride(4);

    let result = SimulationDriver::new(config).unwrap().run().unwrap();
    assert_eq!(result.trajectory.len(), 100);
    for sample in result.trajectory.samples() {
        assert!(sample.state.iter().all(|&v| v <= 1.0));
    }
}

#[test]
fn empty_schedule_and_connectivity_compose() {
    let schedule = StimulationSchedule::new(3);
    assert_eq!(schedule.events_at(0).count(), 0);
    let c = Connectivity::empty(3);
    assert_eq!(c.edge_count(), 0);
}
