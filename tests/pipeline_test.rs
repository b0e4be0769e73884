use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use rusty_lgn::backend::{Backend, RecordingBackend, SynapseType};
use rusty_lgn::connectors::functions::{
    ConnectorFunction, GaussianDecayFunction, LinearDistanceFunction,
};
use rusty_lgn::connectors::modular::{
    ModularConnector, SamplingProbabilisticConnector, ValueDistribution,
};
use rusty_lgn::context::RunContext;
use rusty_lgn::retina::cache::StimulusId;
use rusty_lgn::retina::cell::GainControl;
use rusty_lgn::retina::kernel::SpatioTemporalKernel;
use rusty_lgn::retina::pipeline::{RetinaLgn, RetinaLgnParams, ON_SHEET};
use rusty_lgn::sheet::{Population, UniformSheet};
use rusty_lgn::space::UniformSpace;
use rusty_lgn::MAX_SYNAPTIC_DELAY;

const SEED: u64 = 42;

fn on_kernel() -> SpatioTemporalKernel {
    SpatioTemporalKernel::quantize(
        |x, y, t| {
            let r2 = x * x + y * y;
            ((-r2).exp() - 0.5 * (-r2 / 4.0).exp()) * (t / 20.0) * (-t / 20.0).exp()
        },
        2.0,
        2.0,
        100.0,
        0.5,
        0.5,
        10.0,
    )
    .unwrap()
}

fn params() -> RetinaLgnParams {
    RetinaLgnParams {
        density: 2.0,
        size: (2.0, 2.0),
        linear_scaler: 1.2,
        gain_control: GainControl {
            gain: 0.03,
            non_linear_gain: None,
        },
        injection_stride: 1,
        store_frames: false,
        noise: None,
    }
}

// Presenting an actual blank screen through the full convolution pipeline
// must land on the same amplitudes that the null-input fast path computes
// in closed form, and a second run against the same on-disk cache must
// reproduce them exactly.
#[test]
fn test_blank_stimulus_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let background = 50.0;
    let duration = 200.0;
    let mut space = UniformSpace::new(background, 10.0);
    let stimulus = StimulusId::new("blank")
        .with_parameter("background_luminance", "50.0")
        .with_trial(0);

    let mut first = RecordingBackend::new(0.1);
    {
        let context = RunContext::new(dir.path(), true, 1, SEED);
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut model = RetinaLgn::new(params(), on_kernel(), context, &mut rng).unwrap();
        model
            .process_input(&mut space, &stimulus, duration, 0.0, &mut first)
            .unwrap();

        // Null input on a separate backend gives the closed-form amplitude.
        let mut null_backend = RecordingBackend::new(0.1);
        model
            .provide_null_input(&space, duration, 0.0, &mut null_backend)
            .unwrap();

        let expected = null_backend.injections(ON_SHEET)[0].amplitudes[0];
        assert_abs_diff_eq!(
            expected,
            1.2 * 0.03 * on_kernel().sum() * background,
            epsilon = 1e-12
        );
        for injection in first.injections(ON_SHEET) {
            for &a in &injection.amplitudes {
                assert_abs_diff_eq!(a, expected, epsilon = 1e-9);
            }
        }
    }

    // A fresh model in a new run hits the disk cache and injects the same
    // currents (positions are redrawn from the same seed).
    let mut second = RecordingBackend::new(0.1);
    {
        let context = RunContext::new(dir.path(), true, 1, SEED);
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut model = RetinaLgn::new(params(), on_kernel(), context, &mut rng).unwrap();
        model
            .process_input(&mut space, &stimulus.clone().with_trial(1), duration, 0.0, &mut second)
            .unwrap();
    }
    assert_eq!(first.injections(ON_SHEET), second.injections(ON_SHEET));
}

// A full connectivity pathway: Gaussian-decay weights and distance-derived
// delays over two sheets, realized by weighted sampling into the backend.
#[test]
fn test_modular_connectivity_end_to_end() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let source = UniformSheet::new("X_ON", 4.0, 4.0, 8.0, &mut rng).unwrap();
    let target = UniformSheet::new("V1_Exc", 4.0, 4.0, 4.0, &mut rng).unwrap();
    let mut backend = RecordingBackend::new(0.1);

    let mut weight_functions: BTreeMap<String, Box<dyn ConnectorFunction>> = BTreeMap::new();
    weight_functions.insert(
        "f1".to_string(),
        Box::new(GaussianDecayFunction::new(&source, &target, 1.5, 1.0)),
    );
    let mut delay_functions: BTreeMap<String, Box<dyn ConnectorFunction>> = BTreeMap::new();
    delay_functions.insert(
        "d1".to_string(),
        Box::new(LinearDistanceFunction::new(&source, &target, 1.0, 3.0)),
    );

    let base = ModularConnector::new(
        "AfferentConnection",
        weight_functions,
        "f1",
        delay_functions,
        "d1",
        SynapseType::Static,
        &backend,
    )
    .unwrap();

    let num_samples = 50.0;
    let base_weight = 0.002;
    let connector = SamplingProbabilisticConnector::new(
        base,
        ValueDistribution::constant(num_samples),
        ValueDistribution::constant(base_weight),
    );
    let created = connector
        .connect(&source, &target, &mut backend, &mut rng)
        .unwrap();
    assert!(created > 0);

    let projection = &backend.projections()[0];
    assert_eq!(projection.source, "X_ON");
    assert_eq!(projection.target, "V1_Exc");
    assert_eq!(projection.label, "AfferentConnection");

    // Every target neuron received exactly num_samples weighted draws.
    for i in 0..target.size() {
        let afferent: f64 = projection
            .connections
            .iter()
            .filter(|c| c.target_id() == i)
            .map(|c| c.weight())
            .sum();
        assert_abs_diff_eq!(afferent, num_samples * base_weight, epsilon = 1e-12);
    }

    // Delays sit on the time-step grid below the ceiling.
    let time_step = backend.time_step();
    for connection in &projection.connections {
        assert!(connection.delay() <= MAX_SYNAPTIC_DELAY);
        let steps = connection.delay() / time_step;
        assert!(
            connection.delay() == MAX_SYNAPTIC_DELAY || (steps - steps.round()).abs() < 1e-9
        );
    }
}
