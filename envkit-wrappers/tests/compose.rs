//! End-to-end tests over a composed wrapper chain.
use envkit_core::testing::{EchoEnv, CONTROL_TIMESTEP};
use envkit_core::{Environment, StepKind, ValueTree};
use envkit_wrappers::{
    wrap_all, ActionNoiseConfig, ActionNoiseWrapper, BoxedEnvironment, CanonicalSpecWrapper,
    ConcatObservationWrapper, FrameStackingConfig, FrameStackingWrapper, StepLimitConfig,
    StepLimitWrapper, ValidateActionSpecWrapper,
};

fn chain() -> BoxedEnvironment {
    let base: BoxedEnvironment = Box::new(EchoEnv::new(2, -2.0, 2.0).episode_len(100));
    wrap_all(
        base,
        vec![
            ActionNoiseWrapper::ctor(ActionNoiseConfig::default().scale(0.05)),
            CanonicalSpecWrapper::ctor(Default::default()),
            ValidateActionSpecWrapper::ctor(),
            FrameStackingWrapper::ctor(FrameStackingConfig::default().num_frames(3)),
            ConcatObservationWrapper::ctor(Default::default()),
            StepLimitWrapper::ctor(StepLimitConfig::default().step_limit(8)),
        ],
    )
    .unwrap()
}

#[test]
fn test_chain_advertises_transformed_specs() {
    let _ = env_logger::try_init();
    let env = chain();

    // Canonical action bounds survive to the outside.
    let action_spec = env.action_spec();
    let leaf = action_spec.as_leaf().unwrap();
    assert_eq!(leaf.shape(), &[2]);
    assert!(leaf.minimum().unwrap().iter().all(|&v| v == -1.0));
    assert!(leaf.maximum().unwrap().iter().all(|&v| v == 1.0));

    // Stacked then concatenated: (2 + 1 + 2) leaves, each stacked 3 deep.
    let obs_spec = env.observation_spec();
    assert_eq!(obs_spec.as_leaf().unwrap().shape(), &[15]);
}

#[test]
fn test_chain_keeps_base_capabilities_reachable() {
    let mut env = chain();
    assert_eq!(env.control_timestep(), Some(CONTROL_TIMESTEP));
    assert!(env.random_state().is_some());
}

#[test]
fn test_episode_protocol_through_the_chain() {
    let mut env = chain();
    let ts = env.reset().unwrap();
    assert_eq!(ts.kind, StepKind::First);
    assert!(ts.reward.is_none());
    assert!(ts.discount.is_none());

    let action = ValueTree::leaf_f64(vec![2], vec![0.5, -0.5]);
    let mut kinds = Vec::new();
    loop {
        let ts = env.step(&action).unwrap();
        assert!(ts.reward.is_some());
        assert!(ts.discount.is_some());
        kinds.push(ts.kind);
        if ts.is_last() {
            break;
        }
    }
    // The step limit cuts the 100-step episode at 8 steps.
    assert_eq!(kinds.len(), 8);
    assert!(kinds[..7].iter().all(|&k| k == StepKind::Mid));
    assert_eq!(kinds[7], StepKind::Last);

    // The chain is reusable for another episode.
    let ts = env.reset().unwrap();
    assert_eq!(ts.kind, StepKind::First);
}

#[test]
fn test_flattened_observation_reflects_forwarded_action() {
    let mut env = chain();
    env.reset().unwrap();
    let ts = env.step(&ValueTree::leaf_f64(vec![2], vec![1.0, -1.0])).unwrap();
    let flat: Vec<f64> = ts
        .observation
        .as_leaf()
        .unwrap()
        .to_f64()
        .iter()
        .cloned()
        .collect();
    assert_eq!(flat.len(), 15);
    // Leaves are ordered position, time, velocity; velocity occupies the
    // last 6 slots (3 stacked frames of 2 dims) and its newest frame holds
    // the decanonicalized, noise-corrupted action, still within [-2, 2].
    let newest_velocity = &flat[13..15];
    assert!(newest_velocity.iter().all(|v| (-2.0..=2.0).contains(v)));
    // Noise scale 0.05 on a range of 4 keeps the action near +/-2.
    assert!((newest_velocity[0] - 2.0).abs() < 1.0);
    assert!((newest_velocity[1] + 2.0).abs() < 1.0);
}
