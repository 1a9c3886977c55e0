#![warn(missing_docs)]
//! Transformation layers for step-based environments.
//!
//! Each wrapper implements [`Environment`](envkit_core::Environment) itself
//! and rewrites the action on the way in and/or the timestep on the way out,
//! so wrappers stack in any order and to any depth. Chains are assembled
//! either by nesting constructors directly or at runtime with [`wrap_all`].
mod base;
pub use base::{wrap_all, BoxedEnvironment, WrapperCtor};

mod canonical_spec;
pub use canonical_spec::{CanonicalSpecConfig, CanonicalSpecWrapper};

mod concatenate_observations;
pub use concatenate_observations::{ConcatObservationConfig, ConcatObservationWrapper};

mod frame_stacking;
pub use frame_stacking::{FrameStackingConfig, FrameStackingWrapper};

mod action_noise;
pub use action_noise::{ActionNoiseConfig, ActionNoiseWrapper};

mod filter;
pub use filter::{ButterworthFilter, FilterType, IirFilter};

mod action_smoother;
pub use action_smoother::{ActionSmootherConfig, ActionSmootherWrapper};

mod step_limit;
pub use step_limit::{StepLimitConfig, StepLimitWrapper};

mod action_repeat;
pub use action_repeat::{ActionRepeatConfig, ActionRepeatWrapper};

mod single_precision;
pub use single_precision::SinglePrecisionWrapper;

mod expand_scalar_observation_shapes;
pub use expand_scalar_observation_shapes::ExpandScalarObservationShapesWrapper;

mod observation_action_reward;
pub use observation_action_reward::ObservationActionRewardWrapper;

mod episode_statistics;
pub use episode_statistics::{
    EpisodeStatistics, EpisodeStatisticsConfig, EpisodeStatisticsWrapper,
};

mod validate_spec;
pub use validate_spec::ValidateActionSpecWrapper;
